//! Error types for document store operations
//!
//! All errors are represented by the DocError enum. Variants fall into three
//! groups: transient I/O failures (retried with a bounded budget), data
//! integrity failures (never retried) and misuse of the API (returned at once).

use std::fmt;
use std::error::Error;
use std::path::PathBuf;

/// Document store error types with detailed context
#[derive(Debug, Clone)]
pub enum DocError {
    /// I/O operation failed
    Io {
        /// The file path where the error occurred
        path: Option<PathBuf>,
        /// The underlying I/O error kind
        kind: std::io::ErrorKind,
        /// Human-readable description
        message: String,
    },

    /// A transient operation kept failing until its retry budget ran out
    RetriesExhausted {
        /// What was being attempted
        operation: String,
        /// How many attempts were made
        attempts: u32,
        /// The error returned by the final attempt
        last_error: Box<DocError>,
    },

    /// The identity stored inside a document file differs from its file name
    UidMismatch {
        collection: String,
        file_name: String,
        uid: String,
    },

    /// A document or definition file could not be decoded
    CorruptDocument {
        path: PathBuf,
        reason: String,
    },

    /// A collection definition names a record type that is not registered
    UnresolvedType {
        collection: String,
        type_name: String,
    },

    /// The name inside a definition file differs from its directory
    DefinitionMismatch {
        collection: String,
        found: String,
    },

    /// A collection directory has no definition file
    MissingDefinition {
        collection: String,
    },

    /// A record type declares no `uid`/`UID` field
    MissingIdentityField {
        type_name: &'static str,
    },

    /// A record type's identity field does not hold a string
    InvalidIdentityField {
        type_name: &'static str,
        field: &'static str,
    },

    /// A record type was used against a collection holding another type
    TypeMismatch {
        collection: String,
        expected: String,
        actual: String,
    },

    /// Two distinct Rust types registered under the same stable type name
    DuplicateTypeName {
        type_name: &'static str,
    },

    /// A caller-supplied uid cannot be used as a file name
    InvalidUid {
        uid: String,
        reason: &'static str,
    },

    /// A record field could not be converted to or from its stored value
    Serialization {
        message: String,
    },

    /// A forced flush finished with documents still unwritten
    FlushIncomplete {
        written: usize,
        failed: usize,
        first_error: Box<DocError>,
    },

    /// Configuration failed validation
    InvalidConfig(String),

    /// The database has not been initialised (or has been shut down)
    NotInitialised,

    /// `init` was called on a database that is already running
    AlreadyInitialised,
}

impl DocError {
    /// Whether the failure may succeed if the same operation is attempted again.
    pub fn is_transient(&self) -> bool {
        matches!(self, DocError::Io { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, err: &std::io::Error, context: &str) -> Self {
        DocError::Io {
            path: Some(path.into()),
            kind: err.kind(),
            message: format!("{}: {}", context, err),
        }
    }
}

impl fmt::Display for DocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocError::Io { path, kind, message } => {
                if let Some(path) = path {
                    write!(f, "I/O error in {}: {} ({})", path.display(), message, kind)
                } else {
                    write!(f, "I/O error: {} ({})", message, kind)
                }
            }

            DocError::RetriesExhausted { operation, attempts, last_error } => {
                write!(f, "{} failed after {} attempts: {}", operation, attempts, last_error)
            }

            DocError::UidMismatch { collection, file_name, uid } => {
                write!(f, "Document file \"{}\" in collection \"{}\" holds uid \"{}\"",
                       file_name, collection, uid)
            }

            DocError::CorruptDocument { path, reason } => {
                write!(f, "Corrupt file {}: {}", path.display(), reason)
            }

            DocError::UnresolvedType { collection, type_name } => {
                write!(f, "Collection \"{}\" stores type \"{}\" which is not registered (renamed or removed?)",
                       collection, type_name)
            }

            DocError::DefinitionMismatch { collection, found } => {
                write!(f, "Definition for collection \"{}\" names collection \"{}\"", collection, found)
            }

            DocError::MissingDefinition { collection } => {
                write!(f, "Collection \"{}\" has no definition file", collection)
            }

            DocError::MissingIdentityField { type_name } => {
                write!(f, "Record type {} declares no \"uid\" field", type_name)
            }

            DocError::InvalidIdentityField { type_name, field } => {
                write!(f, "Identity field \"{}\" of record type {} is not a string", field, type_name)
            }

            DocError::TypeMismatch { collection, expected, actual } => {
                write!(f, "Collection \"{}\" stores {} but was accessed as {}", collection, expected, actual)
            }

            DocError::DuplicateTypeName { type_name } => {
                write!(f, "Type name \"{}\" is already registered to a different type", type_name)
            }

            DocError::InvalidUid { uid, reason } => {
                write!(f, "Invalid uid \"{}\": {}", uid, reason)
            }

            DocError::Serialization { message } => {
                write!(f, "Serialization error: {}", message)
            }

            DocError::FlushIncomplete { written, failed, first_error } => {
                write!(f, "Flush wrote {} documents but {} failed: {}", written, failed, first_error)
            }

            DocError::InvalidConfig(reason) => write!(f, "Invalid configuration: {}", reason),

            DocError::NotInitialised => write!(f, "Database is not initialised"),

            DocError::AlreadyInitialised => write!(f, "Database is already initialised"),
        }
    }
}

impl Error for DocError {}

/// Convert std::io::Error to DocError::Io
impl From<std::io::Error> for DocError {
    fn from(err: std::io::Error) -> Self {
        DocError::Io {
            path: None,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for DocError {
    fn from(err: serde_json::Error) -> Self {
        DocError::Serialization { message: err.to_string() }
    }
}

/// Result type alias for document store operations
pub type DocResult<T> = Result<T, DocError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DocError::UidMismatch {
            collection: "players".to_string(),
            file_name: "abc".to_string(),
            uid: "xyz".to_string(),
        };

        let display = format!("{}", err);
        assert!(display.contains("players"));
        assert!(display.contains("abc"));
        assert!(display.contains("xyz"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let doc_err: DocError = io_err.into();

        match doc_err {
            DocError::Io { kind, .. } => assert_eq!(kind, std::io::ErrorKind::NotFound),
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_only_io_is_transient() {
        let io: DocError = std::io::Error::new(std::io::ErrorKind::Other, "busy").into();
        assert!(io.is_transient());
        assert!(!DocError::NotInitialised.is_transient());
        assert!(!DocError::MissingDefinition { collection: "c".into() }.is_transient());
    }

    #[test]
    fn test_retries_exhausted_wraps_last_error() {
        let last: DocError = std::io::Error::new(std::io::ErrorKind::Other, "disk busy").into();
        let err = DocError::RetriesExhausted {
            operation: "delete document".to_string(),
            attempts: 10,
            last_error: Box::new(last),
        };
        let display = err.to_string();
        assert!(display.contains("10 attempts"));
        assert!(display.contains("disk busy"));
    }
}
