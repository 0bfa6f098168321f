//! Persistence layer: documents and collection definitions on disk
//!
//! # Layout
//!
//! ```text
//! <root>/
//!   players/
//!     definition                    {"name": "players", "document_type": "game::Player"}
//!     0f3c9a...                     one file per document, named by uid
//!   monsters/
//!     ...
//! ```
//!
//! # Merge-on-write
//!
//! When enabled, writing a document over an existing file keeps every field of
//! the old file the current type no longer declares. Renaming or removing a
//! field in code therefore never destroys data already on disk.
//!
//! # Retries
//!
//! Transient I/O errors are retried: [`DOCUMENT_WRITE_ATTEMPTS`] times for a
//! document write, [`FILE_OP_ATTEMPTS`] times for everything else. Integrity
//! errors are returned at once.

use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::codec::{Codec, JsonCodec};
use crate::collection::Collection;
use crate::config::Config;
use crate::document::{Document, RecordType, DEFINITION_FILE};
use crate::error::{DocError, DocResult};
use crate::fileio::FileIo;
use crate::obfuscation;

/// Attempts per document write.
pub const DOCUMENT_WRITE_ATTEMPTS: u32 = 3;

/// Attempts per delete, load, definition or wipe operation.
pub const FILE_OP_ATTEMPTS: u32 = 10;

/// Contents of a collection's `definition` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDefinition {
    pub name: String,
    pub document_type: String,
}

/// Run `f` until it succeeds, fails with a non-transient error, or has been
/// tried `attempts` times.
pub fn with_retries<R>(
    attempts: u32,
    operation: &str,
    mut f: impl FnMut() -> DocResult<R>,
) -> DocResult<R> {
    let attempts = attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match f() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                debug!(operation, attempt, error = %e, "transient failure");
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(DocError::RetriesExhausted {
        operation: operation.to_string(),
        attempts,
        last_error: Box::new(last_error.unwrap_or(DocError::Io {
            path: None,
            kind: std::io::ErrorKind::Other,
            message: "no attempt recorded".to_string(),
        })),
    })
}

/// Combine a document's fresh fields with the file it replaces. Old fields keep
/// their value unless the fresh object carries the same name.
pub fn merge_objects(old: Map<String, Value>, fresh: Map<String, Value>) -> Map<String, Value> {
    let mut merged = old;
    merged.extend(fresh);
    merged
}

fn document_path(collection: &str, uid: &str) -> PathBuf {
    Path::new(collection).join(uid)
}

fn definition_path(collection: &str) -> PathBuf {
    Path::new(collection).join(DEFINITION_FILE)
}

/// Reads and writes documents through a [`FileIo`].
pub struct Persistence {
    io: Arc<dyn FileIo>,
    codec: Arc<dyn Codec>,
    merge_on_write: bool,
    obfuscate: bool,
}

impl Persistence {
    pub fn new(io: Arc<dyn FileIo>, codec: Arc<dyn Codec>, merge_on_write: bool, obfuscate: bool) -> Self {
        Self { io, codec, merge_on_write, obfuscate }
    }

    /// JSON persistence with the file options from `config`.
    pub fn from_config(io: Arc<dyn FileIo>, config: &Config) -> Self {
        Self::new(
            io,
            Arc::new(JsonCodec::new(config.indent_json)),
            config.merge_on_write,
            config.obfuscate_files,
        )
    }

    fn encode_bytes(&self, value: &Value) -> DocResult<Vec<u8>> {
        let bytes = self.codec.encode(value)?;
        if self.obfuscate {
            Ok(obfuscation::obfuscate(&bytes))
        } else {
            Ok(bytes)
        }
    }

    /// Transformed files are recognised regardless of the current setting.
    fn decode_bytes(&self, path: &Path, bytes: &[u8]) -> DocResult<Value> {
        let corrupt = |reason: String| DocError::CorruptDocument { path: path.to_path_buf(), reason };

        if obfuscation::is_obfuscated(bytes) {
            let plain = obfuscation::unobfuscate(bytes).map_err(corrupt)?;
            self.codec.decode(&plain).map_err(|e| corrupt(e.to_string()))
        } else {
            self.codec.decode(bytes).map_err(|e| corrupt(e.to_string()))
        }
    }

    fn read_file(&self, path: &Path) -> DocResult<Option<Vec<u8>>> {
        self.io.read(path).map_err(|e| DocError::io(path, &e, "read"))
    }

    /// Create the database root if it does not exist.
    pub fn ensure_root(&self) -> DocResult<()> {
        let root = Path::new("");
        with_retries(FILE_OP_ATTEMPTS, "create database root", || {
            self.io.create_dir(root).map_err(|e| DocError::io(root, &e, "create root"))
        })
    }

    /// Write `document` to its file. Returns `false` without touching the file
    /// if the document is no longer the current entry for its uid (deleted or
    /// replaced since it was queued).
    pub fn save_document(&self, collection: &Collection, document: &Document) -> DocResult<bool> {
        let fresh = collection.record_type().encode(&**document.data())?;
        let path = document_path(collection.name(), document.uid());
        let operation = format!("write document {}", path.display());

        with_retries(DOCUMENT_WRITE_ATTEMPTS, &operation, || {
            let _io = collection.lock_io();

            match collection.get(document.uid()) {
                Some(current) if ptr::eq(current.as_ref(), document) => {}
                _ => return Ok(false),
            }

            if !self.io.dir_exists(Path::new(collection.name())) {
                self.write_definition(collection)?;
            }

            let object = if self.merge_on_write {
                self.merge_with_existing(&path, fresh.clone())?
            } else {
                fresh.clone()
            };

            let bytes = self.encode_bytes(&Value::Object(object))?;
            self.io
                .write(&path, &bytes)
                .map_err(|e| DocError::io(&path, &e, "write document"))?;
            Ok(true)
        })
    }

    fn merge_with_existing(&self, path: &Path, fresh: Map<String, Value>) -> DocResult<Map<String, Value>> {
        let Some(existing) = self.read_file(path)? else {
            return Ok(fresh);
        };

        match self.decode_bytes(path, &existing) {
            Ok(Value::Object(old)) => Ok(merge_objects(old, fresh)),
            Ok(_) => {
                warn!(path = %path.display(), "existing document is not an object, overwriting");
                Ok(fresh)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "existing document is corrupt, overwriting");
                Ok(fresh)
            }
        }
    }

    /// Read the document stored as `file_name` in `collection`.
    pub fn load_document(&self, collection: &str, file_name: &str, record_type: &RecordType) -> DocResult<Document> {
        let path = document_path(collection, file_name);
        let operation = format!("read document {}", path.display());

        let bytes = with_retries(FILE_OP_ATTEMPTS, &operation, || self.read_file(&path))?
            .ok_or_else(|| DocError::CorruptDocument {
                path: path.clone(),
                reason: "file disappeared while loading".to_string(),
            })?;

        let object = match self.decode_bytes(&path, &bytes)? {
            Value::Object(object) => object,
            _ => {
                return Err(DocError::CorruptDocument {
                    path,
                    reason: "document is not an object".to_string(),
                })
            }
        };

        let (uid, data) = record_type.decode(&object).map_err(|e| DocError::CorruptDocument {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        if uid != file_name {
            return Err(DocError::UidMismatch {
                collection: collection.to_string(),
                file_name: file_name.to_string(),
                uid,
            });
        }
        Ok(Document::loaded(uid, data))
    }

    fn write_definition(&self, collection: &Collection) -> DocResult<()> {
        let dir = Path::new(collection.name());
        self.io
            .create_dir(dir)
            .map_err(|e| DocError::io(dir, &e, "create collection directory"))?;

        let definition = CollectionDefinition {
            name: collection.name().to_string(),
            document_type: collection.record_type().type_name().to_string(),
        };
        let bytes = self.encode_bytes(&serde_json::to_value(&definition)?)?;
        let path = definition_path(collection.name());
        self.io
            .write(&path, &bytes)
            .map_err(|e| DocError::io(&path, &e, "write definition"))
    }

    /// Create the collection directory and write its definition file.
    pub fn save_collection_definition(&self, collection: &Collection) -> DocResult<()> {
        let operation = format!("write definition for {}", collection.name());
        with_retries(FILE_OP_ATTEMPTS, &operation, || {
            let _io = collection.lock_io();
            self.write_definition(collection)
        })
    }

    pub fn load_collection_definition(&self, collection: &str) -> DocResult<CollectionDefinition> {
        let path = definition_path(collection);
        let operation = format!("read definition {}", path.display());

        let bytes = with_retries(FILE_OP_ATTEMPTS, &operation, || self.read_file(&path))?
            .ok_or_else(|| DocError::MissingDefinition { collection: collection.to_string() })?;

        let definition: CollectionDefinition = serde_json::from_value(self.decode_bytes(&path, &bytes)?)
            .map_err(|e| DocError::CorruptDocument { path: path.clone(), reason: e.to_string() })?;

        if definition.name != collection {
            return Err(DocError::DefinitionMismatch {
                collection: collection.to_string(),
                found: definition.name,
            });
        }
        Ok(definition)
    }

    /// Names of the collection directories under the root.
    pub fn list_collections(&self) -> DocResult<Vec<String>> {
        let root = Path::new("");
        with_retries(FILE_OP_ATTEMPTS, "list collections", || {
            self.io.list_dirs(root).map_err(|e| DocError::io(root, &e, "list collections"))
        })
    }

    /// Uids of the document files in `collection`.
    pub fn list_documents(&self, collection: &str) -> DocResult<Vec<String>> {
        let dir = Path::new(collection);
        let operation = format!("list documents in {}", collection);
        let mut files = with_retries(FILE_OP_ATTEMPTS, &operation, || {
            self.io.list_files(dir).map_err(|e| DocError::io(dir, &e, "list documents"))
        })?;
        files.retain(|name| name != DEFINITION_FILE);
        Ok(files)
    }

    pub fn delete_document(&self, collection: &Collection, uid: &str) -> DocResult<()> {
        let path = document_path(collection.name(), uid);
        let operation = format!("delete document {}", path.display());
        with_retries(FILE_OP_ATTEMPTS, &operation, || {
            let _io = collection.lock_io();
            self.io.delete(&path).map_err(|e| DocError::io(&path, &e, "delete document"))
        })
    }

    /// Remove every collection directory. Returns how many were removed.
    pub fn wipe_all(&self) -> DocResult<usize> {
        let collections = self.list_collections()?;
        for name in &collections {
            let dir = Path::new(name);
            let operation = format!("delete collection {}", name);
            with_retries(FILE_OP_ATTEMPTS, &operation, || {
                self.io.delete_dir(dir).map_err(|e| DocError::io(dir, &e, "delete collection"))
            })?;
        }
        Ok(collections.len())
    }
}
