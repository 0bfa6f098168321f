//! ClawStore Docs: Embedded RAM-First Document Store
//!
//! Records live in memory, grouped into named collections, and are written
//! back to one file per document on a paced background schedule.
//!
//! # Architecture
//!
//! - **Read path**: Served from RAM; callers get an independent copy built on a
//!   pooled instance, never the cached record
//! - **Write path**: Copy into RAM, mark stale, queue for write-back
//! - **Write-back scheduler**: Full write of every stale document each
//!   `persist_every`, smoothed by rate-limited partial writes in between
//! - **Merge-on-write**: Fields the current code no longer declares survive on
//!   disk
//!
//! # Example
//!
//! ```no_run
//! use clawstore_docs::{record_fields, Config, Database, FieldDescriptor, Record};
//!
//! #[derive(Default)]
//! struct Player {
//!     uid: String,
//!     health: i32,
//! }
//!
//! impl Record for Player {
//!     const TYPE_NAME: &'static str = "game::Player";
//!     fn fields() -> Vec<FieldDescriptor<Self>> {
//!         record_fields!(Player { uid, health })
//!     }
//! }
//!
//! # fn main() -> clawstore_docs::DocResult<()> {
//! let db = Database::new("./save", Config::standard())?;
//! db.register::<Player>()?;
//! db.init()?;
//!
//! let mut player = Player { uid: String::new(), health: 100 };
//! let uid = db.insert("players", &mut player)?;
//! let healthy = db.select::<Player, _>("players", |p| p.health > 50)?;
//! assert_eq!(healthy.len(), 1);
//! # let _ = uid;
//! db.shutdown()?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod collection;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod fileio;
pub mod obfuscation;
pub mod persistence;
pub mod platform_durability;
pub mod pool;
pub mod scheduler;
pub mod schema;

// Re-export key types for convenience
pub use codec::{Codec, JsonCodec};
pub use collection::{Collection, Collections};
pub use config::Config;
pub use document::{Document, RecordType};
pub use engine::{Database, LoadFailure, LoadReport};
pub use error::{DocError, DocResult};
pub use fileio::{DiskIo, FileIo, MemoryIo};
pub use persistence::{CollectionDefinition, Persistence};
pub use pool::{ObjectPool, PoolStats};
pub use scheduler::{
    start_ticker, FlushReport, SchedulerState, SchedulerStats, TickOutcome, TickerHandle,
    WriteBackScheduler,
};
pub use schema::{copy_saved_data, FieldDescriptor, Record, Schema};

#[doc(hidden)]
pub mod __private {
    pub use serde_json;
    pub use serde_json::Value;
}
