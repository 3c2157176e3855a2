//! `normstore` — generic SQLite-backed persistence shared by the NormCode
//! engine: a canonical-JSON serializer, a small `Record`/`Store` document
//! abstraction, and the concrete checkpoint database described by the
//! engine's checkpoint/resume/fork contract.

pub mod canonical;
pub mod checkpoint;
pub mod error;
pub mod record;

pub use canonical::{from_canonical_json, to_canonical_json};
pub use checkpoint::{CheckpointRow, CheckpointStore, ExecutionRow, LogRow};
pub use error::{Result, StoreError};
pub use record::{Filter, FilterOp, IndexValue, Record, SqliteStore};
