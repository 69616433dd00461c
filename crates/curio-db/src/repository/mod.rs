//! # Repository Layer
//!
//! Data access objects over the SQLite local store. Each repository wraps
//! the shared connection pool and owns the SQL for one table:
//!
//! - [`records`] — the local record cache (mirrors remote truth + local edits)
//! - [`mutations`] — the durable pending-mutation queue
//! - [`metadata`] — key/value sync metadata (last sync timestamp, etc.)

pub mod metadata;
pub mod mutations;
pub mod records;

pub use metadata::MetadataRepository;
pub use mutations::MutationRepository;
pub use records::RecordRepository;
