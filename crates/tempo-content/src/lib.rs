//! `tempo-content` — content-addressable source storage.
//!
//! Function and job source blobs are keyed by the SHA-256 of their
//! uncompressed text, stored gzip-compressed and reference-counted.
//! Identical bodies are stored once; `put` on a known hash is a single
//! atomic counter bump. Rows whose count reaches zero stay in place until
//! the explicit [`ContentStore::purge_orphans`] sweep so a concurrent
//! re-reference can never race a delete.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::{ContentError, Result};
pub use store::{get_in, put_in, reference_count_in, release_in, ContentStore};
pub use types::ContentStats;
