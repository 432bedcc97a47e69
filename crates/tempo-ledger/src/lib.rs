//! `tempo-ledger` — append-only version history over content-addressed
//! storage.
//!
//! Every mutation of a function body (or of a job's assembled unit) lands as
//! a new version row: `max(version_number) + 1`, never reused, exactly one
//! row current per subject. Rollback appends a new version pointing at the
//! old content hash — history is never rewritten.
//!
//! [`functions::FunctionStore`] is the write path the host calls: it stores
//! the body, records the function version, retargets the function pointer
//! and synchronously reassembles the owning job's executable unit, all in
//! one transaction. If the assembler refuses, the whole mutation rolls back
//! and the previous unit stays current.

pub mod assembler;
pub mod db;
pub mod diff;
pub mod error;
pub mod functions;
pub mod ledger;
pub mod types;

pub use assembler::{AssemblyError, FunctionSource, JobAssembler, SectionAssembler};
pub use error::{LedgerError, Result};
pub use functions::FunctionStore;
pub use ledger::VersionLedger;
pub use types::{DiffSummary, FunctionRecord, Version};
