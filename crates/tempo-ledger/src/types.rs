use serde::{Deserialize, Serialize};

use tempo_core::Subject;

/// One append-only version record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    /// UUIDv7 primary key — time-sortable.
    pub id: String,
    /// The entity this version belongs to.
    pub subject: Subject,
    /// Strictly increasing per subject, starting at 1, never reused.
    pub version_number: i64,
    /// SHA-256 of the uncompressed source this version points at.
    pub content_hash: String,
    /// Exactly one version per subject carries this flag.
    pub is_current: bool,
    /// Human-readable description supplied by the caller (or generated for
    /// rollbacks and assemblies).
    pub change_description: String,
    /// Line-count summary against the previous current version.
    pub diff_summary: Option<DiffSummary>,
    pub created_by: String,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

/// Line-oriented change summary between two versions.
///
/// Direction is explicit: the counts describe going *from* `from_version`
/// *to* `to_version`. A replaced line counts once under `lines_changed`;
/// unpaired inserts and deletes land in added/removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub from_version: i64,
    pub to_version: i64,
    pub lines_added: usize,
    pub lines_removed: usize,
    pub lines_changed: usize,
    pub total_before: usize,
    pub total_after: usize,
}

/// A live function row: a named pointer into the content store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub id: String,
    pub job_id: String,
    /// Conventionally `execute`, `set_up` or `tear_down`.
    pub name: String,
    /// The hash the pointer currently targets.
    pub content_hash: String,
    pub created_at: String,
    pub updated_at: String,
}
