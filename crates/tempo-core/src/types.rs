use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Tenant scope attached to every persisted row.
///
/// The host framework resolves the account for a request and passes it into
/// every engine operation; the stores append it to every query so one
/// tenant can never observe another's rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The user (or system process) performing an operation, recorded in
/// `created_by` columns and checked against the permission gate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The closed set of entities that carry version history and content.
///
/// A closed enum instead of free-form strings: an unknown kind is a compile
/// error at the call site, not a runtime lookup failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    /// A single named function of a job (`execute`, `set_up`, ...).
    Function,
    /// The job's whole assembled executable unit.
    Job,
}

impl std::fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SubjectKind::Function => "function",
            SubjectKind::Job => "job",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for SubjectKind {
    type Err = CoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "function" => Ok(SubjectKind::Function),
            "job" => Ok(SubjectKind::Job),
            other => Err(CoreError::UnknownSubjectKind(other.to_string())),
        }
    }
}

/// A versionable entity: kind plus its row id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    pub kind: SubjectKind,
    pub id: String,
}

impl Subject {
    pub fn function(id: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::Function,
            id: id.into(),
        }
    }

    pub fn job(id: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::Job,
            id: id.into(),
        }
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
