use crate::error::{CoreError, Result};
use crate::types::ActorId;

/// All engine actions that can be permission-checked in one place. Adding a
/// new action here forces every gate implementation to handle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Read a job, its history or its statistics.
    View,
    /// Create or mutate a job or one of its functions.
    Edit,
    /// Enqueue, claim or finish executions.
    Execute,
    /// Pull a job out of the dead-letter queue.
    Recover,
    /// Maintenance sweeps (orphan purge, lease reaping).
    Maintain,
}

impl Action {
    /// Short action name forwarded to the host framework's checker.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Edit => "edit",
            Action::Execute => "execute",
            Action::Recover => "recover",
            Action::Maintain => "maintain",
        }
    }
}

/// Authorization is owned by the surrounding framework; the engine only
/// asks. Implementations map `(actor, action, resource)` onto whatever
/// role/ACL model the host uses.
pub trait PermissionGate: Send + Sync {
    fn can_perform(&self, actor: &ActorId, action: Action, resource: &str) -> bool;
}

/// Gate that allows everything. Default for tests and single-user hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionGate for AllowAll {
    fn can_perform(&self, _actor: &ActorId, _action: Action, _resource: &str) -> bool {
        true
    }
}

/// Check the gate and turn a refusal into `PermissionDenied`.
pub fn ensure(
    gate: &dyn PermissionGate,
    actor: &ActorId,
    action: Action,
    resource: &str,
) -> Result<()> {
    if gate.can_perform(actor, action, resource) {
        Ok(())
    } else {
        Err(CoreError::PermissionDenied {
            reason: format!("{actor} may not {} {resource}", action.as_str()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DenyEdits;

    impl PermissionGate for DenyEdits {
        fn can_perform(&self, _actor: &ActorId, action: Action, _resource: &str) -> bool {
            action != Action::Edit
        }
    }

    #[test]
    fn allow_all_allows() {
        let actor = ActorId::new("u-1");
        assert!(AllowAll.can_perform(&actor, Action::Edit, "job:1"));
    }

    #[test]
    fn ensure_maps_refusal_to_error() {
        let actor = ActorId::new("u-1");
        assert!(ensure(&DenyEdits, &actor, Action::View, "job:1").is_ok());
        let err = ensure(&DenyEdits, &actor, Action::Edit, "job:1").unwrap_err();
        assert!(matches!(err, CoreError::PermissionDenied { .. }));
    }
}
