//! Pure Hello-acceptance policy (spec.md §4.7, enumerated in §8 "Hello
//! policy").
//!
//! Grounded field-for-field in
//! `examples/original_source/src/network/hello_policy.hpp`'s
//! `decide_hello` free function: no side effects, so the scenario table in
//! spec.md §8 can be checked directly against this function.

use zinc_core::ids::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelloDecisionKind {
    Accept,
    AcceptPairingBootstrap,
    DisconnectSelf,
    DisconnectIdentityMismatch,
    DisconnectWorkspaceMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloDecision {
    pub kind: HelloDecisionKind,
    pub reason: String,
}

impl HelloDecision {
    fn new(kind: HelloDecisionKind, reason: impl Into<String>) -> Self {
        HelloDecision { kind, reason: reason.into() }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self.kind, HelloDecisionKind::Accept | HelloDecisionKind::AcceptPairingBootstrap)
    }
}

/// `expected_peer_id` is only consulted when `allow_rekey_on_hello` is
/// false — callers that don't yet know who they're talking to (inbound
/// accepts, pairing) pass `allow_rekey_on_hello = true` and any value here.
#[allow(clippy::too_many_arguments)]
pub fn decide_hello(
    local_device_id: Id,
    local_workspace_id: Id,
    expected_peer_id: Id,
    allow_rekey_on_hello: bool,
    remote_device_id: Id,
    remote_workspace_id: Id,
) -> HelloDecision {
    if remote_device_id == local_device_id {
        return HelloDecision::new(HelloDecisionKind::DisconnectSelf, "Hello from self");
    }

    if !allow_rekey_on_hello && expected_peer_id != remote_device_id {
        return HelloDecision::new(HelloDecisionKind::DisconnectIdentityMismatch, "Peer identity mismatch");
    }

    if remote_workspace_id != local_workspace_id {
        let pairing_bootstrap =
            allow_rekey_on_hello && (remote_workspace_id.is_nil() || local_workspace_id.is_nil());
        if pairing_bootstrap {
            return HelloDecision::new(HelloDecisionKind::AcceptPairingBootstrap, "Pairing bootstrap allowed");
        }
        return HelloDecision::new(HelloDecisionKind::DisconnectWorkspaceMismatch, "Workspace mismatch");
    }

    HelloDecision::new(HelloDecisionKind::Accept, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    // spec.md §8's enumerated Hello policy scenarios, one test per row.

    #[test]
    fn hello_from_self_is_rejected() {
        let a = Id::new();
        let w = Id::new();
        let decision = decide_hello(a, w, Id::new(), false, a, w);
        assert_eq!(decision.kind, HelloDecisionKind::DisconnectSelf);
    }

    #[test]
    fn identity_mismatch_without_rekey_is_rejected() {
        let a = Id::new();
        let w = Id::new();
        let b = Id::new();
        let c = Id::new();
        let decision = decide_hello(a, w, b, false, c, w);
        assert_eq!(decision.kind, HelloDecisionKind::DisconnectIdentityMismatch);
    }

    #[test]
    fn workspace_mismatch_without_bootstrap_is_rejected() {
        let a = Id::new();
        let w = Id::new();
        let b = Id::new();
        let v = Id::new();
        let decision = decide_hello(a, w, b, false, b, v);
        assert_eq!(decision.kind, HelloDecisionKind::DisconnectWorkspaceMismatch);
    }

    #[test]
    fn pairing_bootstrap_accepted_when_remote_workspace_is_nil() {
        let a = Id::new();
        let w = Id::new();
        let c = Id::new();
        let decision = decide_hello(a, w, c, true, c, Id::nil());
        assert_eq!(decision.kind, HelloDecisionKind::AcceptPairingBootstrap);
    }

    #[test]
    fn matching_identity_and_workspace_is_accepted() {
        let a = Id::new();
        let w = Id::new();
        let b = Id::new();
        let decision = decide_hello(a, w, b, false, b, w);
        assert_eq!(decision.kind, HelloDecisionKind::Accept);
    }

    #[test]
    fn bootstrap_requires_rekey_to_be_allowed() {
        let a = Id::new();
        let w = Id::new();
        let b = Id::new();
        // allow_rekey_on_hello is false here, so a workspace mismatch can
        // never be downgraded to a bootstrap even with a nil remote ws.
        let decision = decide_hello(a, w, b, false, b, Id::nil());
        assert_eq!(decision.kind, HelloDecisionKind::DisconnectWorkspaceMismatch);
    }
}
