//! Gateway state (spec.md §4.P) — the per-process context every `Tool`
//! receives. Mirrors the teacher's `ConnectionContext`: one long-lived
//! struct binding the session, the kill-switch cache, and the in-memory
//! remediation-proposal store.

use atlas_gate_core::SessionContext;
use atlas_gate_killswitch::KillSwitchState;
use atlas_gate_remediate::RemediationProposal;
use std::collections::HashMap;
use std::sync::Mutex;

/// Process-wide gateway state. One instance per running gateway; `init_session`
/// is the only tool that runs before `session` is usable for write paths
/// (the workspace root is not locked until it succeeds).
pub struct GatewayState {
    pub session: SessionContext,
    /// Remediation proposals have no persistence contract in spec.md — only
    /// the audit log does — so they live in memory for the process lifetime,
    /// keyed by `proposal_id`. Every transition is still audited.
    proposals: Mutex<HashMap<String, RemediationProposal>>,
}

impl GatewayState {
    pub fn new(session: SessionContext) -> Self {
        Self {
            session,
            proposals: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert_proposal(&self, proposal: RemediationProposal) {
        let mut guard = self.proposals.lock().expect("proposal store lock poisoned");
        guard.insert(proposal.proposal_id.clone(), proposal);
    }

    pub fn with_proposal_mut<T>(&self, proposal_id: &str, f: impl FnOnce(&mut RemediationProposal) -> T) -> Option<T> {
        let mut guard = self.proposals.lock().expect("proposal store lock poisoned");
        guard.get_mut(proposal_id).map(f)
    }

    pub fn get_proposal(&self, proposal_id: &str) -> Option<RemediationProposal> {
        let guard = self.proposals.lock().expect("proposal store lock poisoned");
        guard.get(proposal_id).cloned()
    }

    pub fn list_proposals(&self) -> Vec<RemediationProposal> {
        let guard = self.proposals.lock().expect("proposal store lock poisoned");
        let mut out: Vec<_> = guard.values().cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        out
    }

    /// Load the current kill-switch state from disk. Called fresh on every
    /// tool dispatch rather than cached, since recovery steps mutate the
    /// file out of band from this process's perspective in principle.
    pub fn kill_switch_state(&self) -> atlas_gate_core::Result<KillSwitchState> {
        let path = self.session.resolver.kill_switch_path()?;
        Ok(atlas_gate_killswitch::load(&path))
    }
}
