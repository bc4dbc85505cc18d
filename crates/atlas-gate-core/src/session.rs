//! Session State (spec.md §4.K) — binds workspace root, operator identity,
//! role, and the fatigue-guard approval counters for one session.

use crate::error::{ErrorCode, GateError};
use crate::path::PathResolver;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, RwLock};

const TOOL: &str = "session_state";

/// Human operator identity, bound at most once per session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatorRole {
    Owner,
    Reviewer,
    Auditor,
}

/// Capability set assigned to the calling client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientRole {
    Execution,
    Planning,
    ReadOnly,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OperatorIdentity {
    pub operator_id: String,
    pub operator_role: OperatorRole,
    pub auth_context: String,
}

/// Fatigue-guard thresholds (spec.md §4.K defaults: 10 / 20 / 5, 60s pause).
#[derive(Clone, Copy, Debug)]
pub struct FatigueConfig {
    pub max_per_session: u32,
    pub max_per_hour: u32,
    pub consecutive_before_pause: u32,
    pub pause_duration_secs: i64,
}

impl Default for FatigueConfig {
    fn default() -> Self {
        Self {
            max_per_session: 10,
            max_per_hour: 20,
            consecutive_before_pause: 5,
            pause_duration_secs: 60,
        }
    }
}

/// Sliding-window approval-fatigue guard. Monotone by construction (spec.md
/// I9): evicting stale entries from `window` can only loosen a subsequent
/// check, never tighten it.
pub struct FatigueGuard {
    config: FatigueConfig,
    session_count: u32,
    window: VecDeque<DateTime<Utc>>,
    consecutive_since_pause: u32,
    last_pause_at: Option<DateTime<Utc>>,
}

impl FatigueGuard {
    pub fn new(config: FatigueConfig) -> Self {
        Self {
            config,
            session_count: 0,
            window: VecDeque::new(),
            consecutive_since_pause: 0,
            last_pause_at: None,
        }
    }

    fn evict_stale(&mut self, now: DateTime<Utc>) {
        let horizon = chrono::Duration::hours(1);
        while let Some(front) = self.window.front() {
            if now - *front > horizon {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }

    /// Run an approval checkpoint: evict stale entries, then admit or
    /// reject. On admission, records the approval.
    pub fn check_and_record(&mut self, now: DateTime<Utc>) -> crate::error::Result<()> {
        self.evict_stale(now);

        if self.session_count >= self.config.max_per_session {
            return Err(GateError::new(
                ErrorCode::ApprovalFatigueLimitReached,
                TOOL,
                format!(
                    "session approval limit reached ({}/{})",
                    self.session_count, self.config.max_per_session
                ),
            ));
        }
        if self.window.len() as u32 >= self.config.max_per_hour {
            return Err(GateError::new(
                ErrorCode::ApprovalFatigueLimitReached,
                TOOL,
                format!(
                    "hourly approval limit reached ({}/{})",
                    self.window.len(),
                    self.config.max_per_hour
                ),
            ));
        }
        if self.consecutive_since_pause >= self.config.consecutive_before_pause {
            let paused_recently = self
                .last_pause_at
                .is_some_and(|p| now - p < chrono::Duration::seconds(self.config.pause_duration_secs));
            if !paused_recently {
                return Err(GateError::new(
                    ErrorCode::ApprovalFatigueLimitReached,
                    TOOL,
                    format!(
                        "{} consecutive approvals without a mandatory {}s pause",
                        self.consecutive_since_pause, self.config.pause_duration_secs
                    ),
                ));
            }
        }

        self.session_count += 1;
        self.window.push_back(now);
        self.consecutive_since_pause += 1;
        Ok(())
    }

    /// Record that the mandatory pause was observed, resetting the
    /// consecutive-approval counter.
    pub fn record_pause(&mut self, now: DateTime<Utc>) {
        self.consecutive_since_pause = 0;
        self.last_pause_at = Some(now);
    }

    pub fn session_count(&self) -> u32 {
        self.session_count
    }

    pub fn window_count(&self) -> u32 {
        self.window.len() as u32
    }
}

/// Process-wide session state: workspace root, operator identity, client
/// role, and the fatigue guard. One instance per session.
pub struct SessionContext {
    pub session_id: String,
    pub resolver: PathResolver,
    pub client_role: ClientRole,
    operator_identity: RwLock<Option<OperatorIdentity>>,
    pub fatigue: Mutex<FatigueGuard>,
}

impl SessionContext {
    pub fn new(client_role: ClientRole) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            resolver: PathResolver::new(),
            client_role,
            operator_identity: RwLock::new(None),
            fatigue: Mutex::new(FatigueGuard::new(FatigueConfig::default())),
        }
    }

    pub fn with_fatigue_config(client_role: ClientRole, config: FatigueConfig) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            resolver: PathResolver::new(),
            client_role,
            operator_identity: RwLock::new(None),
            fatigue: Mutex::new(FatigueGuard::new(config)),
        }
    }

    /// Bind the operator identity. At most once per session.
    pub fn bind_operator_identity(&self, identity: OperatorIdentity) -> crate::error::Result<()> {
        let mut guard = self.operator_identity.write().expect("identity lock poisoned");
        if guard.is_some() {
            return Err(GateError::new(
                ErrorCode::OperatorIdentityAlreadyBound,
                TOOL,
                "operator identity already bound for this session",
            )
            .with_session_id(self.session_id.clone()));
        }
        *guard = Some(identity);
        Ok(())
    }

    pub fn operator_identity(&self) -> Option<OperatorIdentity> {
        self.operator_identity.read().expect("identity lock poisoned").clone()
    }

    pub fn require_operator_role(&self, role: OperatorRole, tool_name: &str) -> crate::error::Result<OperatorIdentity> {
        let identity = self.operator_identity().ok_or_else(|| {
            GateError::new(ErrorCode::UnauthorizedAction, tool_name, "no operator identity bound")
                .with_session_id(self.session_id.clone())
        })?;
        if identity.operator_role != role {
            return Err(GateError::new(
                ErrorCode::RoleMismatch,
                tool_name,
                format!("operator role {:?} required, bound role is {:?}", role, identity.operator_role),
            )
            .with_session_id(self.session_id.clone()));
        }
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(role: OperatorRole) -> OperatorIdentity {
        OperatorIdentity {
            operator_id: "op-1".into(),
            operator_role: role,
            auth_context: "test".into(),
        }
    }

    #[test]
    fn bind_operator_identity_once_succeeds() {
        let ctx = SessionContext::new(ClientRole::Execution);
        ctx.bind_operator_identity(identity(OperatorRole::Owner)).unwrap();
        assert_eq!(ctx.operator_identity().unwrap().operator_role, OperatorRole::Owner);
    }

    #[test]
    fn bind_operator_identity_twice_fails() {
        let ctx = SessionContext::new(ClientRole::Execution);
        ctx.bind_operator_identity(identity(OperatorRole::Owner)).unwrap();
        let err = ctx.bind_operator_identity(identity(OperatorRole::Reviewer)).unwrap_err();
        assert_eq!(err.error_code, ErrorCode::OperatorIdentityAlreadyBound);
    }

    #[test]
    fn require_operator_role_mismatch() {
        let ctx = SessionContext::new(ClientRole::Execution);
        ctx.bind_operator_identity(identity(OperatorRole::Reviewer)).unwrap();
        let err = ctx.require_operator_role(OperatorRole::Owner, "t").unwrap_err();
        assert_eq!(err.error_code, ErrorCode::RoleMismatch);
    }

    #[test]
    fn fatigue_guard_admits_until_session_cap() {
        let mut guard = FatigueGuard::new(FatigueConfig {
            max_per_session: 2,
            max_per_hour: 100,
            consecutive_before_pause: 100,
            pause_duration_secs: 60,
        });
        let now = Utc::now();
        guard.check_and_record(now).unwrap();
        guard.check_and_record(now).unwrap();
        let err = guard.check_and_record(now).unwrap_err();
        assert_eq!(err.error_code, ErrorCode::ApprovalFatigueLimitReached);
    }

    #[test]
    fn fatigue_guard_requires_pause_after_consecutive_threshold() {
        let mut guard = FatigueGuard::new(FatigueConfig {
            max_per_session: 100,
            max_per_hour: 100,
            consecutive_before_pause: 2,
            pause_duration_secs: 60,
        });
        let now = Utc::now();
        guard.check_and_record(now).unwrap();
        guard.check_and_record(now).unwrap();
        let err = guard.check_and_record(now).unwrap_err();
        assert_eq!(err.error_code, ErrorCode::ApprovalFatigueLimitReached);

        guard.record_pause(now);
        guard.check_and_record(now + chrono::Duration::seconds(61)).unwrap();
    }

    #[test]
    fn fatigue_guard_evicts_stale_window_entries() {
        // I9: removing approvals from the window never makes a later call fail.
        let mut guard = FatigueGuard::new(FatigueConfig {
            max_per_session: 100,
            max_per_hour: 1,
            consecutive_before_pause: 100,
            pause_duration_secs: 60,
        });
        let now = Utc::now();
        guard.check_and_record(now).unwrap();
        assert_eq!(guard.window_count(), 1);
        let later = now + chrono::Duration::hours(2);
        guard.check_and_record(later).unwrap();
    }
}
