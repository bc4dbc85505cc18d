//! Classified error envelope — the single error type every component raises.
//!
//! Every component-local error (audit, plan, intent, policy, ...) is lifted
//! into a `GateError` at its crate boundary. No component may swallow an
//! error; local handlers only translate.

use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

/// Closed error-code enumeration, grouped by domain (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Session
    SessionNotInitialized,
    SessionInitFailed,
    SessionLocked,
    RefuseLockSecondTime,
    OperatorIdentityAlreadyBound,
    ApprovalFatigueLimitReached,
    // Input
    InvalidType,
    InvalidFormat,
    InvalidValue,
    MissingRequiredField,
    // Authorization
    UnauthorizedAction,
    InsufficientPermissions,
    RoleMismatch,
    // Path
    InvalidPath,
    PathNotAbsolute,
    PathNotExist,
    PathNotDir,
    PathNotFound,
    TraversalBlocked,
    OutsideWorkspace,
    // File
    FileNotFound,
    FileAlreadyExists,
    FileReadFailed,
    FileWriteFailed,
    // Patch
    PatchInvalid,
    PatchApplyFailed,
    PatchHashMismatch,
    // Plan
    PlanNotFound,
    PlanNotApproved,
    PlanEnforcementFailed,
    PlanScopeViolation,
    PlanHashMismatch,
    PlanLintFailed,
    // Policy
    PolicyViolation,
    RustPolicyViolation,
    TypescriptPolicyViolation,
    PythonPolicyViolation,
    PolicyPreflightFailed,
    PolicyWriteRejected,
    // Intent
    IntentMissing,
    IntentSchemaViolation,
    IntentAuthorityDrift,
    // Governance
    InvariantViolation,
    BootstrapFailure,
    SelfAuditFailure,
    // Audit
    AuditLockFailed,
    AuditAppendFailed,
    TamperDetected,
    // Attestation
    BundleIdMismatch,
    SignatureVerification,
    AuditMetricHashMismatch,
    MaturityHashMismatch,
    PolicySummaryHashMismatch,
    // Internal / catch-all
    InternalError,
}

impl ErrorCode {
    /// Stable SCREAMING_SNAKE_CASE wire form — this is the value clients match on.
    pub fn as_str(&self) -> &'static str {
        use ErrorCode::*;
        match self {
            SessionNotInitialized => "SESSION_NOT_INITIALIZED",
            SessionInitFailed => "SESSION_INIT_FAILED",
            SessionLocked => "SESSION_LOCKED",
            RefuseLockSecondTime => "REFUSE_LOCK_SECOND_TIME",
            OperatorIdentityAlreadyBound => "OPERATOR_IDENTITY_ALREADY_BOUND",
            ApprovalFatigueLimitReached => "APPROVAL_FATIGUE_LIMIT_REACHED",
            InvalidType => "INVALID_TYPE",
            InvalidFormat => "INVALID_FORMAT",
            InvalidValue => "INVALID_VALUE",
            MissingRequiredField => "MISSING_REQUIRED_FIELD",
            UnauthorizedAction => "UNAUTHORIZED_ACTION",
            InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            RoleMismatch => "ROLE_MISMATCH",
            InvalidPath => "INVALID_PATH",
            PathNotAbsolute => "PATH_NOT_ABSOLUTE",
            PathNotExist => "PATH_NOT_EXIST",
            PathNotDir => "PATH_NOT_DIR",
            PathNotFound => "PATH_NOT_FOUND",
            TraversalBlocked => "TRAVERSAL_BLOCKED",
            OutsideWorkspace => "OUTSIDE_WORKSPACE",
            FileNotFound => "FILE_NOT_FOUND",
            FileAlreadyExists => "FILE_ALREADY_EXISTS",
            FileReadFailed => "FILE_READ_FAILED",
            FileWriteFailed => "FILE_WRITE_FAILED",
            PatchInvalid => "PATCH_INVALID",
            PatchApplyFailed => "PATCH_APPLY_FAILED",
            PatchHashMismatch => "PATCH_HASH_MISMATCH",
            PlanNotFound => "PLAN_NOT_FOUND",
            PlanNotApproved => "PLAN_NOT_APPROVED",
            PlanEnforcementFailed => "PLAN_ENFORCEMENT_FAILED",
            PlanScopeViolation => "PLAN_SCOPE_VIOLATION",
            PlanHashMismatch => "PLAN_HASH_MISMATCH",
            PlanLintFailed => "PLAN_LINT_FAILED",
            PolicyViolation => "POLICY_VIOLATION",
            RustPolicyViolation => "RUST_POLICY_VIOLATION",
            TypescriptPolicyViolation => "TS_JS_POLICY_VIOLATION",
            PythonPolicyViolation => "PYTHON_POLICY_VIOLATION",
            PolicyPreflightFailed => "POLICY_PREFLIGHT_FAILED",
            PolicyWriteRejected => "POLICY_WRITE_REJECTED",
            IntentMissing => "INTENT_MISSING",
            IntentSchemaViolation => "INTENT_SCHEMA_VIOLATION",
            IntentAuthorityDrift => "INTENT_AUTHORITY_DRIFT",
            InvariantViolation => "INVARIANT_VIOLATION",
            BootstrapFailure => "BOOTSTRAP_FAILURE",
            SelfAuditFailure => "SELF_AUDIT_FAILURE",
            AuditLockFailed => "LOCK_ACQUISITION_FAILED",
            AuditAppendFailed => "AUDIT_APPEND_FAILED",
            TamperDetected => "TAMPER_DETECTED",
            BundleIdMismatch => "BUNDLE_ID_MISMATCH",
            SignatureVerification => "SIGNATURE_VERIFICATION",
            AuditMetricHashMismatch => "AUDIT_METRIC_HASH_MISMATCH",
            MaturityHashMismatch => "MATURITY_HASH_MISMATCH",
            PolicySummaryHashMismatch => "POLICY_SUMMARY_HASH_MISMATCH",
            InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified, tagged error. The sole error type crossing a component
/// boundary in this crate graph.
#[derive(Debug, Error)]
#[error("{error_code}: {human_message}")]
pub struct GateError {
    pub error_code: ErrorCode,
    pub human_message: String,
    pub role: Option<String>,
    pub session_id: Option<String>,
    pub workspace_root: Option<String>,
    pub tool_name: String,
    pub invariant_id: Option<String>,
    pub phase_id: Option<String>,
    pub plan_hash: Option<String>,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    pub timestamp: DateTime<Utc>,
    pub stack: Option<String>,
}

impl GateError {
    pub fn new(code: ErrorCode, tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: code,
            human_message: message.into(),
            role: None,
            session_id: None,
            workspace_root: None,
            tool_name: tool_name.into(),
            invariant_id: None,
            phase_id: None,
            plan_hash: None,
            cause: None,
            timestamp: Utc::now(),
            stack: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_workspace_root(mut self, root: impl Into<String>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    pub fn with_invariant_id(mut self, invariant_id: impl Into<String>) -> Self {
        self.invariant_id = Some(invariant_id.into());
        self
    }

    pub fn with_phase_id(mut self, phase_id: impl Into<String>) -> Self {
        self.phase_id = Some(phase_id.into());
        self
    }

    pub fn with_plan_hash(mut self, plan_hash: impl Into<String>) -> Self {
        self.plan_hash = Some(plan_hash.into());
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Lift an unclassified error at a boundary. Every such lift is
    /// `INTERNAL_ERROR` by construction — classified errors must be raised
    /// explicitly via `new`/the invariant asserter, never discovered here.
    pub fn from_unknown(
        e: impl std::error::Error + Send + Sync + 'static,
        tool_name: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        let context = context.into();
        Self::new(ErrorCode::InternalError, tool_name, context).with_cause(e)
    }

    /// Invariant-classified error, as raised by the invariant asserter.
    pub fn invariant(
        invariant_id: impl Into<String>,
        tool_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(ErrorCode::InvariantViolation, tool_name, message).with_invariant_id(invariant_id)
    }

    /// Serialize to the documented wire envelope (spec.md §6). The stack
    /// trace is included only when `debug` is true (mirrors `DEBUG_STACK`).
    pub fn to_envelope(&self, debug: bool) -> serde_json::Value {
        let mut obj = serde_json::json!({
            "error_code": self.error_code.as_str(),
            "human_message": self.human_message,
            "tool_name": self.tool_name,
            "timestamp": self.timestamp.to_rfc3339(),
        });
        let map = obj.as_object_mut().expect("object literal");
        if let Some(v) = &self.role {
            map.insert("role".into(), v.clone().into());
        }
        if let Some(v) = &self.session_id {
            map.insert("session_id".into(), v.clone().into());
        }
        if let Some(v) = &self.workspace_root {
            map.insert("workspace_root".into(), v.clone().into());
        }
        if let Some(v) = &self.invariant_id {
            map.insert("invariant_id".into(), v.clone().into());
        }
        if let Some(v) = &self.phase_id {
            map.insert("phase_id".into(), v.clone().into());
        }
        if let Some(v) = &self.plan_hash {
            map.insert("plan_hash".into(), v.clone().into());
        }
        if let Some(cause) = &self.cause {
            map.insert("cause".into(), cause.to_string().into());
        }
        if debug {
            if let Some(stack) = &self.stack {
                map.insert("stack".into(), stack.clone().into());
            }
        }
        obj
    }
}

pub type Result<T> = std::result::Result<T, GateError>;
