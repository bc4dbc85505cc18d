//! Session tools (spec.md §4.K) — lock the workspace root and bind the
//! operator identity that every later mutating tool call checks against.

use crate::registry::Tool;
use crate::state::GatewayState;
use crate::tools::{require_str, parse_operator_role};
use async_trait::async_trait;
use atlas_gate_core::session::OperatorIdentity;
use atlas_gate_core::Result;
use serde_json::{json, Value};
use std::path::Path;

pub struct InitSession;

#[async_trait]
impl Tool for InitSession {
    fn name(&self) -> &str {
        "init_session"
    }
    fn description(&self) -> &str {
        "Lock the workspace root for this session. One-shot: a second call fails REFUSE_LOCK_SECOND_TIME."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "workspace_root": { "type": "string" } },
            "required": ["workspace_root"],
        })
    }
    fn is_read_only(&self) -> bool {
        false
    }
    async fn execute(&self, state: &GatewayState, args: Value) -> Result<Value> {
        let root = require_str(&args, "workspace_root", self.name())?;
        state.session.resolver.lock(Path::new(root))?;
        Ok(json!({ "session_id": state.session.session_id, "workspace_root": root }))
    }
}

pub struct BindOperatorIdentity;

#[async_trait]
impl Tool for BindOperatorIdentity {
    fn name(&self) -> &str {
        "bind_operator_identity"
    }
    fn description(&self) -> &str {
        "Bind the human operator identity for this session. At most once; a second call fails OPERATOR_IDENTITY_ALREADY_BOUND."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operator_id": { "type": "string" },
                "operator_role": { "type": "string", "enum": ["OWNER", "REVIEWER", "AUDITOR"] },
                "auth_context": { "type": "string" },
            },
            "required": ["operator_id", "operator_role", "auth_context"],
        })
    }
    fn is_read_only(&self) -> bool {
        false
    }
    async fn execute(&self, state: &GatewayState, args: Value) -> Result<Value> {
        let operator_id = require_str(&args, "operator_id", self.name())?.to_string();
        let operator_role = parse_operator_role(require_str(&args, "operator_role", self.name())?, self.name())?;
        let auth_context = require_str(&args, "auth_context", self.name())?.to_string();

        state.session.bind_operator_identity(OperatorIdentity {
            operator_id: operator_id.clone(),
            operator_role,
            auth_context,
        })?;

        Ok(json!({ "operator_id": operator_id, "operator_role": require_str(&args, "operator_role", self.name())? }))
    }
}
