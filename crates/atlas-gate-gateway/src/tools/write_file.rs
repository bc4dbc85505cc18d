//! `write_file` (spec.md §4.J) — the one tool that actually touches disk.
//!
//! Grounded on `agenticlaw-tools/src/tools/write.rs`'s `WriteTool`, but
//! split from policy evaluation: `atlas_gate_policy::evaluate` only
//! validates and audits (it never calls `std::fs::write`), so this tool
//! performs the filesystem write itself, and only after a `PASS` verdict.

use crate::registry::Tool;
use crate::state::GatewayState;
use crate::tools::{optional_str, require_str};
use async_trait::async_trait;
use atlas_gate_core::{ErrorCode, GateError, Result};
use atlas_gate_policy::{evaluate, WriteOperation, WriteRequest};
use serde_json::{json, Value};

pub struct WriteFile;

#[async_trait]
impl Tool for WriteFile {
    fn name(&self) -> &str {
        "write_file"
    }
    fn description(&self) -> &str {
        "Write a file under the locked workspace root, gated by plan authorization, static content policy, and intent-artifact validation."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "plan": { "type": "string", "description": "64-hex plan hash" },
                "path": { "type": "string" },
                "content": { "type": "string" },
                "phase_id": { "type": "string" },
                "operation": { "type": "string", "enum": ["CREATE", "MODIFY"] },
            },
            "required": ["plan", "path", "content"],
        })
    }
    fn is_read_only(&self) -> bool {
        false
    }
    async fn execute(&self, state: &GatewayState, args: Value) -> Result<Value> {
        let plan_hash = require_str(&args, "plan", self.name())?.to_string();
        let path = require_str(&args, "path", self.name())?.to_string();
        let content = require_str(&args, "content", self.name())?.to_string();
        let phase_id = optional_str(&args, "phase_id").map(str::to_string);
        let operation = match optional_str(&args, "operation") {
            Some("MODIFY") => WriteOperation::Modify,
            _ => WriteOperation::Create,
        };

        let req = WriteRequest {
            tool_name: self.name().to_string(),
            plan_hash,
            phase_id,
            operation,
            path: path.clone(),
            content: content.clone(),
        };

        let verdict = evaluate(&state.session, req)?;

        let abs_path = state.session.resolver.resolve_write_target(&path)?;
        if let Some(parent) = abs_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GateError::from_unknown(e, self.name(), "failed to create parent directory"))?;
        }
        std::fs::write(&abs_path, &content).map_err(|e| GateError::new(ErrorCode::FileWriteFailed, self.name(), format!("failed to write {}: {}", abs_path.display(), e)).with_cause(e))?;

        Ok(json!({
            "verdict": verdict.verdict,
            "language": verdict.language,
            "content_hash": verdict.content_hash,
            "content_length": verdict.content_length,
            "warnings": verdict.warnings,
        }))
    }
}
