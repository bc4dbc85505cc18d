//! Read-only filesystem and audit tools (spec.md §4.L read-only set).
//!
//! Grounded on `agenticlaw-tools/src/tools/read.rs`'s `ReadTool`: numbered-line
//! output, an `offset`/`limit` window, and workspace-relative path resolution.
//! Unlike the teacher, path resolution goes through `PathResolver::resolve_write_target`
//! (despite the name — it is the same bounds-check every path in this crate uses)
//! so a read can never escape the locked root either.

use crate::registry::Tool;
use crate::state::GatewayState;
use crate::tools::{optional_str, require_str};
use async_trait::async_trait;
use atlas_gate_core::{ErrorCode, GateError, Result};
use serde_json::{json, Value};

pub struct ReadFile;

#[async_trait]
impl Tool for ReadFile {
    fn name(&self) -> &str {
        "read_file"
    }
    fn description(&self) -> &str {
        "Read a file under the locked workspace root. Returns numbered lines; use offset/limit for large files."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "offset": { "type": "integer", "description": "1-indexed line to start from" },
                "limit": { "type": "integer", "description": "maximum number of lines (default 2000)" },
            },
            "required": ["path"],
        })
    }
    fn is_read_only(&self) -> bool {
        true
    }
    async fn execute(&self, state: &GatewayState, args: Value) -> Result<Value> {
        let path = require_str(&args, "path", self.name())?;
        let abs_path = state.session.resolver.resolve_write_target(path)?;

        let content = std::fs::read_to_string(&abs_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GateError::new(ErrorCode::FileNotFound, self.name(), format!("no file at {}", path))
            } else {
                GateError::new(ErrorCode::FileReadFailed, self.name(), format!("failed to read {}: {}", path, e)).with_cause(e)
            }
        })?;

        let offset = args.get("offset").and_then(|v| v.as_u64()).unwrap_or(1) as usize;
        let limit = args.get("limit").and_then(|v| v.as_u64()).unwrap_or(2000) as usize;
        let lines: Vec<&str> = content.lines().collect();
        let start = offset.saturating_sub(1).min(lines.len());
        let end = (start + limit).min(lines.len());

        let numbered: Vec<String> = lines[start..end]
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{:>6}\t{}", start + i + 1, line))
            .collect();

        Ok(json!({
            "path": path,
            "lines_returned": end - start,
            "total_lines": lines.len(),
            "content": numbered.join("\n"),
        }))
    }
}

pub struct ReadAuditLog;

#[async_trait]
impl Tool for ReadAuditLog {
    fn name(&self) -> &str {
        "read_audit_log"
    }
    fn description(&self) -> &str {
        "Read raw audit records from the session's hash-chained audit log, optionally narrowed by a sequence range."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "seq_start": { "type": "integer" },
                "seq_end": { "type": "integer" },
            },
        })
    }
    fn is_read_only(&self) -> bool {
        true
    }
    async fn execute(&self, state: &GatewayState, args: Value) -> Result<Value> {
        let log_path = state.session.resolver.audit_log_path()?;
        let chain = atlas_gate_audit::verify_chain(&log_path)?;

        let seq_start = args.get("seq_start").and_then(|v| v.as_u64());
        let seq_end = args.get("seq_end").and_then(|v| v.as_u64());

        let records: Vec<_> = chain
            .records
            .into_iter()
            .filter(|r| seq_start.map_or(true, |s| r.seq >= s))
            .filter(|r| seq_end.map_or(true, |e| r.seq <= e))
            .collect();

        let value = serde_json::to_value(&records).map_err(|e| GateError::from_unknown(e, self.name(), "failed to serialize audit records"))?;
        Ok(json!({
            "records": value,
            "chain_valid": chain.findings.is_empty(),
            "finding_count": chain.findings.len(),
        }))
    }
}

pub struct ReadPrompt;

#[async_trait]
impl Tool for ReadPrompt {
    fn name(&self) -> &str {
        "read_prompt"
    }
    fn description(&self) -> &str {
        "Return the operational guidance for one registered tool, or the full tool surface summary when no tool is named."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "tool_name": { "type": "string" } },
        })
    }
    fn is_read_only(&self) -> bool {
        true
    }
    async fn execute(&self, _state: &GatewayState, args: Value) -> Result<Value> {
        match optional_str(&args, "tool_name") {
            Some(name) => Ok(json!({ "tool_name": name, "prompt": guidance_for(name) })),
            None => Ok(json!({ "prompt": GENERAL_GUIDANCE })),
        }
    }
}

const GENERAL_GUIDANCE: &str = "Every mutating call runs through init_session, then a plan APPROVED via \
    approve_plan, then write_file, which enforces static content policy and intent-artifact \
    co-requirement before appending to the audit log. A write without an APPROVED plan or a \
    matching *.intent.md sibling fails closed; it is never retried silently.";

fn guidance_for(tool_name: &str) -> &'static str {
    match tool_name {
        "write_file" => "Write only to paths covered by an APPROVED plan's path allowlist, with a co-located *.intent.md sibling already in place.",
        "create_plan" => "A plan's phases, path allowlist, and verification gates must use deterministic language; no TODO/placeholder tokens, no parent-dir escapes.",
        "approve_plan" => "Only an OWNER or REVIEWER operator identity may approve a plan; the first approval in a fresh workspace additionally requires bootstrap opt-in.",
        "replay_execution" => "Replay is read-only and re-derives a PASS/FAIL verdict from the audit log alone; it never mutates state.",
        _ => "See the tool's own input_schema and description for its contract.",
    }
}
