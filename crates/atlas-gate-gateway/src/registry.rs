//! Tool Surface / Gateway (spec.md §4.P) — grounded on
//! `agenticlaw-tools/src/registry.rs`'s `Tool` trait and `ToolRegistry`.
//!
//! Unlike the teacher's `ToolResult::Error(String)`, every `Tool::execute`
//! here returns a classified `atlas_gate_core::Result<Value>` so an error's
//! `error_code` survives end to end through dispatch instead of collapsing
//! to a string.

use crate::state::GatewayState;
use async_trait::async_trait;
use atlas_gate_core::{ErrorCode, GateError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    /// True if this tool never mutates workspace or session state — the
    /// same tools admitted while the kill-switch is engaged
    /// (`atlas_gate_killswitch::READ_ONLY_TOOLS`).
    fn is_read_only(&self) -> bool;
    async fn execute(&self, state: &GatewayState, args: Value) -> Result<Value>;
}

/// Registered tools, keyed by name. Mirrors the teacher's
/// `HashMap<String, Arc<dyn Tool>>` registry shape.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list_read_only(&self) -> Vec<&str> {
        self.tools.values().filter(|t| t.is_read_only()).map(|t| t.name()).collect()
    }

    pub fn get_definitions(&self) -> Vec<Value> {
        let mut defs: Vec<Value> = self
            .tools
            .values()
            .map(|t| {
                serde_json::json!({
                    "name": t.name(),
                    "description": t.description(),
                    "input_schema": t.input_schema(),
                    "is_read_only": t.is_read_only(),
                })
            })
            .collect();
        defs.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
        defs
    }

    /// Dispatch one call by name. `init_session` is the only tool exempt
    /// from the kill-switch gate: no workspace root is locked yet to
    /// resolve `kill_switch_path()` against, so there is nothing to check.
    pub async fn dispatch(&self, state: &GatewayState, tool_name: &str, args: Value) -> Result<Value> {
        let tool = self
            .get(tool_name)
            .ok_or_else(|| GateError::new(ErrorCode::InvalidValue, tool_name, format!("unknown tool '{}'", tool_name)))?;

        if tool_name != "init_session" {
            let ks_state = state.kill_switch_state()?;
            atlas_gate_killswitch::gate_tool_call(&ks_state, tool_name)?;
        }

        tool.execute(state, args).await
    }
}
