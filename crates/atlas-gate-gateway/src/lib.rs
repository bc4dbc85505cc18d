//! Write-Time Policy Engine orchestration and the Tool Surface / Gateway
//! (spec.md §4.J, §4.P) — grounded on `agenticlaw-gateway`'s crate shape:
//! a `registry` of `Tool` impls dispatched against shared connection state.
//!
//! Unlike the teacher, there is no `axum` server here: spec.md places the
//! transport framing that delivers tool calls out of scope (§1, "external
//! collaborators"), and SPEC_FULL.md §4.P resolves the CLI to a thin,
//! single-shot dispatcher rather than a persistent network listener. What
//! this crate owns is everything behind that line — the registry, the
//! kill-switch gate in `ToolRegistry::dispatch`, and the per-session state
//! every tool reads and mutates. `dispatch_request` is that single shot; a
//! real deployment fronts it with its own framing and calls the same
//! registry per request.

pub mod governance;
pub mod registry;
pub mod state;
pub mod tools;

use atlas_gate_core::session::ClientRole;
use atlas_gate_core::SessionContext;
use registry::ToolRegistry;
use state::GatewayState;

/// Build a registry with every tool in `tools::register_all` wired in.
pub fn build_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    tools::register_all(&mut registry);
    registry
}

/// Construct the process-wide gateway state for one session.
pub fn new_state(client_role: ClientRole) -> GatewayState {
    GatewayState::new(SessionContext::new(client_role))
}

/// Dispatch one `{"tool": "...", "args": {...}}` request and return the
/// `{"ok": bool, "result"|"error": ...}` response object. A malformed
/// request (bad JSON, missing `tool` field) yields a classified
/// `INVALID_FORMAT`/`MISSING_REQUIRED_FIELD` envelope rather than panicking
/// — the one invocation this binary makes per process must fail closed like
/// every other boundary in this crate graph.
pub async fn dispatch_request(registry: &ToolRegistry, state: &GatewayState, request_json: &str) -> serde_json::Value {
    let request: serde_json::Value = match serde_json::from_str(request_json) {
        Ok(v) => v,
        Err(e) => {
            let err = atlas_gate_core::GateError::new(atlas_gate_core::ErrorCode::InvalidFormat, "transport", format!("request is not valid JSON: {}", e));
            return serde_json::json!({ "ok": false, "error": err.to_envelope(false) });
        }
    };
    let tool_name = match request.get("tool").and_then(|v| v.as_str()) {
        Some(t) => t,
        None => {
            let err = atlas_gate_core::GateError::new(atlas_gate_core::ErrorCode::MissingRequiredField, "transport", "request is missing a 'tool' field");
            return serde_json::json!({ "ok": false, "error": err.to_envelope(false) });
        }
    };
    let args = request.get("args").cloned().unwrap_or(serde_json::json!({}));

    match registry.dispatch(state, tool_name, args).await {
        Ok(result) => serde_json::json!({ "ok": true, "result": result }),
        Err(err) => serde_json::json!({ "ok": false, "error": err.to_envelope(false) }),
    }
}
