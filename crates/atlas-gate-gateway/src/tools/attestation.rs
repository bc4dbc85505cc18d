//! Attestation Bundle tools (spec.md §4.N) — generate, verify, and export
//! the deterministic, HMAC-signed digest of workspace evidence.

use crate::registry::Tool;
use crate::state::GatewayState;
use crate::tools::{optional_str, require_str};
use async_trait::async_trait;
use atlas_gate_attest::{export_json, export_markdown, generate, verify, AttestationBundle, GenerateOptions};
use atlas_gate_core::{ErrorCode, GateError, Result};
use serde_json::{json, Value};

pub struct GenerateAttestationBundle;

#[async_trait]
impl Tool for GenerateAttestationBundle {
    fn name(&self) -> &str {
        "generate_attestation_bundle"
    }
    fn description(&self) -> &str {
        "Generate a deterministic, HMAC-signed attestation bundle over the current workspace state: audit metrics, policy summary, intent coverage, and a replay verdict."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "plan_hash_filter": { "type": "string", "description": "plan hash to scope the embedded replay verdict to" },
                "workspace_root_label": { "type": "string" },
            },
        })
    }
    fn is_read_only(&self) -> bool {
        true
    }
    async fn execute(&self, state: &GatewayState, args: Value) -> Result<Value> {
        let options = GenerateOptions {
            plan_hash_filter: optional_str(&args, "plan_hash_filter").map(str::to_string),
            workspace_root_label: optional_str(&args, "workspace_root_label").map(str::to_string),
        };
        let bundle = generate(&state.session.resolver, options)?;
        serde_json::to_value(&bundle).map_err(|e| GateError::from_unknown(e, self.name(), "failed to serialize attestation bundle"))
    }
}

pub struct VerifyAttestationBundle;

#[async_trait]
impl Tool for VerifyAttestationBundle {
    fn name(&self) -> &str {
        "verify_attestation_bundle"
    }
    fn description(&self) -> &str {
        "Offline-verify a previously generated attestation bundle: bundle id, HMAC signature, and per-section content hashes, in order. Returns the first failing check, if any."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "bundle": { "type": "object", "description": "a bundle previously returned by generate_attestation_bundle" } },
            "required": ["bundle"],
        })
    }
    fn is_read_only(&self) -> bool {
        true
    }
    async fn execute(&self, state: &GatewayState, args: Value) -> Result<Value> {
        let bundle_value = args
            .get("bundle")
            .ok_or_else(|| GateError::new(ErrorCode::MissingRequiredField, self.name(), "'bundle' is required"))?;
        let bundle: AttestationBundle = serde_json::from_value(bundle_value.clone())
            .map_err(|e| GateError::new(ErrorCode::InvalidFormat, self.name(), format!("bundle does not match the expected shape: {}", e)))?;

        match verify(&bundle, &state.session.resolver) {
            Ok(()) => Ok(json!({ "verdict": "PASS" })),
            Err(e) => Ok(json!({ "verdict": "FAIL", "first_failing_check": e.error_code.as_str(), "human_message": e.human_message })),
        }
    }
}

pub struct ExportAttestationBundle;

#[async_trait]
impl Tool for ExportAttestationBundle {
    fn name(&self) -> &str {
        "export_attestation_bundle"
    }
    fn description(&self) -> &str {
        "Render a previously generated attestation bundle as stable-indent JSON or a Markdown summary."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "bundle": { "type": "object" },
                "format": { "type": "string", "enum": ["json", "markdown"], "default": "json" },
            },
            "required": ["bundle"],
        })
    }
    fn is_read_only(&self) -> bool {
        true
    }
    async fn execute(&self, _state: &GatewayState, args: Value) -> Result<Value> {
        let bundle_value = args
            .get("bundle")
            .ok_or_else(|| GateError::new(ErrorCode::MissingRequiredField, self.name(), "'bundle' is required"))?;
        let bundle: AttestationBundle = serde_json::from_value(bundle_value.clone())
            .map_err(|e| GateError::new(ErrorCode::InvalidFormat, self.name(), format!("bundle does not match the expected shape: {}", e)))?;

        let format = require_str(&args, "format", self.name()).unwrap_or("json");
        match format {
            "markdown" => Ok(json!({ "format": "markdown", "content": export_markdown(&bundle) })),
            _ => Ok(json!({ "format": "json", "content": export_json(&bundle)? })),
        }
    }
}
