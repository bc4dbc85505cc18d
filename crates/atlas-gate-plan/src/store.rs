//! Plan Store / Resolver (spec.md §4.G) — content-addressed, approval-gated
//! plan lookup and scope enforcement.

use crate::lint;
use atlas_gate_core::{ErrorCode, GateError, PathResolver};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

const TOOL: &str = "plan_store";

fn envelope_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<!--\s*ATLAS-GATE_PLAN_HASH:\s*([0-9a-fA-F]{64}).*?STATUS:\s*([A-Z]+)\s*-->").unwrap()
    })
}

fn scope_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^\s*scope\s*:\s*(.+)$").unwrap())
}

#[derive(Debug, Clone)]
pub struct PlanEnvelope {
    pub plan_hash: String,
    pub status: String,
}

/// Parse the `<!-- ATLAS-GATE_PLAN_HASH: … STATUS: … -->` envelope from raw
/// plan text. Exposed for callers (e.g. the gateway's plan-management
/// tools) that need the embedded hash/status without re-deriving the regex.
pub fn parse_envelope(text: &str) -> Option<PlanEnvelope> {
    let caps = envelope_re().captures(text)?;
    Some(PlanEnvelope {
        plan_hash: caps[1].to_ascii_lowercase(),
        status: caps[2].to_string(),
    })
}

/// Read, validate, and scope-check a plan identified by its content hash.
pub fn enforce_plan(resolver: &PathResolver, plan_hash: &str, target_path: &Path) -> atlas_gate_core::Result<()> {
    let path = resolver.plan_path(plan_hash)?;
    let text = std::fs::read_to_string(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            GateError::new(ErrorCode::PlanNotFound, TOOL, format!("no plan file at {}", path.display())).with_plan_hash(plan_hash)
        } else {
            GateError::from_unknown(e, TOOL, format!("failed to read plan file {}", path.display()))
        }
    })?;

    let envelope = parse_envelope(&text).ok_or_else(|| {
        GateError::new(ErrorCode::PlanNotApproved, TOOL, "plan envelope missing or unparseable").with_plan_hash(plan_hash)
    })?;
    if envelope.status != "APPROVED" {
        return Err(GateError::new(
            ErrorCode::PlanNotApproved,
            TOOL,
            format!("plan status is {}, not APPROVED", envelope.status),
        )
        .with_plan_hash(plan_hash));
    }

    if envelope.plan_hash != plan_hash.to_ascii_lowercase() {
        return Err(GateError::new(
            ErrorCode::PlanHashMismatch,
            TOOL,
            format!("embedded hash {} does not match filename {}", envelope.plan_hash, plan_hash),
        )
        .with_plan_hash(plan_hash));
    }

    let verdict = lint::lint(&text, Some(plan_hash)).map_err(|e| e.with_plan_hash(plan_hash))?;
    if !verdict.pass {
        return Err(GateError::new(
            ErrorCode::PlanLintFailed,
            TOOL,
            format!("plan fails {} lint stage(s) on re-lint at enforcement time", verdict.violations.len()),
        )
        .with_plan_hash(plan_hash));
    }

    if let Some(caps) = scope_re().captures(&text) {
        let scope_base = caps[1].trim();
        let root = resolver.root()?;
        let scope_abs = root.join(scope_base);
        if !target_path.starts_with(&scope_abs) {
            return Err(GateError::new(
                ErrorCode::PlanScopeViolation,
                TOOL,
                format!("target {} is not under declared scope {}", target_path.display(), scope_abs.display()),
            )
            .with_plan_hash(plan_hash));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_plan(resolver: &PathResolver, status: &str) -> String {
        let body = r#"# Metadata
Title: x

# Phases

## PHASE_ONE
Objective: do a thing
Allowed Ops: write_file
Forbidden Ops: delete_file
Required Intents: x.intent.md
Verification Commands: cargo test
Expected Outcomes: pass
Failure Stops: true

# Path Allowlist
- src/**

# Verification Gates
- cargo test

# Forbidden Actions
- none

# Rollback Policy
revert
"#;
        let canonical = lint::canonicalize(body);
        let hash = {
            use sha2::{Digest, Sha256};
            let mut h = Sha256::new();
            h.update(canonical.as_bytes());
            hex::encode(h.finalize())
        };
        let text = format!("<!-- ATLAS-GATE_PLAN_HASH: {}\nROLE: EXECUTION\nSTATUS: {} -->\n\n{}", hash, status, body);
        let path = resolver.plan_path(&hash).unwrap();
        std::fs::write(&path, &text).unwrap();
        hash
    }

    fn locked_resolver(tmp: &TempDir) -> PathResolver {
        let resolver = PathResolver::new();
        resolver.lock(tmp.path()).unwrap();
        resolver
    }

    #[test]
    fn approved_plan_enforces_cleanly() {
        let tmp = TempDir::new().unwrap();
        let resolver = locked_resolver(&tmp);
        let hash = write_plan(&resolver, "APPROVED");
        let target = tmp.path().join("src/lib.rs");
        enforce_plan(&resolver, &hash, &target).unwrap();
    }

    #[test]
    fn pending_plan_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let resolver = locked_resolver(&tmp);
        let hash = write_plan(&resolver, "PENDING");
        let target = tmp.path().join("src/lib.rs");
        let err = enforce_plan(&resolver, &hash, &target).unwrap_err();
        assert_eq!(err.error_code, ErrorCode::PlanNotApproved);
    }

    #[test]
    fn missing_plan_file_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let resolver = locked_resolver(&tmp);
        let target = tmp.path().join("src/lib.rs");
        let err = enforce_plan(&resolver, &"a".repeat(64), &target).unwrap_err();
        assert_eq!(err.error_code, ErrorCode::PlanNotFound);
    }

    #[test]
    fn tampered_plan_body_fails_hash_check() {
        let tmp = TempDir::new().unwrap();
        let resolver = locked_resolver(&tmp);
        let hash = write_plan(&resolver, "APPROVED");
        let path = resolver.plan_path(&hash).unwrap();
        let mut text = std::fs::read_to_string(&path).unwrap();
        text.push_str("\nextra tampering\n");
        std::fs::write(&path, text).unwrap();
        let target = tmp.path().join("src/lib.rs");
        let err = enforce_plan(&resolver, &hash, &target).unwrap_err();
        assert_eq!(err.error_code, ErrorCode::PlanHashMismatch);
    }
}
