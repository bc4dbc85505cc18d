//! Invariant registry and assertion primitives (spec.md §4.D).
//!
//! An invariant violation raised here must abort the containing operation —
//! it is never caught and continued within the core. Callers propagate it
//! with `?`.

use crate::error::{ErrorCode, GateError};
use std::fmt::Debug;

/// A named, stable invariant definition.
#[derive(Debug, Clone, Copy)]
pub struct InvariantDef {
    pub code: &'static str,
    pub category: &'static str,
    pub rule: &'static str,
    pub impact: &'static str,
}

/// The registry of invariants this core enforces, keyed by stable `INV_*`
/// code. Mirrors the quantified invariants of spec.md §8 plus the
/// structural ones named throughout §4.
pub static INVARIANTS: &[InvariantDef] = &[
    InvariantDef {
        code: "INV_HASH_CHAIN",
        category: "audit",
        rule: "every audit record's entry_hash recomputes and prev_hash matches the predecessor's entry_hash",
        impact: "a broken chain makes the audit log's history untrustworthy",
    },
    InvariantDef {
        code: "INV_PLAN_IMMUTABILITY",
        category: "plan",
        rule: "SHA-256(canonical(plan)) equals the plan's filename for every approved plan",
        impact: "a mutated approved plan can no longer be cited as authority for a write",
    },
    InvariantDef {
        code: "INV_PATH_BOUNDS",
        category: "path",
        rule: "every accepted write target resolves to the workspace root or a descendant of it",
        impact: "escaping the workspace root defeats every other control in the pipeline",
    },
    InvariantDef {
        code: "INV_INTENT_COREQUISITE",
        category: "intent",
        rule: "every accepted write to a path outside docs/reports/ has a validated sibling *.intent.md",
        impact: "writes without a declared intent cannot be attributed to a purpose during replay",
    },
    InvariantDef {
        code: "INV_DETERMINISM",
        category: "replay",
        rule: "audit entries sharing (phase_id, tool, args_hash) share an identical result_hash",
        impact: "non-deterministic replay invalidates offline attestation",
    },
    InvariantDef {
        code: "INV_KILLSWITCH_DOMINANCE",
        category: "governance",
        rule: "while the kill-switch is engaged, only the closed read-only tool set is admitted",
        impact: "a bypassed kill-switch defeats the halt-and-recover safety model",
    },
    InvariantDef {
        code: "INV_ATTESTATION_DETERMINISM",
        category: "attestation",
        rule: "generating a bundle twice from the same workspace state yields the same bundle_id",
        impact: "non-deterministic bundle ids make offline verification meaningless",
    },
    InvariantDef {
        code: "INV_ATTESTATION_VERIFIABLE",
        category: "attestation",
        rule: "verify(generate(S)) is PASS, and mutating any signed field flips the verdict",
        impact: "a bundle that doesn't verify itself can't be trusted to verify anything else",
    },
    InvariantDef {
        code: "INV_FATIGUE_MONOTONE",
        category: "session",
        rule: "removing approvals from the sliding window never makes a later admission call fail",
        impact: "a non-monotone guard could be gamed by replaying stale approvals",
    },
    InvariantDef {
        code: "INV_SESSION_SINGLE_BIND",
        category: "session",
        rule: "operator identity and workspace root are each bound at most once per session",
        impact: "rebinding mid-session would let a later actor impersonate the session's authority",
    },
];

pub fn lookup(code: &str) -> Option<&'static InvariantDef> {
    INVARIANTS.iter().find(|d| d.code == code)
}

/// Assert `cond`, raising an invariant-classified error on failure.
pub fn assert_invariant(
    cond: bool,
    invariant_id: &'static str,
    tool_name: &str,
    msg: impl Into<String>,
) -> crate::error::Result<()> {
    if cond {
        Ok(())
    } else {
        Err(GateError::invariant(invariant_id, tool_name, msg))
    }
}

pub fn assert_not_null<T>(
    opt: Option<T>,
    invariant_id: &'static str,
    tool_name: &str,
    msg: impl Into<String>,
) -> crate::error::Result<T> {
    opt.ok_or_else(|| GateError::invariant(invariant_id, tool_name, msg))
}

pub fn assert_true(
    cond: bool,
    invariant_id: &'static str,
    tool_name: &str,
    msg: impl Into<String>,
) -> crate::error::Result<()> {
    assert_invariant(cond, invariant_id, tool_name, msg)
}

pub fn assert_equal<T: PartialEq + Debug>(
    a: &T,
    b: &T,
    invariant_id: &'static str,
    tool_name: &str,
    msg: impl Into<String>,
) -> crate::error::Result<()> {
    if a == b {
        Ok(())
    } else {
        Err(GateError::invariant(
            invariant_id,
            tool_name,
            format!("{}: {:?} != {:?}", msg.into(), a, b),
        ))
    }
}

/// Assert that a JSON value is of the expected type tag (`"string"`,
/// `"object"`, `"array"`, `"number"`, `"boolean"`, `"null"`).
pub fn assert_type(
    value: &serde_json::Value,
    expected: &'static str,
    invariant_id: &'static str,
    tool_name: &str,
    field: &str,
) -> crate::error::Result<()> {
    let actual = match value {
        serde_json::Value::String(_) => "string",
        serde_json::Value::Object(_) => "object",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Null => "null",
    };
    assert_invariant(
        actual == expected,
        invariant_id,
        tool_name,
        format!("field '{}' expected type {} but got {}", field, expected, actual),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_known_invariant() {
        let def = lookup("INV_HASH_CHAIN").unwrap();
        assert_eq!(def.category, "audit");
    }

    #[test]
    fn lookup_unknown_returns_none() {
        assert!(lookup("INV_DOES_NOT_EXIST").is_none());
    }

    #[test]
    fn assert_invariant_passes_and_fails() {
        assert!(assert_invariant(true, "INV_PATH_BOUNDS", "t", "ok").is_ok());
        let err = assert_invariant(false, "INV_PATH_BOUNDS", "t", "bad").unwrap_err();
        assert_eq!(err.error_code, ErrorCode::InvariantViolation);
        assert_eq!(err.invariant_id.as_deref(), Some("INV_PATH_BOUNDS"));
    }

    #[test]
    fn assert_type_checks_tag() {
        assert!(assert_type(&serde_json::json!("x"), "string", "INV_PATH_BOUNDS", "t", "f").is_ok());
        assert!(assert_type(&serde_json::json!(1), "string", "INV_PATH_BOUNDS", "t", "f").is_err());
    }
}
