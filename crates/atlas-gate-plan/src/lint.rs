//! Plan Linter (spec.md §4.F) — structure, phases, path allowlist,
//! enforceability, auditability, and hash validation of a plan document.

use atlas_gate_core::{ErrorCode, GateError};
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

const TOOL: &str = "plan_linter";

const REQUIRED_SECTIONS: &[&str] = &[
    "Metadata",
    "Phases",
    "Path Allowlist",
    "Verification Gates",
    "Forbidden Actions",
    "Rollback Policy",
];

const REQUIRED_PHASE_FIELDS: &[&str] = &[
    "Objective",
    "Allowed Ops",
    "Forbidden Ops",
    "Required Intents",
    "Verification Commands",
    "Expected Outcomes",
    "Failure Stops",
];

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PlanViolation {
    pub stage: &'static str,
    pub code: &'static str,
    pub message: String,
}

fn violation(stage: &'static str, code: &'static str, message: impl Into<String>) -> PlanViolation {
    PlanViolation { stage, code, message: message.into() }
}

#[derive(Debug, Clone, Serialize)]
pub struct LintVerdict {
    pub pass: bool,
    pub violations: Vec<PlanViolation>,
    pub plan_hash: String,
}

fn section_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^#\s+(.+?)\s*$").unwrap())
}

fn phase_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^##\s+([A-Za-z0-9_]+)\s*$").unwrap())
}

fn ambiguous_tokens_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(may|should|could|if possible|use best judgment|human judgment|optional|try to|attempt to)\b").unwrap()
    })
}

fn placeholder_tokens_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(TODO|FIXME|XXX|HACK|stub|mock|placeholder|temp.*implementation|to be (determined|implemented|defined)|tbd|wip)\b").unwrap()
    })
}

fn code_symbol_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\$\{|`|<[A-Za-z_][A-Za-z0-9_]*>|\b(function|const|let|var)\b)").unwrap())
}

fn leading_comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^\s*<!--.*?-->").unwrap())
}

fn trailing_footer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\s*\[SHA256_HASH:\s*[0-9a-fA-F]{64}\s*\]\s*$").unwrap())
}

fn parent_dir_segment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(^|[/\\])\.\.([/\\]|$)").unwrap())
}

fn unresolved_var_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{[^}]*\}").unwrap())
}

/// Strip the leading HTML-comment envelope and the trailing
/// `[SHA256_HASH: …]` footer, trim trailing whitespace per line, and drop
/// leading/trailing blank lines. This is the sole canonical form for
/// hashing and diffing a plan — it must be byte-identical for
/// byte-identical logical content.
pub fn canonicalize(text: &str) -> String {
    let without_comment = leading_comment_re().replace(text, "");
    let without_footer = trailing_footer_re().replace(&without_comment, "");
    let trimmed_lines: Vec<&str> = without_footer.lines().map(|l| l.trim_end()).collect();
    let start = trimmed_lines.iter().position(|l| !l.is_empty()).unwrap_or(trimmed_lines.len());
    let end = trimmed_lines.iter().rposition(|l| !l.is_empty()).map(|i| i + 1).unwrap_or(0);
    if start >= end {
        return String::new();
    }
    trimmed_lines[start..end].join("\n")
}

fn sha256_hex(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

fn check_structure(text: &str, violations: &mut Vec<PlanViolation>) {
    let found: Vec<String> = section_header_re()
        .captures_iter(text)
        .map(|c| c[1].trim().to_string())
        .collect();

    for required in REQUIRED_SECTIONS {
        if !found.iter().any(|f| f.eq_ignore_ascii_case(required)) {
            violations.push(violation(
                "structure",
                "PLAN_SECTION_MISSING",
                format!("required section '{}' not found", required),
            ));
        }
    }

    let present_required: Vec<&String> = found
        .iter()
        .filter(|f| REQUIRED_SECTIONS.iter().any(|r| f.eq_ignore_ascii_case(r)))
        .collect();
    let expected_order: Vec<&String> = REQUIRED_SECTIONS
        .iter()
        .filter_map(|r| present_required.iter().find(|f| f.eq_ignore_ascii_case(r)).copied())
        .collect();
    if present_required != expected_order {
        violations.push(violation(
            "structure",
            "PLAN_SECTION_ORDER",
            "required sections are present but not in declared order",
        ));
    }
}

fn check_phases(text: &str, violations: &mut Vec<PlanViolation>) {
    let headers: Vec<_> = phase_header_re().find_iter(text).collect();
    let phase_ids: Vec<&str> = phase_header_re().captures_iter(text).map(|c| c.get(1).unwrap().as_str()).collect();

    if phase_ids.is_empty() {
        violations.push(violation("phases", "PLAN_NO_PHASES", "plan declares no phases"));
        return;
    }

    let id_re = Regex::new(r"^[A-Z0-9_]+$").unwrap();
    let mut seen = std::collections::HashSet::new();
    for id in &phase_ids {
        if !id_re.is_match(id) {
            violations.push(violation("phases", "PLAN_PHASE_ID_INVALID", format!("phase id '{}' does not match [A-Z0-9_]+", id)));
        }
        if !seen.insert(*id) {
            violations.push(violation("phases", "PLAN_PHASE_ID_DUPLICATE", format!("duplicate phase id '{}'", id)));
        }
    }

    for (i, m) in headers.iter().enumerate() {
        let start = m.end();
        let end = headers.get(i + 1).map(|n| n.start()).unwrap_or(text.len());
        let block = &text[start..end];
        let phase_id = phase_ids.get(i).copied().unwrap_or("?");
        for field in REQUIRED_PHASE_FIELDS {
            let field_re = Regex::new(&format!(r"(?im)^\s*{}\s*:", regex::escape(field))).unwrap();
            if !field_re.is_match(block) {
                violations.push(violation(
                    "phases",
                    "PLAN_PHASE_FIELD_MISSING",
                    format!("phase '{}' missing required field '{}'", phase_id, field),
                ));
            }
        }
    }
}

fn path_allowlist_section(text: &str) -> Option<String> {
    let headers: Vec<_> = section_header_re().find_iter(text).collect();
    for (i, m) in headers.iter().enumerate() {
        let name = section_header_re().captures(&text[m.start()..m.end()]).map(|c| c[1].trim().to_string());
        if name.as_deref().map(|n| n.eq_ignore_ascii_case("Path Allowlist")).unwrap_or(false) {
            let start = m.end();
            let end = headers.get(i + 1).map(|n| n.start()).unwrap_or(text.len());
            return Some(text[start..end].to_string());
        }
    }
    None
}

fn check_path_allowlist(text: &str, violations: &mut Vec<PlanViolation>) {
    let Some(section) = path_allowlist_section(text) else {
        return;
    };
    for line in section.lines() {
        let entry = line.trim().trim_start_matches('-').trim();
        if entry.is_empty() {
            continue;
        }
        if parent_dir_segment_re().is_match(entry) {
            violations.push(violation("path_allowlist", "PLAN_ALLOWLIST_PARENT_SEGMENT", format!("entry '{}' contains a parent-directory segment", entry)));
        }
        if entry.starts_with('/') && !(entry.ends_with("/**") || entry.ends_with('*')) {
            violations.push(violation("path_allowlist", "PLAN_ALLOWLIST_ABSOLUTE_WITHOUT_GLOB", format!("absolute entry '{}' has no clear glob terminator", entry)));
        }
        if unresolved_var_re().is_match(entry) {
            violations.push(violation("path_allowlist", "PLAN_ALLOWLIST_UNRESOLVED_VAR", format!("entry '{}' contains an unresolved ${{…}} token", entry)));
        }
    }
}

fn check_enforceability(text: &str, violations: &mut Vec<PlanViolation>) {
    if let Some(m) = ambiguous_tokens_re().find(text) {
        violations.push(violation("enforceability", "PLAN_AMBIGUOUS_LANGUAGE", format!("ambiguous language token '{}'", m.as_str())));
    }
    if let Some(m) = placeholder_tokens_re().find(text) {
        violations.push(violation("enforceability", "PLAN_PLACEHOLDER_TOKEN", format!("placeholder token '{}'", m.as_str())));
    }
}

fn check_auditability(text: &str, violations: &mut Vec<PlanViolation>) {
    let objective_re = Regex::new(r"(?im)^\s*Objective\s*:\s*(.*)$").unwrap();
    for cap in objective_re.captures_iter(text) {
        let line = &cap[1];
        if code_symbol_re().is_match(line) {
            violations.push(violation("auditability", "PLAN_OBJECTIVE_CODE_SYMBOL", format!("objective line contains a code symbol: '{}'", line.trim())));
        }
    }
}

/// Run the full linter pipeline. Stages 1-5 accumulate violations into the
/// returned verdict. Stage 6 (hash check) is an invariant: a mismatch
/// raises `PLAN_HASH_MISMATCH` / `INV_PLAN_IMMUTABILITY` directly rather
/// than being added to the violation list.
pub fn lint(text: &str, expected_hash: Option<&str>) -> atlas_gate_core::Result<LintVerdict> {
    let mut violations = Vec::new();
    check_structure(text, &mut violations);
    check_phases(text, &mut violations);
    check_path_allowlist(text, &mut violations);
    check_enforceability(text, &mut violations);
    check_auditability(text, &mut violations);

    let canonical = canonicalize(text);
    let plan_hash = sha256_hex(&canonical);

    if let Some(expected) = expected_hash {
        if expected != plan_hash {
            return Err(GateError::new(
                ErrorCode::PlanHashMismatch,
                TOOL,
                format!("plan hash mismatch: expected {}, computed {}", expected, plan_hash),
            )
            .with_invariant_id("INV_PLAN_IMMUTABILITY")
            .with_plan_hash(plan_hash));
        }
    }

    Ok(LintVerdict {
        pass: violations.is_empty(),
        violations,
        plan_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_plan() -> String {
        r#"<!-- ATLAS-GATE_PLAN_HASH: 0000000000000000000000000000000000000000000000000000000000000000
ROLE: EXECUTION
STATUS: APPROVED -->

# Metadata
Title: Refactor the parser

# Phases

## PHASE_ONE
Objective: replace the tokenizer
Allowed Ops: write_file
Forbidden Ops: delete_file
Required Intents: parser.intent.md
Verification Commands: cargo test
Expected Outcomes: tests pass
Failure Stops: true

# Path Allowlist
- src/parser/**

# Verification Gates
- cargo test

# Forbidden Actions
- none

# Rollback Policy
revert the commit
"#
        .to_string()
    }

    #[test]
    fn valid_plan_lints_clean() {
        let verdict = lint(&valid_plan(), None).unwrap();
        assert!(verdict.pass, "unexpected violations: {:?}", verdict.violations);
    }

    #[test]
    fn missing_section_is_flagged() {
        let text = valid_plan().replace("# Rollback Policy\nrevert the commit\n", "");
        let verdict = lint(&text, None).unwrap();
        assert!(verdict.violations.iter().any(|v| v.code == "PLAN_SECTION_MISSING"));
    }

    #[test]
    fn ambiguous_language_is_flagged() {
        let text = valid_plan().replace("Objective: replace the tokenizer", "Objective: should replace the tokenizer if possible");
        let verdict = lint(&text, None).unwrap();
        assert!(verdict.violations.iter().any(|v| v.code == "PLAN_AMBIGUOUS_LANGUAGE"));
    }

    #[test]
    fn placeholder_token_is_flagged() {
        let text = valid_plan().replace("revert the commit", "TODO: figure out rollback");
        let verdict = lint(&text, None).unwrap();
        assert!(verdict.violations.iter().any(|v| v.code == "PLAN_PLACEHOLDER_TOKEN"));
    }

    #[test]
    fn parent_dir_allowlist_entry_is_flagged() {
        let text = valid_plan().replace("- src/parser/**", "- ../etc/passwd");
        let verdict = lint(&text, None).unwrap();
        assert!(verdict.violations.iter().any(|v| v.code == "PLAN_ALLOWLIST_PARENT_SEGMENT"));
    }

    #[test]
    fn duplicate_phase_id_is_flagged() {
        let mut text = valid_plan();
        text.push_str("\n## PHASE_ONE\nObjective: x\nAllowed Ops: x\nForbidden Ops: x\nRequired Intents: x\nVerification Commands: x\nExpected Outcomes: x\nFailure Stops: x\n");
        let verdict = lint(&text, None).unwrap();
        assert!(verdict.violations.iter().any(|v| v.code == "PLAN_PHASE_ID_DUPLICATE"));
    }

    #[test]
    fn objective_code_symbol_is_flagged() {
        let text = valid_plan().replace("Objective: replace the tokenizer", "Objective: call `tokenize()` directly");
        let verdict = lint(&text, None).unwrap();
        assert!(verdict.violations.iter().any(|v| v.code == "PLAN_OBJECTIVE_CODE_SYMBOL"));
    }

    #[test]
    fn hash_mismatch_raises_invariant_violation() {
        let err = lint(&valid_plan(), Some("deadbeef")).unwrap_err();
        assert_eq!(err.error_code, ErrorCode::PlanHashMismatch);
        assert_eq!(err.invariant_id.as_deref(), Some("INV_PLAN_IMMUTABILITY"));
    }

    #[test]
    fn canonicalize_strips_envelope_and_footer() {
        let text = "<!-- header -->\n\nbody line   \n\n\n[SHA256_HASH: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa]\n";
        assert_eq!(canonicalize(text), "body line");
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let text = valid_plan();
        let once = canonicalize(&text);
        let twice = canonicalize(&once);
        assert_eq!(once, twice);
    }
}
