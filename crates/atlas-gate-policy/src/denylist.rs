//! Static Content Policy (spec.md §4.I) — universal denylist, per-language
//! profile denylist, and the hard-block set that no plan authorization can
//! override.

use crate::language::Language;
use atlas_gate_core::{ErrorCode, GateError};
use regex::Regex;
use std::sync::OnceLock;

const TOOL: &str = "static_content_policy";

/// One denylist hit: a stable name and a human reason, bound to the error
/// code the family maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyHit {
    pub name: &'static str,
    pub reason: &'static str,
}

struct Pattern {
    name: &'static str,
    reason: &'static str,
    re: fn() -> &'static Regex,
}

macro_rules! pattern_regex {
    ($fn_name:ident, $re:expr) => {
        fn $fn_name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new($re).unwrap())
        }
    };
}

// --- hard-block set: never allowed, even with plan authorization -----------

pattern_regex!(hb_bypass_marker, r"(?i)\b(always allow|bypass)\b");
pattern_regex!(hb_simulated_outcome, r"\b(SIMULATE|DRY_RUN)\b");
pattern_regex!(hb_placeholder, r"(?i)\b(TODO|FIXME|XXX)\b");
pattern_regex!(hb_fake_data, r"(?i)\b(mock|fake|dummy)[_A-Za-z]*\s*(data|=)");

fn hard_block_patterns() -> &'static [Pattern] {
    static PATTERNS: OnceLock<Vec<Pattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            Pattern { name: "policy_bypass_marker", reason: "policy-bypass marker present", re: hb_bypass_marker },
            Pattern { name: "simulated_outcome_marker", reason: "simulated-outcome marker present", re: hb_simulated_outcome },
            Pattern { name: "placeholder_token", reason: "placeholder token present", re: hb_placeholder },
            Pattern { name: "fake_data_identifier", reason: "mock/fake/dummy data identifier present", re: hb_fake_data },
        ]
    })
}

// --- universal denylist -----------------------------------------------------

pattern_regex!(un_todo, r"\bTODO\b");
pattern_regex!(un_fixme, r"\bFIXME\b");
pattern_regex!(un_xxx, r"\bXXX\b");
pattern_regex!(un_lone_pass, r"(?m)^\s*pass\s*$");
pattern_regex!(un_empty_catch, r"catch\s*\([^)]*\)\s*\{\s*\}");
pattern_regex!(un_log_only_catch, r"(?s)catch\s*\([^)]*\)\s*\{\s*(console\.(log|error|warn)|logger?\.[a-zA-Z]+)\([^}]*\)\s*;?\s*\}");
pattern_regex!(un_catch_arrow_noop, r"\.catch\(\s*\(\s*\)\s*=>\s*\{\s*\}\s*\)");
pattern_regex!(un_try_catch_silent_return, r"(?s)catch\s*\([^)]*\)\s*\{\s*return[^}]*\}");
pattern_regex!(un_unwrap_or, r"\bunwrap_or\b");
pattern_regex!(un_unwrap_or_default, r"\bunwrap_or_default\b");
pattern_regex!(un_or_else_get_or_else, r"\b(orElse|getOrElse)\b");
pattern_regex!(un_console_log, r"console\.log\(");
pattern_regex!(un_assert_false, r"assert\(\s*false\s*\)");

fn universal_patterns() -> &'static [Pattern] {
    static PATTERNS: OnceLock<Vec<Pattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            Pattern { name: "todo", reason: "TODO marker present", re: un_todo },
            Pattern { name: "fixme", reason: "FIXME marker present", re: un_fixme },
            Pattern { name: "xxx", reason: "XXX marker present", re: un_xxx },
            Pattern { name: "lone_pass", reason: "bare 'pass' statement present", re: un_lone_pass },
            Pattern { name: "empty_catch", reason: "empty catch block present", re: un_empty_catch },
            Pattern { name: "log_only_catch", reason: "catch block only logs and swallows the error", re: un_log_only_catch },
            Pattern { name: "catch_arrow_noop", reason: ".catch(() => {}) present", re: un_catch_arrow_noop },
            Pattern { name: "try_catch_silent_return", reason: "catch block returns silently", re: un_try_catch_silent_return },
            Pattern { name: "unwrap_or", reason: "unwrap_or masks a failure path", re: un_unwrap_or },
            Pattern { name: "unwrap_or_default", reason: "unwrap_or_default masks a failure path", re: un_unwrap_or_default },
            Pattern { name: "or_else_get_or_else", reason: "orElse/getOrElse masks a failure path", re: un_or_else_get_or_else },
            Pattern { name: "console_log", reason: "console.log present", re: un_console_log },
            Pattern { name: "assert_false", reason: "assert(false) present", re: un_assert_false },
        ]
    })
}

// --- Rust profile ------------------------------------------------------------

pattern_regex!(rs_unwrap, r"\.unwrap\(\)");
pattern_regex!(rs_expect, r"\.expect\(");
pattern_regex!(rs_panic, r"panic!\(");
pattern_regex!(rs_todo_macro, r"todo!\(");
pattern_regex!(rs_unimplemented, r"unimplemented!\(");
pattern_regex!(rs_unsafe_block, r"unsafe\s*\{");
pattern_regex!(rs_static_mut, r"static\s+mut\b");
pattern_regex!(rs_box_leak, r"Box::leak\(");
pattern_regex!(rs_allow_attr, r"#\[allow\(");

fn rust_patterns() -> &'static [Pattern] {
    static PATTERNS: OnceLock<Vec<Pattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            Pattern { name: "unwrap", reason: ".unwrap() can panic", re: rs_unwrap },
            Pattern { name: "expect", reason: ".expect() can panic", re: rs_expect },
            Pattern { name: "panic_macro", reason: "panic!() present", re: rs_panic },
            Pattern { name: "todo_macro", reason: "todo!() present", re: rs_todo_macro },
            Pattern { name: "unimplemented_macro", reason: "unimplemented!() present", re: rs_unimplemented },
            Pattern { name: "unsafe_block", reason: "unsafe block present", re: rs_unsafe_block },
            Pattern { name: "static_mut", reason: "static mut present", re: rs_static_mut },
            Pattern { name: "box_leak", reason: "Box::leak( present", re: rs_box_leak },
            Pattern { name: "allow_attribute", reason: "#[allow(...)] present", re: rs_allow_attr },
        ]
    })
}

// --- TypeScript/JavaScript profile ------------------------------------------

pattern_regex!(ts_any, r":\s*any\b");
pattern_regex!(ts_ignore, r"@ts-(ignore|nocheck|expect-error)");
pattern_regex!(ts_math_random, r"Math\.random\(\)");
pattern_regex!(ts_date_now, r"Date\.now\(\)");

fn ts_js_patterns() -> &'static [Pattern] {
    static PATTERNS: OnceLock<Vec<Pattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            Pattern { name: "any_type", reason: ": any present", re: ts_any },
            Pattern { name: "ts_suppression", reason: "@ts-ignore/@ts-nocheck/@ts-expect-error present", re: ts_ignore },
            Pattern { name: "math_random", reason: "Math.random() is non-deterministic", re: ts_math_random },
            Pattern { name: "date_now", reason: "Date.now() is non-deterministic", re: ts_date_now },
        ]
    })
}

// --- Python profile ----------------------------------------------------------

pattern_regex!(py_import_random, r"(?m)^\s*import random\b");
pattern_regex!(py_from_random, r"(?m)^\s*from random import\b");
pattern_regex!(py_import_time, r"(?m)^\s*import time\b");
pattern_regex!(py_time_time, r"time\.time\(\)");
pattern_regex!(py_bare_except, r"(?m)^\s*except\s*:\s*$");

fn python_patterns() -> &'static [Pattern] {
    static PATTERNS: OnceLock<Vec<Pattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            Pattern { name: "import_random", reason: "import random is non-deterministic", re: py_import_random },
            Pattern { name: "from_random_import", reason: "from random import is non-deterministic", re: py_from_random },
            Pattern { name: "import_time", reason: "import time is non-deterministic", re: py_import_time },
            Pattern { name: "time_time", reason: "time.time() is non-deterministic", re: py_time_time },
            Pattern { name: "bare_except", reason: "bare except: swallows every error", re: py_bare_except },
        ]
    })
}

fn scan(content: &str, patterns: &[Pattern]) -> Option<PolicyHit> {
    patterns.iter().find_map(|p| {
        (p.re)().is_match(content).then_some(PolicyHit { name: p.name, reason: p.reason })
    })
}

/// Hard-block pass: checked first, before any per-language allowance, and
/// never overridden by plan authorization.
pub fn scan_hard_block(content: &str) -> Option<PolicyHit> {
    scan(content, hard_block_patterns())
}

/// Universal denylist, applied to every language including markdown/unknown.
pub fn scan_universal(content: &str) -> Option<PolicyHit> {
    scan(content, universal_patterns())
}

/// Language-profile denylist. Markdown and Unknown have no additional
/// profile beyond the universal scan.
pub fn scan_language_profile(content: &str, language: Language) -> Option<PolicyHit> {
    match language {
        Language::Rust => scan(content, rust_patterns()),
        Language::TypeScript | Language::JavaScript => scan(content, ts_js_patterns()),
        Language::Python => scan(content, python_patterns()),
        Language::Markdown | Language::Unknown => None,
    }
}

/// Error code for a language-profile rejection.
pub fn language_error_code(language: Language) -> ErrorCode {
    match language {
        Language::Rust => ErrorCode::RustPolicyViolation,
        Language::TypeScript | Language::JavaScript => ErrorCode::TypescriptPolicyViolation,
        Language::Python => ErrorCode::PythonPolicyViolation,
        Language::Markdown | Language::Unknown => ErrorCode::PolicyViolation,
    }
}

pub fn hit_to_error(hit: &PolicyHit, code: ErrorCode) -> GateError {
    GateError::new(code, TOOL, format!("{} ({})", hit.reason, hit.name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hard_block_detects_bypass_marker() {
        let hit = scan_hard_block("// always allow this write").unwrap();
        assert_eq!(hit.name, "policy_bypass_marker");
    }

    #[test]
    fn hard_block_detects_simulate_marker() {
        let hit = scan_hard_block("let mode = SIMULATE;").unwrap();
        assert_eq!(hit.name, "simulated_outcome_marker");
    }

    #[test]
    fn universal_detects_todo() {
        let hit = scan_universal("// TODO: finish this").unwrap();
        assert_eq!(hit.name, "todo");
    }

    #[test]
    fn universal_detects_unwrap_or_default() {
        let hit = scan_universal("let x = maybe.unwrap_or_default();").unwrap();
        assert_eq!(hit.name, "unwrap_or_default");
    }

    #[test]
    fn rust_profile_detects_unwrap() {
        let hit = scan_language_profile("fn main(){ x.unwrap(); }", Language::Rust).unwrap();
        assert_eq!(hit.name, "unwrap");
    }

    #[test]
    fn rust_profile_detects_unsafe_block() {
        let hit = scan_language_profile("unsafe { do_thing(); }", Language::Rust).unwrap();
        assert_eq!(hit.name, "unsafe_block");
    }

    #[test]
    fn ts_profile_detects_any_type() {
        let hit = scan_language_profile("function f(x: any) {}", Language::TypeScript).unwrap();
        assert_eq!(hit.name, "any_type");
    }

    #[test]
    fn python_profile_detects_bare_except() {
        let hit = scan_language_profile("try:\n    f()\nexcept:\n    pass", Language::Python).unwrap();
        // bare_except is found; "pass" is caught by the universal scan, not this one.
        assert_eq!(hit.name, "bare_except");
    }

    #[test]
    fn markdown_has_no_language_profile() {
        assert!(scan_language_profile(".unwrap() mentioned in prose", Language::Markdown).is_none());
    }

    #[test]
    fn clean_content_passes_all_scans() {
        let content = "fn main() {\n    println!(\"hi\");\n}\n";
        assert!(scan_hard_block(content).is_none());
        assert!(scan_universal(content).is_none());
        assert!(scan_language_profile(content, Language::Rust).is_none());
    }
}
