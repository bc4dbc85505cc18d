//! Plan Linter and Plan Store/Resolver (spec.md §4.F, §4.G) — the sole
//! authority token a mutating write carries is a plan's content hash.

pub mod lint;
pub mod store;

pub use lint::{lint as lint_plan, LintVerdict, PlanViolation};
pub use store::{enforce_plan, parse_envelope, PlanEnvelope};
