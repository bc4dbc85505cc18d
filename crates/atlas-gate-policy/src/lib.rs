//! Static Content Policy and Write-Time Policy Engine (spec.md §4.I, §4.J).
//!
//! `denylist`/`language` implement the universal + per-language content
//! scan; `engine` orchestrates path bounds, plan authorization, the
//! content scan, and intent validation around one write, fail-closed.

pub mod denylist;
pub mod engine;
pub mod language;

pub use denylist::PolicyHit;
pub use engine::{evaluate, WriteOperation, WriteRequest, WriteVerdict};
pub use language::Language;
