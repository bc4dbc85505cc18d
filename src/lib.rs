//! `atlas-gate` — policy and governance gateway crate root.
//!
//! This crate is a thin re-export shell: the actual modules (session state,
//! the tool registry, the write-time policy engine, audit log, plan store,
//! ...) live in their own workspace crates under `crates/`. `src/bin/
//! atlas-gate.rs` wires them together into a runnable process.

#![allow(dead_code)]

pub use atlas_gate_gateway as gateway;
