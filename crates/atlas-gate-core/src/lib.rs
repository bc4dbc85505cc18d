//! atlas-gate-core — Path Resolver, File Lock, Error Envelope, Invariant
//! Asserter, and Session State: the load-bearing primitives every other
//! atlas-gate crate is built on.

pub mod canonical;
pub mod error;
pub mod invariant;
pub mod lock;
pub mod path;
pub mod session;

pub use error::{ErrorCode, GateError, Result};
pub use path::PathResolver;
pub use session::{ClientRole, FatigueConfig, FatigueGuard, OperatorIdentity, OperatorRole, SessionContext};
