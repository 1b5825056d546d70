//! Abstract interfaces for the lhm core.
//!
//! These traits define the contracts for:
//! - Database sessions (statement execution primitives)
//! - Session factories (opening fresh sessions, optionally pinned to a backend)
//! - Reporters (human-readable output sinks owned by the caller)

pub mod reporter;
pub mod session;

pub use reporter::{BufferReporter, Reporter, TracingReporter};
pub use session::{
    BackendIdentity, DriverError, DriverErrorKind, DriverResult, Row, Session, SessionFactory,
};
