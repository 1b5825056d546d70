//! Session implementations.
//!
//! - `mysql`: live MySQL sessions over sqlx (feature `mysql`)
//! - `mock`: in-memory schema with fault injection (tests, feature `test-utils`)

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockConnector, MockDatabase, MockSession};
#[cfg(feature = "mysql")]
pub use mysql::{MySqlConnector, MySqlSession};
