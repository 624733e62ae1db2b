//! # SIRTIS
//!
//! Sequential case/call identifier allocation and role/permission
//! authorization for the SIRTIS business platform, over PostgreSQL on the
//! `may` coroutine runtime.
//!
//! - [`sequence`]: `CASE-YYYY-NNNNNNNN` and `NNNNNNNN/YYYY` identifiers,
//!   scoped by calendar year.
//! - [`authz`]: per-operation policies checked against a subject's roles
//!   and permission grants.

pub mod authz;
pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod schema;
pub mod sequence;
pub mod transaction;

pub use config::SirtisConfig;
pub use connection::{connect, validate_connection_string, ConnectionError};
pub use error::{ErrorBody, SirtisError, StoreError};
pub use executor::{DbError, Executor, PgExecutor};
pub use transaction::{Transaction, TransactionError};
