//! Transactions over `may_postgres`.
//!
//! Used by the Postgres identifier store to make a lookup and the insert that
//! follows it one atomic unit.

use crate::executor::{instrumented, DbError, Executor};
use may_postgres::types::ToSql;
use may_postgres::{Client, Error as PostgresError, Row};
use std::fmt;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Transaction error type
#[derive(Debug)]
pub enum TransactionError {
    /// `BEGIN`, `COMMIT` or the advisory lock failed
    PostgresError(PostgresError),
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionError::PostgresError(e) => write!(f, "Transaction failed: {e}"),
        }
    }
}

impl std::error::Error for TransactionError {}

impl From<PostgresError> for TransactionError {
    fn from(err: PostgresError) -> Self {
        TransactionError::PostgresError(err)
    }
}

impl From<TransactionError> for DbError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::PostgresError(e) => DbError::PostgresError(e),
        }
    }
}

/// An open database transaction.
///
/// [`commit`](Transaction::commit) consumes the transaction. Dropping it
/// uncommitted issues a best-effort `ROLLBACK`.
pub struct Transaction {
    client: Client,
    committed: bool,
}

impl Transaction {
    pub(crate) fn new(client: Client) -> Result<Self, TransactionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::begin_transaction_span().entered();

        client.execute("BEGIN", &[])?;
        Ok(Self {
            client,
            committed: false,
        })
    }

    /// Take a transaction-scoped advisory lock.
    ///
    /// Postgres releases it at commit or rollback.
    pub fn advisory_lock(&self, key: i64) -> Result<(), TransactionError> {
        self.client
            .execute("SELECT pg_advisory_xact_lock($1)", &[&key])?;
        Ok(())
    }

    /// Commit the transaction
    ///
    /// # Errors
    ///
    /// Returns an error if `COMMIT` fails. The server has then rolled the
    /// transaction back.
    pub fn commit(mut self) -> Result<(), TransactionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::commit_transaction_span().entered();

        self.committed = true;
        self.client.execute("COMMIT", &[])?;
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.committed {
            #[cfg(feature = "tracing")]
            let _span = tracing_helpers::rollback_transaction_span().entered();

            if let Err(e) = self.client.execute("ROLLBACK", &[]) {
                log::warn!("Rollback of abandoned transaction failed: {e}");
            }
        }
    }
}

impl Executor for Transaction {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, DbError> {
        instrumented(query, || self.client.execute(query, params))
    }

    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, DbError> {
        instrumented(query, || self.client.query_one(query, params))
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, DbError> {
        instrumented(query, || self.client.query(query, params))
    }
}
