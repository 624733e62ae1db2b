//! Postgres-backed identifier store.

use super::allocator::{floor_from_latest, next_sequence, AllocationError, MalformedPolicy};
use super::identifier::AllocatedIdentifier;
use super::kind::{EntityKind, SequenceScope};
use super::store::{IdentifierLookup, IdentifierSink, SequenceCounter};
use crate::error::StoreError;
use crate::executor::{DbError, Executor, PgExecutor};
use may_postgres::error::SqlState;
use sea_query::{Alias, Expr, ExprTrait, Order, PostgresQueryBuilder, Query};
use serde::Deserialize;

/// Default name of the counter table used by [`SequenceCounter`].
pub const DEFAULT_COUNTER_TABLE: &str = "sirtis_sequence_counters";

/// Table and column holding one entity kind's identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdentifierColumn {
    pub table: String,
    pub column: String,
}

impl IdentifierColumn {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

/// Where each kind's identifiers live.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdentifierColumns {
    #[serde(default = "default_case_column")]
    pub case: IdentifierColumn,
    #[serde(default = "default_call_column")]
    pub call: IdentifierColumn,
    #[serde(default = "default_counter_table")]
    pub counter_table: String,
}

fn default_case_column() -> IdentifierColumn {
    IdentifierColumn::new("cases", "case_number")
}

fn default_call_column() -> IdentifierColumn {
    IdentifierColumn::new("calls", "call_number")
}

fn default_counter_table() -> String {
    DEFAULT_COUNTER_TABLE.to_string()
}

impl Default for IdentifierColumns {
    fn default() -> Self {
        Self {
            case: default_case_column(),
            call: default_call_column(),
            counter_table: default_counter_table(),
        }
    }
}

impl IdentifierColumns {
    pub fn for_kind(&self, kind: EntityKind) -> &IdentifierColumn {
        match kind {
            EntityKind::Case => &self.case,
            EntityKind::Call => &self.call,
        }
    }

    /// `SELECT <column> FROM <table> WHERE <column> LIKE <pattern> ORDER BY <column> DESC LIMIT 1`
    pub fn latest_identifier_sql(&self, scope: &SequenceScope) -> String {
        let target = self.for_kind(scope.kind);
        Query::select()
            .column(Alias::new(target.column.clone()))
            .from(Alias::new(target.table.clone()))
            .and_where(Expr::col(Alias::new(target.column.clone())).like(scope.like_pattern()))
            .order_by(Alias::new(target.column.clone()), Order::Desc)
            .limit(1)
            .to_string(PostgresQueryBuilder)
    }

    pub fn insert_identifier_sql(&self, identifier: &AllocatedIdentifier) -> Result<String, StoreError> {
        let target = self.for_kind(identifier.kind);
        let mut insert = Query::insert();
        insert
            .into_table(Alias::new(target.table.clone()))
            .columns([Alias::new(target.column.clone())])
            .values([Expr::val(identifier.to_string()).into()])
            .map_err(|e| StoreError::Database(DbError::QueryError(e.to_string())))?;
        Ok(insert.to_string(PostgresQueryBuilder))
    }

    /// Upsert that applies `max(value, floor) + 1` in one statement.
    pub fn increment_sql(&self) -> String {
        let table = &self.counter_table;
        format!(
            "INSERT INTO \"{table}\" (entity_kind, year, value) VALUES ($1::text, $2::int4, $3::int8 + 1) \
             ON CONFLICT (entity_kind, year) \
             DO UPDATE SET value = GREATEST(\"{table}\".value, EXCLUDED.value - 1) + 1 \
             RETURNING value"
        )
    }
}

fn map_insert_error(err: DbError, identifier: &AllocatedIdentifier) -> StoreError {
    match &err {
        DbError::PostgresError(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
            StoreError::Duplicate(identifier.to_string())
        }
        _ => StoreError::Database(err),
    }
}

/// Identifier lookup, sink and counter over Postgres.
///
/// Inserts rely on a unique index over each identifier column (see
/// [`crate::schema::ensure_identifier_index`]) to report lost races as
/// [`StoreError::Duplicate`].
///
/// A store owns one server session. Transactions opened by
/// [`allocate_and_record_locked`](Self::allocate_and_record_locked) run on
/// that session, so the method takes `&mut self`: a store shared between
/// coroutines has to sit behind a mutex, and callers that want to proceed
/// in parallel each need a store with its own connection.
pub struct PgIdentifierStore {
    executor: PgExecutor,
    columns: IdentifierColumns,
}

impl PgIdentifierStore {
    pub fn new(executor: PgExecutor) -> Self {
        Self::with_columns(executor, IdentifierColumns::default())
    }

    pub fn with_columns(executor: PgExecutor, columns: IdentifierColumns) -> Self {
        Self { executor, columns }
    }

    fn latest_with(
        &self,
        executor: &dyn Executor,
        scope: &SequenceScope,
    ) -> Result<Option<String>, StoreError> {
        let sql = self.columns.latest_identifier_sql(scope);
        let row = executor.query_first(&sql, &[])?;
        Ok(row.map(|r| r.get::<_, String>(0)))
    }

    fn insert_with(
        &self,
        executor: &dyn Executor,
        identifier: &AllocatedIdentifier,
    ) -> Result<(), StoreError> {
        let sql = self.columns.insert_identifier_sql(identifier)?;
        executor
            .execute(&sql, &[])
            .map_err(|e| map_insert_error(e, identifier))?;
        Ok(())
    }

    /// Lookup and insert inside one transaction holding a per-scope advisory
    /// lock. Callers on other connections queue on the lock instead of
    /// racing. The lock is re-entrant within a session, which is why this
    /// needs exclusive use of the store.
    pub fn allocate_and_record_locked(
        &mut self,
        kind: EntityKind,
        year: i32,
        policy: MalformedPolicy,
    ) -> Result<AllocatedIdentifier, AllocationError> {
        let scope = SequenceScope::new(kind, year);
        let tx = self
            .executor
            .begin()
            .map_err(|e| StoreError::Database(e.into()))?;
        tx.advisory_lock(scope.lock_key())
            .map_err(|e| StoreError::Database(e.into()))?;

        let latest = self.latest_with(&tx, &scope)?;
        let floor = floor_from_latest(&scope, latest.as_deref(), policy)?;
        let identifier = AllocatedIdentifier::new(kind, year, next_sequence(&scope, floor)?);
        self.insert_with(&tx, &identifier)?;

        tx.commit().map_err(|e| StoreError::Database(e.into()))?;
        log::debug!("Recorded {identifier} under advisory lock");
        Ok(identifier)
    }
}

impl IdentifierLookup for PgIdentifierStore {
    fn latest_identifier(&self, scope: &SequenceScope) -> Result<Option<String>, StoreError> {
        self.latest_with(&self.executor, scope)
    }
}

impl IdentifierSink for PgIdentifierStore {
    fn insert_identifier(&self, identifier: &AllocatedIdentifier) -> Result<(), StoreError> {
        self.insert_with(&self.executor, identifier)
    }
}

impl SequenceCounter for PgIdentifierStore {
    fn increment(&self, scope: &SequenceScope, floor: u64) -> Result<u64, StoreError> {
        let floor = i64::try_from(floor)
            .map_err(|_| StoreError::Database(DbError::Other(format!("floor {floor} out of range"))))?;
        let kind = scope.kind.as_str();
        let row = self
            .executor
            .query_one(&self.columns.increment_sql(), &[&kind, &scope.year, &floor])?;
        let value: i64 = row.get(0);
        u64::try_from(value).map_err(|_| {
            StoreError::Database(DbError::ParseError(format!("negative counter value {value}")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_identifier_sql() {
        let columns = IdentifierColumns::default();
        let sql = columns.latest_identifier_sql(&SequenceScope::new(EntityKind::Case, 2025));
        assert!(sql.starts_with(r#"SELECT "case_number" FROM "cases""#), "{sql}");
        assert!(sql.contains("LIKE 'CASE-2025-%'"), "{sql}");
        assert!(sql.contains(r#"ORDER BY "case_number" DESC"#), "{sql}");
        assert!(sql.ends_with("LIMIT 1"), "{sql}");

        let sql = columns.latest_identifier_sql(&SequenceScope::new(EntityKind::Call, 2025));
        assert!(sql.contains(r#"FROM "calls""#), "{sql}");
        assert!(sql.contains("LIKE '%/2025'"), "{sql}");
    }

    #[test]
    fn test_insert_identifier_sql() {
        let columns = IdentifierColumns {
            case: IdentifierColumn::new("hotline_cases", "reference"),
            ..IdentifierColumns::default()
        };
        let sql = columns
            .insert_identifier_sql(&AllocatedIdentifier::new(EntityKind::Case, 2025, 3))
            .unwrap();
        assert!(sql.contains(r#"INSERT INTO "hotline_cases" ("reference")"#), "{sql}");
        assert!(sql.contains("'CASE-2025-00000003'"), "{sql}");
    }

    #[test]
    fn test_increment_sql_targets_counter_table() {
        let sql = IdentifierColumns::default().increment_sql();
        assert!(sql.contains(r#"INSERT INTO "sirtis_sequence_counters""#));
        assert!(sql.contains("ON CONFLICT (entity_kind, year)"));
        assert!(sql.contains("RETURNING value"));
    }
}
