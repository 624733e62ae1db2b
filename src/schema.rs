//! DDL the allocators depend on.
//!
//! Everything here is idempotent (`IF NOT EXISTS`), so `sirtis-admin
//! init-schema` can run on every deploy.

use crate::executor::{DbError, Executor};
use crate::sequence::{EntityKind, IdentifierColumn, IdentifierColumns};
use sea_query::{ColumnDef, Expr, Index, IndexCreateStatement, PostgresQueryBuilder, Table, TableCreateStatement};

/// `(entity_kind, year) -> value` counter table.
pub fn counter_table(name: &str) -> TableCreateStatement {
    Table::create()
        .table(name.to_string())
        .if_not_exists()
        .col(ColumnDef::new("entity_kind").string().string_len(16).not_null())
        .col(ColumnDef::new("year").integer().not_null())
        .col(ColumnDef::new("value").big_integer().not_null().default(0))
        .primary_key(
            Index::create()
                .col(Expr::col("entity_kind"))
                .col(Expr::col("year")),
        )
        .to_owned()
}

/// Unique index over one identifier column, so concurrent inserts of the
/// same identifier fail instead of both landing.
pub fn identifier_index(target: &IdentifierColumn) -> IndexCreateStatement {
    Index::create()
        .name(format!("uq_{}_{}", target.table, target.column))
        .table(target.table.clone())
        .col(Expr::col(target.column.clone()))
        .unique()
        .if_not_exists()
        .to_owned()
}

pub fn ensure_counter_table(executor: &dyn Executor, name: &str) -> Result<(), DbError> {
    let sql = counter_table(name).build(PostgresQueryBuilder);
    executor.execute(&sql, &[])?;
    log::info!("Counter table {name} is present");
    Ok(())
}

/// Requires the identifier table itself to exist already.
pub fn ensure_identifier_index(
    executor: &dyn Executor,
    target: &IdentifierColumn,
) -> Result<(), DbError> {
    let sql = identifier_index(target).build(PostgresQueryBuilder);
    executor.execute(&sql, &[])?;
    log::info!("Unique index on {}.{} is present", target.table, target.column);
    Ok(())
}

/// Counter table plus the unique index for every entity kind.
pub fn ensure_all(executor: &dyn Executor, columns: &IdentifierColumns) -> Result<(), DbError> {
    ensure_counter_table(executor, &columns.counter_table)?;
    for kind in EntityKind::ALL {
        ensure_identifier_index(executor, columns.for_kind(kind))?;
    }
    Ok(())
}
