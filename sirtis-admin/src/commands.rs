//! Command bodies, kept free of argument parsing and process exit so they
//! can be driven from tests.

use crate::error::AdminError;
use serde_json::{json, Value};
use sirtis::authz::{AuthorizationSubject, PolicyTable, Resolver, SubjectSource};
use sirtis::config::{AllocatorConfig, AllocatorStrategy, SirtisConfig};
use sirtis::sequence::{
    Allocate, AllocatedIdentifier, Clock, CounterAllocator, EntityKind, IdentifierSink,
    LatestRowAllocator, MemoryStore, PgIdentifierStore,
};
use sirtis::SirtisError;
use std::sync::Arc;

/// `--database-url`, then `DATABASE_URL`, then the loaded configuration.
pub fn database_url(flag: Option<String>, config: &SirtisConfig) -> String {
    flag.or_else(|| std::env::var("DATABASE_URL").ok())
        .unwrap_or_else(|| config.database.url.clone())
}

/// Breakdown of an identifier of either kind.
pub fn parse_report(raw: &str) -> Result<Value, SirtisError> {
    let id = AllocatedIdentifier::parse_any(raw.trim())?;
    Ok(json!({
        "identifier": id,
        "kind": id.kind,
        "year": id.year,
        "sequence": id.sequence,
    }))
}

/// `--year`, or the clock's current year.
pub fn resolve_year(year: Option<i32>, clock: &dyn Clock) -> i32 {
    year.unwrap_or_else(|| clock.current_year())
}

fn run<A: Allocate>(
    allocator: &A,
    sink: Option<&dyn IdentifierSink>,
    kind: EntityKind,
    year: Option<i32>,
) -> Result<AllocatedIdentifier, SirtisError> {
    let year = resolve_year(year, allocator.clock());
    let id = match sink {
        Some(sink) => allocator.allocate_and_record(sink, kind, year)?,
        None => allocator.allocate_next(kind, year)?,
    };
    Ok(id)
}

/// Allocate against an in-process store seeded with `existing`. Nothing
/// leaves the process.
pub fn next_id_dry_run(
    config: &AllocatorConfig,
    clock: Arc<dyn Clock>,
    kind: EntityKind,
    year: Option<i32>,
    existing: &[String],
    record: bool,
) -> Result<AllocatedIdentifier, SirtisError> {
    let store = MemoryStore::with_identifiers(existing.iter().cloned());
    let sink: Option<&dyn IdentifierSink> = if record { Some(&store) } else { None };
    match config.strategy {
        AllocatorStrategy::Counter => run(
            &CounterAllocator::new(&store)
                .with_policy(config.malformed_policy)
                .with_clock(clock),
            sink,
            kind,
            year,
        ),
        // The store's mutex stands in for the advisory lock.
        AllocatorStrategy::LatestRow | AllocatorStrategy::AdvisoryLock => run(
            &LatestRowAllocator::new(&store)
                .with_policy(config.malformed_policy)
                .with_clock(clock),
            sink,
            kind,
            year,
        ),
    }
}

pub fn next_id(
    store: &mut PgIdentifierStore,
    config: &AllocatorConfig,
    clock: Arc<dyn Clock>,
    kind: EntityKind,
    year: Option<i32>,
    record: bool,
) -> Result<AllocatedIdentifier, SirtisError> {
    if record && config.strategy == AllocatorStrategy::AdvisoryLock {
        let year = resolve_year(year, clock.as_ref());
        return Ok(store.allocate_and_record_locked(kind, year, config.malformed_policy)?);
    }

    let store = &*store;
    let sink: Option<&dyn IdentifierSink> = if record { Some(store) } else { None };
    match config.strategy {
        AllocatorStrategy::Counter => run(
            &CounterAllocator::new(store)
                .with_policy(config.malformed_policy)
                .with_clock(clock),
            sink,
            kind,
            year,
        ),
        AllocatorStrategy::LatestRow | AllocatorStrategy::AdvisoryLock => run(
            &LatestRowAllocator::new(store)
                .with_policy(config.malformed_policy)
                .with_clock(clock),
            sink,
            kind,
            year,
        ),
    }
}

pub fn check(
    resolver: &Resolver,
    source: &dyn SubjectSource,
    operation: &str,
) -> Result<AuthorizationSubject, AdminError> {
    Ok(resolver.authorize_current(source, operation)?)
}

pub fn render_policies(table: &PolicyTable) -> Result<String, AdminError> {
    table
        .to_toml_string()
        .map_err(|e| AdminError::Sirtis(SirtisError::Config(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    use sirtis::sequence::FixedClock;

    #[test]
    fn test_resolve_year_prefers_flag_over_clock() {
        let clock = FixedClock::new(2031);
        assert_eq!(resolve_year(Some(2025), &clock), 2025);
        assert_eq!(resolve_year(None, &clock), 2031);
    }

    #[test]
    fn test_database_url_prefers_flag() {
        let config = SirtisConfig::default();
        let url = database_url(Some("postgres://flag@localhost/sirtis".into()), &config);
        assert_eq!(url, "postgres://flag@localhost/sirtis");
    }
}
