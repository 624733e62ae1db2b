//! Integration tests for identifier allocation on PostgreSQL
//!
//! Test flow per case:
//! 1. Create uniquely named identifier and counter tables
//! 2. Install the counter table and unique indexes via `schema::ensure_all`
//! 3. Allocate through the Postgres store
//! 4. Drop the tables

mod common;

use common::{drop_tables, executor, unique_table, with_database};
use sirtis::schema;
use sirtis::sequence::{
    Allocate, AllocatedIdentifier, AllocationError, CounterAllocator, EntityKind,
    IdentifierColumn, IdentifierColumns, IdentifierSink, LatestRowAllocator, MalformedPolicy,
    PgIdentifierStore,
};
use sirtis::{Executor, StoreError};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

struct Fixture {
    columns: IdentifierColumns,
}

impl Fixture {
    fn create(url: &str) -> Self {
        let columns = IdentifierColumns {
            case: IdentifierColumn::new(unique_table("cases"), "case_number"),
            call: IdentifierColumn::new(unique_table("calls"), "call_number"),
            counter_table: unique_table("counters"),
        };
        let db = executor(url);
        for target in [&columns.case, &columns.call] {
            db.execute(
                &format!(
                    "CREATE TABLE \"{}\" (id SERIAL PRIMARY KEY, \"{}\" TEXT NOT NULL)",
                    target.table, target.column
                ),
                &[],
            )
            .expect("Failed to create identifier table");
        }
        schema::ensure_all(&db, &columns).expect("Failed to install schema");
        // Idempotent
        schema::ensure_all(&db, &columns).expect("Failed to re-run schema install");
        Self { columns }
    }

    fn store(&self, url: &str) -> PgIdentifierStore {
        PgIdentifierStore::with_columns(executor(url), self.columns.clone())
    }

    fn seed(&self, url: &str, target: &IdentifierColumn, raw: &str) {
        executor(url)
            .execute(
                &format!(
                    "INSERT INTO \"{}\" (\"{}\") VALUES ($1)",
                    target.table, target.column
                ),
                &[&raw],
            )
            .expect("Failed to seed identifier");
    }

    fn teardown(&self, url: &str) {
        drop_tables(
            &executor(url),
            &[
                self.columns.case.table.as_str(),
                self.columns.call.table.as_str(),
                self.columns.counter_table.as_str(),
            ],
        );
    }
}

#[test]
#[ignore = "requires TEST_DATABASE_URL or Docker"]
fn test_counter_allocator_records_sequential_identifiers() {
    with_database(|url| {
        let fixture = Fixture::create(url);
        let store = fixture.store(url);
        let allocator = CounterAllocator::new(&store);

        let ids: Vec<String> = (0..3)
            .map(|_| {
                allocator
                    .allocate_and_record(&store, EntityKind::Case, 2025)
                    .expect("Failed to allocate")
                    .to_string()
            })
            .collect();
        assert_eq!(
            ids,
            vec!["CASE-2025-00000001", "CASE-2025-00000002", "CASE-2025-00000003"]
        );

        let call = allocator
            .allocate_and_record(&store, EntityKind::Call, 2025)
            .expect("Failed to allocate call");
        assert_eq!(call.to_string(), "00000001/2025");

        fixture.teardown(url);
    });
}

#[test]
#[ignore = "requires TEST_DATABASE_URL or Docker"]
fn test_counter_continues_existing_table() {
    with_database(|url| {
        let fixture = Fixture::create(url);
        fixture.seed(url, &fixture.columns.case, "CASE-2025-00000041");
        fixture.seed(url, &fixture.columns.case, "CASE-2025-00000042");
        fixture.seed(url, &fixture.columns.case, "CASE-2024-00000900");

        let store = fixture.store(url);
        let next = CounterAllocator::new(&store)
            .allocate_next(EntityKind::Case, 2025)
            .expect("Failed to allocate");
        assert_eq!(next.to_string(), "CASE-2025-00000043");

        let legacy = LatestRowAllocator::new(&store)
            .allocate_next(EntityKind::Case, 2026)
            .expect("Failed to allocate");
        assert_eq!(legacy.to_string(), "CASE-2026-00000001");

        fixture.teardown(url);
    });
}

#[test]
#[ignore = "requires TEST_DATABASE_URL or Docker"]
fn test_malformed_latest_row_is_rejected() {
    with_database(|url| {
        let fixture = Fixture::create(url);
        fixture.seed(url, &fixture.columns.call, "ABC/2025");

        let store = fixture.store(url);
        let result = LatestRowAllocator::new(&store).allocate_next(EntityKind::Call, 2025);
        assert!(matches!(result, Err(AllocationError::MalformedIdentifier(_))));

        let restarted = LatestRowAllocator::new(&store)
            .with_policy(MalformedPolicy::Restart)
            .allocate_next(EntityKind::Call, 2025)
            .expect("Failed to allocate");
        assert_eq!(restarted.sequence, 1);

        fixture.teardown(url);
    });
}

#[test]
#[ignore = "requires TEST_DATABASE_URL or Docker"]
fn test_unique_index_reports_duplicates() {
    with_database(|url| {
        let fixture = Fixture::create(url);
        let store = fixture.store(url);
        let id = AllocatedIdentifier::new(EntityKind::Case, 2025, 7);

        store.insert_identifier(&id).expect("First insert failed");
        match store.insert_identifier(&id) {
            Err(StoreError::Duplicate(raw)) => assert_eq!(raw, "CASE-2025-00000007"),
            other => panic!("expected duplicate, got {other:?}"),
        }

        fixture.teardown(url);
    });
}

fn allocate_concurrently(
    url: &str,
    fixture: &Fixture,
    allocate: fn(&mut PgIdentifierStore) -> Result<AllocatedIdentifier, AllocationError>,
) -> Vec<String> {
    const WORKERS: usize = 4;
    const PER_WORKER: usize = 10;

    thread::scope(|s| {
        let handles: Vec<_> = (0..WORKERS)
            .map(|_| {
                s.spawn(move || {
                    let mut store = fixture.store(url);
                    (0..PER_WORKER)
                        .map(|_| allocate(&mut store).expect("Failed to allocate").to_string())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().expect("worker panicked"))
            .collect()
    })
}

fn assert_distinct(allocated: &[String]) {
    let distinct: BTreeSet<&String> = allocated.iter().collect();
    assert_eq!(distinct.len(), allocated.len(), "{allocated:?}");
}

#[test]
#[ignore = "requires TEST_DATABASE_URL or Docker"]
fn test_concurrent_counter_allocations_do_not_collide() {
    with_database(|url| {
        let fixture = Fixture::create(url);
        let allocated = allocate_concurrently(url, &fixture, |store| {
            let store = &*store;
            CounterAllocator::new(store).allocate_and_record(store, EntityKind::Case, 2025)
        });
        assert_eq!(allocated.len(), 40);
        assert_distinct(&allocated);
        fixture.teardown(url);
    });
}

#[test]
#[ignore = "requires TEST_DATABASE_URL or Docker"]
fn test_concurrent_locked_allocations_do_not_collide() {
    with_database(|url| {
        let fixture = Fixture::create(url);
        let allocated = allocate_concurrently(url, &fixture, |store| {
            store.allocate_and_record_locked(EntityKind::Call, 2025, MalformedPolicy::Reject)
        });
        assert_eq!(allocated.len(), 40);
        assert_distinct(&allocated);
        assert!(allocated.contains(&"00000040/2025".to_string()));
        fixture.teardown(url);
    });
}

#[test]
#[ignore = "requires TEST_DATABASE_URL or Docker"]
fn test_locked_allocations_through_one_shared_store() {
    const WORKERS: usize = 4;
    const PER_WORKER: usize = 10;

    with_database(|url| {
        let fixture = Fixture::create(url);
        // One connection shared by every coroutine.
        let store = Arc::new(may::sync::Mutex::new(fixture.store(url)));

        let handles: Vec<_> = (0..WORKERS)
            .map(|_| {
                let store = store.clone();
                may::go!(move || {
                    (0..PER_WORKER)
                        .map(|_| {
                            let mut store = store.lock().expect("store mutex poisoned");
                            store
                                .allocate_and_record_locked(
                                    EntityKind::Case,
                                    2025,
                                    MalformedPolicy::Reject,
                                )
                                .expect("Failed to allocate")
                                .to_string()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let allocated: Vec<String> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("worker panicked"))
            .collect();

        assert_eq!(allocated.len(), WORKERS * PER_WORKER);
        assert_distinct(&allocated);
        assert!(allocated.contains(&"CASE-2025-00000040".to_string()));
        fixture.teardown(url);
    });
}
