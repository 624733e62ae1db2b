//! Case and call number allocation.
//!
//! Two strategies share one parsing/formatting core:
//!
//! - [`LatestRowAllocator`] reads the highest stored identifier in the scope
//!   and adds one. On its own this is a read-then-write: two concurrent
//!   callers can compute the same number. [`Allocate::allocate_and_record`]
//!   turns that race into a detected [`StoreError::Duplicate`] (the store
//!   enforces uniqueness) and retries.
//! - [`CounterAllocator`] bumps an atomic per-scope counter, seeded from the
//!   highest stored identifier, so concurrent callers always get distinct
//!   numbers.

use super::clock::{Clock, SystemClock};
use super::identifier::{AllocatedIdentifier, MalformedIdentifier};
use super::kind::{EntityKind, SequenceScope};
use super::store::{IdentifierLookup, IdentifierSink, SequenceCounter};
use crate::error::StoreError;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Attempts `allocate_and_record` makes before giving up on a contended scope.
pub const MAX_RECORD_ATTEMPTS: u32 = 3;

/// What to do when the highest stored identifier cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    /// Restart the scope at sequence 1. Can reissue a number that already
    /// exists further down the table.
    Restart,
    /// Fail with [`AllocationError::MalformedIdentifier`].
    #[default]
    Reject,
}

/// Allocation error type
#[derive(Debug)]
pub enum AllocationError {
    /// Backing lookup, counter or insert failed
    StorageUnavailable(StoreError),
    /// Highest stored identifier is unreadable and the policy is `Reject`
    MalformedIdentifier(MalformedIdentifier),
    /// Every attempt to record collided with an existing identifier
    DuplicateIdentifier(String),
    /// The scope's highest sequence is already `u64::MAX`
    SequenceExhausted(SequenceScope),
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationError::StorageUnavailable(e) => write!(f, "{e}"),
            AllocationError::MalformedIdentifier(e) => write!(f, "{e}"),
            AllocationError::DuplicateIdentifier(id) => {
                write!(f, "identifier already recorded: {id}")
            }
            AllocationError::SequenceExhausted(scope) => {
                write!(f, "no sequence numbers left in {scope}")
            }
        }
    }
}

impl std::error::Error for AllocationError {}

impl From<StoreError> for AllocationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(id) => AllocationError::DuplicateIdentifier(id),
            other => {
                log::error!("Identifier storage failed: {other}");
                AllocationError::StorageUnavailable(other)
            }
        }
    }
}

impl From<MalformedIdentifier> for AllocationError {
    fn from(err: MalformedIdentifier) -> Self {
        AllocationError::MalformedIdentifier(err)
    }
}

/// Highest sequence already used in `scope`, given the latest stored row.
///
/// Rows from another year never match the scope's lookup, so a new year
/// starts from zero.
pub fn floor_from_latest(
    scope: &SequenceScope,
    latest: Option<&str>,
    policy: MalformedPolicy,
) -> Result<u64, MalformedIdentifier> {
    let Some(raw) = latest else {
        return Ok(0);
    };
    match AllocatedIdentifier::parse(scope.kind, raw) {
        Ok(id) if id.year == scope.year => Ok(id.sequence),
        Ok(_) | Err(_) => {
            let err = MalformedIdentifier {
                kind: scope.kind,
                raw: raw.to_string(),
            };
            match policy {
                MalformedPolicy::Restart => {
                    log::warn!("{err} in scope {scope}; restarting sequence at 1");
                    Ok(0)
                }
                MalformedPolicy::Reject => Err(err),
            }
        }
    }
}

/// Sequence that follows `floor` in `scope`.
pub fn next_sequence(scope: &SequenceScope, floor: u64) -> Result<u64, AllocationError> {
    floor
        .checked_add(1)
        .ok_or(AllocationError::SequenceExhausted(*scope))
}

/// Common surface of both strategies.
pub trait Allocate {
    fn clock(&self) -> &dyn Clock;

    /// Next identifier for `kind` in `year`. Does not persist it.
    fn allocate_next(
        &self,
        kind: EntityKind,
        year: i32,
    ) -> Result<AllocatedIdentifier, AllocationError>;

    /// Next identifier for `kind` in the clock's current year.
    fn allocate_now(&self, kind: EntityKind) -> Result<AllocatedIdentifier, AllocationError> {
        let year = self.clock().current_year();
        self.allocate_next(kind, year)
    }

    /// Allocate and persist, retrying when another writer took the number
    /// first.
    fn allocate_and_record(
        &self,
        sink: &dyn IdentifierSink,
        kind: EntityKind,
        year: i32,
    ) -> Result<AllocatedIdentifier, AllocationError> {
        let mut last_duplicate = None;
        for attempt in 1..=MAX_RECORD_ATTEMPTS {
            let identifier = self.allocate_next(kind, year)?;
            match sink.insert_identifier(&identifier) {
                Ok(()) => return Ok(identifier),
                Err(StoreError::Duplicate(raw)) => {
                    log::warn!(
                        "Identifier {raw} taken concurrently (attempt {attempt}/{MAX_RECORD_ATTEMPTS})"
                    );
                    last_duplicate = Some(raw);
                }
                Err(other) => return Err(other.into()),
            }
        }
        Err(AllocationError::DuplicateIdentifier(
            last_duplicate.unwrap_or_default(),
        ))
    }
}

fn finish(
    scope: SequenceScope,
    sequence: u64,
    strategy: &'static str,
) -> AllocatedIdentifier {
    let identifier = AllocatedIdentifier::new(scope.kind, scope.year, sequence);
    log::debug!("Allocated {identifier} ({strategy})");
    #[cfg(feature = "metrics")]
    METRICS.record_allocation(scope.kind, strategy);
    identifier
}

/// Legacy strategy: highest stored identifier plus one.
pub struct LatestRowAllocator<S> {
    store: S,
    policy: MalformedPolicy,
    clock: Arc<dyn Clock>,
}

impl<S: IdentifierLookup> LatestRowAllocator<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            policy: MalformedPolicy::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_policy(mut self, policy: MalformedPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: IdentifierLookup> Allocate for LatestRowAllocator<S> {
    fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    fn allocate_next(
        &self,
        kind: EntityKind,
        year: i32,
    ) -> Result<AllocatedIdentifier, AllocationError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::allocate_span(kind.as_str(), year).entered();

        let scope = SequenceScope::new(kind, year);
        let latest = self.store.latest_identifier(&scope)?;
        let floor = floor_from_latest(&scope, latest.as_deref(), self.policy)?;
        Ok(finish(scope, next_sequence(&scope, floor)?, "latest_row"))
    }
}

/// Hardened strategy: atomic per-scope counter.
pub struct CounterAllocator<S> {
    store: S,
    policy: MalformedPolicy,
    clock: Arc<dyn Clock>,
}

impl<S: IdentifierLookup + SequenceCounter> CounterAllocator<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            policy: MalformedPolicy::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_policy(mut self, policy: MalformedPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: IdentifierLookup + SequenceCounter> Allocate for CounterAllocator<S> {
    fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    fn allocate_next(
        &self,
        kind: EntityKind,
        year: i32,
    ) -> Result<AllocatedIdentifier, AllocationError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::allocate_span(kind.as_str(), year).entered();

        let scope = SequenceScope::new(kind, year);
        // The floor only has to be a lower bound; the counter itself
        // serializes concurrent callers.
        let latest = self.store.latest_identifier(&scope)?;
        let floor = floor_from_latest(&scope, latest.as_deref(), self.policy)?;
        next_sequence(&scope, floor)?;
        let sequence = self.store.increment(&scope, floor)?;
        Ok(finish(scope, sequence, "counter"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::{FixedClock, MemoryStore};

    struct FailingStore;

    impl IdentifierLookup for FailingStore {
        fn latest_identifier(&self, _: &SequenceScope) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    impl SequenceCounter for FailingStore {
        fn increment(&self, _: &SequenceScope, _: u64) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    #[test]
    fn test_floor_from_latest() {
        let scope = SequenceScope::new(EntityKind::Case, 2025);
        assert_eq!(floor_from_latest(&scope, None, MalformedPolicy::Reject), Ok(0));
        assert_eq!(
            floor_from_latest(&scope, Some("CASE-2025-00000041"), MalformedPolicy::Reject),
            Ok(41)
        );
        assert_eq!(
            floor_from_latest(&scope, Some("CASE-2025-BAD"), MalformedPolicy::Restart),
            Ok(0)
        );
        assert!(floor_from_latest(&scope, Some("CASE-2025-BAD"), MalformedPolicy::Reject).is_err());
    }

    #[test]
    fn test_highest_possible_sequence_is_not_wrapped() {
        let store = MemoryStore::with_identifiers(["CASE-2025-18446744073709551615"]);

        let allocator = LatestRowAllocator::new(&store);
        assert!(matches!(
            allocator.allocate_next(EntityKind::Case, 2025),
            Err(AllocationError::SequenceExhausted(scope))
                if scope == SequenceScope::new(EntityKind::Case, 2025)
        ));

        let allocator = CounterAllocator::new(&store);
        assert!(matches!(
            allocator.allocate_next(EntityKind::Case, 2025),
            Err(AllocationError::SequenceExhausted(_))
        ));

        // Other years are unaffected.
        let id = allocator.allocate_next(EntityKind::Case, 2026).unwrap();
        assert_eq!(id.sequence, 1);
    }

    #[test]
    fn test_first_allocation_starts_at_one() {
        let allocator = LatestRowAllocator::new(MemoryStore::new());
        let id = allocator.allocate_next(EntityKind::Case, 2025).unwrap();
        assert_eq!(id.to_string(), "CASE-2025-00000001");
    }

    #[test]
    fn test_latest_row_does_not_persist() {
        let allocator = LatestRowAllocator::new(MemoryStore::new());
        let a = allocator.allocate_next(EntityKind::Call, 2025).unwrap();
        let b = allocator.allocate_next(EntityKind::Call, 2025).unwrap();
        assert_eq!(a, b);
        assert!(allocator.store().is_empty());
    }

    #[test]
    fn test_storage_failure_yields_no_identifier() {
        let allocator = LatestRowAllocator::new(FailingStore);
        assert!(matches!(
            allocator.allocate_next(EntityKind::Case, 2025),
            Err(AllocationError::StorageUnavailable(_))
        ));

        let allocator = CounterAllocator::new(FailingStore);
        assert!(matches!(
            allocator.allocate_next(EntityKind::Call, 2025),
            Err(AllocationError::StorageUnavailable(_))
        ));
    }

    #[test]
    fn test_allocate_now_uses_clock() {
        let clock = Arc::new(FixedClock::new(2031));
        let allocator = CounterAllocator::new(MemoryStore::new()).with_clock(clock);
        let id = allocator.allocate_now(EntityKind::Call).unwrap();
        assert_eq!(id.to_string(), "00000001/2031");
    }

    #[test]
    fn test_counter_continues_existing_table() {
        let store = MemoryStore::with_identifiers(["CASE-2025-00000017"]);
        let allocator = CounterAllocator::new(store);
        let id = allocator.allocate_next(EntityKind::Case, 2025).unwrap();
        assert_eq!(id.sequence, 18);
        let id = allocator.allocate_next(EntityKind::Case, 2025).unwrap();
        assert_eq!(id.sequence, 19);
    }

    #[test]
    fn test_allocate_and_record_retries_after_duplicate() {
        // Counter is behind the table: the first candidate collides with a
        // row written by another process after the floor was read.
        struct StaleLookup(MemoryStore);

        impl IdentifierLookup for StaleLookup {
            fn latest_identifier(&self, _: &SequenceScope) -> Result<Option<String>, StoreError> {
                Ok(None)
            }
        }

        impl SequenceCounter for StaleLookup {
            fn increment(&self, scope: &SequenceScope, floor: u64) -> Result<u64, StoreError> {
                self.0.increment(scope, floor)
            }
        }

        let sink = MemoryStore::with_identifiers(["00000001/2025"]);
        let allocator = CounterAllocator::new(StaleLookup(MemoryStore::new()));
        let id = allocator
            .allocate_and_record(&sink, EntityKind::Call, 2025)
            .unwrap();
        assert_eq!(id.to_string(), "00000002/2025");
        assert!(sink.contains("00000002/2025"));
    }

    #[test]
    fn test_allocate_and_record_gives_up() {
        let store = MemoryStore::with_identifiers(["CASE-2025-00000001"]);
        // Lookup always sees an empty table, so every attempt collides.
        struct Blind;
        impl IdentifierLookup for Blind {
            fn latest_identifier(&self, _: &SequenceScope) -> Result<Option<String>, StoreError> {
                Ok(None)
            }
        }
        let allocator = LatestRowAllocator::new(Blind);
        assert!(matches!(
            allocator.allocate_and_record(&store, EntityKind::Case, 2025),
            Err(AllocationError::DuplicateIdentifier(raw)) if raw == "CASE-2025-00000001"
        ));
    }
}
