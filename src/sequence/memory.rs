use super::identifier::AllocatedIdentifier;
use super::kind::SequenceScope;
use super::store::{IdentifierLookup, IdentifierSink, SequenceCounter};
use crate::error::StoreError;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Inner {
    identifiers: BTreeSet<String>,
    counters: HashMap<SequenceScope, u64>,
}

/// In-process identifier store.
///
/// Holds recorded identifiers and per-scope counters behind one mutex, so
/// every operation is atomic with respect to the others.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with raw identifiers, malformed ones included.
    pub fn with_identifiers<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        if let Ok(mut inner) = store.inner.lock() {
            inner
                .identifiers
                .extend(identifiers.into_iter().map(Into::into));
        }
        store
    }

    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.identifiers.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, raw: &str) -> bool {
        self.lock()
            .map(|inner| inner.identifiers.contains(raw))
            .unwrap_or(false)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store mutex poisoned".to_string()))
    }
}

impl IdentifierLookup for MemoryStore {
    fn latest_identifier(&self, scope: &SequenceScope) -> Result<Option<String>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .identifiers
            .iter()
            .rev()
            .find(|raw| scope.matches(raw))
            .cloned())
    }
}

impl IdentifierSink for MemoryStore {
    fn insert_identifier(&self, identifier: &AllocatedIdentifier) -> Result<(), StoreError> {
        let raw = identifier.to_string();
        let mut inner = self.lock()?;
        if !inner.identifiers.insert(raw.clone()) {
            return Err(StoreError::Duplicate(raw));
        }
        Ok(())
    }
}

impl SequenceCounter for MemoryStore {
    fn increment(&self, scope: &SequenceScope, floor: u64) -> Result<u64, StoreError> {
        let mut inner = self.lock()?;
        let value = inner.counters.entry(*scope).or_insert(0);
        *value = (*value)
            .max(floor)
            .checked_add(1)
            .ok_or_else(|| StoreError::Unavailable(format!("counter for {scope} exhausted")))?;
        Ok(*value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::EntityKind;

    #[test]
    fn test_latest_identifier_is_string_maximum_in_scope() {
        let store = MemoryStore::with_identifiers([
            "CASE-2025-00000002",
            "CASE-2025-00000010",
            "CASE-2026-00000001",
            "00000099/2025",
        ]);
        let scope = SequenceScope::new(EntityKind::Case, 2025);
        assert_eq!(
            store.latest_identifier(&scope).unwrap().as_deref(),
            Some("CASE-2025-00000010")
        );

        let calls = SequenceScope::new(EntityKind::Call, 2025);
        assert_eq!(
            store.latest_identifier(&calls).unwrap().as_deref(),
            Some("00000099/2025")
        );
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let store = MemoryStore::new();
        let id = AllocatedIdentifier::new(EntityKind::Call, 2025, 1);
        store.insert_identifier(&id).unwrap();
        assert!(matches!(
            store.insert_identifier(&id),
            Err(StoreError::Duplicate(raw)) if raw == "00000001/2025"
        ));
    }

    #[test]
    fn test_counter_respects_floor() {
        let store = MemoryStore::new();
        let scope = SequenceScope::new(EntityKind::Case, 2025);
        assert_eq!(store.increment(&scope, 0).unwrap(), 1);
        assert_eq!(store.increment(&scope, 0).unwrap(), 2);
        assert_eq!(store.increment(&scope, 40).unwrap(), 41);
        assert_eq!(store.increment(&scope, 3).unwrap(), 42);

        let other = SequenceScope::new(EntityKind::Case, 2026);
        assert_eq!(store.increment(&other, 0).unwrap(), 1);
    }

    #[test]
    fn test_counter_refuses_to_wrap() {
        let store = MemoryStore::new();
        let scope = SequenceScope::new(EntityKind::Call, 2025);
        assert!(matches!(
            store.increment(&scope, u64::MAX),
            Err(StoreError::Unavailable(_))
        ));
        assert_eq!(store.increment(&scope, 0).unwrap(), 1);
    }
}
