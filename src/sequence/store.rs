//! Storage seams the allocators run against.

use super::identifier::AllocatedIdentifier;
use super::kind::SequenceScope;
use crate::error::StoreError;
use std::sync::Arc;

/// Read side: the highest identifier recorded in a scope.
pub trait IdentifierLookup {
    /// Identifiers compared as strings, descending. Zero padding makes this
    /// the numeric maximum for well-formed rows.
    fn latest_identifier(&self, scope: &SequenceScope) -> Result<Option<String>, StoreError>;
}

/// Write side: persist a freshly allocated identifier.
pub trait IdentifierSink {
    /// Fails with [`StoreError::Duplicate`] when the identifier is already
    /// present.
    fn insert_identifier(&self, identifier: &AllocatedIdentifier) -> Result<(), StoreError>;
}

/// Atomic per-scope counter.
pub trait SequenceCounter {
    /// Set the scope's counter to `max(current, floor) + 1` and return it,
    /// as one atomic step.
    fn increment(&self, scope: &SequenceScope, floor: u64) -> Result<u64, StoreError>;
}

macro_rules! forward_store_traits {
    ($($wrapper:ty),*) => {$(
        impl<T: IdentifierLookup + ?Sized> IdentifierLookup for $wrapper {
            fn latest_identifier(&self, scope: &SequenceScope) -> Result<Option<String>, StoreError> {
                (**self).latest_identifier(scope)
            }
        }

        impl<T: IdentifierSink + ?Sized> IdentifierSink for $wrapper {
            fn insert_identifier(&self, identifier: &AllocatedIdentifier) -> Result<(), StoreError> {
                (**self).insert_identifier(identifier)
            }
        }

        impl<T: SequenceCounter + ?Sized> SequenceCounter for $wrapper {
            fn increment(&self, scope: &SequenceScope, floor: u64) -> Result<u64, StoreError> {
                (**self).increment(scope, floor)
            }
        }
    )*};
}

forward_store_traits!(&T, Arc<T>, Box<T>);
