//! Sequential case and call numbers, scoped by calendar year.
//!
//! ```
//! use sirtis::sequence::{Allocate, CounterAllocator, EntityKind, MemoryStore};
//!
//! let allocator = CounterAllocator::new(MemoryStore::new());
//! let first = allocator.allocate_next(EntityKind::Case, 2025).unwrap();
//! let second = allocator.allocate_next(EntityKind::Case, 2025).unwrap();
//! assert_eq!(first.to_string(), "CASE-2025-00000001");
//! assert_eq!(second.to_string(), "CASE-2025-00000002");
//! ```

mod allocator;
mod clock;
mod identifier;
mod kind;
mod memory;
pub mod postgres;
mod store;

pub use allocator::{
    floor_from_latest, next_sequence, Allocate, AllocationError, CounterAllocator,
    LatestRowAllocator, MalformedPolicy, MAX_RECORD_ATTEMPTS,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use identifier::{AllocatedIdentifier, MalformedIdentifier, SEQUENCE_WIDTH};
pub use kind::{EntityKind, SequenceScope};
pub use memory::MemoryStore;
pub use postgres::{IdentifierColumn, IdentifierColumns, PgIdentifierStore};
pub use store::{IdentifierLookup, IdentifierSink, SequenceCounter};
