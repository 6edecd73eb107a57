//! Set, map and multimap collections with a compile-time choice of locking.
//!
//! # Overview
//! Every container in `lockcoll` takes a [`LockMode`] type parameter:
//! - [`Guarded`]: each operation goes through a reader/writer lock. Mutations
//!   are exclusive and reads are shared. The container is `Sync`.
//! - [`Unguarded`] (the default): no synchronization. The container is not
//!   `Sync`, so the compiler rejects sharing it between threads.
//!
//! Both modes expose the same methods, and the mode cannot change after
//! construction other than by consuming the container with `into_mode`.
//!
//! # Features
//! - [`ConcurrentSet`] with union, intersection and difference
//! - [`ConcurrentMap`] with default values for absent keys
//! - [`ConcurrentMultiMap`] mapping each key to a set of values
//! - Snapshot accessors (`values`, `keys`) that return detached copies
//! - Iterators that hold the read scope and release it on `stop` or drop
//! - Hand-off iteration from a producer thread for guarded maps
//! - No poisoning, the lock is released normally on panic
//!
//! # Examples
//! ```
//! use lockcoll::{ConcurrentSet, GuardedMap, GuardedSet};
//! use std::sync::Arc;
//!
//! let set = GuardedSet::from_values([1, 2, 3]);
//! let other = ConcurrentSet::<i32>::from_values([3, 4]);
//! assert_eq!(set.union(&other).len(), 4);
//! assert_eq!(set.difference(&other).len(), 2);
//!
//! let map = Arc::new(GuardedMap::<String, u32>::new());
//! let writer = {
//!     let map = map.clone();
//!     std::thread::spawn(move || map.set("key".into(), 42))
//! };
//! writer.join().unwrap();
//! assert_eq!(map.value("key"), 42);
//! assert_eq!(map.value("missing"), 0);
//! ```
mod iter;
mod map;
mod mode;
mod multimap;
mod rwlock;
mod set;

#[cfg(test)]
mod proptests;

pub use iter::Handoff;
pub use map::{ConcurrentMap, GuardedMap, Iter as MapIter};
pub use mode::{Guarded, LockMode, RwCell, Unguarded};
pub use multimap::{ConcurrentMultiMap, GuardedMultiMap, Iter as MultiMapIter};
pub use rwlock::{RawRwLock, RwLock, RwLockReadGuard, RwLockWriteGuard};
pub use set::{ConcurrentSet, GuardedSet};
