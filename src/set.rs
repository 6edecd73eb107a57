use crate::mode::{LockMode, RwCell, Storage};
use crate::{Guarded, Unguarded};
use foldhash::fast::RandomState;
use std::borrow::Borrow;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;

type Members<T> = HashSet<T, RandomState>;

/// A set whose lock mode is fixed by `M` at construction.
///
/// With [`Guarded`], mutations take the exclusive lock and reads take the
/// shared lock. With [`Unguarded`], nothing is locked and the set cannot be
/// shared between threads.
///
/// # Examples
/// ```
/// use lockcoll::{ConcurrentSet, GuardedSet};
///
/// let set = ConcurrentSet::<u32>::from_values([1, 2, 3]);
/// set.add([4]);
/// assert_eq!(set.len(), 4);
/// assert!(set.contains(&[1, 2, 3, 4]));
/// set.remove(&[1]);
/// assert!(!set.exists(&1));
///
/// let other = GuardedSet::from_values([3, 4, 5]);
/// assert_eq!(set.intersect(&other).len(), 2);
/// ```
pub struct ConcurrentSet<T, M: LockMode = Unguarded> {
    members: Storage<M, Members<T>>,
}

/// A set guarded by a reader/writer lock.
pub type GuardedSet<T> = ConcurrentSet<T, Guarded>;

impl<T: Eq + Hash, M: LockMode> Default for ConcurrentSet<T, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash, M: LockMode> ConcurrentSet<T, M> {
    /// Creates an empty set.
    ///
    /// # Returns
    ///
    /// A new `ConcurrentSet` in lock mode `M`.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty set with room for at least `capacity` members.
    ///
    /// # Arguments
    ///
    /// * `capacity` - The initial capacity of the underlying table.
    ///
    /// # Returns
    ///
    /// A new `ConcurrentSet` in lock mode `M`.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            members: RwCell::new(HashSet::with_capacity_and_hasher(
                capacity,
                RandomState::default(),
            )),
        }
    }

    /// Creates a set holding the given initial values.
    pub fn from_values<I: IntoIterator<Item = T>>(values: I) -> Self {
        let set = Self::new();
        set.add(values);
        set
    }

    /// Returns whether operations on this set are serialized through a lock.
    pub fn is_guarded(&self) -> bool {
        M::GUARDED
    }

    /// Inserts each value. Values already present are left as they are.
    ///
    /// **Locking behaviour:** `values` is consumed while the exclusive lock is
    /// held, so it must not read from this set.
    pub fn add<I: IntoIterator<Item = T>>(&self, values: I) {
        self.members.write().extend(values);
    }

    /// Removes each value; values not in the set are ignored.
    pub fn remove<'q, Q, I>(&self, values: I)
    where
        I: IntoIterator<Item = &'q Q>,
        T: Borrow<Q>,
        Q: Eq + Hash + ?Sized + 'q,
    {
        let mut members = self.members.write();
        for value in values {
            members.remove(value);
        }
    }

    /// Removes every member.
    pub fn remove_all(&self) {
        self.members.write().clear();
    }

    /// Checks whether a single value is in the set.
    ///
    /// # Arguments
    ///
    /// * `value` - The value to look up, or any borrowed form of it.
    ///
    /// # Returns
    ///
    /// `true` if the value is a member.
    pub fn exists<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.members.read().contains(value)
    }

    /// Returns true if every given value is in the set, and for no values at all.
    pub fn contains<'q, Q, I>(&self, values: I) -> bool
    where
        I: IntoIterator<Item = &'q Q>,
        T: Borrow<Q>,
        Q: Eq + Hash + ?Sized + 'q,
    {
        let members = self.members.read();
        values.into_iter().all(|value| members.contains(value))
    }

    /// Returns the number of members.
    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    /// Returns `true` if the set has no members.
    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }

    /// Converts the set into the other lock mode, keeping its contents.
    pub fn into_mode<N: LockMode>(self) -> ConcurrentSet<T, N> {
        ConcurrentSet {
            members: RwCell::new(self.members.into_inner()),
        }
    }
}

impl<T: Eq + Hash + Clone, M: LockMode> ConcurrentSet<T, M> {
    /// A detached snapshot of the members, in no particular order.
    pub fn values(&self) -> Vec<T> {
        self.members.read().iter().cloned().collect()
    }

    /// Elements present in both `self` and `other`.
    ///
    /// `other` is read through [`values`](Self::values) before this set's
    /// read lock is taken, so two locks are never held at once.
    pub fn intersect<N: LockMode>(&self, other: &ConcurrentSet<T, N>) -> ConcurrentSet<T> {
        let theirs = other.values();
        let ours = self.members.read();
        let result: ConcurrentSet<T> = ConcurrentSet::with_capacity(ours.len().min(theirs.len()));
        result.add(theirs.into_iter().filter(|value| ours.contains(value)));
        result
    }

    /// Elements present in either `self` or `other`.
    pub fn union<N: LockMode>(&self, other: &ConcurrentSet<T, N>) -> ConcurrentSet<T> {
        let theirs = other.values();
        let ours = self.members.read();
        let result: ConcurrentSet<T> = ConcurrentSet::with_capacity(ours.len() + theirs.len());
        result.add(ours.iter().cloned());
        result.add(theirs);
        result
    }

    /// Elements of `self` that are not in `other`.
    pub fn difference<N: LockMode>(&self, other: &ConcurrentSet<T, N>) -> ConcurrentSet<T> {
        let theirs: Members<T> = other.values().into_iter().collect();
        let ours = self.members.read();
        let result: ConcurrentSet<T> = ConcurrentSet::new();
        result.add(ours.difference(&theirs).cloned());
        result
    }
}

impl<T: Eq + Hash, M: LockMode> FromIterator<T> for ConcurrentSet<T, M> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_values(iter)
    }
}

impl<T: Eq + Hash, M: LockMode> Extend<T> for ConcurrentSet<T, M> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.add(iter);
    }
}

impl<T: fmt::Debug, M: LockMode> fmt::Debug for ConcurrentSet<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.members.read().iter()).finish()
    }
}
