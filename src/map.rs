use crate::iter::{produce, Cursor, Handoff};
use crate::mode::{LockMode, RwCell, Storage};
use crate::{Guarded, Unguarded};
use foldhash::fast::RandomState;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

type Table<K, V> = HashMap<K, V, RandomState>;

/// A key/value map whose lock mode is fixed by `M` at construction.
///
/// Absent keys never raise an error: [`value`](Self::value) returns
/// `V::default()` and [`get`](Self::get) returns `None`.
///
/// # Examples
/// ```
/// use lockcoll::GuardedMap;
///
/// let map = GuardedMap::<String, u32>::new();
/// map.set("a".into(), 1);
/// assert_eq!(map.value("a"), 1);
/// assert!(map.exists("a"));
/// map.remove("a");
/// assert!(!map.exists("a"));
/// assert_eq!(map.value("a"), 0);
/// ```
pub struct ConcurrentMap<K, V, M: LockMode = Unguarded> {
    entries: Storage<M, Table<K, V>>,
}

/// A map guarded by a reader/writer lock.
pub type GuardedMap<K, V> = ConcurrentMap<K, V, Guarded>;

impl<K: Eq + Hash, V, M: LockMode> Default for ConcurrentMap<K, V, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash, V, M: LockMode> ConcurrentMap<K, V, M> {
    /// Creates an empty map.
    ///
    /// # Returns
    ///
    /// A new `ConcurrentMap` in lock mode `M`.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty map with room for at least `capacity` entries.
    ///
    /// # Arguments
    ///
    /// * `capacity` - The initial capacity of the underlying table.
    ///
    /// # Returns
    ///
    /// A new `ConcurrentMap` in lock mode `M`.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwCell::new(HashMap::with_capacity_and_hasher(
                capacity,
                RandomState::default(),
            )),
        }
    }

    /// Returns whether operations on this map are serialized through a lock.
    pub fn is_guarded(&self) -> bool {
        M::GUARDED
    }

    /// Sets the value for `key`, replacing any previous value.
    pub fn set(&self, key: K, value: V) {
        self.entries.write().insert(key, value);
    }

    /// Removes `key` and its value. Removing an absent key does nothing.
    ///
    /// # Arguments
    ///
    /// * `key` - The key to remove, or any borrowed form of it.
    pub fn remove<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.write().remove(key);
    }

    /// Removes every entry.
    pub fn remove_all(&self) {
        self.entries.write().clear();
    }

    /// Checks whether `key` has a value.
    ///
    /// # Arguments
    ///
    /// * `key` - The key to look up, or any borrowed form of it.
    ///
    /// # Returns
    ///
    /// `true` if the key is present.
    pub fn exists<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.read().contains_key(key)
    }

    /// Returns true if every given key is present, and for no keys at all.
    pub fn contains<'q, Q, I>(&self, keys: I) -> bool
    where
        I: IntoIterator<Item = &'q Q>,
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized + 'q,
    {
        let entries = self.entries.read();
        keys.into_iter().all(|key| entries.contains_key(key))
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Returns the value for `key`, or `V::default()` if it is absent.
    pub fn value<Q>(&self, key: &Q) -> V
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
        V: Clone + Default,
    {
        self.get(key).unwrap_or_default()
    }

    /// Gets a clone of the value associated with `key`.
    ///
    /// # Arguments
    ///
    /// * `key` - The key to look up, or any borrowed form of it.
    ///
    /// # Returns
    ///
    /// * `Some(V)` if the key is present.
    /// * `None` if it is absent.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
        V: Clone,
    {
        self.entries.read().get(key).cloned()
    }

    /// A detached snapshot of the keys, in no particular order.
    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.entries.read().keys().cloned().collect()
    }

    /// A detached snapshot of the values, in no particular order.
    pub fn values(&self) -> Vec<V>
    where
        V: Clone,
    {
        self.entries.read().values().cloned().collect()
    }

    /// Iterates over clones of all `(key, value)` pairs.
    ///
    /// The read scope is taken here and held until the iterator is stopped,
    /// dropped or exhausted. Breaking out of a loop early releases it.
    ///
    /// **Locking behaviour:** While the iterator is alive, any operation on
    /// this map from the iterating thread may deadlock (guarded) and any write
    /// from it panics (unguarded). A guarded read deadlocks too once another
    /// thread's writer is queued, since queued writers block new readers. Call
    /// [`Iter::stop`] first.
    ///
    /// # Examples
    /// ```
    /// use lockcoll::GuardedMap;
    ///
    /// let map = GuardedMap::<u32, u32>::new();
    /// map.set(1, 10);
    /// map.set(2, 20);
    /// for (key, value) in map.iter() {
    ///     assert_eq!(value, key * 10);
    ///     break;
    /// }
    /// map.set(3, 30); // the abandoned iterator no longer holds the lock
    /// ```
    pub fn iter(&self) -> Iter<'_, K, V, M> {
        Iter {
            cursor: Cursor::new(&self.entries, |entries| entries),
        }
    }

    /// Converts the map into the other lock mode, keeping its contents.
    pub fn into_mode<N: LockMode>(self) -> ConcurrentMap<K, V, N> {
        ConcurrentMap {
            entries: RwCell::new(self.entries.into_inner()),
        }
    }
}

impl<K, V> ConcurrentMap<K, V, Guarded>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Iterates through a producer thread that holds the read lock and hands
    /// pairs over one at a time.
    ///
    /// The producer releases the lock before the sequence ends. Call
    /// [`Handoff::stop`] or drop the `Handoff` to end it early.
    ///
    /// **Locking behaviour:** Deadlock if the consuming thread performs any
    /// operation on this map before the hand-off is exhausted or stopped. A
    /// read only deadlocks once another thread's writer is queued, but that
    /// cannot be ruled out.
    pub fn handoff(self: &Arc<Self>) -> Handoff<(K, V)> {
        let map = Arc::clone(self);
        Handoff::spawn(move |sender| {
            let entries = map.entries.read();
            produce(&*entries, sender, |key, value| (key.clone(), value.clone()));
        })
    }
}

/// Iterator returned by [`ConcurrentMap::iter`].
pub struct Iter<'a, K, V, M: LockMode> {
    cursor: Cursor<'a, Table<K, V>, K, V, M>,
}

impl<K, V, M: LockMode> Iter<'_, K, V, M> {
    /// Ends the iteration now and releases the read scope.
    pub fn stop(&mut self) {
        self.cursor.stop();
    }

    /// Returns `true` once the read scope has been released.
    pub fn is_stopped(&self) -> bool {
        self.cursor.is_stopped()
    }
}

impl<K: Clone, V: Clone, M: LockMode> Iterator for Iter<'_, K, V, M> {
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        let item = self
            .cursor
            .next_with(|key, value| (key.clone(), value.clone()));
        if item.is_none() {
            self.cursor.stop();
        }
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.cursor.remaining();
        (remaining, Some(remaining))
    }
}

impl<K: Eq + Hash, V, M: LockMode> FromIterator<(K, V)> for ConcurrentMap<K, V, M> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let map = Self::new();
        map.entries.write().extend(iter);
        map
    }
}

impl<K: Eq + Hash, V, M: LockMode> Extend<(K, V)> for ConcurrentMap<K, V, M> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.entries.write().extend(iter);
    }
}

impl<K: fmt::Debug, V: fmt::Debug, M: LockMode> fmt::Debug for ConcurrentMap<K, V, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.read().iter()).finish()
    }
}
