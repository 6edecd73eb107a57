use crate::iter::{produce, Cursor, Handoff};
use crate::mode::{LockMode, RwCell, Storage};
use crate::{Guarded, Unguarded};
use foldhash::fast::RandomState;
use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

type Values<V> = HashSet<V, RandomState>;

/// The locked state of a multimap.
///
/// `len` counts `(key, value)` pairs and is only changed under the same
/// write guard as the table mutation it accompanies.
struct State<K, V> {
    table: HashMap<K, Values<V>, RandomState>,
    len: usize,
}

/// A map from each key to a set of values, whose lock mode is fixed by `M`.
///
/// A key is present only while it has at least one value.
///
/// # Examples
/// ```
/// use lockcoll::GuardedMultiMap;
///
/// let map = GuardedMultiMap::<&str, &str>::new();
/// assert!(map.set("k", "v1"));
/// assert!(!map.set("k", "v1"));
/// assert!(map.set("k", "v2"));
/// assert_eq!(map.exists("k"), 2);
/// assert_eq!(map.len(), 2);
/// assert!(map.remove("k"));
/// assert_eq!(map.len(), 0);
/// ```
pub struct ConcurrentMultiMap<K, V, M: LockMode = Unguarded> {
    state: Storage<M, State<K, V>>,
}

/// A multimap guarded by a reader/writer lock.
pub type GuardedMultiMap<K, V> = ConcurrentMultiMap<K, V, Guarded>;

impl<K: Eq + Hash, V: Eq + Hash, M: LockMode> Default for ConcurrentMultiMap<K, V, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash, V: Eq + Hash, M: LockMode> ConcurrentMultiMap<K, V, M> {
    /// Creates an empty multimap.
    ///
    /// # Returns
    ///
    /// A new `ConcurrentMultiMap` in lock mode `M`.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates a multimap with room for `capacity` keys.
    ///
    /// # Arguments
    ///
    /// * `capacity` - The initial number of keys the table can hold.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: RwCell::new(State {
                table: HashMap::with_capacity_and_hasher(capacity, RandomState::default()),
                len: 0,
            }),
        }
    }

    /// Returns whether operations on this multimap are serialized through a lock.
    pub fn is_guarded(&self) -> bool {
        M::GUARDED
    }

    /// Adds `value` under `key`. Returns false if the pair was already present.
    pub fn set(&self, key: K, value: V) -> bool {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let added = state.table.entry(key).or_default().insert(value);
        if added {
            state.len += 1;
        }
        added
    }

    /// Removes `key` with all its values. Returns whether the key existed.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let mut state = self.state.write();
        match state.table.remove(key) {
            Some(values) => {
                state.len -= values.len();
                true
            }
            None => false,
        }
    }

    /// Removes a single pair, dropping `key` once it has no values left.
    /// Returns whether the pair existed.
    pub fn remove_value<Q, R>(&self, key: &Q, value: &R) -> bool
    where
        K: Borrow<Q>,
        V: Borrow<R>,
        Q: Eq + Hash + ?Sized,
        R: Eq + Hash + ?Sized,
    {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let Some(values) = state.table.get_mut(key) else {
            return false;
        };
        if !values.remove(value) {
            return false;
        }
        if values.is_empty() {
            state.table.remove(key);
        }
        state.len -= 1;
        true
    }

    /// Removes everything. Returns whether there was anything to remove.
    pub fn remove_all(&self) -> bool {
        let mut state = self.state.write();
        let had_entries = !state.table.is_empty();
        state.table.clear();
        state.len = 0;
        had_entries
    }

    /// Returns the number of values under `key`, 0 if it is absent.
    pub fn exists<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.state.read().table.get(key).map_or(0, |values| values.len())
    }

    /// Returns true if every given key is present, and for no keys at all.
    pub fn contains<'q, Q, I>(&self, keys: I) -> bool
    where
        I: IntoIterator<Item = &'q Q>,
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized + 'q,
    {
        let state = self.state.read();
        keys.into_iter().all(|key| state.table.contains_key(key))
    }

    /// The total number of `(key, value)` pairs.
    pub fn len(&self) -> usize {
        self.state.read().len
    }

    /// Returns `true` if there are no pairs.
    pub fn is_empty(&self) -> bool {
        self.state.read().len == 0
    }

    /// A detached snapshot of the values under `key`; empty if it is absent.
    pub fn value<Q>(&self, key: &Q) -> Vec<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
        V: Clone,
    {
        self.state
            .read()
            .table
            .get(key)
            .map(|values| values.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// A detached snapshot of the keys, in no particular order.
    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.state.read().table.keys().cloned().collect()
    }

    /// Every value under every key, one entry per pair.
    pub fn values(&self) -> Vec<V>
    where
        V: Clone,
    {
        let state = self.state.read();
        let mut values = Vec::with_capacity(state.len);
        for set in state.table.values() {
            values.extend(set.iter().cloned());
        }
        values
    }

    /// Iterates over each key with a snapshot of its values.
    ///
    /// Holds the read scope like [`ConcurrentMap::iter`](crate::ConcurrentMap::iter).
    ///
    /// **Locking behaviour:** While the iterator is alive, any operation on
    /// this multimap from the iterating thread may deadlock (guarded) and any
    /// write from it panics (unguarded). Reads deadlock once another thread's
    /// writer is queued. Call [`Iter::stop`] first.
    pub fn iter(&self) -> Iter<'_, K, V, M> {
        Iter {
            cursor: Cursor::new(&self.state, |state: &State<K, V>| &state.table),
        }
    }

    /// Converts the multimap into the other lock mode, keeping its contents.
    pub fn into_mode<N: LockMode>(self) -> ConcurrentMultiMap<K, V, N> {
        ConcurrentMultiMap {
            state: RwCell::new(self.state.into_inner()),
        }
    }
}

impl<K, V> ConcurrentMultiMap<K, V, Guarded>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Eq + Hash + Clone + Send + Sync + 'static,
{
    /// Hands each key with a snapshot of its values over from a producer
    /// thread, as [`ConcurrentMap::handoff`](crate::ConcurrentMap::handoff) does.
    ///
    /// **Locking behaviour:** Deadlock if the consuming thread performs any
    /// operation on this multimap before the hand-off is exhausted or stopped.
    pub fn handoff(self: &Arc<Self>) -> Handoff<(K, Vec<V>)> {
        let map = Arc::clone(self);
        Handoff::spawn(move |sender| {
            let state = map.state.read();
            produce(&state.table, sender, |key, values| {
                (key.clone(), values.iter().cloned().collect())
            });
        })
    }
}

/// Iterator returned by [`ConcurrentMultiMap::iter`].
pub struct Iter<'a, K, V, M: LockMode> {
    cursor: Cursor<'a, State<K, V>, K, Values<V>, M>,
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
    type Item = (K, Vec<V>);

    fn next(&mut self) -> Option<Self::Item> {
        let item = self
            .cursor
            .next_with(|key, values| (key.clone(), values.iter().cloned().collect()));
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

impl<K, V, M> FromIterator<(K, V)> for ConcurrentMultiMap<K, V, M>
where
    K: Eq + Hash,
    V: Eq + Hash,
    M: LockMode,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let map = Self::new();
        for (key, value) in iter {
            map.set(key, value);
        }
        map
    }
}

impl<K, V, M> Extend<(K, V)> for ConcurrentMultiMap<K, V, M>
where
    K: Eq + Hash,
    V: Eq + Hash,
    M: LockMode,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.set(key, value);
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug, M: LockMode> fmt::Debug for ConcurrentMultiMap<K, V, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.state.read().table.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted<T: Ord>(mut values: Vec<T>) -> Vec<T> {
        values.sort();
        values
    }

    #[test]
    fn test_multimap_scenario() {
        let map = ConcurrentMultiMap::<&str, &str>::new();
        assert!(!map.is_guarded());
        assert!(map.set("k", "v1"));
        assert!(!map.set("k", "v1"));
        assert!(map.set("k", "v2"));
        assert_eq!(map.exists("k"), 2);
        assert_eq!(map.len(), 2);
        assert!(map.remove("k"));
        assert_eq!(map.len(), 0);
        assert!(!map.remove("k"));
        assert_eq!(map.exists("k"), 0);
    }

    #[test]
    fn test_multimap_snapshots() {
        let map: GuardedMultiMap<u32, u32> = [(1, 10), (1, 11), (2, 20)].into_iter().collect();
        assert_eq!(map.len(), 3);
        assert_eq!(sorted(map.value(&1)), vec![10, 11]);
        assert!(map.value(&3).is_empty());
        assert_eq!(sorted(map.keys()), vec![1, 2]);
        assert_eq!(sorted(map.values()), vec![10, 11, 20]);
        assert!(map.contains(&[1, 2]));
        assert!(!map.contains(&[1, 3]));
        assert!(map.contains(std::iter::empty::<&u32>()));

        // Same value under different keys counts once per key.
        assert!(map.set(2, 10));
        assert_eq!(map.len(), 4);
    }

    #[test]
    fn test_multimap_extend() {
        let mut map = ConcurrentMultiMap::<u32, u32>::new();
        map.set(1, 10);
        map.extend([(1, 10), (1, 11), (2, 20), (2, 20)]);
        assert_eq!(map.len(), 3);
        assert_eq!(map.exists(&1), 2);
        assert_eq!(map.exists(&2), 1);
        assert_eq!(sorted(map.value(&1)), vec![10, 11]);
    }

    #[test]
    fn test_multimap_remove_value() {
        let map = GuardedMultiMap::<u32, u32>::new();
        map.set(1, 10);
        map.set(1, 11);
        assert!(map.remove_value(&1, &10));
        assert!(!map.remove_value(&1, &10));
        assert!(!map.remove_value(&7, &10));
        assert_eq!(map.len(), 1);
        assert!(map.remove_value(&1, &11));
        assert!(!map.contains(&[1]));
        assert!(map.keys().is_empty());
        assert!(map.is_empty());
    }

    #[test]
    fn test_multimap_remove_all() {
        let map = ConcurrentMultiMap::<u32, u32>::new();
        assert!(!map.remove_all());
        map.set(1, 1);
        map.set(2, 2);
        assert!(map.remove_all());
        assert!(map.is_empty());
        assert!(!map.remove_all());
    }

    #[test]
    fn test_multimap_iter() {
        let map = GuardedMultiMap::<&str, u32>::new();
        map.set("a", 1);
        map.set("a", 2);
        map.set("b", 3);

        let mut pairs = map
            .iter()
            .map(|(key, values)| (key, sorted(values)))
            .collect::<Vec<_>>();
        pairs.sort();
        assert_eq!(pairs, vec![("a", vec![1, 2]), ("b", vec![3])]);

        let mut iter = map.iter();
        assert_eq!(iter.size_hint(), (2, Some(2)));
        assert!(iter.next().is_some());
        iter.stop();
        assert!(iter.is_stopped());
        assert_eq!(iter.next(), None);
        assert!(map.set("c", 4));
    }

    #[test]
    fn test_multimap_handoff() {
        let map = Arc::new(GuardedMultiMap::<u32, u32>::new());
        for i in 0..8 {
            map.set(i % 4, i);
        }

        let mut pairs = map
            .handoff()
            .map(|(key, values)| (key, sorted(values)))
            .collect::<Vec<_>>();
        pairs.sort();
        assert_eq!(
            pairs,
            vec![(0, vec![0, 4]), (1, vec![1, 5]), (2, vec![2, 6]), (3, vec![3, 7])]
        );

        let mut handoff = map.handoff();
        assert!(handoff.next().is_some());
        drop(handoff);
        assert!(map.remove(&0));
        assert_eq!(map.len(), 6);
    }

    #[test]
    fn test_multimap_concurrent_len() {
        let map = Arc::new(GuardedMultiMap::<u32, u32>::new());
        const N: usize = 1 << 12;
        const M: usize = 8;

        let threads = (0..M)
            .map(|_| {
                let map = map.clone();
                std::thread::spawn(move || {
                    for _ in 0..N {
                        let key = rand::random::<u32>() % 16;
                        let value = rand::random::<u32>() % 16;
                        match rand::random::<u32>() % 4 {
                            0 => {
                                map.remove(&key);
                            }
                            1 => {
                                map.remove_value(&key, &value);
                            }
                            _ => {
                                map.set(key, value);
                            }
                        }
                    }
                })
            })
            .collect::<Vec<_>>();
        threads.into_iter().for_each(|t| t.join().unwrap());

        let counted: usize = map.keys().iter().map(|key| map.exists(key)).sum();
        assert_eq!(map.len(), counted);
        assert_eq!(map.len(), map.values().len());
        for (_, values) in map.iter() {
            assert!(!values.is_empty());
        }
    }

    #[test]
    fn test_multimap_debug_and_mode() {
        let map = ConcurrentMultiMap::<u32, u32>::new();
        map.set(1, 2);
        assert_eq!(format!("{:?}", map), "{1: {2}}");
        let map = map.into_mode::<Guarded>();
        assert!(map.is_guarded());
        assert_eq!(map.exists(&1), 1);
    }
}
