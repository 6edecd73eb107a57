//! Property-based tests for the set algebra and the map/multimap counters.

use crate::{ConcurrentMap, ConcurrentMultiMap, ConcurrentSet, GuardedSet};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

fn members(set: &ConcurrentSet<u8>) -> BTreeSet<u8> {
    set.values().into_iter().collect()
}

proptest! {
    #[test]
    fn test_union_holds_exactly_both(
        a in prop::collection::vec(any::<u8>(), 0..64),
        b in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let left = GuardedSet::from_values(a.iter().copied());
        let right = ConcurrentSet::<u8>::from_values(b.iter().copied());
        let union = left.union(&right);

        prop_assert!(union.contains(&a));
        prop_assert!(union.contains(&b));
        let expected: BTreeSet<u8> = a.iter().chain(b.iter()).copied().collect();
        prop_assert_eq!(members(&union), expected);
    }

    #[test]
    fn test_intersection_bounded(
        a in prop::collection::vec(any::<u8>(), 0..64),
        b in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let left = ConcurrentSet::<u8>::from_values(a.iter().copied());
        let right = GuardedSet::from_values(b.iter().copied());
        let intersection = left.intersect(&right);

        prop_assert!(intersection.len() <= left.len().min(right.len()));
        let a: BTreeSet<u8> = a.into_iter().collect();
        let b: BTreeSet<u8> = b.into_iter().collect();
        let expected: BTreeSet<u8> = a.intersection(&b).copied().collect();
        prop_assert_eq!(members(&intersection), expected);
    }

    #[test]
    fn test_difference_recombines(
        a in prop::collection::vec(any::<u8>(), 0..64),
        b in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let left = GuardedSet::from_values(a.iter().copied());
        let right = GuardedSet::from_values(b.iter().copied());
        let difference = left.difference(&right);

        for value in difference.values() {
            prop_assert!(!right.exists(&value));
        }
        let recombined = difference.union(&left.intersect(&right));
        prop_assert_eq!(members(&recombined), members(&left.into_mode()));
    }

    #[test]
    fn test_map_matches_model(
        ops in prop::collection::vec((any::<bool>(), 0u8..16, any::<u32>()), 0..128),
    ) {
        let map = ConcurrentMap::<u8, u32>::new();
        let mut model = BTreeMap::new();
        for (insert, key, value) in ops {
            if insert {
                map.set(key, value);
                model.insert(key, value);
            } else {
                map.remove(&key);
                model.remove(&key);
            }
        }

        prop_assert_eq!(map.len(), model.len());
        for key in 0u8..16 {
            prop_assert_eq!(map.value(&key), model.get(&key).copied().unwrap_or_default());
        }
        let drained: BTreeMap<u8, u32> = map.iter().collect();
        prop_assert_eq!(drained, model);
    }

    #[test]
    fn test_multimap_len_matches_pairs(
        ops in prop::collection::vec((0u8..3, 0u8..8, 0u8..8), 0..128),
    ) {
        let map = ConcurrentMultiMap::<u8, u8>::new();
        let mut model: BTreeMap<u8, BTreeSet<u8>> = BTreeMap::new();
        for (op, key, value) in ops {
            match op {
                0 => {
                    let added = model.entry(key).or_default().insert(value);
                    prop_assert_eq!(map.set(key, value), added);
                }
                1 => {
                    let removed = model.remove(&key).is_some();
                    prop_assert_eq!(map.remove(&key), removed);
                }
                _ => {
                    let removed = model
                        .get_mut(&key)
                        .is_some_and(|values| values.remove(&value));
                    if model.get(&key).is_some_and(|values| values.is_empty()) {
                        model.remove(&key);
                    }
                    prop_assert_eq!(map.remove_value(&key, &value), removed);
                }
            }
        }

        let pairs: usize = model.values().map(|values| values.len()).sum();
        prop_assert_eq!(map.len(), pairs);
        prop_assert_eq!(map.keys().len(), model.len());
        for (key, values) in &model {
            prop_assert_eq!(map.exists(key), values.len());
        }
    }
}
