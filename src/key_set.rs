//! An open-addressing hash set of 64-bit keys.
//!
//! Used by the broad phase for the set of shape pairs that have a contact
//! and the set of proxies that moved since the last pair update.
//! Zero is reserved to mark empty slots, so it can never be stored.

/// Thomas Wang's 64 to 32 bit integer hash.
#[inline]
fn key_hash(key: u64) -> u32 {
    let mut h = key;
    h = (!h).wrapping_add(h << 18);
    h ^= h >> 31;
    h = h.wrapping_mul(21);
    h ^= h >> 11;
    h = h.wrapping_add(h << 6);
    h ^= h >> 22;
    h as u32
}

#[derive(Clone, Debug)]
pub struct KeySet {
    // length is always a power of two
    slots: Vec<u64>,
    count: usize,
}

impl Default for KeySet {
    fn default() -> Self {
        Self::with_capacity(16)
    }
}

impl KeySet {
    pub fn with_capacity(capacity: usize) -> Self {
        // keep load factor at most one half
        let slot_count = (2 * capacity).max(16).next_power_of_two();
        Self {
            slots: vec![0; slot_count],
            count: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = 0);
        self.count = 0;
    }

    /// Find the slot holding `key` or the empty slot where it would go.
    #[inline]
    fn find_slot(&self, key: u64) -> usize {
        let mask = self.slots.len() - 1;
        let mut idx = key_hash(key) as usize & mask;
        while self.slots[idx] != 0 && self.slots[idx] != key {
            idx = (idx + 1) & mask;
        }
        idx
    }

    #[inline]
    pub fn contains(&self, key: u64) -> bool {
        debug_assert!(key != 0, "zero is reserved as the empty key");
        self.slots[self.find_slot(key)] == key
    }

    /// Insert a key. Returns `true` if it was already present.
    pub fn add(&mut self, key: u64) -> bool {
        debug_assert!(key != 0, "zero is reserved as the empty key");
        let idx = self.find_slot(key);
        if self.slots[idx] == key {
            return true;
        }

        if 2 * (self.count + 1) > self.slots.len() {
            self.grow();
            let idx = self.find_slot(key);
            self.slots[idx] = key;
        } else {
            self.slots[idx] = key;
        }
        self.count += 1;
        false
    }

    /// Remove a key. Returns `true` if it was present.
    pub fn remove(&mut self, key: u64) -> bool {
        debug_assert!(key != 0, "zero is reserved as the empty key");
        let mask = self.slots.len() - 1;
        let mut hole = self.find_slot(key);
        if self.slots[hole] != key {
            return false;
        }
        self.slots[hole] = 0;
        self.count -= 1;

        // backward shift deletion: move later entries of the probe chain
        // into the hole if their home slot allows it, so lookups never
        // stop early at the new empty slot
        let mut idx = hole;
        loop {
            idx = (idx + 1) & mask;
            let next_key = self.slots[idx];
            if next_key == 0 {
                return true;
            }
            let home = key_hash(next_key) as usize & mask;
            // distance from home to the hole versus to the current position,
            // both measured cyclically
            let dist_to_hole = hole.wrapping_sub(home) & mask;
            let dist_to_idx = idx.wrapping_sub(home) & mask;
            if dist_to_hole < dist_to_idx {
                self.slots[hole] = next_key;
                self.slots[idx] = 0;
                hole = idx;
            }
        }
    }

    fn grow(&mut self) {
        let new_len = 2 * self.slots.len();
        let old_slots = std::mem::replace(&mut self.slots, vec![0; new_len]);
        for key in old_slots.into_iter().filter(|k| *k != 0) {
            let idx = self.find_slot(key);
            self.slots[idx] = key;
        }
    }

    /// Iterate over the stored keys in slot order.
    pub fn iter(&self) -> impl '_ + Iterator<Item = u64> {
        self.slots.iter().copied().filter(|k| *k != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::collections::HashSet;

    #[test]
    fn add_contains_remove() {
        let mut set = KeySet::default();
        assert!(!set.add(5));
        assert!(set.add(5));
        assert!(!set.add(1 << 40));
        assert_eq!(set.len(), 2);
        assert!(set.contains(5));
        assert!(set.contains(1 << 40));
        assert!(!set.contains(6));

        assert!(set.remove(5));
        assert!(!set.remove(5));
        assert!(!set.contains(5));
        assert!(set.contains(1 << 40));
        assert_eq!(set.len(), 1);

        set.clear();
        assert!(set.is_empty());
        assert!(!set.contains(1 << 40));
    }

    #[test]
    fn keeps_keys_across_growth() {
        let mut set = KeySet::with_capacity(2);
        let keys: Vec<u64> = (1..=500).map(|k| k * 0x9e37_79b9).collect();
        for &key in &keys {
            assert!(!set.add(key));
        }
        assert_eq!(set.len(), keys.len());
        assert!(keys.iter().all(|k| set.contains(*k)));
    }

    #[test]
    fn matches_std_set_under_churn() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut set = KeySet::with_capacity(4);
        let mut reference = HashSet::new();
        for _ in 0..20_000 {
            // small key range so that removals hit and probe chains collide
            let key = rng.gen_range(1..600_u64);
            if rng.gen_bool(0.55) {
                assert_eq!(set.add(key), !reference.insert(key));
            } else {
                assert_eq!(set.remove(key), reference.remove(&key));
            }
            assert_eq!(set.len(), reference.len());
        }
        for key in 1..600 {
            assert_eq!(set.contains(key), reference.contains(&key), "key {key}");
        }
        let mut stored: Vec<u64> = set.iter().collect();
        stored.sort_unstable();
        let mut expected: Vec<u64> = reference.into_iter().collect();
        expected.sort_unstable();
        assert_eq!(stored, expected);
    }
}
