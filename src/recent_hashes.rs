use std::collections::{HashSet, VecDeque};

use alloy::primitives::TxHash;

pub const DEFAULT_MAX_RECENT_HASHES: usize = 10_000;
pub const DEFAULT_RETAIN_RECENT_HASHES: usize = 5_000;

/// Insertion-ordered set of recently emitted transaction hashes.
///
/// Growth is unbounded between calls to [`RecentHashSet::trim`]; once `trim` runs the
/// set holds at most `max_size` hashes. When `max_size` is exceeded only the
/// `retain_size` most recently inserted hashes are kept.
#[derive(Clone, Debug)]
pub struct RecentHashSet {
    order: VecDeque<TxHash>,
    members: HashSet<TxHash>,
    max_size: usize,
    retain_size: usize,
}

impl Default for RecentHashSet {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECENT_HASHES, DEFAULT_RETAIN_RECENT_HASHES)
    }
}

impl RecentHashSet {
    /// Creates an empty set. `retain_size` is clamped to `max_size`.
    #[must_use]
    pub fn new(max_size: usize, retain_size: usize) -> Self {
        Self {
            order: VecDeque::new(),
            members: HashSet::new(),
            max_size,
            retain_size: retain_size.min(max_size),
        }
    }

    /// Rebuilds a set from persisted hashes, oldest first, and trims it.
    #[must_use]
    pub fn from_hashes(
        hashes: impl IntoIterator<Item = TxHash>,
        max_size: usize,
        retain_size: usize,
    ) -> Self {
        let mut set = Self::new(max_size, retain_size);
        for hash in hashes {
            set.insert(hash);
        }
        set.trim();
        set
    }

    #[must_use]
    pub fn contains(&self, hash: &TxHash) -> bool {
        self.members.contains(hash)
    }

    /// Appends `hash` as the newest entry. Returns `false` if it was already present,
    /// in which case its position is unchanged.
    pub fn insert(&mut self, hash: TxHash) -> bool {
        if !self.members.insert(hash) {
            return false;
        }
        self.order.push_back(hash);
        true
    }

    /// Evicts the oldest hashes if the set is over capacity.
    ///
    /// Returns the number of hashes evicted.
    pub fn trim(&mut self) -> usize {
        if self.order.len() <= self.max_size {
            return 0;
        }
        let evicted = self.order.len() - self.retain_size;
        for hash in self.order.drain(..evicted) {
            self.members.remove(&hash);
        }
        evicted
    }

    /// Iterates from the oldest to the newest hash.
    pub fn iter(&self) -> impl Iterator<Item = &TxHash> {
        self.order.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[must_use]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    #[must_use]
    pub fn retain_size(&self) -> usize {
        self.retain_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::B256;

    fn hash(n: u64) -> TxHash {
        B256::left_padding_from(&n.to_be_bytes())
    }

    #[test]
    fn insert_ignores_duplicates() {
        let mut set = RecentHashSet::new(10, 5);
        assert!(set.insert(hash(1)));
        assert!(set.insert(hash(2)));
        assert!(!set.insert(hash(1)));

        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().copied().collect::<Vec<_>>(), vec![hash(1), hash(2)]);
    }

    #[test]
    fn trim_is_noop_at_capacity() {
        let mut set = RecentHashSet::new(3, 2);
        for n in 0..3 {
            set.insert(hash(n));
        }
        assert_eq!(set.trim(), 0);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn trim_keeps_most_recent_entries() {
        let mut set = RecentHashSet::new(4, 2);
        for n in 0..5 {
            set.insert(hash(n));
        }

        assert_eq!(set.trim(), 3);
        assert_eq!(set.iter().copied().collect::<Vec<_>>(), vec![hash(3), hash(4)]);
        assert!(!set.contains(&hash(0)));
        assert!(set.contains(&hash(4)));
    }

    #[test]
    fn size_bounded_after_every_trim() {
        let mut set = RecentHashSet::new(100, 60);
        for round in 0..50u64 {
            for n in 0..37 {
                set.insert(hash(round * 1_000 + n));
            }
            set.trim();
            assert!(set.len() <= set.max_size());
        }
    }

    #[test]
    fn retain_size_is_clamped_to_max_size() {
        let set = RecentHashSet::new(3, 10);
        assert_eq!(set.retain_size(), 3);
    }

    #[test]
    fn from_hashes_applies_eviction() {
        let set = RecentHashSet::from_hashes((0..12).map(hash), 10, 5);
        assert_eq!(set.len(), 5);
        assert_eq!(set.iter().next(), Some(&hash(7)));
    }
}
