//! Ordered set of publishes awaiting broker confirmation.

use std::collections::BTreeMap;

use devwatch_common::SystemValue;

/// A confirm-tracked publish that the broker has not resolved yet.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingPublish {
    pub sequence: u64,
    pub routing_key: String,
    pub payload: SystemValue,
    pub device_identifier: String,
}

/// Pending publishes keyed by sequence number.
#[derive(Debug, Default)]
pub(crate) struct PendingSet {
    entries: BTreeMap<u64, PendingPublish>,
}

impl PendingSet {
    pub fn insert(&mut self, entry: PendingPublish) {
        self.entries.insert(entry.sequence, entry);
    }

    /// Remove the entries a confirmation covers, in ascending order.
    ///
    /// A cumulative confirmation removes every entry up to and including
    /// `tag`; otherwise only the entry at `tag` is removed.
    pub fn resolve(&mut self, tag: u64, multiple: bool) -> Vec<PendingPublish> {
        if !multiple {
            return self.entries.remove(&tag).into_iter().collect();
        }

        let remaining = match tag.checked_add(1) {
            Some(bound) => self.entries.split_off(&bound),
            None => BTreeMap::new(),
        };
        std::mem::replace(&mut self.entries, remaining)
            .into_values()
            .collect()
    }

    /// Remove everything, in ascending order.
    pub fn drain(&mut self) -> Vec<PendingPublish> {
        std::mem::take(&mut self.entries).into_values().collect()
    }

    pub fn sequences(&self) -> Vec<u64> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devwatch_common::Ram;

    fn set_with(sequences: &[u64]) -> PendingSet {
        let mut set = PendingSet::default();
        for &sequence in sequences {
            set.insert(PendingPublish {
                sequence,
                routing_key: "device-0.metrics.ram".to_string(),
                payload: SystemValue::from(Ram::default()),
                device_identifier: "device-0".to_string(),
            });
        }
        set
    }

    fn sequences(entries: &[PendingPublish]) -> Vec<u64> {
        entries.iter().map(|e| e.sequence).collect()
    }

    #[test]
    fn test_cumulative_resolve_leaves_suffix() {
        let mut set = set_with(&[1, 2, 3, 4, 5]);

        let resolved = set.resolve(3, true);

        assert_eq!(sequences(&resolved), vec![1, 2, 3]);
        assert_eq!(set.sequences(), vec![4, 5]);
    }

    #[test]
    fn test_single_resolve_touches_one_entry() {
        let mut set = set_with(&[1, 2, 3]);

        let resolved = set.resolve(2, false);

        assert_eq!(sequences(&resolved), vec![2]);
        assert_eq!(set.sequences(), vec![1, 3]);
    }

    #[test]
    fn test_resolve_unknown_tag() {
        let mut set = set_with(&[4, 5]);

        assert!(set.resolve(9, false).is_empty());
        assert!(set.resolve(3, true).is_empty());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_cumulative_with_gaps() {
        // 2 was already resolved out of order.
        let mut set = set_with(&[1, 3, 4, 6]);

        let resolved = set.resolve(5, true);

        assert_eq!(sequences(&resolved), vec![1, 3, 4]);
        assert_eq!(set.sequences(), vec![6]);
    }

    #[test]
    fn test_cumulative_max_tag() {
        let mut set = set_with(&[1, u64::MAX]);

        let resolved = set.resolve(u64::MAX, true);

        assert_eq!(sequences(&resolved), vec![1, u64::MAX]);
        assert!(set.is_empty());
    }

    #[test]
    fn test_drain() {
        let mut set = set_with(&[7, 2, 5]);

        assert_eq!(sequences(&set.drain()), vec![2, 5, 7]);
        assert!(set.is_empty());
    }
}
