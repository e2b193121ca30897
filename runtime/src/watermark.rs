//! Per-partition highwater tracking.
//!
//! The tracker is filled once, from the first partition assignment, and then
//! only observes message offsets. Partitions assigned later are not tracked:
//! the highwater is a property of the subscription, not of the group.

use eventsource_core::message::{Offset, PartitionId, PartitionWatermark};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug)]
struct TrackedPartition {
    watermark: PartitionWatermark,
    reached: bool,
}

/// Records the watermark of each assigned partition and which ones have been
/// read up to their highwater.
#[derive(Clone, Debug, Default)]
pub struct WatermarkTracker {
    partitions: BTreeMap<PartitionId, TrackedPartition>,
    assigned: bool,
}

impl WatermarkTracker {
    /// Create a tracker with no assignment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an assignment has been recorded.
    #[must_use]
    pub const fn is_assigned(&self) -> bool {
        self.assigned
    }

    /// Record the watermarks captured for an assignment.
    ///
    /// Empty partitions are satisfied immediately. Returns `false`, leaving the
    /// tracker untouched, if an assignment was already recorded.
    pub fn record_assignment<I>(&mut self, assignment: I) -> bool
    where
        I: IntoIterator<Item = (PartitionId, PartitionWatermark)>,
    {
        if self.assigned {
            return false;
        }
        self.partitions = assignment
            .into_iter()
            .map(|(partition, watermark)| {
                (
                    partition,
                    TrackedPartition {
                        watermark,
                        reached: watermark.is_empty(),
                    },
                )
            })
            .collect();
        self.assigned = true;
        true
    }

    /// Note that a message at `offset` was read from `partition`.
    ///
    /// Returns `true` if this message brought the partition to its highwater.
    pub fn observe(&mut self, partition: PartitionId, offset: Offset) -> bool {
        match self.partitions.get_mut(&partition) {
            Some(tracked) if !tracked.reached && tracked.watermark.is_reached_by(offset) => {
                tracked.reached = true;
                true
            }
            _ => false,
        }
    }

    /// Whether an assignment was recorded and every partition in it is satisfied.
    #[must_use]
    pub fn all_reached(&self) -> bool {
        self.assigned && self.partitions.values().all(|p| p.reached)
    }

    /// Partitions still short of their highwater, in ascending order.
    #[must_use]
    pub fn pending(&self) -> Vec<PartitionId> {
        self.partitions
            .iter()
            .filter(|(_, p)| !p.reached)
            .map(|(id, _)| *id)
            .collect()
    }

    /// The watermark captured for `partition`.
    #[must_use]
    pub fn watermark(&self, partition: PartitionId) -> Option<PartitionWatermark> {
        self.partitions.get(&partition).map(|p| p.watermark)
    }

    /// Number of tracked partitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    /// Whether no partitions are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Upper bound on the number of messages before the highwater.
    #[must_use]
    pub fn expected_messages(&self) -> i64 {
        self.partitions.values().map(|p| p.watermark.span()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_is_reached_before_assignment() {
        let tracker = WatermarkTracker::new();
        assert!(!tracker.is_assigned());
        assert!(!tracker.all_reached());
    }

    #[test]
    fn empty_assignment_is_reached_immediately() {
        let mut tracker = WatermarkTracker::new();
        assert!(tracker.record_assignment(Vec::new()));
        assert!(tracker.all_reached());
        assert!(tracker.is_empty());
    }

    #[test]
    fn empty_partitions_are_satisfied_on_assignment() {
        let mut tracker = WatermarkTracker::new();
        tracker.record_assignment([
            (0, PartitionWatermark::new(0, 0)),
            (1, PartitionWatermark::new(7, 7)),
        ]);
        assert!(tracker.all_reached());
        assert_eq!(tracker.expected_messages(), 0);
    }

    #[test]
    fn partitions_are_reached_at_their_last_offset() {
        let mut tracker = WatermarkTracker::new();
        tracker.record_assignment([
            (0, PartitionWatermark::new(0, 3)),
            (1, PartitionWatermark::new(10, 12)),
        ]);
        assert_eq!(tracker.pending(), vec![0, 1]);
        assert_eq!(tracker.expected_messages(), 5);

        assert!(!tracker.observe(0, 0));
        assert!(!tracker.observe(0, 1));
        assert!(tracker.observe(0, 2));
        assert_eq!(tracker.pending(), vec![1]);
        assert!(!tracker.all_reached());

        assert!(tracker.observe(1, 11));
        assert!(tracker.all_reached());

        // Later messages do not re-trigger the transition
        assert!(!tracker.observe(1, 12));
    }

    #[test]
    fn later_assignments_are_ignored() {
        let mut tracker = WatermarkTracker::new();
        tracker.record_assignment([(0, PartitionWatermark::new(0, 1))]);
        assert!(!tracker.record_assignment([(1, PartitionWatermark::new(0, 100))]));

        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.watermark(1), None);
        assert!(!tracker.observe(1, 99));
        assert!(tracker.observe(0, 0));
        assert!(tracker.all_reached());
    }
}
