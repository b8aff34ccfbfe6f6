//! Deferred events waiting for their due time.

use std::cmp::Ordering;
use std::time::Instant;

/// An event that becomes deliverable at `due`.
///
/// Ordered by `(due, seq)` so two timers with the same due time leave the
/// heap in the order they were scheduled.
pub(super) struct Timer<E> {
    pub(super) due: Instant,
    pub(super) seq: u64,
    pub(super) event: E,
}

impl<E> PartialEq for Timer<E> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<E> Eq for Timer<E> {}

impl<E> PartialOrd for Timer<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Timer<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due
            .cmp(&other.due)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Reverse;
    use std::collections::BinaryHeap;
    use std::time::Duration;

    #[test]
    fn test_heap_pops_earliest_then_oldest() {
        // Arrange
        let now = Instant::now();
        let mut heap = BinaryHeap::new();
        heap.push(Reverse(Timer { due: now + Duration::from_millis(20), seq: 0, event: "late" }));
        heap.push(Reverse(Timer { due: now, seq: 2, event: "second" }));
        heap.push(Reverse(Timer { due: now, seq: 1, event: "first" }));

        // Act
        let order: Vec<_> = std::iter::from_fn(|| heap.pop().map(|Reverse(t)| t.event)).collect();

        // Assert
        assert_eq!(order, vec!["first", "second", "late"]);
    }
}
