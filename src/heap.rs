//! Fixed-capacity min-heap that retains the top-K records it has seen.

use crate::record::UrlCount;

/* ===================== TopKHeap ===================== */

/// The largest **K** [`UrlCount`] records pushed so far (by [`UrlCount`]'s `Ord`).
///
/// The heap is an array of `capacity` slots laid out as a binary min-heap
/// (children of `i` at `2i+1` and `2i+2`). Unfilled slots are `None`, which
/// orders below every record, so the root is always the record that the
/// next push has to beat.
///
/// - Memory is bounded by `capacity` regardless of how many records are pushed.
/// - Slot order is heap order, not rank order; use [`TopKHeap::into_sorted_vec`]
///   for a ranking.
///
/// # Notes
/// - `capacity == 0` ignores every push.
/// - Records are expected to be distinct; pushing a copy of a retained record
///   that is not the current minimum keeps both copies.
#[derive(Clone, Debug)]
pub struct TopKHeap {
    slots: Vec<Option<UrlCount>>,
    len: usize,
}

impl TopKHeap {
    /// Create an empty heap with `capacity` slots.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            len: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    /// The record a new push must beat, once every slot is occupied.
    #[must_use]
    pub fn threshold(&self) -> Option<&UrlCount> {
        if self.is_full() {
            self.slots.first().and_then(Option::as_ref)
        } else {
            None
        }
    }

    /// Offer a record to the heap.
    ///
    /// If `record` does not rank above the root the call is a no-op and
    /// returns `false`. Otherwise the root is replaced and sifted down.
    pub fn push(&mut self, record: UrlCount) -> bool {
        let Some(root) = self.slots.first_mut() else {
            return false;
        };
        if root.as_ref().is_some_and(|min| record <= *min) {
            return false;
        }
        if root.replace(record).is_none() {
            self.len += 1;
        }
        self.sift_down(0);
        true
    }

    fn sift_down(&mut self, mut i: usize) {
        let n = self.slots.len();
        loop {
            let left = 2 * i + 1;
            if left >= n {
                break;
            }
            let right = left + 1;
            let child = if right < n && self.slots[right] < self.slots[left] {
                right
            } else {
                left
            };
            if self.slots[child] < self.slots[i] {
                self.slots.swap(i, child);
                i = child;
            } else {
                break;
            }
        }
    }

    /// The record stored at heap-array index `idx`.
    ///
    /// Returns `None` when `idx` is out of range or the slot has never been
    /// filled. The index carries no rank meaning.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&UrlCount> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    /// Occupied slots in heap-array order.
    pub fn iter(&self) -> impl Iterator<Item = &UrlCount> {
        self.slots.iter().flatten()
    }

    /// Offer every record of `other` to this heap.
    pub fn merge_from(&mut self, other: &Self) {
        for record in other.iter() {
            self.push(record.clone());
        }
    }

    /// Drain into rank order: descending count, ascending item on ties.
    #[must_use]
    pub fn into_sorted_vec(self) -> Vec<UrlCount> {
        let mut v: Vec<UrlCount> = self.slots.into_iter().flatten().collect();
        v.sort_unstable_by(|a, b| b.cmp(a));
        v
    }
}

impl Extend<UrlCount> for TopKHeap {
    fn extend<I: IntoIterator<Item = UrlCount>>(&mut self, iter: I) {
        for record in iter {
            self.push(record);
        }
    }
}
