//! The edge agenda: an array-based max-heap keyed by `Edge::merit`, with
//! each edge's slot mirrored back into `Edge::heap_index` so it can be
//! resifted in place after a demerit without a search. Up-heap/down-heap
//! are explicit loops, not recursion, since this runs on every pop.

use crate::arena::Arena;

use super::edge::{Edge, EdgeId};

#[derive(Debug, Default)]
pub struct EdgeHeap {
    slots: Vec<EdgeId>,
}

impl EdgeHeap {
    pub fn with_capacity(capacity: usize) -> Self {
        EdgeHeap {
            slots: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Pushes `id` onto the heap. Returns `false` without modifying the
    /// heap if it is already at `hard_cap` — the caller turns that into an
    /// `OverflowFailure`.
    #[must_use]
    pub fn push(&mut self, edges: &mut Arena<Edge>, id: EdgeId, hard_cap: usize) -> bool {
        if self.slots.len() >= hard_cap {
            return false;
        }
        let idx = self.slots.len() as u32;
        self.slots.push(id);
        edges.get_mut(id).heap_index = Some(idx);
        self.sift_up(edges, idx);
        true
    }

    pub fn pop(&mut self, edges: &mut Arena<Edge>) -> Option<EdgeId> {
        if self.slots.is_empty() {
            return None;
        }
        let top = self.slots[0];
        edges.get_mut(top).heap_index = None;
        let last = self.slots.pop().unwrap();
        if !self.slots.is_empty() {
            self.slots[0] = last;
            edges.get_mut(last).heap_index = Some(0);
            self.sift_down(edges, 0);
        }
        Some(top)
    }

    /// Re-establishes heap order for an edge whose merit just changed in
    /// place (a demerit application). No-op if the edge isn't on the heap.
    pub fn resift(&mut self, edges: &mut Arena<Edge>, id: EdgeId) {
        let Some(idx) = edges.get(id).heap_index else {
            return;
        };
        self.sift_down(edges, idx);
        if let Some(idx) = edges.get(id).heap_index {
            self.sift_up(edges, idx);
        }
    }

    /// Drops `id` from the heap entirely (a demerit past `demerit_bound`).
    /// No-op if the edge isn't on the heap.
    pub fn remove(&mut self, edges: &mut Arena<Edge>, id: EdgeId) {
        let Some(idx) = edges.get(id).heap_index else {
            return;
        };
        edges.get_mut(id).heap_index = None;
        let last = self.slots.pop().unwrap();
        let idx = idx as usize;
        if idx < self.slots.len() {
            self.slots[idx] = last;
            edges.get_mut(last).heap_index = Some(idx as u32);
            self.sift_down(edges, idx as u32);
            if let Some(moved) = edges.get(last).heap_index {
                self.sift_up(edges, moved);
            }
        }
    }

    fn merit_of(edges: &Arena<Edge>, slot: EdgeId) -> log_domain::LogDomain<f64> {
        edges.get(slot).merit
    }

    fn sift_up(&mut self, edges: &mut Arena<Edge>, mut idx: u32) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if Self::merit_of(edges, self.slots[parent as usize])
                >= Self::merit_of(edges, self.slots[idx as usize])
            {
                break;
            }
            self.slots.swap(parent as usize, idx as usize);
            edges.get_mut(self.slots[parent as usize]).heap_index = Some(parent);
            edges.get_mut(self.slots[idx as usize]).heap_index = Some(idx);
            idx = parent;
        }
    }

    fn sift_down(&mut self, edges: &mut Arena<Edge>, mut idx: u32) {
        let n = self.slots.len() as u32;
        loop {
            let left = idx * 2 + 1;
            let right = idx * 2 + 2;
            let mut largest = idx;
            if left < n
                && Self::merit_of(edges, self.slots[left as usize])
                    > Self::merit_of(edges, self.slots[largest as usize])
            {
                largest = left;
            }
            if right < n
                && Self::merit_of(edges, self.slots[right as usize])
                    > Self::merit_of(edges, self.slots[largest as usize])
            {
                largest = right;
            }
            if largest == idx {
                break;
            }
            self.slots.swap(idx as usize, largest as usize);
            edges.get_mut(self.slots[idx as usize]).heap_index = Some(idx);
            edges.get_mut(self.slots[largest as usize]).heap_index = Some(largest);
            idx = largest;
        }
    }

    #[cfg(test)]
    fn assert_heap_property(&self, edges: &Arena<Edge>) {
        for (idx, &id) in self.slots.iter().enumerate() {
            assert_eq!(edges.get(id).heap_index, Some(idx as u32));
            let left = idx * 2 + 1;
            let right = idx * 2 + 2;
            if left < self.slots.len() {
                assert!(Self::merit_of(edges, id) >= Self::merit_of(edges, self.slots[left]));
            }
            if right < self.slots.len() {
                assert!(Self::merit_of(edges, id) >= Self::merit_of(edges, self.slots[right]));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::edge::EdgeStatus;
    use crate::chart::item::ItemId;
    use log_domain::LogDomain;
    use num_traits::One;

    fn edge(merit: f64) -> Edge {
        Edge {
            lhs: 0,
            rhs: Vec::new(),
            dot: 0,
            start: 0,
            pred: None,
            item: None::<ItemId>,
            status: EdgeStatus::Active,
            head: None,
            inside: LogDomain::new(merit).unwrap(),
            left_merit: LogDomain::one(),
            right_merit: LogDomain::one(),
            merit: LogDomain::new(merit).unwrap(),
            demerits: 0,
            heap_index: None,
            sucs: Vec::new(),
        }
    }

    #[test]
    fn pops_in_descending_merit_order() {
        let mut arena = Arena::new();
        let merits = [0.3, 0.9, 0.1, 0.7, 0.5];
        let mut heap = EdgeHeap::with_capacity(8);
        for &m in &merits {
            let id = arena.alloc(edge(m));
            assert!(heap.push(&mut arena, id, 100));
            heap.assert_heap_property(&arena);
        }

        let mut popped = Vec::new();
        while let Some(id) = heap.pop(&mut arena) {
            popped.push(arena.get(id).merit);
            heap.assert_heap_property(&arena);
        }
        let mut sorted = popped.clone();
        sorted.sort();
        sorted.reverse();
        assert_eq!(popped, sorted);
    }

    #[test]
    fn refuses_past_hard_cap() {
        let mut arena = Arena::new();
        let mut heap = EdgeHeap::with_capacity(2);
        let a = arena.alloc(edge(0.5));
        let b = arena.alloc(edge(0.4));
        let c = arena.alloc(edge(0.9));
        assert!(heap.push(&mut arena, a, 2));
        assert!(heap.push(&mut arena, b, 2));
        assert!(!heap.push(&mut arena, c, 2));
    }

    #[test]
    fn remove_drops_an_edge_and_preserves_heap_property() {
        let mut arena = Arena::new();
        let mut heap = EdgeHeap::with_capacity(8);
        let a = arena.alloc(edge(0.9));
        let b = arena.alloc(edge(0.5));
        let c = arena.alloc(edge(0.7));
        heap.push(&mut arena, a, 8);
        heap.push(&mut arena, b, 8);
        heap.push(&mut arena, c, 8);

        heap.remove(&mut arena, b);
        heap.assert_heap_property(&arena);
        assert_eq!(arena.get(b).heap_index, None);
        assert_eq!(heap.len(), 2);

        let mut popped = Vec::new();
        while let Some(id) = heap.pop(&mut arena) {
            popped.push(id);
        }
        assert_eq!(popped, vec![a, c]);
    }

    #[test]
    fn remove_is_a_no_op_once_already_popped() {
        let mut arena = Arena::new();
        let mut heap = EdgeHeap::with_capacity(8);
        let a = arena.alloc(edge(0.9));
        heap.push(&mut arena, a, 8);
        heap.pop(&mut arena);
        heap.remove(&mut arena, a);
        assert_eq!(heap.len(), 0);
    }

    #[test]
    fn resift_after_demerit_restores_order() {
        let mut arena = Arena::new();
        let mut heap = EdgeHeap::with_capacity(8);
        let a = arena.alloc(edge(0.9));
        let b = arena.alloc(edge(0.5));
        heap.push(&mut arena, a, 8);
        heap.push(&mut arena, b, 8);
        arena.get_mut(a).merit = LogDomain::new(0.1).unwrap();
        heap.resift(&mut arena, a);
        heap.assert_heap_property(&arena);
        assert_eq!(heap.pop(&mut arena), Some(b));
    }
}
