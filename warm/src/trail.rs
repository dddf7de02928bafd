use ::{derive_new::new, smallvec::SmallVec};

use crate::word::{Address, Word};

/// One undo record: the value `address` held before it was overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, new)]
pub struct TrailItem {
    pub address: Address,
    pub value: Word,
}

pub type TrailFrame = SmallVec<[TrailItem; 16]>;

/// How much of the heap and stack existed when a choice point was made: heap cells
/// below `heap` and stack slots up to `stack` (the stack pointer then).
#[derive(Debug, Clone, Copy, PartialEq, Eq, new)]
pub struct Boundary {
    pub heap: i32,
    pub stack: i32,
}

impl Boundary {
    fn max(self, other: Boundary) -> Boundary {
        Boundary::new(self.heap.max(other.heap), self.stack.max(other.stack))
    }

    /// Whether some choice point can still see the old value at `address`. Retained
    /// cells outlive backtracking, so they always can.
    #[inline]
    fn covers(self, address: Address) -> bool {
        match address {
            Address::Heap(i) => i < self.heap,
            Address::Stack(i) => i <= self.stack,
            _ => true,
        }
    }
}

/// The backtracking undo log, one frame per open choice point.
///
/// Writes recorded while no frame is open are permanent: there is nothing to backtrack
/// to that could observe the old value. Neither are writes to cells that no open choice
/// point had allocated yet, since backtracking discards those cells wholesale.
#[derive(Debug, Default)]
pub struct Trail {
    frames: Vec<TrailFrame>,
    /// Per frame, the furthest boundary of it and every frame below it. A stack slot
    /// popped after an older choice point may lie above a newer one's boundary and
    /// still need restoring.
    boundaries: Vec<Boundary>,
}

impl Trail {
    pub fn new() -> Self {
        Self {
            frames: Vec::new(),
            boundaries: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.boundaries.clear();
    }

    /// The number of open frames.
    #[inline(always)]
    pub fn level(&self) -> usize {
        self.frames.len()
    }

    #[inline(always)]
    pub fn is_backtrack_available(&self) -> bool {
        !self.frames.is_empty()
    }

    /// The number of undo records across all open frames.
    pub fn len(&self) -> usize {
        self.frames.iter().map(|frame| frame.len()).sum()
    }

    #[inline]
    pub fn push(&mut self, boundary: Boundary) {
        let boundary = match self.boundaries.last() {
            Some(&outer) => outer.max(boundary),
            None => boundary,
        };

        self.frames.push(TrailFrame::new());
        self.boundaries.push(boundary);
    }

    #[inline]
    pub fn add_item(&mut self, address: Address, value: Word) {
        if let (Some(frame), Some(boundary)) = (self.frames.last_mut(), self.boundaries.last()) {
            if boundary.covers(address) {
                frame.push(TrailItem::new(address, value));
            }
        }
    }

    /// Removes the innermost frame. Replay it newest-first.
    #[inline]
    pub fn pop_backtrack_items(&mut self) -> Option<TrailFrame> {
        self.boundaries.pop();
        self.frames.pop()
    }

    /// Commits every frame above `level`. Their memory records move into the enclosing
    /// frame when it can still observe those writes; their register records describe
    /// alternatives that no longer exist and are dropped.
    pub fn cut(&mut self, level: usize) {
        while self.frames.len() > level {
            let frame = match self.pop_backtrack_items() {
                Some(frame) => frame,
                None => break,
            };

            if let (Some(outer), Some(&boundary)) = (self.frames.last_mut(), self.boundaries.last()) {
                outer.extend(frame.into_iter().filter(|item| match item.address {
                    Address::Register(_) => false,
                    address => boundary.covers(address),
                }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::word::GlobalRegister;

    fn everything() -> Boundary {
        Boundary::new(i32::MAX, i32::MAX)
    }

    #[test]
    fn writes_outside_a_frame_are_dropped() {
        let mut trail = Trail::new();
        trail.add_item(Address::Heap(0), Word(1));
        assert_eq!(trail.level(), 0);
        assert!(trail.pop_backtrack_items().is_none());
    }

    #[test]
    fn cut_merges_into_the_enclosing_frame() {
        let mut trail = Trail::new();
        trail.push(everything());
        trail.add_item(Address::Heap(0), Word(1));
        trail.push(everything());
        trail.add_item(Address::Register(GlobalRegister::TopOfHeap), Word(2));
        trail.add_item(Address::Heap(3), Word(4));
        trail.push(everything());
        trail.add_item(Address::Stack(1), Word(5));

        trail.cut(1);
        assert_eq!(trail.level(), 1);

        let frame = trail.pop_backtrack_items().unwrap();
        let addresses = frame.iter().map(|item| item.address).collect::<Vec<_>>();
        assert_eq!(
            addresses,
            vec![Address::Heap(0), Address::Heap(3), Address::Stack(1)]
        );
    }

    #[test]
    fn cut_to_current_level_is_a_no_op() {
        let mut trail = Trail::new();
        trail.push(everything());
        trail.push(everything());
        trail.cut(2);
        assert_eq!(trail.level(), 2);
        trail.cut(0);
        assert_eq!(trail.level(), 0);
    }

    #[test]
    fn cells_made_after_the_choice_point_are_not_recorded() {
        let mut trail = Trail::new();
        trail.push(Boundary::new(4, 2));

        trail.add_item(Address::Heap(3), Word(1));
        trail.add_item(Address::Heap(4), Word(2));
        trail.add_item(Address::Stack(2), Word(3));
        trail.add_item(Address::Stack(3), Word(4));
        trail.add_item(Address::Retained(100), Word(5));
        trail.add_item(Address::Register(GlobalRegister::TopOfHeap), Word(6));

        for _ in 0..1000 {
            trail.add_item(Address::Heap(10), Word(7));
            trail.add_item(Address::Stack(10), Word(8));
        }

        assert_eq!(trail.len(), 4);
        let addresses = trail
            .pop_backtrack_items()
            .unwrap()
            .iter()
            .map(|item| item.address)
            .collect::<Vec<_>>();
        assert_eq!(
            addresses,
            vec![
                Address::Heap(3),
                Address::Stack(2),
                Address::Retained(100),
                Address::Register(GlobalRegister::TopOfHeap),
            ]
        );
    }

    #[test]
    fn older_choice_points_keep_their_stack_slots() {
        let mut trail = Trail::new();
        trail.push(Boundary::new(0, 8));
        // The stack shrank before the newer choice point was made.
        trail.push(Boundary::new(0, 2));

        trail.add_item(Address::Stack(5), Word(1));
        trail.add_item(Address::Stack(9), Word(2));
        assert_eq!(trail.len(), 1);

        trail.cut(1);
        assert_eq!(trail.len(), 1);
    }

    #[test]
    fn cut_drops_records_the_enclosing_frame_cannot_see() {
        let mut trail = Trail::new();
        trail.push(Boundary::new(2, 0));
        trail.push(Boundary::new(6, 0));
        trail.add_item(Address::Heap(1), Word(1));
        trail.add_item(Address::Heap(4), Word(2));

        trail.cut(1);
        let frame = trail.pop_backtrack_items().unwrap();
        assert_eq!(frame.len(), 1);
        assert_eq!(frame[0].address, Address::Heap(1));
    }
}
