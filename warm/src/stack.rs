use crate::{
    error::{Error, Segment},
    trail::Trail,
    word::{Address, Word},
};

/// The operand stack, which also holds activation records.
///
/// Every write goes through the trail, so a choice point sees the stack exactly as it
/// was when the choice point was made, even after frames above it were popped and their
/// slots reused.
#[derive(Debug)]
pub struct BranchingStack {
    words: Vec<Word>,
    /// Index of the top element, `-1` when empty.
    pointer: i32,
}

impl BranchingStack {
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![Word::ZERO; capacity],
            pointer: -1,
        }
    }

    #[inline]
    pub fn pointer(&self) -> i32 {
        self.pointer
    }

    /// The live portion of the stack, bottom first.
    pub fn as_slice(&self) -> &[Word] {
        &self.words[..(self.pointer + 1) as usize]
    }

    pub fn reset(&mut self) {
        self.pointer = -1;
    }

    #[inline]
    fn slot(&self, index: i32) -> Result<usize, Error> {
        if index < 0 || index as usize >= self.words.len() {
            Err(Error::InvalidAddress(Address::Stack(index)))
        } else {
            Ok(index as usize)
        }
    }

    #[inline]
    pub fn get(&self, index: i32) -> Result<Word, Error> {
        Ok(self.words[self.slot(index)?])
    }

    #[inline]
    pub fn set(&mut self, index: i32, value: Word, trail: &mut Trail) -> Result<(), Error> {
        let slot = self.slot(index)?;
        trail.add_item(Address::Stack(index), self.words[slot]);
        self.words[slot] = value;
        Ok(())
    }

    #[inline]
    pub fn push(&mut self, value: Word, trail: &mut Trail) -> Result<(), Error> {
        if (self.pointer + 1) as usize >= self.words.len() {
            return Err(Error::Exhausted {
                segment: Segment::Stack,
                capacity: self.words.len(),
            });
        }

        self.pointer += 1;
        self.set(self.pointer, value, trail)
    }

    #[inline]
    pub fn pop(&mut self) -> Result<Word, Error> {
        if self.pointer < 0 {
            return Err(Error::StackUnderflow);
        }

        let value = self.words[self.pointer as usize];
        self.pointer -= 1;
        Ok(value)
    }

    #[inline]
    pub fn peek(&self) -> Result<Word, Error> {
        if self.pointer < 0 {
            return Err(Error::StackUnderflow);
        }

        Ok(self.words[self.pointer as usize])
    }

    /// Moves the top, zero-filling (trailed) when growing.
    pub fn set_pointer(&mut self, pointer: i32, trail: &mut Trail) -> Result<(), Error> {
        while pointer > self.pointer {
            self.push(Word::ZERO, trail)?;
        }

        if pointer < self.pointer {
            self.pointer = pointer.max(-1);
        }

        Ok(())
    }

    pub fn allocate(&mut self, count: u32, trail: &mut Trail) -> Result<(), Error> {
        for _ in 0..count {
            self.push(Word::ZERO, trail)?;
        }
        Ok(())
    }

    pub fn deallocate(&mut self, count: u32) -> Result<(), Error> {
        for _ in 0..count {
            self.pop()?;
        }
        Ok(())
    }

    /// Restores a recorded top without touching any slot.
    #[inline]
    pub fn backtrack_pointer(&mut self, pointer: i32) {
        self.pointer = pointer;
    }

    /// Restores a recorded slot value without trailing it again.
    #[inline]
    pub fn backtrack(&mut self, index: i32, value: Word) -> Result<(), Error> {
        let slot = self.slot(index)?;
        self.words[slot] = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trail::Boundary;

    #[test]
    fn overwritten_slots_are_restored_on_backtrack() {
        let mut trail = Trail::new();
        let mut stack = BranchingStack::new(8);

        stack.push(Word(1), &mut trail).unwrap();
        stack.push(Word(2), &mut trail).unwrap();

        let saved = stack.pointer();
        trail.push(Boundary::new(0, saved));
        stack.pop().unwrap();
        stack.push(Word(9), &mut trail).unwrap();
        stack.push(Word(10), &mut trail).unwrap();

        // Only the slot that existed at the choice point needs an undo record.
        let frame = trail.pop_backtrack_items().unwrap();
        assert_eq!(frame.len(), 1);
        for item in frame.iter().rev() {
            if let Address::Stack(index) = item.address {
                stack.backtrack(index, item.value).unwrap();
            }
        }
        stack.backtrack_pointer(saved);

        assert_eq!(stack.as_slice(), &[Word(1), Word(2)]);
    }

    #[test]
    fn overflow_is_reported() {
        let mut trail = Trail::new();
        let mut stack = BranchingStack::new(1);
        stack.push(Word(1), &mut trail).unwrap();
        match stack.push(Word(2), &mut trail) {
            Err(Error::Exhausted { segment: Segment::Stack, .. }) => {}
            other => panic!("expected exhaustion, got {:?}", other),
        }
        stack.pop().unwrap();
        assert!(stack.pop().is_err());
    }
}
