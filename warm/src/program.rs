//! The code segment and everything that indexes into it: interned functors, the
//! predicate table with its dispatch thunks, and registered native callbacks.

use ::{
    std::{collections::HashMap, fmt, rc::Rc},
    tracing::debug,
};

use crate::{
    error::{Error, Segment},
    functor::{FunctorDescriptor, FunctorId, FunctorTable},
    machine::Machine,
    opcode::Opcode,
    word::Address,
};

/// A native predicate body. Returning `Ok(false)` fails the goal exactly like a failed
/// unification would.
pub type Callback = Rc<dyn Fn(&mut Machine) -> Result<bool, Error>>;

/// Every predicate is entered through a chain of fixed-size thunks:
///
/// ```text
/// undefined:     Fail        Nop    Nop             Nop
/// last clause:   Nop         Nop    BranchAbsolute  clause
/// other clauses: ChoicePoint next   BranchAbsolute  clause
/// ```
pub const THUNK_SIZE: u32 = 4;

/// Where a predicate's thunk chain stands. `entry` is what callers jump to and never
/// moves once allocated, which is what lets calls be compiled before their callee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    /// Called but never defined; the thunk at `thunk` fails.
    Undefined { thunk: u32 },
    DefinedSingle { entry: u32 },
    /// `tail` is the thunk of the most recently added clause.
    DefinedChain { entry: u32, tail: u32 },
}

impl Predicate {
    pub fn entry(self) -> u32 {
        match self {
            Predicate::Undefined { thunk } => thunk,
            Predicate::DefinedSingle { entry } | Predicate::DefinedChain { entry, .. } => entry,
        }
    }

    pub fn is_defined(self) -> bool {
        match self {
            Predicate::Undefined { .. } => false,
            _ => true,
        }
    }
}

pub struct Program {
    code: Vec<u32>,
    top: u32,
    functors: FunctorTable,
    predicates: HashMap<FunctorDescriptor, Predicate>,
    callbacks: Vec<Callback>,
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Program")
            .field("top", &self.top)
            .field("functors", &self.functors.len())
            .field("predicates", &self.predicates)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl Program {
    pub fn new(code_size: usize) -> Self {
        let mut code = vec![0; code_size.max(THUNK_SIZE as usize)];
        code[0] = Opcode::Halt as u32;

        Self {
            code,
            top: 1,
            functors: FunctorTable::new(),
            predicates: HashMap::new(),
            callbacks: Vec::new(),
        }
    }

    #[inline]
    pub fn code(&self) -> &[u32] {
        &self.code[..self.top as usize]
    }

    #[inline]
    pub fn top(&self) -> u32 {
        self.top
    }

    #[inline]
    pub fn fetch(&self, at: i32) -> Result<u32, Error> {
        if at < 0 || at as usize >= self.code.len() {
            return Err(Error::InvalidAddress(Address::Code(at)));
        }

        Ok(self.code[at as usize])
    }

    pub fn write(&mut self, at: u32, words: &[u32]) -> Result<(), Error> {
        let end = at as usize + words.len();
        if end > self.code.len() {
            return Err(Error::Exhausted {
                segment: Segment::Code,
                capacity: self.code.len(),
            });
        }

        self.code[at as usize..end].copy_from_slice(words);
        Ok(())
    }

    /// Writes `words` at the top of the code segment and claims them.
    pub fn append(&mut self, words: &[u32]) -> Result<u32, Error> {
        let at = self.top;
        self.write(at, words)?;
        self.top += words.len() as u32;
        Ok(at)
    }

    /// Gives back `at..end` if it is the most recently claimed code, returning whether
    /// it did.
    pub fn release(&mut self, at: u32, end: u32) -> bool {
        if end != self.top || at > end {
            return false;
        }

        self.top = at;
        true
    }

    #[inline]
    pub fn intern(&mut self, descriptor: &FunctorDescriptor) -> FunctorId {
        self.functors.intern(descriptor)
    }

    #[inline]
    pub fn functor(&self, id: FunctorId) -> Option<&FunctorDescriptor> {
        self.functors.get(id)
    }

    pub fn predicate(&self, descriptor: &FunctorDescriptor) -> Option<Predicate> {
        self.predicates.get(descriptor).cloned()
    }

    /// The entry thunk of a predicate, allocating a failing placeholder if nothing by
    /// that name and arity has been seen yet.
    pub fn rule_pointer(&mut self, descriptor: &FunctorDescriptor) -> Result<u32, Error> {
        if let Some(predicate) = self.predicates.get(descriptor) {
            return Ok(predicate.entry());
        }

        let thunk = self.append(&[
            Opcode::Fail as u32,
            Opcode::Nop as u32,
            Opcode::Nop as u32,
            Opcode::Nop as u32,
        ])?;

        debug!(target: "warm::host", predicate = %descriptor, thunk, "forward reference");
        self.predicates
            .insert(descriptor.clone(), Predicate::Undefined { thunk });

        Ok(thunk)
    }

    fn dispatch(clause: u32) -> [u32; THUNK_SIZE as usize] {
        [
            Opcode::Nop as u32,
            Opcode::Nop as u32,
            Opcode::BranchAbsolute as u32,
            clause,
        ]
    }

    /// Makes the clause compiled at `clause` the last alternative of `descriptor`.
    pub fn append_clause(&mut self, descriptor: &FunctorDescriptor, clause: u32) -> Result<(), Error> {
        let next = match self.predicates.get(descriptor).cloned() {
            None => {
                let entry = self.append(&Self::dispatch(clause))?;
                Predicate::DefinedSingle { entry }
            }
            Some(Predicate::Undefined { thunk }) => {
                self.write(thunk, &Self::dispatch(clause))?;
                Predicate::DefinedSingle { entry: thunk }
            }
            Some(Predicate::DefinedSingle { entry: tail }) | Some(Predicate::DefinedChain { tail, .. }) => {
                let entry = self.predicates[descriptor].entry();
                let thunk = self.append(&Self::dispatch(clause))?;
                self.write(tail, &[Opcode::ChoicePoint as u32, thunk])?;
                Predicate::DefinedChain { entry, tail: thunk }
            }
        };

        debug!(target: "warm::host", predicate = %descriptor, clause, ?next, "clause appended");
        self.predicates.insert(descriptor.clone(), next);
        Ok(())
    }

    pub fn add_callback(&mut self, callback: Callback) -> u32 {
        self.callbacks.push(callback);
        (self.callbacks.len() - 1) as u32
    }

    pub fn callback(&self, index: usize) -> Option<Callback> {
        self.callbacks.get(index).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warm_ir::Atom;

    fn decode(program: &Program, at: u32) -> Option<Opcode> {
        Opcode::decode(program.code()[at as usize])
    }

    #[test]
    fn forward_reference_is_patched_in_place() {
        let mut program = Program::new(64);
        let p = FunctorDescriptor::new(Atom::from("p"), 1);

        let entry = program.rule_pointer(&p).unwrap();
        assert_eq!(decode(&program, entry), Some(Opcode::Fail));

        program.append_clause(&p, 40).unwrap();
        assert_eq!(program.predicate(&p), Some(Predicate::DefinedSingle { entry }));
        assert_eq!(decode(&program, entry + 2), Some(Opcode::BranchAbsolute));
        assert_eq!(program.code()[(entry + 3) as usize], 40);
    }

    #[test]
    fn later_clauses_chain_through_choice_points() {
        let mut program = Program::new(64);
        let p = FunctorDescriptor::new(Atom::from("p"), 0);

        program.append_clause(&p, 10).unwrap();
        let entry = program.rule_pointer(&p).unwrap();
        program.append_clause(&p, 20).unwrap();
        program.append_clause(&p, 30).unwrap();

        let second = match program.predicate(&p) {
            Some(Predicate::DefinedChain { entry: e, tail }) => {
                assert_eq!(e, entry);
                tail - THUNK_SIZE
            }
            other => panic!("unexpected {:?}", other),
        };

        assert_eq!(decode(&program, entry), Some(Opcode::ChoicePoint));
        assert_eq!(program.code()[(entry + 1) as usize], second);
        assert_eq!(decode(&program, second), Some(Opcode::ChoicePoint));
        assert_eq!(decode(&program, second + THUNK_SIZE), Some(Opcode::Nop));
    }

    #[test]
    fn only_the_newest_code_is_released() {
        let mut program = Program::new(64);
        let first = program.append(&[0; 4]).unwrap();
        let second = program.append(&[0; 4]).unwrap();

        assert!(!program.release(first, second));
        assert!(program.release(second, second + 4));
        assert_eq!(program.top(), second);
    }

    #[test]
    fn code_exhaustion_is_an_error() {
        let mut program = Program::new(8);
        assert!(program.append(&[0; 4]).is_ok());
        assert!(program.append(&[0; 4]).is_err());
    }
}
