//! A small assembler: straight-line emission plus forward-patchable labels and
//! monotonically numbered local slots.

use ::{derive_more::Display, smallvec::SmallVec};

use crate::{error::Error, opcode::Opcode};

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[display(fmt = "L{}", _0)]
pub struct Label(usize);

/// A slot in the activation record, addressed as `E + 3 + index` at runtime.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[display(fmt = "local{}", _0)]
pub struct Local(pub u32);

#[derive(Debug, Default)]
pub struct CodeGenerator {
    code: Vec<u32>,
    /// Code position each label was marked at, if it has been.
    marks: Vec<Option<u32>>,
    /// `(label, opcode position)` for every instruction waiting on a label.
    fixups: SmallVec<[(Label, u32); 16]>,
    locals: u32,
}

impl CodeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The position the next instruction will be emitted at.
    #[inline]
    pub fn position(&self) -> u32 {
        self.code.len() as u32
    }

    #[inline]
    pub fn locals(&self) -> u32 {
        self.locals
    }

    pub fn local(&mut self) -> Local {
        let local = Local(self.locals);
        self.locals += 1;
        local
    }

    pub fn label(&mut self) -> Label {
        self.marks.push(None);
        Label(self.marks.len() - 1)
    }

    /// Binds `label` to the current position.
    pub fn mark(&mut self, label: Label) {
        self.marks[label.0] = Some(self.position());
    }

    pub fn emit(&mut self, opcode: Opcode) -> &mut Self {
        debug_assert!(!opcode.has_operand(), "{:?} needs an operand", opcode);
        self.code.push(opcode.into());
        self
    }

    pub fn emit_with(&mut self, opcode: Opcode, operand: u32) -> &mut Self {
        debug_assert!(opcode.has_operand(), "{:?} takes no operand", opcode);
        self.code.push(opcode.into());
        self.code.push(operand);
        self
    }

    /// Emits a relative branch (or relative choice point) to `label`, marked or not.
    pub fn emit_branch(&mut self, opcode: Opcode, label: Label) -> &mut Self {
        debug_assert!(opcode.is_relative(), "{:?} is not a relative instruction", opcode);
        let at = self.position();
        self.fixups.push((label, at));
        self.emit_with(opcode, 0)
    }

    #[inline]
    pub fn emit_local(&mut self, opcode: Opcode, local: Local) -> &mut Self {
        self.emit_with(opcode, local.0)
    }

    /// Resolves every label reference and returns the raw code. Offsets are relative to
    /// the referencing opcode, so the result can be placed anywhere.
    pub fn finish(mut self) -> Result<Vec<u32>, Error> {
        self.patch()?;
        Ok(self.code)
    }

    /// Like [`finish`](Self::finish), but wraps the body in a clause frame:
    /// `Allocate(locals) <body> Deallocate(argc) Proceed`.
    pub fn generate(mut self, argc: u32) -> Result<Vec<u32>, Error> {
        self.patch()?;

        let mut code = Vec::with_capacity(self.code.len() + 5);
        code.extend_from_slice(&[Opcode::Allocate.into(), self.locals]);
        code.extend(self.code);
        code.extend_from_slice(&[Opcode::Deallocate.into(), argc, Opcode::Proceed.into()]);

        Ok(code)
    }

    fn patch(&mut self) -> Result<(), Error> {
        for &(label, at) in self.fixups.iter() {
            let target = self.marks[label.0]
                .ok_or_else(|| Error::MalformedTerm(format!("branch to unmarked label {}", label)))?;
            self.code[at as usize + 1] = (target as i32 - at as i32) as u32;
        }

        self.fixups.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_and_backward_labels_are_relative() {
        let mut gen = CodeGenerator::new();
        let top = gen.label();
        let end = gen.label();

        gen.mark(top);
        gen.emit(Opcode::Nop);
        gen.emit_branch(Opcode::BranchEqual, end);
        gen.emit_branch(Opcode::BranchAlways, top);
        gen.mark(end);
        gen.emit(Opcode::Halt);

        let code = gen.finish().unwrap();
        assert_eq!(code[2], 4);
        assert_eq!(code[4] as i32, -3);
    }

    #[test]
    fn generate_wraps_the_body_in_a_frame() {
        let mut gen = CodeGenerator::new();
        let a = gen.local();
        let b = gen.local();
        assert_ne!(a, b);

        let done = gen.label();
        gen.emit_local(Opcode::LoadLocal, a);
        gen.emit_branch(Opcode::BranchAlways, done);
        gen.mark(done);

        let code = gen.generate(3).unwrap();
        assert_eq!(Opcode::decode(code[0]), Some(Opcode::Allocate));
        assert_eq!(code[1], 2);
        // The branch lands on the epilogue even though it was marked at the end of the body.
        assert_eq!(code[5], 2);
        assert_eq!(Opcode::decode(code[6]), Some(Opcode::Deallocate));
        assert_eq!(code[7], 3);
        assert_eq!(Opcode::decode(code[8]), Some(Opcode::Proceed));
    }

    #[test]
    fn unmarked_label_is_an_error() {
        let mut gen = CodeGenerator::new();
        let nowhere = gen.label();
        gen.emit_branch(Opcode::BranchAlways, nowhere);
        assert!(gen.finish().is_err());
    }
}
