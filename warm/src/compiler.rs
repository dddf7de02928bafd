//! Lowers clauses into bytecode.
//!
//! Head arguments are matched breadth-first. Each argument that is a structure or a
//! list gets both a write path, taken when the argument dereferences to an unbound
//! variable, and a read path that walks the cells already there. Structures nested
//! inside a head argument are matched through a temporary local once the enclosing
//! argument is done; in write mode that temporary is a fresh variable which the nested
//! match then binds.
//!
//! Body goals build their arguments on the heap bottom-up (`set_*`), push them in
//! reverse so argument 0 ends up on top, and `Call` the predicate's entry thunk.

use ::{
    std::collections::{HashMap, VecDeque},
    warm_ir::{Atom, CompoundTerm, Rule, Term, LIST},
};

use crate::{
    codegen::{CodeGenerator, Local},
    error::Error,
    functor::{FunctorDescriptor, FunctorId},
    opcode::Opcode,
    program::Program,
    word::Tag,
};

/// Late-bound lookups the compiler needs. Either may hand back a placeholder that is
/// filled in when the functor or predicate is defined later.
pub trait Resolver {
    fn functor(&mut self, descriptor: &FunctorDescriptor) -> FunctorId;
    fn rule_pointer(&mut self, descriptor: &FunctorDescriptor) -> Result<u32, Error>;
}

impl Resolver for Program {
    fn functor(&mut self, descriptor: &FunctorDescriptor) -> FunctorId {
        self.intern(descriptor)
    }

    fn rule_pointer(&mut self, descriptor: &FunctorDescriptor) -> Result<u32, Error> {
        Program::rule_pointer(self, descriptor)
    }
}

/// Compiles `rule` into a relocatable clause body. With `trace` set, the body reports
/// entry and exit through `Trace`/`EndTrace`.
pub fn compile_rule<R>(resolver: &mut R, rule: &Rule, trace: bool) -> Result<Vec<u32>, Error>
where
    R: Resolver + ?Sized,
{
    Compiler::new(resolver).clause(rule, trace)
}

/// Where a head match reads its subject from.
#[derive(Debug, Clone, Copy)]
enum Source {
    Argument(u32),
    Local(Local),
    /// The cell under the structure cursor.
    Cursor,
}

enum Shape<'t> {
    Void,
    Variable(&'t Atom),
    Constant(FunctorDescriptor),
    Structure(&'t CompoundTerm),
    List(&'t CompoundTerm),
}

fn shape(term: &Term) -> Result<Shape, Error> {
    Ok(match term {
        Term::Atom(name) => Shape::Constant(FunctorDescriptor::constant(name.clone())),
        Term::Variable(var) if var.is_anonymous() => Shape::Void,
        Term::Variable(var) => Shape::Variable(var.atom()),
        Term::Compound(c) if c.functor == *LIST => {
            if c.arity() != 2 {
                return Err(Error::MalformedTerm(format!(
                    "list cell with {} arguments: {}",
                    c.arity(),
                    c
                )));
            }

            Shape::List(c)
        }
        Term::Compound(c) if c.terms.is_empty() => Shape::Constant(FunctorDescriptor::constant(c.functor.clone())),
        Term::Compound(c) => Shape::Structure(c),
    })
}

/// How one argument of a head structure is matched.
enum Slot<'t> {
    Void,
    First(Local),
    Repeat(Local),
    Constant(FunctorId),
    Nested(Local, &'t CompoundTerm),
}

enum Occurrence {
    First(Local),
    Repeat(Local),
}

/// A built body argument, ready to be pushed.
#[derive(Debug, Clone, Copy)]
enum Value {
    Local(Local),
    Constant(FunctorId),
}

struct Compiler<'r, R: Resolver + ?Sized> {
    resolver: &'r mut R,
    gen: CodeGenerator,
    variables: HashMap<Atom, Local>,
    /// `(deref, cursor)`, allocated on first use.
    scratch: Option<(Local, Local)>,
    cut: Option<Local>,
}

impl<'r, R: Resolver + ?Sized> Compiler<'r, R> {
    fn new(resolver: &'r mut R) -> Self {
        Self {
            resolver,
            gen: CodeGenerator::new(),
            variables: HashMap::new(),
            scratch: None,
            cut: None,
        }
    }

    fn clause(mut self, rule: &Rule, trace: bool) -> Result<Vec<u32>, Error> {
        if rule.goals.iter().any(is_cut) {
            let cut = self.gen.local();
            self.gen.emit(Opcode::LoadGlobalRegisterB0).emit_local(Opcode::StoreLocal, cut);
            self.cut = Some(cut);
        }

        let traced = if trace {
            let functor = self.resolver.functor(&FunctorDescriptor::of(&rule.head));
            self.gen.emit_with(Opcode::Trace, functor.0);
            Some(functor)
        } else {
            None
        };

        self.head(&rule.head)?;
        for goal in rule.goals.iter() {
            self.goal(goal)?;
        }

        if let Some(functor) = traced {
            self.gen.emit_with(Opcode::EndTrace, functor.0);
        }

        self.gen.generate(rule.head.arity() as u32)
    }

    fn scratch(&mut self) -> (Local, Local) {
        match self.scratch {
            Some(scratch) => scratch,
            None => {
                let scratch = (self.gen.local(), self.gen.local());
                self.scratch = Some(scratch);
                scratch
            }
        }
    }

    fn variable(&mut self, name: &Atom) -> Occurrence {
        match self.variables.get(name) {
            Some(&local) => Occurrence::Repeat(local),
            None => {
                let local = self.gen.local();
                self.variables.insert(name.clone(), local);
                Occurrence::First(local)
            }
        }
    }

    fn h(&mut self) -> &mut CodeGenerator {
        self.gen.emit(Opcode::LoadGlobalRegisterH)
    }

    fn bump_h(&mut self) {
        self.h().emit(Opcode::Increment).emit(Opcode::StoreGlobalRegisterH);
    }

    fn push_source(&mut self, source: Source) {
        match source {
            Source::Argument(i) => self.gen.emit_with(Opcode::LoadArgumentAddress, i),
            Source::Local(local) => self.gen.emit_local(Opcode::LoadLocalAddress, local),
            Source::Cursor => {
                let (_, cursor) = self.scratch();
                self.gen.emit_local(Opcode::LoadLocal, cursor)
            }
        };
    }

    fn head(&mut self, head: &CompoundTerm) -> Result<(), Error> {
        let mut pending = VecDeque::new();

        for (i, term) in head.terms.iter().enumerate() {
            let source = Source::Argument(i as u32);
            match shape(term)? {
                Shape::Void => {}
                Shape::Variable(name) => match self.variable(name) {
                    Occurrence::First(local) => self.get_variable(source, local),
                    Occurrence::Repeat(local) => self.get_value(source, local),
                },
                Shape::Constant(descriptor) => {
                    let functor = self.resolver.functor(&descriptor);
                    self.get_constant(source, functor);
                }
                Shape::Structure(c) => self.get_compound(source, c, false, &mut pending)?,
                Shape::List(c) => self.get_compound(source, c, true, &mut pending)?,
            }
        }

        while let Some((local, c)) = pending.pop_front() {
            let is_list = c.functor == *LIST;
            self.get_compound(Source::Local(local), c, is_list, &mut pending)?;
        }

        Ok(())
    }

    fn get_variable(&mut self, source: Source, local: Local) {
        self.push_source(source);
        self.gen.emit(Opcode::Load).emit_local(Opcode::StoreLocal, local);
    }

    fn get_value(&mut self, source: Source, local: Local) {
        self.push_source(source);
        self.gen
            .emit_local(Opcode::LoadLocalAddress, local)
            .emit(Opcode::Unify);
    }

    fn get_constant(&mut self, source: Source, functor: FunctorId) {
        let (deref, _) = self.scratch();
        let read = self.gen.label();
        let done = self.gen.label();

        self.push_source(source);
        self.gen.emit(Opcode::Deref).emit_local(Opcode::StoreLocal, deref);
        self.test_tag(deref, Tag::Ref);
        self.gen.emit_branch(Opcode::BranchNotEqual, read);

        self.gen
            .emit_local(Opcode::LoadLocal, deref)
            .emit_with(Opcode::LoadConstant, functor.0)
            .emit(Opcode::ApplyTagCon)
            .emit(Opcode::Store)
            .emit_branch(Opcode::BranchAlways, done);

        self.gen.mark(read);
        self.gen
            .emit_local(Opcode::LoadLocal, deref)
            .emit(Opcode::Load)
            .emit_with(Opcode::LoadConstant, functor.0)
            .emit(Opcode::ApplyTagCon)
            .emit_branch(Opcode::BranchEqual, done)
            .emit(Opcode::Fail);

        self.gen.mark(done);
    }

    /// Leaves two words on the stack that are equal iff the cell `deref` points at has
    /// tag `tag`.
    fn test_tag(&mut self, deref: Local, tag: Tag) {
        self.gen
            .emit_local(Opcode::LoadLocal, deref)
            .emit(Opcode::Load)
            .emit(Opcode::GetTag)
            .emit_with(Opcode::LoadConstant, tag as u32);
    }

    fn plan<'t>(&mut self, term: &'t Term) -> Result<Slot<'t>, Error> {
        Ok(match shape(term)? {
            Shape::Void => Slot::Void,
            Shape::Variable(name) => match self.variable(name) {
                Occurrence::First(local) => Slot::First(local),
                Occurrence::Repeat(local) => Slot::Repeat(local),
            },
            Shape::Constant(descriptor) => Slot::Constant(self.resolver.functor(&descriptor)),
            Shape::Structure(c) | Shape::List(c) => Slot::Nested(self.gen.local(), c),
        })
    }

    fn get_compound<'t>(
        &mut self,
        source: Source,
        compound: &'t CompoundTerm,
        is_list: bool,
        pending: &mut VecDeque<(Local, &'t CompoundTerm)>,
    ) -> Result<(), Error> {
        let (deref, cursor) = self.scratch();
        let slots = compound
            .terms
            .iter()
            .map(|term| self.plan(term))
            .collect::<Result<Vec<_>, _>>()?;

        let functor = if is_list {
            None
        } else {
            Some(self.resolver.functor(&FunctorDescriptor::of(compound)))
        };

        let read = self.gen.label();
        let fail = self.gen.label();
        let done = self.gen.label();

        self.push_source(source);
        self.gen.emit(Opcode::Deref).emit_local(Opcode::StoreLocal, deref);
        self.test_tag(deref, Tag::Ref);
        self.gen.emit_branch(Opcode::BranchNotEqual, read);

        // Write mode: build the cell and its arguments, then bind the variable to it.
        // Binding last means a retained variable copies a fully written term.
        let tag = if is_list { Opcode::ApplyTagLis } else { Opcode::ApplyTagStr };
        self.h()
            .emit(Opcode::Duplicate)
            .emit(Opcode::Increment)
            .emit(tag)
            .emit(Opcode::Store);
        self.h().emit_local(Opcode::StoreLocal, cursor);

        match functor {
            Some(functor) => {
                self.h()
                    .emit(Opcode::Increment)
                    .emit_with(Opcode::LoadConstant, functor.0)
                    .emit(Opcode::ApplyTagFun)
                    .emit(Opcode::Store);
                self.h()
                    .emit_with(Opcode::LoadConstant, 2)
                    .emit(Opcode::Add)
                    .emit(Opcode::StoreGlobalRegisterH);
            }
            None => self.bump_h(),
        }

        for slot in slots.iter() {
            self.unify_write(slot);
        }

        self.gen
            .emit_local(Opcode::LoadLocal, deref)
            .emit_local(Opcode::LoadLocal, cursor)
            .emit(Opcode::Bind)
            .emit_branch(Opcode::BranchAlways, done);

        // Read mode.
        self.gen.mark(read);
        self.test_tag(deref, if is_list { Tag::Lis } else { Tag::Str });
        self.gen
            .emit_branch(Opcode::BranchNotEqual, fail)
            .emit_local(Opcode::LoadLocal, deref)
            .emit(Opcode::Load)
            .emit(Opcode::GetAddress)
            .emit_local(Opcode::StoreLocal, cursor);

        if let Some(functor) = functor {
            self.gen
                .emit_local(Opcode::LoadLocal, cursor)
                .emit(Opcode::Load)
                .emit_with(Opcode::LoadConstant, functor.0)
                .emit(Opcode::ApplyTagFun)
                .emit_branch(Opcode::BranchNotEqual, fail);
            self.advance_cursor(cursor);
        }

        for (i, slot) in slots.iter().enumerate() {
            if i > 0 {
                self.advance_cursor(cursor);
            }
            self.unify_read(slot);
        }

        self.gen.emit_branch(Opcode::BranchAlways, done);
        self.gen.mark(fail);
        self.gen.emit(Opcode::Fail);
        self.gen.mark(done);

        for slot in slots {
            if let Slot::Nested(local, c) = slot {
                pending.push_back((local, c));
            }
        }

        Ok(())
    }

    fn advance_cursor(&mut self, cursor: Local) {
        self.gen
            .emit_local(Opcode::LoadLocal, cursor)
            .emit(Opcode::Increment)
            .emit_local(Opcode::StoreLocal, cursor);
    }

    fn unify_write(&mut self, slot: &Slot) {
        match *slot {
            Slot::Void => {
                self.fresh_variable(None);
                return;
            }
            Slot::First(local) | Slot::Nested(local, _) => {
                self.fresh_variable(Some(local));
                return;
            }
            Slot::Repeat(local) => {
                self.h().emit_local(Opcode::LoadLocal, local);
            }
            Slot::Constant(functor) => {
                self.h()
                    .emit_with(Opcode::LoadConstant, functor.0)
                    .emit(Opcode::ApplyTagCon);
            }
        }

        self.gen.emit(Opcode::Store);
        self.bump_h();
    }

    fn unify_read(&mut self, slot: &Slot) {
        match *slot {
            Slot::Void => {}
            Slot::First(local) | Slot::Nested(local, _) => self.get_variable(Source::Cursor, local),
            Slot::Repeat(local) => self.get_value(Source::Cursor, local),
            Slot::Constant(functor) => self.get_constant(Source::Cursor, functor),
        }
    }

    /// `heap[H] = Ref(H)`, optionally remembered in `local`, then `H += 1`.
    fn fresh_variable(&mut self, local: Option<Local>) {
        self.h()
            .emit(Opcode::Duplicate)
            .emit(Opcode::ApplyTagRef)
            .emit(Opcode::Store);

        if let Some(local) = local {
            self.h().emit(Opcode::Load).emit_local(Opcode::StoreLocal, local);
        }

        self.bump_h();
    }

    fn goal(&mut self, goal: &CompoundTerm) -> Result<(), Error> {
        if is_cut(goal) {
            if let Some(cut) = self.cut {
                self.gen.emit_local(Opcode::LoadLocal, cut).emit(Opcode::Cut);
            }

            return Ok(());
        }

        let values = goal
            .terms
            .iter()
            .map(|term| self.build(term))
            .collect::<Result<Vec<_>, _>>()?;

        for &value in values.iter().rev() {
            self.push_value(value);
        }

        let entry = self.resolver.rule_pointer(&FunctorDescriptor::of(goal))?;
        self.gen.emit_with(Opcode::Call, entry);

        Ok(())
    }

    fn push_value(&mut self, value: Value) {
        match value {
            Value::Local(local) => {
                self.gen.emit_local(Opcode::LoadLocal, local);
            }
            Value::Constant(functor) => {
                self.gen
                    .emit_with(Opcode::LoadConstant, functor.0)
                    .emit(Opcode::ApplyTagCon);
            }
        }
    }

    /// `heap[H] = value`, then `H += 1`.
    fn set_value(&mut self, value: Value) {
        self.h();
        self.push_value(value);
        self.gen.emit(Opcode::Store);
        self.bump_h();
    }

    /// Builds `term` on the heap, innermost terms first.
    ///
    /// Post-order over an explicit worklist: a compound's arguments are built (and
    /// their values parked on `values`) before its own cells are written.
    fn build(&mut self, term: &Term) -> Result<Value, Error> {
        let mut work = vec![Build::Visit(term)];
        let mut values = Vec::new();

        while let Some(task) = work.pop() {
            match task {
                Build::Visit(term) => match shape(term)? {
                    Shape::Void => {
                        let local = self.gen.local();
                        self.fresh_variable(Some(local));
                        values.push(Value::Local(local));
                    }
                    Shape::Variable(name) => match self.variable(name) {
                        Occurrence::First(local) => {
                            self.fresh_variable(Some(local));
                            values.push(Value::Local(local));
                        }
                        Occurrence::Repeat(local) => values.push(Value::Local(local)),
                    },
                    Shape::Constant(descriptor) => {
                        values.push(Value::Constant(self.resolver.functor(&descriptor)))
                    }
                    Shape::Structure(c) => {
                        work.push(Build::Structure(c));
                        work.extend(c.terms.iter().rev().map(Build::Visit));
                    }
                    Shape::List(c) => {
                        work.push(Build::List);
                        work.extend(c.terms.iter().rev().map(Build::Visit));
                    }
                },
                Build::Structure(c) => {
                    let args = values.split_off(values.len() - c.arity());
                    let functor = self.resolver.functor(&FunctorDescriptor::of(c));
                    let local = self.gen.local();

                    self.h()
                        .emit(Opcode::Increment)
                        .emit(Opcode::ApplyTagStr)
                        .emit_local(Opcode::StoreLocal, local);
                    self.h().emit_local(Opcode::LoadLocal, local).emit(Opcode::Store);
                    self.h()
                        .emit(Opcode::Increment)
                        .emit_with(Opcode::LoadConstant, functor.0)
                        .emit(Opcode::ApplyTagFun)
                        .emit(Opcode::Store);
                    self.h()
                        .emit_with(Opcode::LoadConstant, 2)
                        .emit(Opcode::Add)
                        .emit(Opcode::StoreGlobalRegisterH);

                    for arg in args {
                        self.set_value(arg);
                    }

                    values.push(Value::Local(local));
                }
                Build::List => {
                    let args = values.split_off(values.len() - 2);
                    let local = self.gen.local();

                    self.h().emit(Opcode::ApplyTagLis).emit_local(Opcode::StoreLocal, local);
                    for arg in args {
                        self.set_value(arg);
                    }

                    values.push(Value::Local(local));
                }
            }
        }

        values
            .pop()
            .ok_or_else(|| Error::MalformedTerm(format!("nothing built for {}", term)))
    }
}

/// A pending step of `Compiler::build`.
enum Build<'t> {
    Visit(&'t Term),
    /// Writes a structure whose arguments are the newest `arity` values.
    Structure(&'t CompoundTerm),
    /// Writes a list cell from the newest two values.
    List,
}

fn is_cut(goal: &CompoundTerm) -> bool {
    goal.terms.is_empty() && &*goal.functor == "!"
}
