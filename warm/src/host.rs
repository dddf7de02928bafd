//! The embedding surface: a rule database over a single machine.

use ::{
    itertools::Itertools,
    std::rc::Rc,
    tracing::debug,
    warm_ir::{Atom, CompoundTerm, Rule, Term, Variable},
};

use crate::{
    codegen::CodeGenerator,
    compiler::compile_rule,
    config::MachineConfig,
    error::Error,
    functor::FunctorDescriptor,
    machine::Machine,
    opcode::Opcode,
    query::QueryResult,
};

mod builtins;

/// Owns a [`Machine`] and everything compiled into it.
///
/// Rules are compiled and linked as they are added; predicates may be called before
/// they are defined, and clauses are tried in the order they were added.
#[derive(Debug)]
pub struct Host {
    machine: Machine,
    /// Code claimed by the last query, reclaimed by the next one when possible.
    scratch: Option<(u32, u32)>,
}

impl Host {
    pub fn new() -> Result<Self, Error> {
        Self::with_config(MachineConfig::default())
    }

    /// A host with the builtin predicates installed.
    pub fn with_config(config: MachineConfig) -> Result<Self, Error> {
        let mut host = Self {
            machine: Machine::new(config),
            scratch: None,
        };

        builtins::install(&mut host)?;
        debug!(
            target: "warm::host",
            code = host.machine.program().top(),
            "builtins installed"
        );

        Ok(host)
    }

    #[inline]
    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    /// Compiles `rule` and makes it the last clause of its predicate.
    pub fn add_rule(&mut self, rule: &Rule) -> Result<(), Error> {
        let trace = self.machine.config().trace;
        self.add_clause(rule, trace)
    }

    pub fn add_rules<'a, I>(&mut self, rules: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = &'a Rule>,
    {
        for rule in rules {
            self.add_rule(rule)?;
        }

        Ok(())
    }

    fn add_clause(&mut self, rule: &Rule, trace: bool) -> Result<(), Error> {
        let program = self.machine.program_mut();
        let code = compile_rule(program, rule, trace)?;
        let clause = program.append(&code)?;

        debug!(target: "warm::host", %rule, clause, len = code.len(), "rule compiled");
        program.append_clause(&FunctorDescriptor::of(&rule.head), clause)
    }

    /// Links hand-assembled code as a clause of `descriptor`.
    fn add_code(&mut self, descriptor: &FunctorDescriptor, code: &[u32]) -> Result<(), Error> {
        let program = self.machine.program_mut();
        let clause = program.append(code)?;
        program.append_clause(descriptor, clause)
    }

    /// Defines `name/arity` as a native predicate.
    ///
    /// The callback finds the goal's arguments at `machine.argument(0..arity)`. It may
    /// bind them through [`Machine::unify`], push arguments and [`Machine::call`] into
    /// compiled code (which then runs once the callback returns), or return `Ok(false)`
    /// to fail the goal.
    pub fn define_native<A, F>(&mut self, name: A, arity: u32, callback: F) -> Result<(), Error>
    where
        A: Into<Atom>,
        F: Fn(&mut Machine) -> Result<bool, Error> + 'static,
    {
        let descriptor = FunctorDescriptor::new(name.into(), arity);
        let index = self.machine.program_mut().add_callback(Rc::new(callback));

        // The frame saves CP, so a callback that `call`s into compiled code still
        // returns to whoever called the native predicate.
        let mut gen = CodeGenerator::new();
        gen.emit_with(Opcode::Callback, index);
        let code = gen.generate(arity)?;

        debug!(target: "warm::host", predicate = %descriptor, index, "native defined");
        self.add_code(&descriptor, &code)
    }

    /// Runs `goals` as a conjunction and returns the first solution (if any).
    ///
    /// Every run starts from a clean machine: registers, stack, trail, heap and the
    /// retained segment are all reset, which also recovers from an error in a previous
    /// query.
    pub fn query(&mut self, goals: &[CompoundTerm]) -> Result<QueryResult<'_>, Error> {
        let variables = goals
            .iter()
            .flat_map(|goal| goal.variables())
            .filter(|var| !var.is_anonymous())
            .unique()
            .cloned()
            .collect::<Vec<Variable>>();

        let head = CompoundTerm::new("_query", variables.iter().cloned().map(Term::Variable));
        let rule = Rule::new(head, goals.to_vec());

        let program = self.machine.program_mut();
        if let Some((at, end)) = self.scratch.take() {
            program.release(at, end);
        }

        let code = compile_rule(program, &rule, false)?;
        let entry = program.append(&code)?;
        self.scratch = Some((entry, program.top()));

        debug!(target: "warm::host", query = %rule, entry, "query compiled");
        let success = self.machine.start(entry, variables.len())?;

        Ok(QueryResult::new(&mut self.machine, success, variables))
    }
}
