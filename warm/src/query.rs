use ::{
    std::collections::{HashMap, HashSet},
    warm_ir::{Atom, Term, Variable, LIST},
};

use crate::{
    error::Error,
    machine::Machine,
    word::{Address, Cell},
};

/// A running query. Holds the machine until dropped, so a host cannot be modified
/// while solutions are still being enumerated.
#[derive(Debug)]
pub struct QueryResult<'h> {
    machine: &'h mut Machine,
    success: bool,
    variables: Vec<Variable>,
}

impl<'h> QueryResult<'h> {
    pub(crate) fn new(machine: &'h mut Machine, success: bool, variables: Vec<Variable>) -> Self {
        Self {
            machine,
            success,
            variables,
        }
    }

    /// Whether the most recent attempt produced a solution.
    #[inline]
    pub fn success(&self) -> bool {
        self.success
    }

    /// The query's named variables, in order of first occurrence.
    #[inline]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// The current binding of `var`, rebuilt as a term. Unbound variables come back as
    /// variables named after their cell (`_H12`). `None` if there is no current
    /// solution or `var` is not part of the query.
    pub fn get_variable(&self, var: &Variable) -> Option<Term> {
        if !self.success {
            return None;
        }

        let index = self.variables.iter().position(|v| v == var)?;
        self.machine.term_at(Address::Heap(index as i32)).ok()
    }

    /// Every named variable paired with its current binding.
    pub fn bindings(&self) -> Vec<(Variable, Term)> {
        self.variables
            .iter()
            .filter_map(|var| self.get_variable(var).map(|term| (var.clone(), term)))
            .collect()
    }

    /// Backtracks for the next solution. Once no alternatives remain this returns
    /// `false` and leaves the machine untouched.
    pub fn resume(&mut self) -> Result<bool, Error> {
        if !self.machine.is_backtrack_available() {
            self.success = false;
            return Ok(false);
        }

        self.success = self.machine.resume()?;
        Ok(self.success)
    }

    #[inline]
    pub fn can_resume(&self) -> bool {
        self.machine.is_backtrack_available()
    }

    pub fn machine(&self) -> &Machine {
        self.machine
    }
}

enum Frame {
    Visit(Address),
    /// Pops `arity` finished arguments and assembles the term headed at `key`.
    Build {
        key: Address,
        functor: Atom,
        arity: usize,
    },
}

/// Reads the term stored at `address` back into an AST.
///
/// Structures and list cells reached more than once are rebuilt once and cloned. A
/// structure reached again while its own arguments are still being rebuilt is a cycle
/// (unification does no occurs check); the back edge comes out as a variable named
/// after the cell.
pub(crate) fn rebuild_term(machine: &Machine, address: Address) -> Result<Term, Error> {
    let mut frames = vec![Frame::Visit(address)];
    let mut output: Vec<Term> = Vec::new();
    let mut built: HashMap<Address, Term> = HashMap::new();
    let mut in_progress: HashSet<Address> = HashSet::new();

    while let Some(frame) = frames.pop() {
        match frame {
            Frame::Visit(address) => {
                let address = machine.deref(address)?;
                let (key, functor, arity, first) = match machine.load(address)?.unpack() {
                    Cell::Ref(_) => {
                        output.push(variable_at(address));
                        continue;
                    }
                    Cell::Con(id) => {
                        output.push(Term::Atom(machine.functor(id)?.name));
                        continue;
                    }
                    Cell::Str(p) => {
                        let descriptor = machine.functor_at(p)?;
                        (p, descriptor.name, descriptor.arity as usize, p + 1)
                    }
                    Cell::Lis(p) => (p, LIST.clone(), 2, p),
                    other => {
                        return Err(Error::MalformedTerm(format!(
                            "cannot rebuild a term from {:?} at {}",
                            other, address
                        )))
                    }
                };

                if in_progress.contains(&key) {
                    output.push(variable_at(key));
                } else if let Some(term) = built.get(&key) {
                    output.push(term.clone());
                } else {
                    in_progress.insert(key);
                    frames.push(Frame::Build { key, functor, arity });
                    for i in (0..arity as i32).rev() {
                        frames.push(Frame::Visit(first + i));
                    }
                }
            }
            Frame::Build { key, functor, arity } => {
                let args = output.split_off(output.len() - arity);
                let term = Term::compound(functor, args);
                in_progress.remove(&key);
                built.insert(key, term.clone());
                output.push(term);
            }
        }
    }

    output
        .pop()
        .ok_or_else(|| Error::MalformedTerm(format!("nothing to rebuild at {}", address)))
}

fn variable_at(address: Address) -> Term {
    Term::Variable(Variable::new(format!("_{}", address)))
}
