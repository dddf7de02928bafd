//! `warm` is an embeddable Prolog engine built on a small Warren-style abstract machine.
//!
//! Clauses arrive as [`warm_ir`] terms (parsing is left to the embedder), are compiled to
//! a compact bytecode, and run on a tagged-memory virtual machine with trail-based
//! backtracking. The pieces, leaf first:
//!
//! - [`word`]: the packed cell and address representation shared by every segment.
//! - [`trail`] and [`stack`]: the undo log and the operand stack that is checkpointed
//!   through it.
//! - [`machine`]: the interpreter loop, unification and term copying.
//! - [`codegen`] and [`compiler`]: lowering clauses to bytecode.
//! - [`program`]: the code segment, functor table and predicate dispatch thunks.
//! - [`host`]: the rule database and query entry point, with the builtin predicates.
//! - [`query`]: enumerating solutions and reading bindings back as terms.
//!
//! ```
//! use warm::prelude::*;
//!
//! # fn main() -> Result<(), warm::Error> {
//! let mut host = Host::new()?;
//! host.add_rule(&Rule::fact(CompoundTerm::new(
//!     "parent",
//!     vec![Term::atom("cronus"), Term::atom("zeus")],
//! )))?;
//!
//! let goal = CompoundTerm::new("parent", vec![Term::atom("cronus"), Term::var("Y")]);
//! let result = host.query(&[goal])?;
//! assert!(result.success());
//! assert_eq!(result.get_variable(&Variable::new("Y")), Some(Term::atom("zeus")));
//! # Ok(())
//! # }
//! ```
//!
//! The engine is single-threaded: a [`Host`] owns its [`Machine`] outright, and a
//! [`QueryResult`] borrows the host until it is dropped.

pub mod codegen;
pub mod compiler;
pub mod config;
pub mod error;
pub mod functor;
pub mod host;
pub mod machine;
pub mod opcode;
pub mod program;
pub mod query;
pub mod stack;
pub mod trail;
pub mod word;

pub use crate::{
    config::MachineConfig,
    error::{Error, Segment},
    functor::{FunctorDescriptor, FunctorId},
    host::Host,
    machine::{CloneMode, Machine, Region, StepResult},
    program::{Callback, Predicate, Program},
    query::QueryResult,
    word::{Address, Cell, GlobalRegister, Tag, Word},
};

pub use warm_ir as ir;

pub mod prelude {
    pub use crate::{Error, Host, Machine, MachineConfig, QueryResult};
    pub use warm_ir::prelude::*;
}
