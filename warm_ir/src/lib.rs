//! The term representation consumed by the `warm` engine.
//!
//! A parser (not part of this workspace) lowers Prolog source into these types. The
//! shape is deliberately tiny: a term is an atom, a variable, or a compound term with a
//! functor name and an ordered list of argument terms. Clauses are [`Rule`]s, a head
//! plus an ordered list of goals, and queries are plain slices of [`CompoundTerm`].
//!
//! Lists and strings have no dedicated node types. They are lowered to reserved
//! functors instead:
//! - `[a, b | T]` is `_list(a, _list(b, T))`, and `[]` is the atom `_emptyList`.
//! - `"ab"` is `_string(_list(97, _list(98, _emptyList)))`.
//!
//! The helpers on [`Term`] build these shapes, and the `Display` impls print them back
//! with the usual sugar.

pub mod term;

pub use crate::term::{Atom, CompoundTerm, Rule, Term, Variable, EMPTY_LIST, LIST, STRING};

pub mod prelude {
    pub use crate::term::{Atom, CompoundTerm, Rule, Term, Variable};
}
