use ::{
    derive_more::From,
    derive_new::new,
    itertools::Itertools,
    lazy_static::lazy_static,
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Interned names, shared by atoms, functors and variables.
pub type Atom = string_cache::DefaultAtom;

lazy_static! {
    /// The functor of a list cell, `_list(Head, Tail)`.
    pub static ref LIST: Atom = Atom::from("_list");

    /// The atom terminating a proper list.
    pub static ref EMPTY_LIST: Atom = Atom::from("_emptyList");

    /// The functor wrapping the code point list of a string literal.
    pub static ref STRING: Atom = Atom::from("_string");
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Variable {
    name: Atom,
}

impl Variable {
    pub fn new<A: Into<Atom>>(name: A) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn atom(&self) -> &Atom {
        &self.name
    }

    /// `_` never shares a binding with any other occurrence, itself included.
    pub fn is_anonymous(&self) -> bool {
        &*self.name == "_"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompoundTerm {
    pub functor: Atom,
    pub terms: Vec<Term>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, From)]
pub enum Term {
    Atom(Atom),
    Variable(Variable),
    Compound(CompoundTerm),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, new)]
pub struct Rule {
    pub head: CompoundTerm,
    pub goals: Vec<CompoundTerm>,
}

impl CompoundTerm {
    pub fn new<A, I>(functor: A, terms: I) -> Self
    where
        A: Into<Atom>,
        I: IntoIterator<Item = Term>,
    {
        Self {
            functor: functor.into(),
            terms: terms.into_iter().collect(),
        }
    }

    pub fn atom<A: Into<Atom>>(functor: A) -> Self {
        Self::new(functor, Vec::new())
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.terms.len()
    }

    /// Every variable in the term, in depth-first first-occurrence order, repeats included.
    pub fn variables(&self) -> Vec<&Variable> {
        let mut found = Vec::new();
        let mut stack: Vec<&Term> = self.terms.iter().rev().collect();

        while let Some(term) = stack.pop() {
            match term {
                Term::Atom(_) => {}
                Term::Variable(var) => found.push(var),
                Term::Compound(compound) => stack.extend(compound.terms.iter().rev()),
            }
        }

        found
    }
}

impl Term {
    pub fn atom<A: Into<Atom>>(name: A) -> Self {
        Term::Atom(name.into())
    }

    pub fn var<A: Into<Atom>>(name: A) -> Self {
        Term::Variable(Variable::new(name))
    }

    pub fn compound<A, I>(functor: A, terms: I) -> Self
    where
        A: Into<Atom>,
        I: IntoIterator<Item = Term>,
    {
        Term::Compound(CompoundTerm::new(functor, terms))
    }

    pub fn empty_list() -> Self {
        Term::Atom(EMPTY_LIST.clone())
    }

    pub fn list<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Term>,
        I::IntoIter: DoubleEndedIterator,
    {
        Self::list_with_tail(items, Self::empty_list())
    }

    pub fn list_with_tail<I>(items: I, tail: Term) -> Self
    where
        I: IntoIterator<Item = Term>,
        I::IntoIter: DoubleEndedIterator,
    {
        items.into_iter().rev().fold(tail, |tail, head| {
            Term::Compound(CompoundTerm {
                functor: LIST.clone(),
                terms: vec![head, tail],
            })
        })
    }

    pub fn string(s: &str) -> Self {
        let codes = s.chars().map(|c| Term::atom((c as u32).to_string()));
        Term::compound(STRING.clone(), vec![Term::list(codes.collect::<Vec<_>>())])
    }

    pub fn is_empty_list(&self) -> bool {
        match self {
            Term::Atom(atom) => *atom == *EMPTY_LIST,
            Term::Compound(c) => c.terms.is_empty() && c.functor == *EMPTY_LIST,
            Term::Variable(_) => false,
        }
    }

    /// Splits a `_list` chain into its elements and whatever terminates it.
    pub fn list_parts(&self) -> (Vec<&Term>, &Term) {
        let mut items = Vec::new();
        let mut current = self;

        while let Term::Compound(c) = current {
            if c.functor != *LIST || c.terms.len() != 2 {
                break;
            }

            items.push(&c.terms[0]);
            current = &c.terms[1];
        }

        (items, current)
    }

    /// The elements of a proper list, or `None` if this is not one.
    pub fn list_items(&self) -> Option<Vec<&Term>> {
        let (items, tail) = self.list_parts();
        if tail.is_empty_list() {
            Some(items)
        } else {
            None
        }
    }

    pub fn as_atom(&self) -> Option<&Atom> {
        match self {
            Term::Atom(atom) => Some(atom),
            Term::Compound(c) if c.terms.is_empty() => Some(&c.functor),
            _ => None,
        }
    }

    pub fn as_compound(&self) -> Option<&CompoundTerm> {
        match self {
            Term::Compound(c) => Some(c),
            _ => None,
        }
    }
}

impl From<CompoundTerm> for Rule {
    fn from(head: CompoundTerm) -> Self {
        Rule::fact(head)
    }
}

impl Rule {
    pub fn fact(head: CompoundTerm) -> Self {
        Self {
            head,
            goals: Vec::new(),
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Display for CompoundTerm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.terms.is_empty() {
            return write_atom(&self.functor, f);
        }

        if self.functor == *LIST && self.terms.len() == 2 {
            let (items, tail) = Term::list_parts_of(self);
            write!(f, "[{}", items.iter().format(", "))?;
            if !tail.is_empty_list() {
                write!(f, " | {}", tail)?;
            }
            return f.write_str("]");
        }

        if self.functor == *STRING && self.terms.len() == 1 {
            let decoded = self.terms[0].list_items().and_then(|codes| {
                codes
                    .into_iter()
                    .map(|code| {
                        code.as_atom()
                            .and_then(|a| a.parse::<u32>().ok())
                            .and_then(std::char::from_u32)
                    })
                    .collect::<Option<String>>()
            });

            if let Some(s) = decoded {
                return write!(f, "{:?}", s);
            }
        }

        write!(f, "{}({})", self.functor, self.terms.iter().format(", "))
    }
}

impl Term {
    fn list_parts_of(cell: &CompoundTerm) -> (Vec<&Term>, &Term) {
        let (mut items, tail) = cell.terms[1].list_parts();
        items.insert(0, &cell.terms[0]);
        (items, tail)
    }
}

fn write_atom(atom: &Atom, f: &mut fmt::Formatter) -> fmt::Result {
    if *atom == *EMPTY_LIST {
        f.write_str("[]")
    } else {
        f.write_str(atom)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Term::Atom(atom) => write_atom(atom, f),
            Term::Variable(var) => var.fmt(f),
            Term::Compound(compound) => compound.fmt(f),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.goals.is_empty() {
            write!(f, "{}.", self.head)
        } else {
            write!(f, "{} :- {}.", self.head, self.goals.iter().format(", "))
        }
    }
}
