use ::{
    derive_more::{Display, From, Into},
    derive_new::new,
    std::collections::HashMap,
    warm_ir::{Atom, CompoundTerm},
};

/// Index of an interned functor; the operand of `Fun`/`Con` cells and of functor-typed
/// instructions.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
pub struct FunctorId(pub u32);

/// A predicate or term head, identified by value.
#[derive(Debug, Display, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, new)]
#[display(fmt = "{}/{}", name, arity)]
pub struct FunctorDescriptor {
    pub name: Atom,
    pub arity: u32,
}

impl FunctorDescriptor {
    pub fn of(term: &CompoundTerm) -> Self {
        Self::new(term.functor.clone(), term.arity() as u32)
    }

    pub fn constant(name: Atom) -> Self {
        Self::new(name, 0)
    }
}

/// Content-addressed functor interning.
#[derive(Debug, Default)]
pub struct FunctorTable {
    functors: Vec<FunctorDescriptor>,
    lookup: HashMap<FunctorDescriptor, FunctorId>,
}

impl FunctorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, descriptor: &FunctorDescriptor) -> FunctorId {
        if let Some(&id) = self.lookup.get(descriptor) {
            return id;
        }

        let id = FunctorId(self.functors.len() as u32);
        self.functors.push(descriptor.clone());
        self.lookup.insert(descriptor.clone(), id);
        id
    }

    pub fn get(&self, id: FunctorId) -> Option<&FunctorDescriptor> {
        self.functors.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.functors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functors.is_empty()
    }
}
