use crate::{
    error::Error,
    machine::{CloneMode, Machine, Region},
    word::{Address, Cell},
};

impl Machine {
    /// Unifies the terms at `left` and `right`, binding variables as needed.
    ///
    /// On failure the bindings made so far stay in place; the `Fail` that follows
    /// undoes them through the trail.
    pub fn unify(&mut self, left: Address, right: Address) -> Result<bool, Error> {
        self.pdl.clear();
        self.pdl.push((left, right));

        while let Some((l, r)) = self.pdl.pop() {
            let (l, r) = (self.deref(l)?, self.deref(r)?);
            if l == r {
                continue;
            }

            match (self.load(l)?.unpack(), self.load(r)?.unpack()) {
                (Cell::Ref(_), _) | (_, Cell::Ref(_)) => self.bind(l, r)?,
                (Cell::Con(f), Cell::Con(g)) => {
                    if f != g {
                        return Ok(false);
                    }
                }
                (Cell::Lis(p), Cell::Lis(q)) => {
                    if p != q {
                        self.pdl.push((p + 1, q + 1));
                        self.pdl.push((p, q));
                    }
                }
                (Cell::Str(p), Cell::Str(q)) => {
                    if p == q {
                        continue;
                    }

                    let (f, g) = (self.functor_at(p)?, self.functor_at(q)?);
                    if f != g {
                        return Ok(false);
                    }

                    for i in (1..=f.arity as i32).rev() {
                        self.pdl.push((p + i, q + i));
                    }
                }
                (Cell::Non(x), Cell::Non(y)) => {
                    if x != y {
                        return Ok(false);
                    }
                }
                _ => return Ok(false),
            }
        }

        Ok(true)
    }

    /// Binds whichever of the two (dereferenced) addresses holds an unbound variable.
    ///
    /// When both do, the newer one is bound to the older one: addresses order as
    /// Retained < Heap < Stack and by offset within a segment, so references never point
    /// into storage that can be reclaimed before them. A retained variable may only
    /// ever refer to retained cells, so a value from anywhere else is copied into the
    /// retained segment first.
    pub fn bind(&mut self, first: Address, second: Address) -> Result<(), Error> {
        let (a, b) = (self.load(first)?, self.load(second)?);

        let first_is_var = match a.unpack() {
            Cell::Ref(_) => true,
            _ => false,
        };
        let second_is_var = match b.unpack() {
            Cell::Ref(_) => true,
            _ => false,
        };

        let (var, source, mut value) = if first_is_var && (!second_is_var || second < first) {
            (first, second, b)
        } else {
            (second, first, a)
        };

        if var.is_retained() && !source.is_retained() {
            value = self.clone_term(value, Region::Retained, CloneMode::Share)?;
        }

        self.store(var, value)
    }
}
