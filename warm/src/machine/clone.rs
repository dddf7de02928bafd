use ::{smallvec::SmallVec, std::collections::HashMap};

use crate::{
    error::Error,
    machine::Machine,
    word::{Address, Cell, Tag, Word},
};

/// Where a copied term is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Heap,
    Retained,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneMode {
    /// Unbound source variables are bound to their copies, so the copy stands in for
    /// the original. Terms already in the target region are shared, not copied.
    Share,
    /// Copies get variables of their own and the source is left untouched.
    Fresh,
}

type Copies = HashMap<(Tag, Address), Word>;
type Pending = SmallVec<[(Address, Address); 32]>;

impl Machine {
    /// Copies the term rooted at `root` (a cell value) into `region` and returns the
    /// cell for the copy.
    ///
    /// The walk is iterative. Each source variable and each source structure is copied
    /// once, so sharing inside the term is preserved in the copy and cyclic terms
    /// terminate.
    pub fn clone_term(&mut self, root: Word, region: Region, mode: CloneMode) -> Result<Word, Error> {
        let mut copies = Copies::new();
        let mut pending = Pending::new();

        let copy = self.clone_cell(root, None, region, mode, &mut copies, &mut pending)?;

        while let Some((source, target)) = pending.pop() {
            let word = self.load(source)?;
            let cell = self.clone_cell(word, Some(target), region, mode, &mut copies, &mut pending)?;
            self.store_fresh(target, cell)?;
        }

        Ok(copy)
    }

    fn shares(region: Region, mode: CloneMode, address: Address) -> bool {
        mode == CloneMode::Share && region == Region::Retained && address.is_retained()
    }

    /// Copies one cell. Variables land in `slot` when the caller already has a cell for
    /// them; structure arguments are queued on `pending`.
    fn clone_cell(
        &mut self,
        word: Word,
        slot: Option<Address>,
        region: Region,
        mode: CloneMode,
        copies: &mut Copies,
        pending: &mut Pending,
    ) -> Result<Word, Error> {
        let mut word = word;

        if let Cell::Ref(address) = word.unpack() {
            let var = self.deref(address)?;
            let value = self.load(var)?;

            match value.unpack() {
                Cell::Ref(_) => {
                    if Self::shares(region, mode, var) {
                        return Ok(Word::r#ref(var));
                    }

                    if let Some(&copy) = copies.get(&(Tag::Ref, var)) {
                        return Ok(copy);
                    }

                    let target = match slot {
                        Some(target) => target,
                        None => self.allocate_cells(region, 1)?,
                    };

                    let copy = Word::r#ref(target);
                    self.store_fresh(target, copy)?;
                    copies.insert((Tag::Ref, var), copy);

                    if mode == CloneMode::Share {
                        self.store(var, copy)?;
                    }

                    return Ok(copy);
                }
                _ => word = value,
            }
        }

        match word.unpack() {
            Cell::Str(functor) => {
                if Self::shares(region, mode, functor) {
                    return Ok(word);
                }

                if let Some(&copy) = copies.get(&(Tag::Str, functor)) {
                    return Ok(copy);
                }

                let arity = self.functor_at(functor)?.arity;
                let base = self.allocate_cells(region, arity + 1)?;
                let header = self.load(functor)?;
                self.store_fresh(base, header)?;

                let copy = Word::str(base);
                copies.insert((Tag::Str, functor), copy);

                for i in (1..=arity as i32).rev() {
                    pending.push((functor + i, base + i));
                }

                Ok(copy)
            }
            Cell::Lis(head) => {
                if Self::shares(region, mode, head) {
                    return Ok(word);
                }

                if let Some(&copy) = copies.get(&(Tag::Lis, head)) {
                    return Ok(copy);
                }

                let base = self.allocate_cells(region, 2)?;
                let copy = Word::lis(base);
                copies.insert((Tag::Lis, head), copy);

                pending.push((head + 1, base + 1));
                pending.push((head, base));

                Ok(copy)
            }
            _ => Ok(word),
        }
    }
}
