//! The tagged store model.
//!
//! Every heap, stack and retained slot holds a [`Word`]. A word packs an [`Address`] (a
//! segment plus a signed offset) and, for cells, a [`Tag`] saying how to read it:
//!
//! ```text
//!  63        44 43   40 39   36 35      32 31                     0
//! +------------+-------+-------+----------+------------------------+
//! |   unused   |  tag  | spare | segment  |   offset (i32 bits)    |
//! +------------+-------+-------+----------+------------------------+
//! ```
//!
//! An untagged address and a `Ref` cell pointing at the same address are the same bits,
//! because `Ref` is tag zero. Bytecode relies on this: it pushes raw addresses, applies
//! tags to them, and strips them off again with plain word operations.

use ::{
    serde::{Deserialize, Serialize},
    std::{
        fmt,
        ops::{Add, Sub},
    },
};

use crate::functor::FunctorId;

#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Word(pub u64);

impl fmt::Debug for Word {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.unpack())
    }
}

const OFFSET_BITS: u32 = 32;
const SEGMENT_BITS: u32 = 4;
const TAG_SHIFT: u32 = 40;
const ADDRESS_MASK: u64 = (1 << (OFFSET_BITS + SEGMENT_BITS)) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u64)]
pub enum Tag {
    Ref = 0,
    Str = 1,
    Fun = 2,
    Con = 3,
    Lis = 4,
    Non = 5,
}

impl Tag {
    pub const NUM_BITS: u32 = 4;
    pub const MASK_BITS: u64 = 0xf;

    pub const REF: u64 = Tag::Ref as u64;
    pub const STR: u64 = Tag::Str as u64;
    pub const FUN: u64 = Tag::Fun as u64;
    pub const CON: u64 = Tag::Con as u64;
    pub const LIS: u64 = Tag::Lis as u64;

    #[inline]
    pub fn from_bits(bits: u64) -> Tag {
        match bits & Tag::MASK_BITS {
            Tag::REF => Tag::Ref,
            Tag::STR => Tag::Str,
            Tag::FUN => Tag::Fun,
            Tag::CON => Tag::Con,
            Tag::LIS => Tag::Lis,
            _ => Tag::Non,
        }
    }
}

/// The registers addressable from bytecode and recorded by choice points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum GlobalRegister {
    TopOfHeap = 0,
    InstructionPointer = 1,
    Environment = 2,
    ContinuationPointer = 3,
    ChoicePointBase = 4,
    StackPointer = 5,
    NextRetained = 6,
}

impl GlobalRegister {
    fn from_index(index: u32) -> Option<GlobalRegister> {
        use self::GlobalRegister::*;
        Some(match index {
            0 => TopOfHeap,
            1 => InstructionPointer,
            2 => Environment,
            3 => ContinuationPointer,
            4 => ChoicePointBase,
            5 => StackPointer,
            6 => NextRetained,
            _ => return None,
        })
    }
}

/// A pointer into one of the machine's segments.
///
/// The derived ordering compares the segment first, so every Retained address sorts
/// below every Heap address, which in turn sorts below every Stack address. The binding
/// rule leans on this to make references run from newer storage to older storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Address {
    /// Untyped payload: functor indices, trail levels, small integers.
    Blank(i32),
    Retained(i32),
    Heap(i32),
    Stack(i32),
    Code(i32),
    Register(GlobalRegister),
}

impl Address {
    const BLANK: u64 = 0;
    const RETAINED: u64 = 1;
    const HEAP: u64 = 2;
    const STACK: u64 = 3;
    const CODE: u64 = 4;
    const REGISTER: u64 = 5;

    #[inline]
    pub fn pack(self) -> Word {
        let (segment, offset) = match self {
            Address::Blank(o) => (Address::BLANK, o),
            Address::Retained(o) => (Address::RETAINED, o),
            Address::Heap(o) => (Address::HEAP, o),
            Address::Stack(o) => (Address::STACK, o),
            Address::Code(o) => (Address::CODE, o),
            Address::Register(r) => (Address::REGISTER, r as i32),
        };

        Word((segment << OFFSET_BITS) | u64::from(offset as u32))
    }

    /// Reads the address bits of a word, ignoring any tag. Segment bits that name no
    /// segment read as `Blank`, which no load or store accepts.
    #[inline]
    pub fn unpack(word: Word) -> Address {
        let bits = word.0 & ADDRESS_MASK;
        let offset = bits as u32 as i32;
        match bits >> OFFSET_BITS {
            Address::RETAINED => Address::Retained(offset),
            Address::HEAP => Address::Heap(offset),
            Address::STACK => Address::Stack(offset),
            Address::CODE => Address::Code(offset),
            Address::REGISTER => match GlobalRegister::from_index(offset as u32) {
                Some(register) => Address::Register(register),
                None => Address::Blank(offset),
            },
            _ => Address::Blank(offset),
        }
    }

    /// The signed offset within the segment; register addresses yield their index.
    #[inline]
    pub fn offset(self) -> i32 {
        match self {
            Address::Blank(o)
            | Address::Retained(o)
            | Address::Heap(o)
            | Address::Stack(o)
            | Address::Code(o) => o,
            Address::Register(r) => r as i32,
        }
    }

    #[inline]
    pub fn is_retained(self) -> bool {
        match self {
            Address::Retained(_) => true,
            _ => false,
        }
    }

    #[inline]
    fn offset_by(self, delta: i32) -> Address {
        match self {
            Address::Blank(o) => Address::Blank(o + delta),
            Address::Retained(o) => Address::Retained(o + delta),
            Address::Heap(o) => Address::Heap(o + delta),
            Address::Stack(o) => Address::Stack(o + delta),
            Address::Code(_) | Address::Register(_) => {
                panic!("address arithmetic on non-offsettable {:?}", self)
            }
        }
    }
}

impl Add<i32> for Address {
    type Output = Address;

    #[inline]
    fn add(self, rhs: i32) -> Address {
        self.offset_by(rhs)
    }
}

impl Sub<i32> for Address {
    type Output = Address;

    #[inline]
    fn sub(self, rhs: i32) -> Address {
        self.offset_by(-rhs)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Address::Blank(o) => write!(f, "#{}", o),
            Address::Retained(o) => write!(f, "R{}", o),
            Address::Heap(o) => write!(f, "H{}", o),
            Address::Stack(o) => write!(f, "S{}", o),
            Address::Code(o) => write!(f, "C{}", o),
            Address::Register(r) => write!(f, "{:?}", r),
        }
    }
}

/// A tagged store word with its payload decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cell {
    /// A variable. Unbound when it points at its own slot.
    Ref(Address),
    /// A structure; points at the `Fun` cell heading its arguments.
    Str(Address),
    Fun(FunctorId),
    Con(FunctorId),
    /// A list pair; points at the head, with the tail in the next slot.
    Lis(Address),
    Non(u64),
}

impl Cell {
    #[inline]
    pub fn pack(self) -> Word {
        let tagged = |tag: Tag, address: Address| Word(((tag as u64) << TAG_SHIFT) | address.pack().0);
        match self {
            Cell::Ref(a) => tagged(Tag::Ref, a),
            Cell::Str(a) => tagged(Tag::Str, a),
            Cell::Fun(f) => tagged(Tag::Fun, Address::Blank(f.0 as i32)),
            Cell::Con(f) => tagged(Tag::Con, Address::Blank(f.0 as i32)),
            Cell::Lis(a) => tagged(Tag::Lis, a),
            Cell::Non(payload) => Word(((Tag::Non as u64) << TAG_SHIFT) | (payload & ((1 << TAG_SHIFT) - 1))),
        }
    }

    #[inline]
    pub fn tag(self) -> Tag {
        match self {
            Cell::Ref(_) => Tag::Ref,
            Cell::Str(_) => Tag::Str,
            Cell::Fun(_) => Tag::Fun,
            Cell::Con(_) => Tag::Con,
            Cell::Lis(_) => Tag::Lis,
            Cell::Non(_) => Tag::Non,
        }
    }
}

impl Word {
    pub const ZERO: Word = Word(0);

    #[inline]
    pub fn raw(value: u64) -> Word {
        Word(value)
    }

    #[inline]
    pub fn get_tag(self) -> Tag {
        Tag::from_bits(self.0 >> TAG_SHIFT)
    }

    #[inline]
    pub fn address(self) -> Address {
        Address::unpack(self)
    }

    /// Replaces the tag, keeping the address bits.
    #[inline]
    pub fn with_tag(self, tag: Tag) -> Word {
        Word(((tag as u64) << TAG_SHIFT) | (self.0 & ADDRESS_MASK))
    }

    #[inline]
    pub fn unpack(self) -> Cell {
        let address = self.address();
        match self.get_tag() {
            Tag::Ref => Cell::Ref(address),
            Tag::Str => Cell::Str(address),
            Tag::Fun => Cell::Fun(FunctorId(address.offset() as u32)),
            Tag::Con => Cell::Con(FunctorId(address.offset() as u32)),
            Tag::Lis => Cell::Lis(address),
            Tag::Non => Cell::Non(self.0 & ((1 << TAG_SHIFT) - 1)),
        }
    }

    #[inline]
    pub fn r#ref(address: Address) -> Word {
        Cell::Ref(address).pack()
    }

    #[inline]
    pub fn str(address: Address) -> Word {
        Cell::Str(address).pack()
    }

    #[inline]
    pub fn fun(functor: FunctorId) -> Word {
        Cell::Fun(functor).pack()
    }

    #[inline]
    pub fn con(functor: FunctorId) -> Word {
        Cell::Con(functor).pack()
    }

    #[inline]
    pub fn lis(address: Address) -> Word {
        Cell::Lis(address).pack()
    }
}

impl From<Cell> for Word {
    #[inline]
    fn from(cell: Cell) -> Self {
        cell.pack()
    }
}

impl From<Address> for Word {
    #[inline]
    fn from(address: Address) -> Self {
        address.pack()
    }
}
