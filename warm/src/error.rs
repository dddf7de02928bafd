use ::{derive_more::Display, failure::Fail};

use crate::word::Address;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    #[display(fmt = "heap")]
    Heap,
    #[display(fmt = "stack")]
    Stack,
    #[display(fmt = "retained")]
    Retained,
    #[display(fmt = "code")]
    Code,
}

/// Everything that can go wrong besides a goal simply failing. None of these are
/// recoverable mid-query; the machine is reset by the next query.
#[derive(Debug, Fail)]
pub enum Error {
    #[fail(display = "{} segment exhausted (capacity {})", segment, capacity)]
    Exhausted { segment: Segment, capacity: usize },

    #[fail(display = "invalid address `{}`", _0)]
    InvalidAddress(Address),

    #[fail(display = "unknown opcode `{:#010x}` at {}", word, at)]
    UnknownOpcode { word: u32, at: i32 },

    #[fail(display = "malformed term: {}", _0)]
    MalformedTerm(String),

    #[fail(display = "no callback registered at index {}", _0)]
    UnknownCallback(usize),

    #[fail(display = "operand stack underflow")]
    StackUnderflow,
}
