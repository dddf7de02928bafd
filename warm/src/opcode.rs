//! The instruction set.
//!
//! An opcode is one code word: the high byte says how many operand words follow, the
//! rest is `family << 8 | member`. Operands are a single `u32`, read as signed where the
//! instruction calls for it (relative branches).

pub const NO_OPERAND: u32 = 1 << 24;
pub const WITH_OPERAND: u32 = 2 << 24;
pub const OPERAND_MASK: u32 = 0xff << 24;

macro_rules! opcodes {
    ($($(#[$meta:meta])* $name:ident = $flag:ident | $code:expr,)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum Opcode {
            $($(#[$meta])* $name = $flag | $code,)*
        }

        impl Opcode {
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name,)*];

            pub fn decode(word: u32) -> Option<Opcode> {
                #[allow(non_upper_case_globals)]
                mod words {
                    use super::*;
                    $(pub const $name: u32 = $flag | $code;)*
                }

                match word {
                    $(words::$name => Some(Opcode::$name),)*
                    _ => None,
                }
            }
        }
    };
}

opcodes! {
    Halt = NO_OPERAND | 0x0000,
    Nop = NO_OPERAND | 0x0001,
    /// Backtracks into the newest choice point, or ends the run in failure.
    Fail = NO_OPERAND | 0x0002,

    Duplicate = NO_OPERAND | 0x0100,
    Pop = NO_OPERAND | 0x0101,
    /// `addr -- value`
    Load = NO_OPERAND | 0x0102,
    /// `addr value --`
    Store = NO_OPERAND | 0x0103,
    LoadConstant = WITH_OPERAND | 0x0104,
    LoadLocal = WITH_OPERAND | 0x0105,
    StoreLocal = WITH_OPERAND | 0x0106,
    LoadLocalAddress = WITH_OPERAND | 0x0107,
    LoadArgumentAddress = WITH_OPERAND | 0x0108,

    /// `addr -- addr'`, following `Ref` chains.
    Deref = NO_OPERAND | 0x0200,
    GetTag = NO_OPERAND | 0x0201,
    GetAddress = NO_OPERAND | 0x0202,
    ApplyTagRef = NO_OPERAND | 0x0203,
    ApplyTagStr = NO_OPERAND | 0x0204,
    ApplyTagFun = NO_OPERAND | 0x0205,
    ApplyTagCon = NO_OPERAND | 0x0206,
    ApplyTagLis = NO_OPERAND | 0x0207,
    /// `addr addr --`, one side must be an unbound variable.
    Bind = NO_OPERAND | 0x0208,
    /// `addr addr --`, falls into `Fail` when the terms do not unify.
    Unify = NO_OPERAND | 0x0209,

    LoadGlobalRegisterH = NO_OPERAND | 0x0300,
    StoreGlobalRegisterH = NO_OPERAND | 0x0301,
    LoadGlobalRegisterB0 = NO_OPERAND | 0x0302,
    StoreGlobalRegisterB0 = NO_OPERAND | 0x0303,

    Increment = NO_OPERAND | 0x0400,
    Add = NO_OPERAND | 0x0401,

    Allocate = WITH_OPERAND | 0x0500,
    Deallocate = WITH_OPERAND | 0x0501,
    Call = WITH_OPERAND | 0x0502,
    Proceed = NO_OPERAND | 0x0503,

    BranchEqual = WITH_OPERAND | 0x0600,
    BranchNotEqual = WITH_OPERAND | 0x0601,
    BranchAlways = WITH_OPERAND | 0x0602,
    BranchAbsolute = WITH_OPERAND | 0x0603,

    ChoicePoint = WITH_OPERAND | 0x0700,
    ChoicePointRelative = WITH_OPERAND | 0x0701,
    GetLevel = NO_OPERAND | 0x0702,
    Cut = NO_OPERAND | 0x0703,

    Callback = WITH_OPERAND | 0x0800,
    Trace = WITH_OPERAND | 0x0801,
    EndTrace = WITH_OPERAND | 0x0802,
}

impl Opcode {
    #[inline]
    pub fn has_operand(self) -> bool {
        (self as u32) & OPERAND_MASK == WITH_OPERAND
    }

    /// Instruction length in code words.
    #[inline]
    pub fn size(self) -> i32 {
        if self.has_operand() {
            2
        } else {
            1
        }
    }

    /// Whether the operand is an offset relative to the opcode's own address.
    #[inline]
    pub fn is_relative(self) -> bool {
        match self {
            Opcode::BranchEqual
            | Opcode::BranchNotEqual
            | Opcode::BranchAlways
            | Opcode::ChoicePointRelative => true,
            _ => false,
        }
    }
}

impl From<Opcode> for u32 {
    #[inline]
    fn from(op: Opcode) -> u32 {
        op as u32
    }
}
