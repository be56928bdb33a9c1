//! The EightBall VM opcode set.
//!
//! The front-end emits these; the VM executes them. Opcodes are single
//! bytes. Where an opcode takes an immediate operand, the operand is a
//! 16-bit little-endian word appended directly after the opcode byte.
//! `PRMSG` is the one variable-length opcode: the opcode byte is followed
//! by the NUL-terminated message text.
//!
//! The numeric values are part of the VM contract and must not be
//! reassigned: a bytecode file is a flat stream of these bytes with no
//! header, no symbol table and no relocation data, terminated by `END`.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// VM program counter value at entry to a compiled program.
pub const RT_PC_START: u16 = 0x0000;

/// Top of the VM call stack. The stack grows downward from here; globals
/// and subroutine locals are carved out of it at compile time.
pub const RT_CALL_STACK_TOP: u16 = 0xfe00;

/// Lower bound of the VM call stack. The compiler refuses to allocate
/// past this point.
pub const RT_CALL_STACK_LIM: u16 = 0xe000;

/// Distance from the callee's frame pointer to the first formal argument.
/// `JSRIMM` and `SPTOFP` leave the return address and the saved frame
/// pointer (two bytes each) between FP and the arguments the caller pushed.
pub const FRAME_ARGS_OFFSET: i32 = 4;

/// One opcode of the EightBall VM.
///
/// Grouped as in the VM contract: loads/stores (absolute vs frame-relative,
/// word vs byte, immediate address vs address-on-stack), arithmetic,
/// bitwise, logical, comparison, stack manipulation, console I/O and
/// control transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Opcode {
    /// Terminate execution. Also terminates the bytecode stream.
    End = 0x00,
    /// Push a 16-bit immediate onto the evaluation stack.
    Ldimm = 0x01,

    // Loads: A=absolute address, R=relative to frame pointer.
    // The plain forms take the address from the evaluation stack; the
    // `..Imm` forms take it as an immediate operand.
    Ldaword = 0x02,
    Ldabyte = 0x03,
    LdawordImm = 0x04,
    LdabyteImm = 0x05,
    Ldrword = 0x06,
    Ldrbyte = 0x07,
    LdrwordImm = 0x08,
    LdrbyteImm = 0x09,

    // Stores, same naming scheme as the loads.
    Staword = 0x0a,
    Stabyte = 0x0b,
    StawordImm = 0x0c,
    StabyteImm = 0x0d,
    Strword = 0x0e,
    Strbyte = 0x0f,
    StrwordImm = 0x10,
    StrbyteImm = 0x11,

    // Arithmetic.
    Neg = 0x12,
    Add = 0x13,
    Sub = 0x14,
    Mul = 0x15,
    Div = 0x16,
    Mod = 0x17,
    Inc = 0x18,
    Dec = 0x19,
    /// x^y computed by repeated multiplication in the VM.
    Pow = 0x1a,

    // Bitwise.
    Bitand = 0x1b,
    Bitor = 0x1c,
    Bitxor = 0x1d,
    Bitnot = 0x1e,
    Lsh = 0x1f,
    Rsh = 0x20,

    // Logical.
    And = 0x21,
    Or = 0x22,
    Not = 0x23,

    // Comparison. Each pops two operands and pushes 0 or 1.
    Eql = 0x24,
    Neql = 0x25,
    Lt = 0x26,
    Lte = 0x27,
    Gt = 0x28,
    Gte = 0x29,

    // Evaluation / call stack manipulation.
    Dup = 0x2a,
    Drop = 0x2b,
    Swap = 0x2c,
    /// FP := SP (entering a subroutine frame).
    Sptofp = 0x2d,
    /// SP := FP (discarding a frame's locals in one step).
    Fptosp = 0x2e,
    /// Pop a word from the evaluation stack, push it to the call stack.
    Pshword = 0x2f,
    Pshbyte = 0x30,
    /// Pop a word from the call stack, push it to the evaluation stack.
    Popword = 0x31,
    Popbyte = 0x32,
    /// Pop a count, then discard that many bytes from the call stack.
    Discard = 0x33,
    /// Convert a frame-relative address on the stack to an absolute one.
    Rtoa = 0x34,

    // Console I/O.
    Prch = 0x35,
    Prdec = 0x36,
    Prhex = 0x37,
    /// Print the NUL-terminated string at the address on the stack.
    Prstr = 0x38,
    /// Print the NUL-terminated string inlined after the opcode.
    Prmsg = 0x39,
    Kbdch = 0x3a,
    Kbdln = 0x3b,

    // Control transfer.
    /// Pop a value; branch to the immediate address when it is non-zero.
    BrnchImm = 0x3c,
    JmpImm = 0x3d,
    JsrImm = 0x3e,
    Rts = 0x3f,
}

impl Opcode {
    /// Does this opcode carry a 16-bit immediate operand?
    pub fn has_immediate(self) -> bool {
        matches!(
            self,
            Opcode::Ldimm
                | Opcode::LdawordImm
                | Opcode::LdabyteImm
                | Opcode::LdrwordImm
                | Opcode::LdrbyteImm
                | Opcode::StawordImm
                | Opcode::StabyteImm
                | Opcode::StrwordImm
                | Opcode::StrbyteImm
                | Opcode::BrnchImm
                | Opcode::JmpImm
                | Opcode::JsrImm
        )
    }

    /// Is this the variable-length inline-string opcode?
    pub fn has_inline_string(self) -> bool {
        self == Opcode::Prmsg
    }

    /// Lowercase mnemonic, as used by the disassembler.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::End => "end",
            Opcode::Ldimm => "ldimm",
            Opcode::Ldaword => "ldaword",
            Opcode::Ldabyte => "ldabyte",
            Opcode::LdawordImm => "ldawordimm",
            Opcode::LdabyteImm => "ldabyteimm",
            Opcode::Ldrword => "ldrword",
            Opcode::Ldrbyte => "ldrbyte",
            Opcode::LdrwordImm => "ldrwordimm",
            Opcode::LdrbyteImm => "ldrbyteimm",
            Opcode::Staword => "staword",
            Opcode::Stabyte => "stabyte",
            Opcode::StawordImm => "stawordimm",
            Opcode::StabyteImm => "stabyteimm",
            Opcode::Strword => "strword",
            Opcode::Strbyte => "strbyte",
            Opcode::StrwordImm => "strwordimm",
            Opcode::StrbyteImm => "strbyteimm",
            Opcode::Neg => "neg",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Mod => "mod",
            Opcode::Inc => "inc",
            Opcode::Dec => "dec",
            Opcode::Pow => "pow",
            Opcode::Bitand => "bitand",
            Opcode::Bitor => "bitor",
            Opcode::Bitxor => "bitxor",
            Opcode::Bitnot => "bitnot",
            Opcode::Lsh => "lsh",
            Opcode::Rsh => "rsh",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Not => "not",
            Opcode::Eql => "eql",
            Opcode::Neql => "neql",
            Opcode::Lt => "lt",
            Opcode::Lte => "lte",
            Opcode::Gt => "gt",
            Opcode::Gte => "gte",
            Opcode::Dup => "dup",
            Opcode::Drop => "drop",
            Opcode::Swap => "swap",
            Opcode::Sptofp => "sptofp",
            Opcode::Fptosp => "fptosp",
            Opcode::Pshword => "pshword",
            Opcode::Pshbyte => "pshbyte",
            Opcode::Popword => "popword",
            Opcode::Popbyte => "popbyte",
            Opcode::Discard => "discard",
            Opcode::Rtoa => "rtoa",
            Opcode::Prch => "prch",
            Opcode::Prdec => "prdec",
            Opcode::Prhex => "prhex",
            Opcode::Prstr => "prstr",
            Opcode::Prmsg => "prmsg",
            Opcode::Kbdch => "kbdch",
            Opcode::Kbdln => "kbdln",
            Opcode::BrnchImm => "brnch",
            Opcode::JmpImm => "jmp",
            Opcode::JsrImm => "jsr",
            Opcode::Rts => "rts",
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_byte_roundtrip() {
        for byte in 0x00..=0x3fu8 {
            let op = Opcode::try_from(byte).expect("contiguous opcode space");
            let back: u8 = op.into();
            assert_eq!(back, byte);
        }
        assert!(Opcode::try_from(0x40u8).is_err());
        assert!(Opcode::try_from(0xffu8).is_err());
    }

    #[test]
    fn test_immediate_metadata() {
        assert!(Opcode::Ldimm.has_immediate());
        assert!(Opcode::BrnchImm.has_immediate());
        assert!(Opcode::JsrImm.has_immediate());
        assert!(!Opcode::Add.has_immediate());
        assert!(!Opcode::Prmsg.has_immediate());
        assert!(Opcode::Prmsg.has_inline_string());
    }

    #[test]
    fn test_mnemonics_unique() {
        let mut seen = std::collections::HashSet::new();
        for byte in 0x00..=0x3fu8 {
            let op = Opcode::try_from(byte).expect("opcode");
            assert!(seen.insert(op.mnemonic()), "duplicate {}", op.mnemonic());
        }
    }

    #[test]
    fn test_contract_constants() {
        assert!(RT_CALL_STACK_LIM < RT_CALL_STACK_TOP);
        assert_eq!(RT_PC_START, 0);
        assert_eq!(FRAME_ARGS_OFFSET, 4);
    }
}
