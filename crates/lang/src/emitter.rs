//! Bytecode emitter.
//!
//! Append-only writer with a current emit address (`rt_pc`) and the
//! simulated runtime stack and frame pointers (`rt_sp`, `rt_fp`). The
//! simulation is what lets the compiler hand out frame-relative addresses
//! to locals as they are declared: every push or pop the emitted code
//! will perform at runtime is mirrored here, so `rt_sp - rt_fp` is always
//! the correct offset for the next local.
//!
//! Forward branches are emitted with a placeholder operand; the
//! control-flow engine remembers the operand's address inside its own
//! frame and calls [`Emitter::fixup`] when the matching closer arrives.

use crate::error::LangError;
use eightball_core::{Opcode, RT_CALL_STACK_LIM, RT_CALL_STACK_TOP, RT_PC_START};
use tracing::trace;

pub struct Emitter {
    code: Vec<u8>,
    /// Emit address: the VM PC the next emitted byte will execute at.
    pub rt_pc: u16,
    /// Simulated VM call stack pointer.
    pub rt_sp: u16,
    /// Simulated VM frame pointer.
    pub rt_fp: u16,
}

impl Emitter {
    pub fn new() -> Self {
        Emitter {
            code: Vec::new(),
            rt_pc: RT_PC_START,
            rt_sp: RT_CALL_STACK_TOP,
            rt_fp: RT_CALL_STACK_TOP,
        }
    }

    /// Reset for a fresh compilation.
    pub fn reset(&mut self) {
        self.code.clear();
        self.rt_pc = RT_PC_START;
        self.rt_sp = RT_CALL_STACK_TOP;
        self.rt_fp = RT_CALL_STACK_TOP;
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Emit a plain one-byte opcode.
    pub fn emit(&mut self, op: Opcode) {
        trace!(pc = self.rt_pc, op = %op, "emit");
        self.code.push(op.into());
        self.rt_pc = self.rt_pc.wrapping_add(1);
    }

    /// Emit an opcode with a 16-bit little-endian immediate operand.
    /// Negative values (frame-relative offsets) wrap to two's complement.
    pub fn emit_imm(&mut self, op: Opcode, word: i32) {
        trace!(pc = self.rt_pc, op = %op, word, "emit");
        let w = word as u16;
        self.code.push(op.into());
        self.code.push((w & 0xff) as u8);
        self.code.push((w >> 8) as u8);
        self.rt_pc = self.rt_pc.wrapping_add(3);
    }

    /// Push an immediate onto the VM evaluation stack.
    pub fn emit_ldi(&mut self, word: i32) {
        self.emit_imm(Opcode::Ldimm, word);
    }

    /// Emit `PRMSG` followed by the inline NUL-terminated message.
    pub fn emit_prmsg(&mut self, msg: &str) {
        self.emit(Opcode::Prmsg);
        for &b in msg.as_bytes() {
            self.code.push(b);
            self.rt_pc = self.rt_pc.wrapping_add(1);
        }
        self.code.push(0);
        self.rt_pc = self.rt_pc.wrapping_add(1);
    }

    /// Rewrite the 16-bit immediate previously emitted at VM address
    /// `addr`. `rt_pc` is unaffected.
    pub fn fixup(&mut self, addr: u16, word: u16) {
        trace!(addr, word, "fixup");
        let idx = (addr - RT_PC_START) as usize;
        self.code[idx] = (word & 0xff) as u8;
        self.code[idx + 1] = (word >> 8) as u8;
    }

    /// Allocate bytes on the simulated VM call stack and return the new
    /// stack pointer. Callers must emit matching `PSHWORD`/`PSHBYTE`
    /// instructions so the runtime stack tracks the simulation.
    pub fn push_callstack(&mut self, bytes: u16) -> Result<u16, LangError> {
        if u32::from(self.rt_sp) < u32::from(RT_CALL_STACK_LIM) + u32::from(bytes) {
            return Err(LangError::NoTargetMem);
        }
        self.rt_sp -= bytes;
        Ok(self.rt_sp)
    }

    /// Release bytes from the simulated call stack; pairs with emitted
    /// `POPWORD`/`POPBYTE`/`DISCARD` instructions.
    pub fn pop_callstack(&mut self, bytes: u16) {
        self.rt_sp = self.rt_sp.wrapping_add(bytes);
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Emitter::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_advances_pc() {
        let mut e = Emitter::new();
        e.emit(Opcode::Dup);
        assert_eq!(e.rt_pc, RT_PC_START + 1);
        e.emit_imm(Opcode::JmpImm, 0x1234);
        assert_eq!(e.rt_pc, RT_PC_START + 4);
        assert_eq!(e.code(), &[Opcode::Dup.into(), Opcode::JmpImm.into(), 0x34, 0x12]);
    }

    #[test]
    fn test_negative_immediate_wraps() {
        let mut e = Emitter::new();
        e.emit_ldi(-4);
        assert_eq!(e.code()[1..], [0xfc, 0xff]);
    }

    #[test]
    fn test_fixup_rewrites_in_place() {
        let mut e = Emitter::new();
        e.emit_imm(Opcode::BrnchImm, 0xffff);
        let operand_addr = RT_PC_START + 1;
        e.emit(Opcode::End);
        let target = e.rt_pc;
        e.fixup(operand_addr, target);
        assert_eq!(e.code()[1], (target & 0xff) as u8);
        assert_eq!(e.code()[2], (target >> 8) as u8);
        // PC unaffected by the fixup.
        assert_eq!(e.rt_pc, RT_PC_START + 4);
    }

    #[test]
    fn test_prmsg_is_variable_length() {
        let mut e = Emitter::new();
        e.emit_prmsg("hi");
        assert_eq!(e.code(), &[Opcode::Prmsg.into(), b'h', b'i', 0]);
        assert_eq!(e.rt_pc, RT_PC_START + 4);
    }

    #[test]
    fn test_simulated_callstack_bounds() {
        let mut e = Emitter::new();
        let sp = e.push_callstack(2).expect("room");
        assert_eq!(sp, RT_CALL_STACK_TOP - 2);
        e.pop_callstack(2);
        assert_eq!(e.rt_sp, RT_CALL_STACK_TOP);
        assert_eq!(
            e.push_callstack(RT_CALL_STACK_TOP - RT_CALL_STACK_LIM + 1),
            Err(LangError::NoTargetMem)
        );
    }
}
