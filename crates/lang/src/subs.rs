//! Subroutine tables and the linker.
//!
//! While compiling, two lists grow side by side: the entry address of
//! every `sub` seen, and the operand address of every `call` emitted with
//! a placeholder target. The linker runs once after the whole program has
//! been compiled and patches each pending call; this is the only place a
//! symbolic name crosses a phase boundary.

use crate::emitter::Emitter;
use crate::error::LangError;
use tracing::debug;

/// Significant prefix length for subroutine names. Applied uniformly at
/// definition, call and link time.
pub const SUB_NAME_CHARS: usize = 8;

/// NUL-padded 8-byte subroutine key.
pub type SubKey = [u8; SUB_NAME_CHARS];

pub fn sub_key(name: &str) -> SubKey {
    let mut key = [0u8; SUB_NAME_CHARS];
    for (slot, b) in key.iter_mut().zip(name.bytes()) {
        *slot = b;
    }
    key
}

struct SubEntry {
    key: SubKey,
    /// For a definition: the entry PC. For a pending call: the VM address
    /// of the `JSRIMM` operand awaiting a fixup.
    addr: u16,
}

/// Definitions and pending calls recorded during one compilation.
pub struct SubTable {
    defs: Vec<SubEntry>,
    calls: Vec<SubEntry>,
}

impl SubTable {
    pub fn new() -> Self {
        SubTable {
            defs: Vec::new(),
            calls: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.defs.clear();
        self.calls.clear();
    }

    /// Record a subroutine entry point. Each name may be defined at most
    /// once per compilation.
    pub fn add_def(&mut self, name: &str, entry_pc: u16) -> Result<(), LangError> {
        let key = sub_key(name);
        if self.defs.iter().any(|d| d.key == key) {
            return Err(LangError::Redefined);
        }
        debug!(name, entry_pc, "sub defined");
        self.defs.push(SubEntry { key, addr: entry_pc });
        Ok(())
    }

    /// Record a call whose jump-target operand at `operand_addr` needs
    /// patching at link time.
    pub fn add_call(&mut self, name: &str, operand_addr: u16) {
        self.calls.push(SubEntry {
            key: sub_key(name),
            addr: operand_addr,
        });
    }

    /// Resolve every pending call against the definition list and patch
    /// the recorded operands. An unresolved name is a fatal compile error.
    pub fn link(&self, emitter: &mut Emitter) -> Result<(), LangError> {
        for call in &self.calls {
            let def = self
                .defs
                .iter()
                .find(|d| d.key == call.key)
                .ok_or(LangError::Link)?;
            debug!(addr = call.addr, target = def.addr, "link");
            emitter.fixup(call.addr, def.addr);
        }
        Ok(())
    }
}

impl Default for SubTable {
    fn default() -> Self {
        SubTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eightball_core::Opcode;

    #[test]
    fn test_sub_key_truncates_to_eight() {
        assert_eq!(sub_key("fibonacci"), *b"fibonacc");
        assert_eq!(sub_key("sq"), *b"sq\0\0\0\0\0\0");
        // Names identical in the first eight characters collide.
        assert_eq!(sub_key("routine_a"), sub_key("routine_b"));
    }

    #[test]
    fn test_link_patches_pending_calls() {
        let mut emitter = Emitter::new();
        let mut subs = SubTable::new();

        emitter.emit_imm(Opcode::JsrImm, 0xffff);
        subs.add_call("sq", emitter.rt_pc - 2);
        emitter.emit(Opcode::End);

        let entry = emitter.rt_pc;
        subs.add_def("sq", entry).expect("fresh name");
        emitter.emit(Opcode::Rts);

        subs.link(&mut emitter).expect("resolved");
        assert_eq!(emitter.code()[1], (entry & 0xff) as u8);
        assert_eq!(emitter.code()[2], (entry >> 8) as u8);
    }

    #[test]
    fn test_unresolved_call_is_link_error() {
        let mut emitter = Emitter::new();
        let mut subs = SubTable::new();
        emitter.emit_imm(Opcode::JsrImm, 0xffff);
        subs.add_call("nosuch", emitter.rt_pc - 2);
        assert_eq!(subs.link(&mut emitter), Err(LangError::Link));
    }

    #[test]
    fn test_duplicate_definition_rejected() {
        let mut subs = SubTable::new();
        subs.add_def("twice", 10).expect("first");
        assert_eq!(subs.add_def("twice", 20), Err(LangError::Redefined));
    }
}
