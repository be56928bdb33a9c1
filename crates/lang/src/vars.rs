//! Variable and scope model.
//!
//! Variables are descriptors in declaration order. A subroutine call
//! opens a frame: a mark records where the frame starts and what the
//! variable arena looked like, so tearing the frame down is O(1) in both
//! directions (truncate the table, restore the arena pointer).
//!
//! Lookup is local-then-global: the innermost frame first, then the
//! globals that precede the first frame. The caller learns whether the
//! hit was local so the compiler can choose absolute vs frame-relative
//! addressing.
//!
//! Storage depends on the back-end. Interpreted variables live at real
//! addresses in the 64K memory, which is what makes `&x`, pointer
//! dereference and the poke statements behave exactly like compiled code.
//! Compiled variables store the VM address (absolute for globals,
//! frame-relative for subroutine locals) that the emitted code will use.
//! Constants keep their value in the descriptor itself so the compiler
//! can read them without generating code.

use crate::Interp;
use crate::error::LangError;
use crate::machine::Mode;
use eightball_core::Opcode;

/// Significant prefix length for variable names.
pub const VAR_NAME_CHARS: usize = 4;

/// NUL-padded 4-byte variable key.
pub type VarKey = [u8; VAR_NAME_CHARS];

pub fn var_key(name: &str) -> VarKey {
    let mut key = [0u8; VAR_NAME_CHARS];
    for (slot, b) in key.iter_mut().zip(name.bytes()) {
        *slot = b;
    }
    key
}

/// The two machine types of the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    Word,
    Byte,
}

impl BaseType {
    pub fn size(self) -> u16 {
        match self {
            BaseType::Word => 2,
            BaseType::Byte => 1,
        }
    }
}

/// Declaration flavour for `word` / `byte` / `const`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeclKind {
    Word,
    Byte,
    Const,
}

/// One variable descriptor.
///
/// `loc` is the descriptor's value slot: an arena address when
/// interpreting, a VM address (absolute) or frame-relative offset when
/// compiling, or the array body location. An array size of -1 marks a
/// pass-by-reference formal whose `loc` holds the address of the caller's
/// body *pointer*, one indirection away.
#[derive(Debug, Clone)]
pub(crate) struct VarEntry {
    pub key: VarKey,
    pub ty: BaseType,
    pub is_const: bool,
    /// `None` for scalars, `Some(count)` for arrays.
    pub array: Option<i16>,
    pub loc: i32,
    pub const_val: i16,
    /// Was this descriptor created while compiling? Decides what the
    /// value slot means if it is read from the other back-end.
    pub compiled: bool,
}

/// Scope delimiter: where the frame's entries start and the arena state
/// to restore when the frame closes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameMark {
    pub start: usize,
    pub saved_arena: u16,
}

pub(crate) struct VarTable {
    pub entries: Vec<VarEntry>,
    pub frames: Vec<FrameMark>,
    /// Index (into `frames`, plus one) of the frame lookups treat as
    /// local. Normally `frames.len()`; the call machinery winds it back
    /// temporarily to evaluate actuals in the caller's scope.
    pub active: usize,
}

impl VarTable {
    pub fn new() -> Self {
        VarTable {
            entries: Vec::new(),
            frames: Vec::new(),
            active: 0,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.frames.clear();
        self.active = 0;
    }

    /// Open a call frame.
    pub fn mark_frame(&mut self, saved_arena: u16) {
        self.frames.push(FrameMark {
            start: self.entries.len(),
            saved_arena,
        });
        self.active = self.frames.len();
    }

    /// Close the innermost call frame, dropping its locals. Returns the
    /// arena mark saved when the frame was opened.
    pub fn drop_frame(&mut self) -> Option<u16> {
        let mark = self.frames.pop()?;
        self.entries.truncate(mark.start);
        self.active = self.frames.len();
        Some(mark.saved_arena)
    }

    /// Local-then-global lookup. Returns the entry index and whether it
    /// was found in the local frame. `local_only` stops after the local
    /// search (used for redefinition checks).
    pub fn find(&self, key: &VarKey, local_only: bool) -> Option<(usize, bool)> {
        let local_start = if self.active > 0 {
            self.frames[self.active - 1].start
        } else {
            0
        };
        for (off, e) in self.entries[local_start..].iter().enumerate() {
            if e.key == *key {
                return Some((local_start + off, true));
            }
        }
        if local_only {
            return None;
        }
        let global_end = self
            .frames
            .first()
            .map(|f| f.start)
            .unwrap_or(self.entries.len());
        for (i, e) in self.entries[..global_end.min(local_start)].iter().enumerate() {
            if e.key == *key {
                return Some((i, false));
            }
        }
        None
    }
}

/// What a lookup learned about a variable, for callers that branch on it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct VarInfo {
    pub ty: BaseType,
    pub is_const: bool,
    pub is_array: bool,
    pub is_local: bool,
}

impl Interp {
    /// `clear`: drop every variable and bulk-reset the arena.
    pub(crate) fn clear_vars(&mut self) {
        self.vars.clear();
        self.arena.reset();
    }

    fn check_fresh(&self, key: &VarKey) -> Result<(), LangError> {
        if self.vars.find(key, true).is_some() {
            return Err(LangError::Redefined);
        }
        Ok(())
    }

    /// Declare a scalar (or constant) with an already-evaluated value.
    pub(crate) fn create_scalar(
        &mut self,
        name: &str,
        kind: DeclKind,
        value: i16,
    ) -> Result<(), LangError> {
        let key = var_key(name);
        self.check_fresh(&key)?;
        let (ty, is_const) = match kind {
            DeclKind::Word => (BaseType::Word, false),
            DeclKind::Byte => (BaseType::Byte, false),
            DeclKind::Const => (BaseType::Word, true),
        };

        let mut loc = 0i32;
        let mut const_val = 0i16;
        match self.mode {
            Mode::Compile => {
                if is_const {
                    const_val = value;
                } else {
                    // The initializer value is on the VM evaluation stack;
                    // push it into the slot carved from the call stack.
                    let sp = self.emitter.push_callstack(ty.size())?;
                    loc = if self.compiling_sub {
                        i32::from(sp) - i32::from(self.emitter.rt_fp)
                    } else {
                        i32::from(sp) + 1
                    };
                    self.emitter.emit(match ty {
                        BaseType::Word => Opcode::Pshword,
                        BaseType::Byte => Opcode::Pshbyte,
                    });
                }
            }
            Mode::Interpret => {
                let addr = self.arena.alloc(ty.size()).ok_or(LangError::NoMem)?;
                match ty {
                    BaseType::Word => self.mem.write_word(addr, value),
                    BaseType::Byte => self.mem.write_byte(addr, value as u8),
                }
                loc = i32::from(addr);
                if is_const {
                    const_val = value;
                }
            }
        }

        self.vars.entries.push(VarEntry {
            key,
            ty,
            is_const,
            array: None,
            loc,
            const_val,
            compiled: self.mode == Mode::Compile,
        });
        Ok(())
    }

    /// Declare an array and parse its initializer (`"text"` or
    /// `{e1, e2, ...}`) at the cursor.
    pub(crate) fn create_array(
        &mut self,
        name: &str,
        ty: BaseType,
        size: i16,
    ) -> Result<(), LangError> {
        let key = var_key(name);
        self.check_fresh(&key)?;
        if size < 1 {
            return Err(LangError::BadDim);
        }

        #[derive(PartialEq, Clone, Copy)]
        enum Init {
            Strg,
            List,
        }
        let init = match self.peek() {
            b'"' => Init::Strg,
            b'{' => Init::List,
            _ => return Err(LangError::BadExpr),
        };
        self.advance();

        // A string initializer reserves the last element for the NUL.
        let limit = if init == Init::Strg { size - 1 } else { size };

        let loc;
        match self.mode {
            Mode::Compile => {
                let bytes = size as u16 * ty.size();
                let sp = self.emitter.push_callstack(bytes)?;
                loc = if self.compiling_sub {
                    i32::from(sp) - i32::from(self.emitter.rt_fp)
                } else {
                    i32::from(sp) + 1
                };

                // Runtime allocation: push `size` zeroed elements.
                self.emitter.emit_ldi(i32::from(size));
                self.emitter.emit(Opcode::Dec);
                self.emitter.emit(Opcode::Dup);
                self.emitter.emit_ldi(0);
                self.emitter.emit(match ty {
                    BaseType::Word => Opcode::Pshword,
                    BaseType::Byte => Opcode::Pshbyte,
                });
                self.emitter.emit_ldi(0);
                self.emitter.emit(Opcode::Neql);
                let back = i32::from(self.emitter.rt_pc) - 10;
                self.emitter.emit_imm(Opcode::BrnchImm, back);
                self.emitter.emit(Opcode::Drop);

                let base_rel =
                    i32::from(self.emitter.rt_sp) - i32::from(self.emitter.rt_fp);
                for i in 0..limit {
                    match init {
                        Init::Strg => {
                            let ch = if self.peek() == b'"' { 0 } else { self.peek() };
                            self.emitter.emit_ldi(i32::from(ch));
                            self.emit_store_element(ty, base_rel, i);
                            if self.peek() == b'"' {
                                break;
                            }
                            self.advance();
                        }
                        Init::List => {
                            if self.peek() == b'}' {
                                break;
                            }
                            self.eval(false)?;
                            self.emit_store_element(ty, base_rel, i);
                            self.eat_space();
                            if self.peek() == b',' {
                                self.advance();
                            }
                            self.eat_space();
                        }
                    }
                }
            }
            Mode::Interpret => {
                let bytes = size as u16 * ty.size();
                let body = self.arena.alloc(bytes).ok_or(LangError::NoMem)?;
                self.mem.zero(body, bytes);
                loc = i32::from(body);

                for i in 0..limit {
                    let val = match init {
                        Init::Strg => {
                            if self.peek() == b'"' {
                                0
                            } else {
                                let ch = self.peek() as i16;
                                self.advance();
                                ch
                            }
                        }
                        Init::List => {
                            if self.peek() == b'}' {
                                0
                            } else {
                                let v = self.eval(false)?;
                                self.eat_space();
                                if self.peek() == b',' {
                                    self.advance();
                                }
                                self.eat_space();
                                v
                            }
                        }
                    };
                    let addr = (loc as u16).wrapping_add(i as u16 * ty.size());
                    match ty {
                        BaseType::Word => self.mem.write_word(addr, val),
                        BaseType::Byte => self.mem.write_byte(addr, val as u8),
                    }
                }
            }
        }

        // The initializer must be exhausted: anything left over was too
        // long for the declared size.
        let closer = if init == Init::Strg { b'"' } else { b'}' };
        if self.peek() == closer {
            self.advance();
        } else {
            return Err(LangError::TooLong);
        }

        self.vars.entries.push(VarEntry {
            key,
            ty,
            is_const: false,
            array: Some(size),
            loc,
            const_val: 0,
            compiled: self.mode == Mode::Compile,
        });
        Ok(())
    }

    fn emit_store_element(&mut self, ty: BaseType, base_rel: i32, index: i16) {
        let off = base_rel + i32::from(index) * i32::from(ty.size());
        self.emitter.emit_ldi(off);
        self.emitter.emit(match ty {
            BaseType::Word => Opcode::Strword,
            BaseType::Byte => Opcode::Strbyte,
        });
    }

    /// Declare an array header that aliases an existing body
    /// (interpreter-side pass-by-reference).
    pub(crate) fn create_array_ref(
        &mut self,
        name: &str,
        ty: BaseType,
        size: i16,
        body_loc: i32,
    ) -> Result<(), LangError> {
        let key = var_key(name);
        self.check_fresh(&key)?;
        self.vars.entries.push(VarEntry {
            key,
            ty,
            is_const: false,
            array: Some(size),
            loc: body_loc,
            const_val: 0,
            compiled: false,
        });
        Ok(())
    }

    /// Assign to an existing variable. `idx` is `Some` when a `[expr]`
    /// subscript was parsed (in compile mode the index code has already
    /// been emitted and the value is on the VM stack above it).
    pub(crate) fn set_var(
        &mut self,
        name: &str,
        idx: Option<i16>,
        value: i16,
    ) -> Result<(), LangError> {
        let key = var_key(name);
        let (i, local) = self.vars.find(&key, false).ok_or(LangError::ExpectVar)?;
        let e = self.vars.entries[i].clone();
        if e.is_const {
            return Err(LangError::StoreConst);
        }

        match e.array {
            None => {
                if idx.is_some() {
                    return Err(LangError::BadSubscript);
                }
                match self.mode {
                    Mode::Compile => {
                        // Globals use absolute addressing even inside a
                        // subroutine; only locals of the sub being
                        // compiled are frame-relative.
                        let rel = local && self.compiling_sub;
                        let op = match (rel, e.ty) {
                            (true, BaseType::Word) => Opcode::StrwordImm,
                            (true, BaseType::Byte) => Opcode::StrbyteImm,
                            (false, BaseType::Word) => Opcode::StawordImm,
                            (false, BaseType::Byte) => Opcode::StabyteImm,
                        };
                        self.emitter.emit_imm(op, e.loc);
                    }
                    Mode::Interpret => match e.ty {
                        BaseType::Word => self.mem.write_word(e.loc as u16, value),
                        BaseType::Byte => self.mem.write_byte(e.loc as u16, value as u8),
                    },
                }
            }
            Some(size) => {
                if idx.is_none() {
                    return Err(LangError::BadSubscript);
                }
                match self.mode {
                    Mode::Compile => {
                        // Stack holds [index, value]; reorder and turn the
                        // index into an address.
                        self.emitter.emit(Opcode::Swap);
                        if e.ty == BaseType::Word {
                            self.emitter.emit_ldi(1);
                            self.emitter.emit(Opcode::Lsh);
                        }
                        self.emitter.emit_ldi(e.loc);
                        if size == -1 {
                            // Pass-by-reference: the slot holds a pointer
                            // to the body pointer.
                            self.emitter.emit(Opcode::Ldrword);
                        }
                        self.emitter.emit(Opcode::Add);
                        let rel = local && self.compiling_sub && size != -1;
                        let op = match (rel, e.ty) {
                            (true, BaseType::Word) => Opcode::Strword,
                            (true, BaseType::Byte) => Opcode::Strbyte,
                            (false, BaseType::Word) => Opcode::Staword,
                            (false, BaseType::Byte) => Opcode::Stabyte,
                        };
                        self.emitter.emit(op);
                    }
                    Mode::Interpret => {
                        let i = idx.unwrap_or(0);
                        if i < 0 || i >= size {
                            return Err(LangError::BadSubscript);
                        }
                        let addr = (e.loc as u16).wrapping_add(i as u16 * e.ty.size());
                        match e.ty {
                            BaseType::Word => self.mem.write_word(addr, value),
                            BaseType::Byte => self.mem.write_byte(addr, value as u8),
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Read a variable (or its address). In compile mode this emits the
    /// load and returns 0; with `lookup_only` it instead returns the raw
    /// descriptor slot without generating code (the compile-time peek
    /// used for constants and for loop-variable addresses).
    pub(crate) fn get_var(
        &mut self,
        name: &str,
        idx: Option<i16>,
        address: bool,
        lookup_only: bool,
    ) -> Result<(i16, VarInfo), LangError> {
        let key = var_key(name);
        let (i, local) = self.vars.find(&key, false).ok_or(LangError::ExpectVar)?;
        let e = self.vars.entries[i].clone();
        let info = VarInfo {
            ty: e.ty,
            is_const: e.is_const,
            is_array: e.array.is_some(),
            is_local: local,
        };

        if lookup_only {
            let slot = if e.is_const { e.const_val } else { e.loc as i16 };
            return Ok((slot, info));
        }

        let val = match e.array {
            None => {
                if idx.is_some() {
                    return Err(LangError::BadSubscript);
                }
                match self.mode {
                    Mode::Compile => {
                        let rel = local && self.compiling_sub;
                        if address {
                            self.emitter.emit_ldi(e.loc);
                            if rel {
                                self.emitter.emit(Opcode::Rtoa);
                            }
                        } else {
                            let op = match (rel, e.ty) {
                                (true, BaseType::Word) => Opcode::LdrwordImm,
                                (true, BaseType::Byte) => Opcode::LdrbyteImm,
                                (false, BaseType::Word) => Opcode::LdawordImm,
                                (false, BaseType::Byte) => Opcode::LdabyteImm,
                            };
                            self.emitter.emit_imm(op, e.loc);
                        }
                        0
                    }
                    Mode::Interpret => {
                        if address {
                            e.loc as i16
                        } else if e.is_const {
                            e.const_val
                        } else if e.compiled {
                            // Descriptor made by the compiler: the slot
                            // holds the VM address, which is all there is
                            // to read.
                            e.loc as i16
                        } else {
                            match e.ty {
                                BaseType::Word => self.mem.read_word(e.loc as u16),
                                BaseType::Byte => i16::from(self.mem.read_byte(e.loc as u16)),
                            }
                        }
                    }
                }
            }
            Some(size) => {
                // For an array A, both `A` and `&A` mean `&A[0]`; the
                // second form is what array pass-by-reference rides on.
                let mut address = address;
                let mut idx = idx;
                if idx.is_none() {
                    address = true;
                    idx = Some(0);
                    if self.mode == Mode::Compile {
                        self.emitter.emit_ldi(0);
                    }
                }
                match self.mode {
                    Mode::Compile => {
                        if e.ty == BaseType::Word {
                            self.emitter.emit_ldi(1);
                            self.emitter.emit(Opcode::Lsh);
                        }
                        self.emitter.emit_ldi(e.loc);
                        if size == -1 {
                            self.emitter.emit(Opcode::Ldrword);
                        }
                        self.emitter.emit(Opcode::Add);
                        let rel = local && self.compiling_sub;
                        if !address {
                            let op = match (rel && size != -1, e.ty) {
                                (true, BaseType::Word) => Opcode::Ldrword,
                                (true, BaseType::Byte) => Opcode::Ldrbyte,
                                (false, BaseType::Word) => Opcode::Ldaword,
                                (false, BaseType::Byte) => Opcode::Ldabyte,
                            };
                            self.emitter.emit(op);
                        } else if rel && size != -1 {
                            self.emitter.emit(Opcode::Rtoa);
                        }
                        0
                    }
                    Mode::Interpret => {
                        let i = idx.unwrap_or(0);
                        if i < 0 || i >= size {
                            return Err(LangError::BadSubscript);
                        }
                        let addr = (e.loc as u16).wrapping_add(i as u16 * e.ty.size());
                        if address {
                            addr as i16
                        } else {
                            match e.ty {
                                BaseType::Word => self.mem.read_word(addr),
                                BaseType::Byte => i16::from(self.mem.read_byte(addr)),
                            }
                        }
                    }
                }
            }
        };
        Ok((val, info))
    }

    /// The `vars` statement: dump the variable table.
    pub(crate) fn print_vars(&mut self) {
        for i in 0..self.vars.entries.len() {
            let e = self.vars.entries[i].clone();
            for k in 0..VAR_NAME_CHARS {
                let ch = if e.key[k] == 0 { b' ' } else { e.key[k] };
                self.console.putc(ch);
            }
            if let Some(size) = e.array {
                self.console.putc(b'[');
                self.print_dec(size);
                self.console.putc(b']');
            }
            self.console.putc(b' ');
            self.console.putc(match e.ty {
                BaseType::Word => b'w',
                BaseType::Byte => b'b',
            });
            self.console.putc(if e.is_const { b'c' } else { b' ' });
            self.console.putc(b' ');
            if e.array.is_none() {
                let val = if e.is_const {
                    e.const_val
                } else if e.compiled {
                    e.loc as i16
                } else {
                    match e.ty {
                        BaseType::Word => self.mem.read_word(e.loc as u16),
                        BaseType::Byte => i16::from(self.mem.read_byte(e.loc as u16)),
                    }
                };
                self.print_dec(val);
            }
            self.console.putc(b'\n');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eightball_core::RecordingConsole;

    fn interp() -> Interp {
        Interp::new(Box::new(RecordingConsole::new()))
    }

    #[test]
    fn test_var_key_truncates_to_four() {
        assert_eq!(var_key("counter"), *b"coun");
        assert_eq!(var_key("x"), *b"x\0\0\0");
        // Names identical in the first four characters collide.
        assert_eq!(var_key("count"), var_key("counter"));
    }

    #[test]
    fn test_scalar_create_and_read() {
        let mut i = interp();
        i.create_scalar("x", DeclKind::Word, -42).expect("declared");
        let (v, info) = i.get_var("x", None, false, false).expect("found");
        assert_eq!(v, -42);
        assert_eq!(info.ty, BaseType::Word);
        assert!(!info.is_array);
    }

    #[test]
    fn test_redefinition_rejected() {
        let mut i = interp();
        i.create_scalar("x", DeclKind::Word, 1).expect("declared");
        assert_eq!(
            i.create_scalar("x", DeclKind::Byte, 2),
            Err(LangError::Redefined)
        );
        // Same 4-char prefix is the same name.
        i.create_scalar("xaaa1", DeclKind::Word, 3).expect("declared");
        assert_eq!(
            i.create_scalar("xaaa2", DeclKind::Word, 4),
            Err(LangError::Redefined)
        );
    }

    #[test]
    fn test_byte_truncates_value() {
        let mut i = interp();
        i.create_scalar("b", DeclKind::Byte, 0x1ff).expect("declared");
        let (v, _) = i.get_var("b", None, false, false).expect("found");
        assert_eq!(v, 0xff);
    }

    #[test]
    fn test_const_blocks_assignment() {
        let mut i = interp();
        i.create_scalar("k", DeclKind::Const, 7).expect("declared");
        assert_eq!(i.set_var("k", None, 9), Err(LangError::StoreConst));
        let (v, info) = i.get_var("k", None, false, false).expect("found");
        assert_eq!(v, 7);
        assert!(info.is_const);
    }

    #[test]
    fn test_scope_teardown_restores_globals() {
        let mut i = interp();
        i.create_scalar("g", DeclKind::Word, 1).expect("global");
        let mark = i.arena.mark();
        i.vars.mark_frame(mark);
        i.create_scalar("l", DeclKind::Word, 2).expect("local");
        // Local shadows nothing; both visible.
        assert!(i.get_var("l", None, false, false).is_ok());
        assert!(i.get_var("g", None, false, false).is_ok());
        let saved = i.vars.drop_frame().expect("frame open");
        i.arena.release(saved);
        assert_eq!(i.get_var("l", None, false, false).map(|_| ()), Err(LangError::ExpectVar));
        assert!(i.get_var("g", None, false, false).is_ok());
        assert_eq!(i.arena.mark(), mark);
    }

    #[test]
    fn test_local_shadows_global() {
        let mut i = interp();
        i.create_scalar("x", DeclKind::Word, 1).expect("global");
        i.vars.mark_frame(i.arena.mark());
        i.create_scalar("x", DeclKind::Word, 2).expect("local shadow");
        let (v, info) = i.get_var("x", None, false, false).expect("found");
        assert_eq!(v, 2);
        assert!(info.is_local);
        i.vars.drop_frame();
        let (v, _) = i.get_var("x", None, false, false).expect("global again");
        assert_eq!(v, 1);
    }

    #[test]
    fn test_array_bounds_checked() {
        let mut i = interp();
        i.lnbuf = b"{1, 2, 3}".to_vec();
        i.pos = 0;
        i.create_array("a", BaseType::Word, 3).expect("declared");
        assert_eq!(i.get_var("a", Some(0), false, false).expect("ok").0, 1);
        assert_eq!(i.get_var("a", Some(2), false, false).expect("ok").0, 3);
        assert_eq!(
            i.get_var("a", Some(3), false, false).map(|_| ()),
            Err(LangError::BadSubscript)
        );
        assert_eq!(
            i.get_var("a", Some(-1), false, false).map(|_| ()),
            Err(LangError::BadSubscript)
        );
    }

    #[test]
    fn test_string_initializer_too_long() {
        let mut i = interp();
        i.lnbuf = b"\"hello\"".to_vec();
        i.pos = 0;
        // Four elements leave room for three characters plus NUL.
        assert_eq!(
            i.create_array("s", BaseType::Byte, 4),
            Err(LangError::TooLong)
        );
    }

    #[test]
    fn test_string_initializer_nul_terminated() {
        let mut i = interp();
        i.lnbuf = b"\"hi\"".to_vec();
        i.pos = 0;
        i.create_array("s", BaseType::Byte, 8).expect("declared");
        let (addr, _) = i.get_var("s", Some(0), true, false).expect("address");
        assert_eq!(i.mem.read_cstr(addr as u16), b"hi");
    }

    #[test]
    fn test_array_dimension_must_be_positive() {
        let mut i = interp();
        i.lnbuf = b"{0}".to_vec();
        i.pos = 0;
        assert_eq!(i.create_array("a", BaseType::Word, 0), Err(LangError::BadDim));
        assert_eq!(i.create_array("b", BaseType::Word, -5), Err(LangError::BadDim));
    }

    #[test]
    fn test_array_ref_aliases_body() {
        let mut i = interp();
        i.lnbuf = b"{10, 20}".to_vec();
        i.pos = 0;
        i.create_array("orig", BaseType::Word, 2).expect("declared");
        let body = i.vars.entries[0].loc;
        i.vars.mark_frame(i.arena.mark());
        i.create_array_ref("alias", BaseType::Word, 2, body).expect("ref");
        i.set_var("alias", Some(1), 99).expect("stored");
        i.vars.drop_frame();
        assert_eq!(i.get_var("orig", Some(1), false, false).expect("ok").0, 99);
    }
}
