//! Control-flow engine.
//!
//! Every open construct lives as a tagged [`Frame`] on a bounded return
//! stack. The frame at the top identifies the innermost construct; a
//! closer that finds the wrong tag reports `no if` / `no for` /
//! `no while`. When compiling, frames carry the placeholder addresses of
//! forward branches, patched when the matching closer arrives; when
//! interpreting, they carry the line/cursor positions loops and calls
//! resume from.
//!
//! `return` unwinds to the nearest call frame, which also discards any
//! still-open `if`/`for`/`while` inside the callee.

use crate::Interp;
use crate::cursor::Scan;
use crate::error::LangError;
use crate::machine::{Mode, RET_STACK_SIZE, RunOutcome};
use crate::subs::sub_key;
use crate::vars::{BaseType, DeclKind, VarEntry, var_key};
use eightball_core::{FRAME_ARGS_OFFSET, Opcode};

/// One return-stack frame.
#[derive(Debug, Clone)]
pub(crate) enum Frame {
    /// Subroutine activation. `line` is the caller's line (-1 when called
    /// from immediate mode, -2 for the synthetic frame that makes an
    /// expression-style invocation return promptly); `resume_pos` is the
    /// cursor position just after the call's argument list.
    Call { line: i32, resume_pos: usize },
    If(IfFrame),
    For(ForFrame),
    While(WhileFrame),
}

#[derive(Debug, Clone)]
pub(crate) enum IfFrame {
    /// Interpreter bookkeeping: 0 = skip flag was already set, 1 = this
    /// `if` set it (condition false), 2 = condition true.
    Interp { status: u8 },
    /// Placeholders awaiting fixup: the branch taken when the condition
    /// is false, and the jump emitted by `else` over its block.
    Compile {
        cond_patch: Option<u16>,
        end_patch: Option<u16>,
    },
}

#[derive(Debug, Clone)]
pub(crate) enum ForFrame {
    Interp {
        ty: BaseType,
        line: i32,
        resume_pos: usize,
        limit: i16,
        var_addr: u16,
    },
    Compile {
        ty: BaseType,
        /// Frame-relative loop variable addressing?
        rel: bool,
        top_pc: u16,
        var_loc: i32,
    },
}

#[derive(Debug, Clone)]
pub(crate) enum WhileFrame {
    /// Same status convention as [`IfFrame::Interp`].
    Interp {
        status: u8,
        line: i32,
        resume_pos: usize,
    },
    Compile {
        /// PC before the guard expression, so `endwhile` can jump back
        /// and re-evaluate it.
        top_pc: u16,
        patch_addr: u16,
    },
}

impl Interp {
    pub(crate) fn push_frame(&mut self, frame: Frame) -> Result<(), LangError> {
        if self.ret_stack.len() >= RET_STACK_SIZE {
            return Err(LangError::Stack);
        }
        self.ret_stack.push(frame);
        Ok(())
    }

    // ---------------------------------------------------------------
    // if / else / endif
    // ---------------------------------------------------------------

    pub(crate) fn do_if(&mut self, arg: i16) -> Result<(), LangError> {
        if self.mode == Mode::Compile {
            // Condition value is on the VM stack; branch over the block
            // when it is false.
            self.emitter.emit(Opcode::Not);
            let patch = self.emitter.rt_pc + 1;
            self.emitter.emit_imm(Opcode::BrnchImm, 0xffff);
            self.push_frame(Frame::If(IfFrame::Compile {
                cond_patch: Some(patch),
                end_patch: None,
            }))
        } else {
            let status = if self.skip_flag {
                0
            } else if arg == 0 {
                self.skip_flag = true;
                1
            } else {
                2
            };
            self.push_frame(Frame::If(IfFrame::Interp { status }))
        }
    }

    pub(crate) fn do_else(&mut self) -> Result<(), LangError> {
        let frame = self.ret_stack.pop().ok_or(LangError::NoIf)?;
        let Frame::If(iff) = frame else {
            self.ret_stack.push(frame);
            return Err(LangError::NoIf);
        };
        match iff {
            IfFrame::Compile { cond_patch, .. } => {
                // Jump over the else block when the if block ran.
                let end_patch = self.emitter.rt_pc + 1;
                self.emitter.emit_imm(Opcode::JmpImm, 0xffff);
                if let Some(p) = cond_patch {
                    let here = self.emitter.rt_pc;
                    self.emitter.fixup(p, here);
                }
                self.ret_stack.push(Frame::If(IfFrame::Compile {
                    cond_patch: None,
                    end_patch: Some(end_patch),
                }));
            }
            IfFrame::Interp { status } => {
                if status == 2 {
                    self.skip_flag = true;
                } else if status == 1 {
                    self.skip_flag = false;
                }
                self.ret_stack.push(Frame::If(IfFrame::Interp { status }));
            }
        }
        Ok(())
    }

    pub(crate) fn do_endif(&mut self) -> Result<(), LangError> {
        let frame = self.ret_stack.pop().ok_or(LangError::NoIf)?;
        let Frame::If(iff) = frame else {
            self.ret_stack.push(frame);
            return Err(LangError::NoIf);
        };
        match iff {
            IfFrame::Compile {
                cond_patch,
                end_patch,
            } => {
                let here = self.emitter.rt_pc;
                if let Some(p) = cond_patch {
                    self.emitter.fixup(p, here);
                }
                if let Some(p) = end_patch {
                    self.emitter.fixup(p, here);
                }
            }
            IfFrame::Interp { status } => {
                // Clear the skip flag only if this if (or its else) owned it.
                if status != 0 {
                    self.skip_flag = false;
                }
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // for / endfor
    // ---------------------------------------------------------------

    /// Push the loop frame after `for var = start : limit` has assigned
    /// the start value. In compile mode the limit is on the VM stack.
    pub(crate) fn do_for(
        &mut self,
        name: &str,
        idx: Option<i16>,
        limit: i16,
    ) -> Result<(), LangError> {
        let lookup = self.mode == Mode::Compile;
        let (slot, info) = self.get_var(name, idx, true, lookup)?;

        if self.mode == Mode::Compile {
            let rel = info.is_local && self.compiling_sub;
            // Park the loop limit on the VM call stack for endfor.
            self.emitter.emit(Opcode::Pshword);
            self.emitter.push_callstack(2)?;
            self.push_frame(Frame::For(ForFrame::Compile {
                ty: info.ty,
                rel,
                top_pc: self.emitter.rt_pc,
                var_loc: i32::from(slot),
            }))
        } else {
            self.push_frame(Frame::For(ForFrame::Interp {
                ty: info.ty,
                line: self.counter,
                resume_pos: self.pos,
                limit,
                var_addr: slot as u16,
            }))
        }
    }

    pub(crate) fn do_endfor(&mut self) -> Result<(), LangError> {
        let frame = self.ret_stack.pop().ok_or(LangError::NoFor)?;
        let Frame::For(ff) = frame else {
            self.ret_stack.push(frame);
            return Err(LangError::NoFor);
        };
        match ff {
            ForFrame::Compile {
                ty,
                rel,
                top_pc,
                var_loc,
            } => {
                // Limit back onto the VM stack, keeping a copy parked.
                self.emitter.emit(Opcode::Popword);
                self.emitter.pop_callstack(2);
                self.emitter.emit(Opcode::Dup);
                self.emitter.emit(Opcode::Pshword);
                self.emitter.push_callstack(2)?;

                // Load, increment and store back the loop variable.
                let (ld, st) = match (rel, ty) {
                    (true, BaseType::Word) => (Opcode::LdrwordImm, Opcode::StrwordImm),
                    (true, BaseType::Byte) => (Opcode::LdrbyteImm, Opcode::StrbyteImm),
                    (false, BaseType::Word) => (Opcode::LdawordImm, Opcode::StawordImm),
                    (false, BaseType::Byte) => (Opcode::LdabyteImm, Opcode::StabyteImm),
                };
                self.emitter.emit_imm(ld, var_loc);
                self.emitter.emit(Opcode::Inc);
                self.emitter.emit(Opcode::Dup);
                self.emitter.emit_imm(st, var_loc);

                // Still in range? Back to the top of the loop.
                self.emitter.emit(Opcode::Gte);
                self.emitter.emit_imm(Opcode::BrnchImm, i32::from(top_pc));

                // Done: drop the parked limit.
                self.emitter.emit(Opcode::Popword);
                self.emitter.pop_callstack(2);
                self.emitter.emit(Opcode::Drop);
            }
            ForFrame::Interp {
                ty,
                line,
                resume_pos,
                limit,
                var_addr,
            } => {
                let val = match ty {
                    BaseType::Word => self.mem.read_word(var_addr),
                    BaseType::Byte => i16::from(self.mem.read_byte(var_addr)),
                };
                if val < limit {
                    match ty {
                        BaseType::Word => {
                            let v = self.mem.read_word(var_addr).wrapping_add(1);
                            self.mem.write_word(var_addr, v);
                        }
                        BaseType::Byte => {
                            let v = self.mem.read_byte(var_addr).wrapping_add(1);
                            self.mem.write_byte(var_addr, v);
                        }
                    }
                    self.back_to_top(line, resume_pos);
                    self.push_frame(Frame::For(ForFrame::Interp {
                        ty,
                        line,
                        resume_pos,
                        limit,
                        var_addr,
                    }))?;
                }
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // while / endwhile
    // ---------------------------------------------------------------

    /// `start_pos` is the cursor position of the `while` statement
    /// itself, so the interpreter can re-parse the guard each iteration.
    pub(crate) fn do_while(&mut self, start_pos: usize, arg: i16) -> Result<(), LangError> {
        if self.mode == Mode::Compile {
            let top_pc = self.rt_pc_before_eval;
            self.emitter.emit(Opcode::Not);
            let patch_addr = self.emitter.rt_pc + 1;
            self.emitter.emit_imm(Opcode::BrnchImm, 0xffff);
            self.push_frame(Frame::While(WhileFrame::Compile { top_pc, patch_addr }))
        } else {
            let status = if self.skip_flag {
                0
            } else if arg == 0 {
                self.skip_flag = true;
                1
            } else {
                2
            };
            self.push_frame(Frame::While(WhileFrame::Interp {
                status,
                line: self.counter,
                resume_pos: start_pos,
            }))
        }
    }

    pub(crate) fn do_endwhile(&mut self) -> Result<(), LangError> {
        let frame = self.ret_stack.pop().ok_or(LangError::NoWhile)?;
        let Frame::While(wf) = frame else {
            self.ret_stack.push(frame);
            return Err(LangError::NoWhile);
        };
        match wf {
            WhileFrame::Compile { top_pc, patch_addr } => {
                // Jump back and re-evaluate the guard; the guard's branch
                // lands here.
                self.emitter.emit_imm(Opcode::JmpImm, i32::from(top_pc));
                let here = self.emitter.rt_pc;
                self.emitter.fixup(patch_addr, here);
            }
            WhileFrame::Interp {
                status,
                line,
                resume_pos,
            } => match status {
                0 => {}
                1 => self.skip_flag = false,
                2 => self.back_to_top(line, resume_pos),
                _ => unreachable!("while status"),
            },
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // sub / endsub / call / return
    // ---------------------------------------------------------------

    /// `sub name(formals)`. Compiler-only: running into a declaration
    /// means a missing `return` upstream.
    pub(crate) fn do_sub(&mut self, name: &str) -> Result<(), LangError> {
        if self.mode != Mode::Compile {
            return Err(LangError::RanIntoSub);
        }
        self.compiling_sub = true;

        self.console.print("\n[");
        self.console.print(name);
        self.console.print("]");

        self.subs.add_def(name, self.emitter.rt_pc)?;
        self.vars.mark_frame(self.arena.mark());
        self.emitter.emit(Opcode::Sptofp);
        self.emitter.rt_fp = self.emitter.rt_sp;

        self.expect(b'(')?;
        loop {
            self.eat_space();
            if self.peek() == b')' {
                break;
            }
            let ty = if self.looking_at("word ") {
                BaseType::Word
            } else if self.looking_at("byte ") {
                BaseType::Byte
            } else {
                return Err(LangError::Arg);
            };
            self.pos += 5;
            self.eat_space();
            let pname = self.scan_name();
            let mut arraymode = false;
            if self.peek() == b'[' {
                self.advance();
                if self.peek() == b']' {
                    self.advance();
                    arraymode = true;
                } else {
                    return Err(LangError::Arg);
                }
            }

            // Formals address storage the caller has already pushed. Each
            // new formal moves everything previously added further from
            // the frame pointer, so bump those offsets first.
            let bump = if arraymode || ty == BaseType::Word { 2 } else { 1 };
            let frame_start = self
                .vars
                .frames
                .last()
                .map(|f| f.start)
                .unwrap_or(0);
            for e in &mut self.vars.entries[frame_start..] {
                e.loc += bump;
            }
            self.vars.entries.push(VarEntry {
                key: var_key(&pname),
                ty,
                is_const: false,
                // -1 marks pass-by-reference: the slot holds the address
                // of the caller's body pointer.
                array: if arraymode { Some(-1) } else { None },
                loc: FRAME_ARGS_OFFSET,
                const_val: 0,
                compiled: true,
            });

            self.eat_space();
            if self.peek() == b',' {
                self.advance();
            }
        }
        self.expect(b')')
    }

    /// `endsub`: close the frame and return 0.
    pub(crate) fn do_endsub(&mut self) -> Result<(), LangError> {
        if self.mode == Mode::Compile {
            self.emitter.rt_sp = self.emitter.rt_fp;
            self.compiling_sub = false;
            if let Some(saved) = self.vars.drop_frame() {
                self.arena.release(saved);
            }
            self.emitter.emit_ldi(0);
        }
        self.do_return(0)
    }

    /// `return expr`. In compile mode the value is already on the VM
    /// stack; the frame's locals are discarded with a single SP := FP.
    pub(crate) fn do_return(&mut self, value: i16) -> Result<(), LangError> {
        if self.mode == Mode::Compile {
            self.emitter.emit(Opcode::Fptosp);
            self.emitter.emit(Opcode::Rts);
            return Ok(());
        }

        // Unwind to the nearest call frame, discarding any open
        // if/for/while inside the callee.
        let idx = self
            .ret_stack
            .iter()
            .rposition(|f| matches!(f, Frame::Call { .. }))
            .ok_or(LangError::Stack)?;
        let (line, resume_pos) = match &self.ret_stack[idx] {
            Frame::Call { line, resume_pos } => (*line, *resume_pos),
            _ => unreachable!("rposition matched a call frame"),
        };
        self.ret_stack.truncate(idx);

        self.ret_register = value;
        if let Some(saved) = self.vars.drop_frame() {
            self.arena.release(saved);
        }
        self.back_to_top(line, resume_pos);
        Ok(())
    }

    /// Find the stored line declaring `name` (8 significant characters).
    fn find_sub_line(&self, name: &str) -> Option<usize> {
        let want = sub_key(name);
        for i in 0..self.program.len() {
            let mut scan = Scan::new(self.program.line(i));
            scan.eat_space();
            if !scan.eat("sub ") {
                continue;
            }
            scan.eat_space();
            if sub_key(&scan.scan_name()) == want {
                return Some(i);
            }
        }
        None
    }

    /// The shared call path. Parses the actual arguments at the cursor
    /// against the formal list on the `sub` line. Interpreter: open a
    /// frame, bind actuals (evaluated in the caller's scope) to fresh
    /// locals, and move execution to the line after the `sub`. Compiler:
    /// push each actual, emit `JSRIMM` with a placeholder and record it
    /// for the linker, then discard the pushed arguments.
    pub(crate) fn do_call(&mut self, name: &str) -> Result<(), LangError> {
        let orig_counter = self.counter;
        let Some(subline) = self.find_sub_line(name) else {
            return Err(LangError::NoSub);
        };

        let defline = self.program.line(subline).to_string();
        let mut scan = Scan::new(&defline);
        scan.eat_space();
        scan.eat("sub ");
        scan.eat_space();
        scan.scan_name();
        if scan.peek() != b'(' {
            return Err(LangError::Expected('('));
        }
        scan.advance();

        self.eat_space();
        self.expect(b'(')?;

        let compile = self.mode == Mode::Compile;
        let mut argbytes: i16 = 0;
        let caller_active = self.vars.active;
        if !compile {
            self.vars.mark_frame(self.arena.mark());
        }
        let callee_active = self.vars.active;

        loop {
            scan.eat_space();
            if scan.peek() == b')' {
                break;
            }
            let ty = if scan.eat("word ") {
                BaseType::Word
            } else if scan.eat("byte ") {
                BaseType::Byte
            } else {
                return Err(LangError::Arg);
            };
            scan.eat_space();
            let pname = scan.scan_name();
            let mut arraymode = false;
            if scan.peek() == b'[' {
                scan.advance();
                if scan.peek() == b']' {
                    scan.advance();
                    arraymode = true;
                } else {
                    return Err(LangError::Arg);
                }
            }

            // Matching actual argument at the cursor.
            if self.at_eol() || self.peek() == b')' {
                return Err(LangError::Arg);
            }
            if !arraymode {
                // Scalar: evaluate in the caller's scope, bind in the
                // callee's.
                if !compile {
                    self.vars.active = caller_active;
                }
                let arg = self.eval(false)?;
                if compile {
                    match ty {
                        BaseType::Word => {
                            self.emitter.emit(Opcode::Pshword);
                            argbytes += 2;
                        }
                        BaseType::Byte => {
                            self.emitter.emit(Opcode::Pshbyte);
                            argbytes += 1;
                        }
                    }
                } else {
                    self.vars.active = callee_active;
                    let kind = match ty {
                        BaseType::Word => DeclKind::Word,
                        BaseType::Byte => DeclKind::Byte,
                    };
                    self.create_scalar(&pname, kind, arg)?;
                }
            } else if compile {
                // The actual evaluates to the array's address.
                self.eval(false)?;
                self.emitter.emit(Opcode::Pshword);
                argbytes += 2;
            } else {
                // Pass-by-reference: copy the caller's array header, body
                // shared.
                let aname = self.scan_name();
                self.vars.active = caller_active;
                let found = self.vars.find(&var_key(&aname), false);
                let Some((i, _)) = found else {
                    self.vars.active = callee_active;
                    return Err(LangError::ExpectVar);
                };
                let entry = self.vars.entries[i].clone();
                self.vars.active = callee_active;
                let Some(size) = entry.array else {
                    return Err(LangError::Type);
                };
                if entry.ty != ty {
                    return Err(LangError::Type);
                }
                self.create_array_ref(&pname, ty, size, entry.loc)?;
            }

            self.eat_space();
            if self.peek() == b',' {
                self.advance();
            }
            self.eat_space();
            scan.eat_space();
            if scan.peek() == b',' {
                scan.advance();
            }
        }
        self.eat_space();
        self.expect(b')')?;

        if compile {
            self.emitter.emit_imm(Opcode::JsrImm, 0xffff);
            self.subs.add_call(name, self.emitter.rt_pc - 2);
            if argbytes != 0 {
                // Caller drops the arguments it pushed.
                self.emitter.emit_ldi(i32::from(argbytes));
                self.emitter.emit(Opcode::Discard);
            }
        } else {
            self.push_frame(Frame::Call {
                line: orig_counter,
                resume_pos: self.pos,
            })?;
            // Execution continues at the first line of the body.
            let body = subline + 1;
            self.counter = subline as i32 + 1;
            if body < self.program.len() {
                self.current = Some(body);
                self.load_line(body);
            } else {
                self.current = None;
                self.lnbuf.clear();
                self.pos = 0;
            }
        }
        Ok(())
    }

    /// Function invocation inside an expression. The interpreter pushes a
    /// synthetic call frame with a sentinel caller line of -2 and runs
    /// the callee to its first `return`; the compiler goes through the
    /// plain call path and leaves the return value on the VM stack.
    pub(crate) fn call_in_expression(&mut self, name: &str) -> Result<(), LangError> {
        use crate::expr::OpTok;

        if self.mode == Mode::Compile {
            self.push_operator_stack(OpTok::Sentinel)?;
            self.do_call(name)?;
            self.pop_operator_stack()?;
            return Ok(());
        }

        self.push_operator_stack(OpTok::Sentinel)?;
        let old_current = self.current;
        let old_counter = self.counter;

        // The synthetic frame makes the nested run return as soon as the
        // callee's `return` executes.
        self.push_frame(Frame::Call {
            line: -2,
            resume_pos: 0,
        })?;
        self.do_call(name)?;

        let outcome = self.run(true);
        if outcome != RunOutcome::Completed {
            return Err(LangError::Stack);
        }

        self.current = old_current;
        self.counter = old_counter;

        match self.ret_stack.pop() {
            Some(Frame::Call { line: -2, .. }) => {}
            _ => return Err(LangError::Stack),
        }
        self.pop_operator_stack()?;
        let value = self.ret_register;
        self.push_operand(value)
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
    fn test_else_without_if() {
        let mut i = interp();
        assert_eq!(i.do_else(), Err(LangError::NoIf));
    }

    #[test]
    fn test_closer_checks_innermost_tag() {
        let mut i = interp();
        i.do_if(1).expect("if open");
        assert_eq!(i.do_endfor(), Err(LangError::NoFor));
        assert_eq!(i.do_endwhile(), Err(LangError::NoWhile));
        // The if frame survived the failed closers.
        assert!(i.do_endif().is_ok());
        assert!(i.ret_stack.is_empty());
    }

    #[test]
    fn test_if_skip_flag_ownership() {
        let mut i = interp();
        i.do_if(0).expect("if");
        assert!(i.skip_flag);
        // A nested if while skipping stays passive.
        i.do_if(1).expect("nested if");
        i.do_endif().expect("nested endif");
        assert!(i.skip_flag);
        i.do_endif().expect("endif");
        assert!(!i.skip_flag);
    }

    #[test]
    fn test_else_toggles_owner_only() {
        let mut i = interp();
        i.do_if(1).expect("true if");
        assert!(!i.skip_flag);
        i.do_else().expect("else");
        assert!(i.skip_flag);
        i.do_endif().expect("endif");
        assert!(!i.skip_flag);
    }

    #[test]
    fn test_return_without_call_frame() {
        let mut i = interp();
        assert_eq!(i.do_return(0), Err(LangError::Stack));
    }

    #[test]
    fn test_return_unwinds_nested_frames() {
        let mut i = interp();
        i.vars.mark_frame(i.arena.mark());
        i.push_frame(Frame::Call {
            line: -1,
            resume_pos: 0,
        })
        .expect("call frame");
        i.do_if(1).expect("if inside callee");
        i.do_return(7).expect("return unwinds the open if too");
        assert!(i.ret_stack.is_empty());
        assert_eq!(i.ret_register, 7);
    }

    #[test]
    fn test_running_into_sub_declaration() {
        let mut i = interp();
        i.lnbuf = b"(word n)".to_vec();
        i.pos = 0;
        assert_eq!(i.do_sub("f"), Err(LangError::RanIntoSub));
    }

    #[test]
    fn test_formal_offsets_account_for_later_args() {
        let mut i = interp();
        i.mode = Mode::Compile;
        i.lnbuf = b"(word a, byte b, word c[])".to_vec();
        i.pos = 0;
        i.do_sub("f").expect("declared");
        // Last formal sits at the base offset; earlier ones are pushed
        // further out by the later ones' sizes.
        let locs: Vec<i32> = i.vars.entries.iter().map(|e| e.loc).collect();
        assert_eq!(locs, vec![FRAME_ARGS_OFFSET + 3, FRAME_ARGS_OFFSET + 2, FRAME_ARGS_OFFSET]);
        assert_eq!(i.vars.entries[2].array, Some(-1));
    }
}
