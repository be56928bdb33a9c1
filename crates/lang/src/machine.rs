//! The interpreter/compiler state machine.
//!
//! One [`Interp`] owns everything the front-end needs: the program store,
//! the variable table and its arena, the expression stacks, the return
//! stack, the bytecode emitter and the subroutine tables. A single
//! statement traversal drives two back-ends; [`Mode`] selects whether
//! statements execute immediately or emit VM bytecode.

use crate::error::LangError;
use crate::expr::OpTok;
use crate::program::Program;
use crate::statement::Stop;
use crate::subs::SubTable;
use crate::vars::VarTable;
use eightball_core::{Arena, Console, Memory, Opcode};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Capacity of the operand and operator stacks.
pub(crate) const EXPR_STACK_SIZE: usize = 16;

/// Capacity of the return stack, in frames.
pub(crate) const RET_STACK_SIZE: usize = 64;

/// Longest accepted source line, matching the 255-byte line buffers of
/// the language's 8-bit targets.
pub(crate) const LINE_MAX: usize = 255;

/// Which back-end the shared statement traversal drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Execute statements as they are parsed.
    Interpret,
    /// Emit VM bytecode instead of executing.
    Compile,
}

/// Editor state of the top-level loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditMode {
    /// Lines typed at the prompt execute immediately.
    Off,
    /// Lines are inserted into the program; `at` is the 0-based index the
    /// next line goes to.
    Append { at: usize },
    /// The next line becomes the new first line of the program.
    InsertFirst,
}

/// How a top-level line or a program run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Ran to completion (or a clean `end`).
    Completed,
    /// An error was reported; transient state has been reset.
    Errored,
    /// The user hit the break key.
    Interrupted,
    /// The `quit` statement was executed.
    Quit,
}

/// The language front-end: line editor data model, interpreter and
/// single-pass compiler in one.
pub struct Interp {
    pub(crate) console: Box<dyn Console>,
    pub(crate) mem: Memory,
    pub(crate) arena: Arena,
    pub(crate) program: Program,
    pub(crate) vars: VarTable,
    pub(crate) subs: SubTable,
    pub(crate) emitter: crate::emitter::Emitter,
    pub(crate) ret_stack: Vec<crate::controlflow::Frame>,
    pub(crate) operands: Vec<i16>,
    pub(crate) operators: Vec<OpTok>,
    pub(crate) mode: Mode,
    pub(crate) compiling_sub: bool,
    pub(crate) only_constants: bool,
    pub(crate) skip_flag: bool,
    /// Text of the line being executed (the program store keeps its own
    /// copy; jumps reload from there).
    pub(crate) lnbuf: Vec<u8>,
    /// The immediate-mode line, kept separately so a subroutine called
    /// from the prompt can resume it after `return`.
    immbuf: Vec<u8>,
    /// Cursor position within `lnbuf`.
    pub(crate) pos: usize,
    /// Index of the stored line being executed; `None` in immediate mode.
    pub(crate) current: Option<usize>,
    /// 0-based line counter for error reports; -1 in immediate mode.
    pub(crate) counter: i32,
    /// Subroutine return value (interpreter only).
    pub(crate) ret_register: i16,
    /// Emitter PC captured before a statement's arguments are compiled.
    pub(crate) rt_pc_before_eval: u16,
    /// Editor state, driven by `:a`/`:i` and read by the top-level loop.
    pub edit: EditMode,
    interrupt: Option<Arc<AtomicBool>>,
}

impl Interp {
    pub fn new(console: Box<dyn Console>) -> Self {
        let mut interp = Interp {
            console,
            mem: Memory::new(),
            arena: Arena::with_defaults(),
            program: Program::new(),
            vars: VarTable::new(),
            subs: SubTable::new(),
            emitter: crate::emitter::Emitter::new(),
            ret_stack: Vec::new(),
            operands: Vec::new(),
            operators: Vec::new(),
            mode: Mode::Interpret,
            compiling_sub: false,
            only_constants: false,
            skip_flag: false,
            lnbuf: Vec::new(),
            immbuf: Vec::new(),
            pos: 0,
            current: None,
            counter: -1,
            ret_register: 0,
            rt_pc_before_eval: 0,
            edit: EditMode::Off,
            interrupt: None,
        };
        interp.clear_expr_stacks();
        interp
    }

    /// Install the break flag polled once per dispatched statement.
    pub fn set_interrupt_flag(&mut self, flag: Arc<AtomicBool>) {
        self.interrupt = Some(flag);
    }

    pub(crate) fn interrupted(&self) -> bool {
        match &self.interrupt {
            Some(flag) => flag.swap(false, Ordering::Relaxed),
            None => false,
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    // ---------------------------------------------------------------
    // Console helpers
    // ---------------------------------------------------------------

    /// Decimal print. Values are printed as unsigned 16-bit quantities;
    /// `pr.dec.s` is the signed variant.
    pub(crate) fn print_dec(&mut self, val: i16) {
        let s = format!("{}", val as u16);
        self.console.print(&s);
    }

    pub(crate) fn print_dec_signed(&mut self, val: i16) {
        let s = format!("{}", val);
        self.console.print(&s);
    }

    pub(crate) fn print_hex(&mut self, val: i16) {
        let s = format!("{:04x}", val as u16);
        self.console.print(&s);
    }

    pub(crate) fn report(&mut self, err: &LangError) {
        let s = err.to_string();
        self.console.print(&s);
    }

    // ---------------------------------------------------------------
    // Top-level entry points
    // ---------------------------------------------------------------

    /// Feed one line from the top-level loop, honouring edit mode.
    pub fn feed_line(&mut self, line: &str) -> RunOutcome {
        match self.edit {
            EditMode::Off => self.exec_immediate(line),
            EditMode::Append { at } => {
                if line.starts_with('.') {
                    self.edit = EditMode::Off;
                } else {
                    self.program.insert(at, line);
                    self.edit = EditMode::Append { at: at + 1 };
                }
                RunOutcome::Completed
            }
            EditMode::InsertFirst => {
                self.program.insert(0, line);
                self.edit = EditMode::Append { at: 1 };
                RunOutcome::Completed
            }
        }
    }

    /// Parse and execute one immediate-mode line.
    pub fn exec_immediate(&mut self, line: &str) -> RunOutcome {
        self.clear_expr_stacks();
        self.mode = Mode::Interpret;
        self.lnbuf = line.as_bytes().to_vec();
        self.immbuf = self.lnbuf.clone();
        self.pos = 0;
        self.current = None;
        self.counter = -1;

        let outcome = match self.parse_line() {
            Ok(Stop::Eol) | Ok(Stop::End) => {
                self.console.putc(b'\n');
                RunOutcome::Completed
            }
            Ok(Stop::Quit) => return RunOutcome::Quit,
            Ok(Stop::Break) => {
                self.console.print("Brk\n");
                self.reset_after_error();
                RunOutcome::Interrupted
            }
            Err(err) => {
                self.report(&err);
                self.console.print(" err\n");
                self.reset_after_error();
                RunOutcome::Errored
            }
        };

        // A dangling `if`/`for`/`while` typed at the prompt leaves frames
        // behind; report it and recover.
        if !self.ret_stack.is_empty() {
            self.report(&LangError::Stack);
            self.console.putc(b'\n');
            self.ret_stack.clear();
        }
        self.skip_flag = false;
        outcome
    }

    /// Execute the stored program from the top (the `run` statement), or
    /// continue an in-flight execution after a subroutine call.
    pub(crate) fn run(&mut self, cont: bool) -> RunOutcome {
        self.skip_flag = false;
        if !cont {
            self.counter = 0;
            self.clear_vars();
            self.ret_stack.clear();
            self.current = if self.program.is_empty() { None } else { Some(0) };
        }

        while let Some(idx) = self.current {
            if self.mode == Mode::Compile {
                self.console.putc(b'.');
            }
            self.load_line(idx);
            match self.parse_line() {
                Ok(Stop::Eol) => {}
                Ok(Stop::End) => break,
                Ok(Stop::Quit) => return RunOutcome::Quit,
                Ok(Stop::Break) => {
                    let at = self.counter;
                    self.console.print("\nBrk at ");
                    self.print_dec(at as i16);
                    self.console.putc(b'\n');
                    self.reset_after_error();
                    return RunOutcome::Interrupted;
                }
                Err(err) => {
                    let at = self.counter;
                    self.report(&err);
                    self.console.print(" err at ");
                    self.print_dec(at as i16);
                    self.console.putc(b'\n');
                    self.reset_after_error();
                    return RunOutcome::Errored;
                }
            }
            // A call or return may have moved `current`; advance from
            // wherever the line left us.
            match self.current {
                Some(i) if i + 1 < self.program.len() => {
                    self.current = Some(i + 1);
                    self.counter += 1;
                }
                _ => self.current = None,
            }
        }
        RunOutcome::Completed
    }

    /// Run the stored program from the top. Library-level entry for the
    /// batch CLI; equivalent to typing `run`.
    pub fn run_program(&mut self) -> RunOutcome {
        self.clear_expr_stacks();
        self.run(false)
    }

    /// Compile the stored program and write the bytecode file (the
    /// `comp "file"` statement).
    pub fn comp(&mut self, path: &Path) -> RunOutcome {
        self.mode = Mode::Compile;
        self.compiling_sub = false;
        self.subs.clear();
        self.emitter.reset();
        self.clear_expr_stacks();

        let outcome = self.run(false);
        if self.mode != Mode::Compile {
            // `run` already reported and reset.
            return outcome;
        }
        self.emitter.emit(Opcode::End);
        self.mode = Mode::Interpret;

        if let Err(err) = self.subs.link(&mut self.emitter) {
            self.report(&err);
            self.console.putc(b'\n');
            return RunOutcome::Errored;
        }
        debug!(bytes = self.emitter.code().len(), "writing bytecode");
        self.console.print("\nWriting ");
        self.console.print(&path.display().to_string());
        self.console.print(":...\n");
        if fs::write(path, self.emitter.code()).is_err() {
            self.report(&LangError::File);
            self.console.putc(b'\n');
            return RunOutcome::Errored;
        }
        outcome
    }

    pub(crate) fn load_line(&mut self, idx: usize) {
        self.lnbuf = self.program.line(idx).as_bytes().to_vec();
        self.pos = 0;
    }

    /// Move execution to a stored line at a saved cursor position, or back
    /// to immediate mode when `line` is -1. Used when loops jump back and
    /// when subroutines return.
    pub(crate) fn back_to_top(&mut self, line: i32, resume_pos: usize) {
        if line < 0 {
            self.counter = -1;
            self.current = None;
            self.lnbuf = self.immbuf.clone();
        } else {
            self.current = Some(line as usize);
            self.counter = line;
            self.load_line(line as usize);
        }
        self.pos = resume_pos;
    }

    fn reset_after_error(&mut self) {
        self.ret_stack.clear();
        self.skip_flag = false;
        self.mode = Mode::Interpret;
        self.compiling_sub = false;
        self.only_constants = false;
    }

    // ---------------------------------------------------------------
    // Informational statements
    // ---------------------------------------------------------------

    /// The `free` statement: arena and store usage.
    pub(crate) fn show_free(&mut self) {
        let vars_free = self.arena.free_bytes();
        let vars_total = self.arena.total_bytes();
        let lines = self.program.len();
        let src_bytes = self.program.source_bytes();
        let code = self.emitter.code().len();

        self.console.print("free:\n");
        self.print_dec(vars_free as i16);
        self.console.print(" / ");
        self.print_dec(vars_total as i16);
        self.console.print(" vars\n");
        self.print_dec(lines as i16);
        self.console.print(" lines, ");
        self.print_dec(src_bytes as i16);
        self.console.print(" bytes source\n");
        self.print_dec(code as i16);
        self.console.print(" bytes bytecode\n");
    }

    /// Startup banner, printed by the interactive top level.
    pub fn banner(&mut self, version: &str) {
        self.console.print("      ***    EightBall v");
        self.console.print(version);
        self.console.print("   ***\n\n");
        self.show_free();
        self.console.print("\n");
    }
}
