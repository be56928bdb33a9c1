//! Statement dispatcher.
//!
//! A fixed keyword table maps each statement to an argument shape; the
//! dispatcher matches the keyword at the cursor, checks that a separator
//! follows (except for the sigil and editor tokens), evaluates the
//! declared argument shape, and runs the handler. Anything that matches
//! no keyword is treated as an assignment.
//!
//! While the skip flag is set (a false `if` or `while` guard), only the
//! statements that can clear it are recognised; everything else is eaten
//! up to the next `;` or end of line.

use crate::Interp;
use crate::controlflow::Frame;
use crate::cursor::is_alpha;
use crate::error::LangError;
use crate::machine::{Mode, RunOutcome};
use crate::vars::{BaseType, DeclKind};
use eightball_core::Opcode;
use std::path::Path;

/// How `parse_line` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stop {
    /// Line consumed; keep running.
    Eol,
    /// Normal stop (`end`, or a function's `return`).
    End,
    /// Break key.
    Break,
    /// `quit`.
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Comment,
    PrDec,
    PrDecS,
    PrHex,
    PrMsg,
    PrNl,
    PrStr,
    PrCh,
    KbdCh,
    KbdLn,
    Quit,
    Clear,
    Vars,
    Word,
    Byte,
    Const,
    Run,
    Comp,
    New,
    Sub,
    EndSub,
    If,
    Else,
    EndIf,
    Free,
    Call,
    Return,
    For,
    EndFor,
    While,
    EndWhile,
    End,
    Mode,
    PokeWord,
    PokeByte,
    Load,
    Save,
    List,
    Change,
    Append,
    Insert,
    Delete,
}

/// Argument shapes the generic parameter handling knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgShape {
    /// The whole line belongs to the statement.
    FullLine,
    NoArgs,
    /// One expression, then end of statement.
    OneArg,
    /// Two expressions separated by a comma.
    TwoArgs,
    /// One expression; the handler parses the rest.
    InitialArg,
    /// One quoted string.
    OneStrArg,
    /// One bare name; the handler parses the rest.
    InitialNameArg,
    /// The handler does all of its own parsing.
    Custom,
}

/// Keyword table. Where one name is a prefix of another (`end` and
/// `endif`, `pr.dec` and `pr.dec.s`) the separator check keeps the
/// first-match scan unambiguous.
const STATEMENTS: [(&str, Token, ArgShape); 42] = [
    ("'", Token::Comment, ArgShape::FullLine),
    ("pr.dec", Token::PrDec, ArgShape::OneArg),
    ("pr.dec.s", Token::PrDecS, ArgShape::OneArg),
    ("pr.hex", Token::PrHex, ArgShape::OneArg),
    ("pr.msg", Token::PrMsg, ArgShape::OneStrArg),
    ("pr.nl", Token::PrNl, ArgShape::NoArgs),
    ("pr.str", Token::PrStr, ArgShape::OneArg),
    ("pr.ch", Token::PrCh, ArgShape::OneArg),
    ("kbd.ch", Token::KbdCh, ArgShape::OneArg),
    ("kbd.ln", Token::KbdLn, ArgShape::TwoArgs),
    ("quit", Token::Quit, ArgShape::NoArgs),
    ("clear", Token::Clear, ArgShape::NoArgs),
    ("vars", Token::Vars, ArgShape::NoArgs),
    ("word", Token::Word, ArgShape::Custom),
    ("byte", Token::Byte, ArgShape::Custom),
    ("const", Token::Const, ArgShape::Custom),
    ("run", Token::Run, ArgShape::NoArgs),
    ("comp", Token::Comp, ArgShape::OneStrArg),
    ("new", Token::New, ArgShape::NoArgs),
    ("sub", Token::Sub, ArgShape::InitialNameArg),
    ("endsub", Token::EndSub, ArgShape::NoArgs),
    ("if", Token::If, ArgShape::OneArg),
    ("else", Token::Else, ArgShape::NoArgs),
    ("endif", Token::EndIf, ArgShape::NoArgs),
    ("free", Token::Free, ArgShape::NoArgs),
    ("call", Token::Call, ArgShape::InitialNameArg),
    ("return", Token::Return, ArgShape::OneArg),
    ("for", Token::For, ArgShape::Custom),
    ("endfor", Token::EndFor, ArgShape::NoArgs),
    ("while", Token::While, ArgShape::OneArg),
    ("endwhile", Token::EndWhile, ArgShape::NoArgs),
    ("end", Token::End, ArgShape::NoArgs),
    ("mode", Token::Mode, ArgShape::OneArg),
    ("*", Token::PokeWord, ArgShape::InitialArg),
    ("^", Token::PokeByte, ArgShape::InitialArg),
    (":r", Token::Load, ArgShape::OneStrArg),
    (":w", Token::Save, ArgShape::OneStrArg),
    (":l", Token::List, ArgShape::Custom),
    (":c", Token::Change, ArgShape::InitialArg),
    (":a", Token::Append, ArgShape::OneArg),
    (":i", Token::Insert, ArgShape::OneArg),
    (":d", Token::Delete, ArgShape::InitialArg),
];

/// The sigil statements and editor commands stand on their own; keyword
/// statements need a space, `;` or end of line after them.
fn needs_separator(token: Token) -> bool {
    !matches!(
        token,
        Token::Comment
            | Token::PokeWord
            | Token::PokeByte
            | Token::Load
            | Token::Save
            | Token::List
            | Token::Change
            | Token::Append
            | Token::Insert
            | Token::Delete
    )
}

/// The five assignment-shaped parses share one routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssignMode {
    Word,
    Byte,
    Const,
    Let,
    For,
}

impl Interp {
    fn match_statement(&self) -> Option<(Token, ArgShape, usize)> {
        for &(name, token, shape) in STATEMENTS.iter() {
            if !self.lnbuf[self.pos..].starts_with(name.as_bytes()) {
                continue;
            }
            if !needs_separator(token) {
                return Some((token, shape, name.len()));
            }
            let next = self.peek_at(name.len());
            if next == 0 || next == b' ' || next == b';' {
                return Some((token, shape, name.len()));
            }
        }
        None
    }

    fn check_no_more_args(&mut self) -> Result<(), LangError> {
        self.eat_space();
        if !self.at_eol() && self.peek() != b';' {
            return Err(LangError::Extra(self.rest()));
        }
        Ok(())
    }

    /// Parse a double-quoted string argument.
    fn parse_string_arg(&mut self) -> Result<String, LangError> {
        if self.peek() != b'"' {
            return Err(LangError::BadString);
        }
        self.advance();
        let mut s = String::new();
        while !self.at_eol() && self.peek() != b'"' {
            s.push(self.peek() as char);
            self.advance();
        }
        if self.peek() != b'"' {
            return Err(LangError::BadString);
        }
        self.advance();
        Ok(s)
    }

    /// Parse statements from the cursor to the end of the line.
    pub(crate) fn parse_line(&mut self) -> Result<Stop, LangError> {
        loop {
            // Cooperative break check, once per statement.
            if self.interrupted() {
                return Ok(Stop::Break);
            }

            self.eat_space();
            while self.peek() == b';' {
                self.advance();
                if self.at_eol() {
                    return Ok(Stop::Eol);
                }
                self.eat_space();
            }
            if self.at_eol() {
                return Ok(Stop::Eol);
            }

            let stmt_start = self.pos;
            let matched = self.match_statement();

            // While skipping, only the statements that affect the skip
            // flag are live.
            if self.skip_flag {
                let live = matches!(
                    matched.map(|m| m.0),
                    Some(Token::If)
                        | Some(Token::Else)
                        | Some(Token::EndIf)
                        | Some(Token::While)
                        | Some(Token::EndWhile)
                );
                if !live {
                    self.skip_statement();
                    continue;
                }
            }

            let Some((token, shape, kwlen)) = matched else {
                // Not a keyword: variable assignment.
                self.assign_or_create(AssignMode::Let)?;
                continue;
            };
            self.pos += kwlen;
            self.eat_space();

            // PC before argument handling, for re-evaluating while guards.
            self.rt_pc_before_eval = self.emitter.rt_pc;

            let compile = self.mode == Mode::Compile;
            let mut arg: i16 = 0;
            let mut arg2: i16 = 0;
            let mut name = String::new();
            match shape {
                ArgShape::NoArgs => self.check_no_more_args()?,
                ArgShape::OneArg => arg = self.eval(true)?,
                ArgShape::TwoArgs => {
                    arg = self.eval(false)?;
                    self.eat_space();
                    self.expect(b',')?;
                    arg2 = self.eval(false)?;
                }
                ArgShape::InitialArg => arg = self.eval(false)?,
                ArgShape::OneStrArg => {
                    name = self.parse_string_arg()?;
                    self.check_no_more_args()?;
                }
                ArgShape::InitialNameArg => {
                    if !is_alpha(self.peek()) {
                        return Err(LangError::ExpectVar);
                    }
                    name = self.scan_name();
                }
                ArgShape::FullLine => self.pos = self.lnbuf.len(),
                ArgShape::Custom => {}
            }

            match token {
                Token::Comment => {}
                Token::Quit => {
                    self.console.print("Bye!\n");
                    return Ok(Stop::Quit);
                }
                Token::PrDec => {
                    if compile {
                        self.emitter.emit(Opcode::Prdec);
                    } else {
                        self.print_dec(arg);
                    }
                }
                Token::PrDecS => {
                    if compile {
                        // Print '-' and negate when the sign bit is set.
                        self.emitter.emit(Opcode::Dup);
                        self.emitter.emit_ldi(0x8000);
                        self.emitter.emit(Opcode::Bitand);
                        self.emitter.emit(Opcode::Not);
                        let skip_to = i32::from(self.emitter.rt_pc) + 8;
                        self.emitter.emit_imm(Opcode::BrnchImm, skip_to);
                        self.emitter.emit_ldi(i32::from(b'-'));
                        self.emitter.emit(Opcode::Prch);
                        self.emitter.emit(Opcode::Neg);
                        self.emitter.emit(Opcode::Prdec);
                    } else {
                        self.print_dec_signed(arg);
                    }
                }
                Token::PrHex => {
                    if compile {
                        self.emitter.emit(Opcode::Prhex);
                    } else {
                        self.print_hex(arg);
                    }
                }
                Token::PrMsg => {
                    if compile {
                        self.emitter.emit_prmsg(&name);
                    } else {
                        self.console.print(&name);
                    }
                }
                Token::PrNl => {
                    if compile {
                        self.emitter.emit_ldi(10);
                        self.emitter.emit(Opcode::Prch);
                    } else {
                        self.console.putc(b'\n');
                    }
                }
                Token::PrStr => {
                    if compile {
                        self.emitter.emit(Opcode::Prstr);
                    } else {
                        let bytes = self.mem.read_cstr(arg as u16);
                        let s = String::from_utf8_lossy(&bytes).into_owned();
                        self.console.print(&s);
                    }
                }
                Token::PrCh => {
                    if compile {
                        self.emitter.emit(Opcode::Prch);
                    } else {
                        self.console.putc(arg as u8);
                    }
                }
                Token::KbdCh => {
                    if compile {
                        // Address is on the stack; the keycode joins it.
                        self.emitter.emit(Opcode::Kbdch);
                        self.emitter.emit(Opcode::Swap);
                        self.emitter.emit(Opcode::Stabyte);
                    } else {
                        let key = self.console.read_key().map_err(|_| LangError::File)?;
                        self.mem.write_byte(arg as u16, key);
                    }
                }
                Token::KbdLn => {
                    if compile {
                        self.emitter.emit(Opcode::Kbdln);
                    } else {
                        let line = self.console.read_line().map_err(|_| LangError::File)?;
                        let max = (arg2 as u16).saturating_sub(1) as usize;
                        let bytes = &line.as_bytes()[..line.len().min(max)];
                        let bytes = bytes.to_vec();
                        self.mem.write_cstr(arg as u16, &bytes);
                    }
                }
                Token::Clear => self.clear_vars(),
                Token::Vars => self.print_vars(),
                Token::Word => self.assign_or_create(AssignMode::Word)?,
                Token::Byte => self.assign_or_create(AssignMode::Byte)?,
                Token::Const => self.assign_or_create(AssignMode::Const)?,
                Token::Run => {
                    if self.run(false) == RunOutcome::Quit {
                        return Ok(Stop::Quit);
                    }
                }
                Token::Comp => {
                    let path = name.clone();
                    if self.comp(Path::new(&path)) == RunOutcome::Quit {
                        return Ok(Stop::Quit);
                    }
                }
                Token::New => {
                    self.program.clear();
                    self.current = None;
                }
                Token::Sub => self.do_sub(&name)?,
                Token::EndSub => self.do_endsub()?,
                Token::If => self.do_if(arg)?,
                Token::Else => self.do_else()?,
                Token::EndIf => self.do_endif()?,
                Token::Free => self.show_free(),
                Token::Call => {
                    self.do_call(&name)?;
                    if compile {
                        // Statement-level call: the return value is unused.
                        self.emitter.emit(Opcode::Drop);
                    } else if matches!(
                        self.ret_stack.last(),
                        Some(Frame::Call { line: -1, .. })
                    ) {
                        // Called from immediate mode: run until the sub
                        // returns control here.
                        if self.run(true) == RunOutcome::Quit {
                            return Ok(Stop::Quit);
                        }
                    }
                }
                Token::Return => {
                    self.do_return(arg)?;
                    // A function invoked inside an expression returns
                    // control to the evaluator at once.
                    if matches!(self.ret_stack.last(), Some(Frame::Call { line: -2, .. })) {
                        return Ok(Stop::End);
                    }
                }
                Token::For => self.assign_or_create(AssignMode::For)?,
                Token::EndFor => self.do_endfor()?,
                Token::While => self.do_while(stmt_start, arg)?,
                Token::EndWhile => self.do_endwhile()?,
                Token::End => {
                    if compile {
                        self.emitter.emit(Opcode::End);
                    } else {
                        return Ok(Stop::End);
                    }
                }
                Token::Mode => {
                    if compile {
                        self.emitter.emit(Opcode::Drop);
                    } else if arg == 40 || arg == 80 {
                        self.console.set_mode(arg as u8);
                    } else {
                        return Err(LangError::BadValue);
                    }
                }
                Token::PokeWord => {
                    self.eat_space();
                    self.expect(b'=')?;
                    arg2 = self.eval(true)?;
                    if compile {
                        self.emitter.emit(Opcode::Swap);
                        self.emitter.emit(Opcode::Staword);
                    } else {
                        self.mem.write_word(arg as u16, arg2);
                    }
                }
                Token::PokeByte => {
                    self.eat_space();
                    self.expect(b'=')?;
                    arg2 = self.eval(true)?;
                    if compile {
                        self.emitter.emit(Opcode::Swap);
                        self.emitter.emit(Opcode::Stabyte);
                    } else {
                        self.mem.write_byte(arg as u16, arg2 as u8);
                    }
                }
                Token::Append => match self.program.index_of(arg) {
                    Some(idx) => self.edit = crate::machine::EditMode::Append { at: idx + 1 },
                    None => self.report(&LangError::BadLine),
                },
                Token::Insert => {
                    if arg <= 1 {
                        self.edit = crate::machine::EditMode::InsertFirst;
                    } else {
                        match self.program.index_of(arg - 1) {
                            Some(idx) => {
                                self.edit = crate::machine::EditMode::Append { at: idx + 1 }
                            }
                            None => self.report(&LangError::BadLine),
                        }
                    }
                }
                Token::Delete => {
                    self.eat_space();
                    if self.at_eol() {
                        self.program.delete_range(arg, arg);
                    } else {
                        self.expect(b',')?;
                        arg2 = self.eval(true)?;
                        self.program.delete_range(arg, arg2);
                    }
                }
                Token::Change => {
                    self.eat_space();
                    self.expect(b':')?;
                    let text = self.rest();
                    if self.program.change(arg, &text) {
                        // The replaced line is not executed now.
                        return Ok(Stop::Eol);
                    }
                    self.report(&LangError::BadLine);
                }
                Token::List => {
                    if self.at_eol() {
                        self.list(1, 32767);
                    } else {
                        arg = self.eval(false)?;
                        self.eat_space();
                        if self.at_eol() {
                            self.list(arg, 32767);
                        } else {
                            self.expect(b',')?;
                            arg2 = self.eval(true)?;
                            self.list(arg, arg2);
                        }
                    }
                }
                Token::Load => {
                    let path = name.clone();
                    self.read_file(Path::new(&path))?;
                    // The line buffer described the old program; stop here.
                    return Ok(Stop::Eol);
                }
                Token::Save => {
                    let path = name.clone();
                    self.write_file(Path::new(&path))?;
                }
            }
        }
    }

    /// Shared parse for declaration, assignment and `for` entry:
    /// `var = expr`, `var[dim] = init`, `var[expr] = expr`, or
    /// `var = start : limit`.
    fn assign_or_create(&mut self, amode: AssignMode) -> Result<(), LangError> {
        if !is_alpha(self.peek()) {
            return Err(LangError::ExpectVar);
        }
        let name = self.scan_name();

        let mut idx: Option<i16> = None;
        let mut dim: i16 = 0;
        let mut isarray = false;
        if self.peek() == b'[' {
            isarray = true;
            match amode {
                AssignMode::Word | AssignMode::Byte | AssignMode::Const => {
                    // A dimension must be a constant expression, evaluated
                    // now even while compiling.
                    self.only_constants = true;
                    let old_mode = self.mode;
                    self.mode = Mode::Interpret;
                    let parsed = self.parse_subscript();
                    self.only_constants = false;
                    self.mode = old_mode;
                    dim = parsed?;
                }
                AssignMode::Let | AssignMode::For => {
                    idx = Some(self.parse_subscript()?);
                }
            }
        }

        self.eat_space();
        self.expect(b'=')?;
        self.eat_space();

        // A constant's initializer is evaluated at compile time.
        let old_mode = self.mode;
        if amode == AssignMode::Const {
            self.mode = Mode::Interpret;
        }

        let mut value: i16 = 0;
        if !isarray || amode == AssignMode::Let || amode == AssignMode::For {
            let check_no_more = amode != AssignMode::For;
            match self.eval(check_no_more) {
                Ok(v) => value = v,
                Err(e) => {
                    self.mode = old_mode;
                    return Err(e);
                }
            }
        }
        self.mode = old_mode;

        match amode {
            AssignMode::Word | AssignMode::Byte | AssignMode::Const => {
                if isarray {
                    let ty = if amode == AssignMode::Byte {
                        BaseType::Byte
                    } else {
                        BaseType::Word
                    };
                    self.create_array(&name, ty, dim)?;
                } else {
                    let kind = match amode {
                        AssignMode::Word => DeclKind::Word,
                        AssignMode::Byte => DeclKind::Byte,
                        _ => DeclKind::Const,
                    };
                    self.create_scalar(&name, kind, value)?;
                }
            }
            AssignMode::Let => {
                self.set_var(&name, idx, value)?;
            }
            AssignMode::For => {
                // A loop variable that does not exist yet is created as a
                // word in the current scope.
                match self.set_var(&name, idx, value) {
                    Err(LangError::ExpectVar) if !isarray => {
                        self.create_scalar(&name, DeclKind::Word, value)?;
                    }
                    other => other?,
                }
            }
        }

        if amode != AssignMode::For {
            return Ok(());
        }

        // The rest of a `for`: the loop limit.
        self.expect(b':')?;
        let limit = self.eval(true)?;
        self.do_for(&name, idx, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eightball_core::{OutputHandle, RecordingConsole};

    fn interp_with_output() -> (Interp, OutputHandle) {
        let con = RecordingConsole::new();
        let out = con.handle();
        (Interp::new(Box::new(con)), out)
    }

    fn run_lines(lines: &[&str]) -> (Interp, OutputHandle) {
        let (mut interp, out) = interp_with_output();
        for line in lines {
            interp.feed_line(line);
        }
        (interp, out)
    }

    #[test]
    fn test_keyword_needs_separator() {
        let (mut interp, out) = interp_with_output();
        // `runs` is not `run` followed by junk; it falls through to
        // assignment handling (and an unknown variable).
        interp.exec_immediate("runs = 1");
        assert!(out.text().contains("?expect var"));
    }

    #[test]
    fn test_longer_keyword_wins_over_prefix() {
        let (mut interp, out) = interp_with_output();
        interp.exec_immediate("pr.dec.s 0-5 ; pr.nl");
        assert_eq!(out.text(), "-5\n\n");
    }

    #[test]
    fn test_multiple_statements_per_line() {
        let (mut interp, out) = interp_with_output();
        interp.exec_immediate("pr.dec 1 ; pr.dec 2 ; pr.dec 3");
        assert_eq!(out.text(), "123\n");
    }

    #[test]
    fn test_comment_eats_line() {
        let (mut interp, out) = interp_with_output();
        interp.exec_immediate("' pr.dec 1 ; pr.dec 2");
        assert_eq!(out.text(), "\n");
    }

    #[test]
    fn test_unsigned_and_signed_decimal() {
        let (mut interp, out) = interp_with_output();
        interp.exec_immediate("pr.dec 0-1 ; pr.ch ' ' ; pr.dec.s 0-1");
        assert_eq!(out.text(), "65535 -1\n");
    }

    #[test]
    fn test_hex_print() {
        let (mut interp, out) = interp_with_output();
        interp.exec_immediate("pr.hex $d020");
        assert_eq!(out.text(), "d020\n");
    }

    #[test]
    fn test_poke_and_peek() {
        let (mut interp, out) = interp_with_output();
        interp.exec_immediate("*$5000 = 513 ; pr.dec *$5000 ; pr.dec ^$5001");
        assert_eq!(out.text(), "5132\n");
    }

    #[test]
    fn test_extra_args_rejected() {
        let (mut interp, out) = interp_with_output();
        interp.exec_immediate("pr.nl 5");
        assert!(out.text().contains("?extra"));
    }

    #[test]
    fn test_mode_validates_columns() {
        let (mut interp, out) = interp_with_output();
        interp.exec_immediate("mode 40");
        assert!(!out.text().contains("err"));
        out.clear();
        interp.exec_immediate("mode 64");
        assert!(out.text().contains("?bad val"));
    }

    #[test]
    fn test_editor_append_insert_delete_list() {
        let (mut interp, out) = run_lines(&[
            ":i 1",
            "pr.msg \"b\"",
            ".",
            ":i 1",
            "pr.msg \"a\"",
            ".",
            ":a 2",
            "pr.msg \"c\"",
            ".",
        ]);
        out.clear();
        interp.exec_immediate(":l");
        assert_eq!(
            out.text(),
            "1: pr.msg \"a\"\n2: pr.msg \"b\"\n3: pr.msg \"c\"\n\n"
        );
        out.clear();
        interp.exec_immediate(":d 1,2");
        interp.exec_immediate(":l");
        assert_eq!(out.text(), "\n1: pr.msg \"c\"\n\n");
    }

    #[test]
    fn test_editor_change_line() {
        let (mut interp, out) = run_lines(&[":i 1", "pr.dec 1", "."]);
        interp.exec_immediate(":c 1: pr.dec 9");
        out.clear();
        interp.exec_immediate("run");
        assert_eq!(out.text(), "9\n");
    }

    #[test]
    fn test_bad_line_number_is_not_fatal() {
        let (mut interp, out) = interp_with_output();
        interp.exec_immediate(":a 3 ; pr.msg \"still here\"");
        assert!(out.text().contains("?bad line#"));
        assert!(out.text().contains("still here"));
    }

    #[test]
    fn test_skip_flag_eats_non_flow_statements() {
        let (mut interp, out) = interp_with_output();
        interp.exec_immediate("if 0 ; pr.msg \"no\" ; else ; pr.msg \"yes\" ; endif");
        assert_eq!(out.text(), "yes\n");
    }

    #[test]
    fn test_new_keeps_variables_clear_keeps_program() {
        let (mut interp, out) = run_lines(&[":i 1", "pr.dec 7", "."]);
        interp.exec_immediate("word keep = 3");
        interp.exec_immediate("new");
        assert_eq!(interp.program().len(), 0);
        out.clear();
        interp.exec_immediate("pr.dec keep");
        assert_eq!(out.text(), "3\n");

        let (mut interp, out) = run_lines(&[":i 1", "pr.dec 7", "."]);
        interp.exec_immediate("word gone = 3");
        interp.exec_immediate("clear");
        out.clear();
        interp.exec_immediate("run");
        assert_eq!(out.text(), "7\n");
    }
}
