//! Expression evaluator.
//!
//! Classic shunting-yard over two small fixed-size stacks. A `Sentinel`
//! with the lowest possible precedence floors the operator stack, so a
//! legal expression can never underflow it; every parenthesised
//! subexpression and subscript pushes a fresh sentinel and pops it on the
//! way out.
//!
//! `primary` parses one atom, `expression` parses `primary (binop
//! primary)*`, and applying an operator either computes (interpret) or
//! emits the corresponding VM opcode (compile). Pushing a literal operand
//! in compile mode emits an immediate push instead of touching the stack.

use crate::Interp;
use crate::cursor::{is_alpha, is_digit};
use crate::error::LangError;
use crate::machine::{EXPR_STACK_SIZE, Mode};
use eightball_core::Opcode;

/// Operator tokens, unary and binary, plus the stack floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpTok {
    Sentinel,
    // Unary.
    UnaryMinus,
    UnaryPlus,
    Not,
    BitNot,
    /// Unary `*`: word dereference.
    DerefWord,
    /// Unary `^`: byte dereference.
    DerefByte,
    // Binary.
    Pow,
    Div,
    Mod,
    Mul,
    Add,
    Sub,
    Gt,
    Lt,
    BitAnd,
    BitOr,
    BitXor,
    Eql,
    Neql,
    Gte,
    Lte,
    And,
    Or,
    Lsh,
    Rsh,
}

impl OpTok {
    fn is_unary(self) -> bool {
        matches!(
            self,
            OpTok::UnaryMinus
                | OpTok::UnaryPlus
                | OpTok::Not
                | OpTok::BitNot
                | OpTok::DerefWord
                | OpTok::DerefByte
        )
    }
}

/// C precedence levels; higher binds tighter. The sentinel must be the
/// lowest so the drain loops stop at it.
fn precedence(tok: OpTok) -> u8 {
    match tok {
        OpTok::UnaryMinus
        | OpTok::UnaryPlus
        | OpTok::Not
        | OpTok::BitNot
        | OpTok::DerefWord
        | OpTok::DerefByte => 11,
        OpTok::Pow | OpTok::Div | OpTok::Mul | OpTok::Mod => 10,
        OpTok::Add | OpTok::Sub => 9,
        OpTok::Lsh | OpTok::Rsh => 8,
        OpTok::Gt | OpTok::Gte | OpTok::Lt | OpTok::Lte => 7,
        OpTok::Eql | OpTok::Neql => 6,
        OpTok::BitAnd => 5,
        OpTok::BitXor => 4,
        OpTok::BitOr => 3,
        OpTok::And => 2,
        OpTok::Or => 1,
        OpTok::Sentinel => 0,
    }
}

/// Two-character binary operators; matched before the single-character
/// table so `<=` never parses as `<` `=`.
const BINARY2: [(u8, u8, OpTok); 8] = [
    (b'=', b'=', OpTok::Eql),
    (b'!', b'=', OpTok::Neql),
    (b'>', b'=', OpTok::Gte),
    (b'<', b'=', OpTok::Lte),
    (b'&', b'&', OpTok::And),
    (b'|', b'|', OpTok::Or),
    (b'<', b'<', OpTok::Lsh),
    (b'>', b'>', OpTok::Rsh),
];

const BINARY1: [(u8, OpTok); 11] = [
    (b'^', OpTok::Pow),
    (b'/', OpTok::Div),
    (b'%', OpTok::Mod),
    (b'*', OpTok::Mul),
    (b'+', OpTok::Add),
    (b'-', OpTok::Sub),
    (b'>', OpTok::Gt),
    (b'<', OpTok::Lt),
    (b'&', OpTok::BitAnd),
    (b'|', OpTok::BitOr),
    (b'!', OpTok::BitXor),
];

const UNARY: [(u8, OpTok); 6] = [
    (b'-', OpTok::UnaryMinus),
    (b'+', OpTok::UnaryPlus),
    (b'!', OpTok::Not),
    (b'~', OpTok::BitNot),
    (b'*', OpTok::DerefWord),
    (b'^', OpTok::DerefByte),
];

impl Interp {
    /// Reset both stacks and seat the sentinel. Done before each
    /// immediate-mode line.
    pub(crate) fn clear_expr_stacks(&mut self) {
        self.operands.clear();
        self.operators.clear();
        self.operators.push(OpTok::Sentinel);
    }

    pub(crate) fn push_operand(&mut self, val: i16) -> Result<(), LangError> {
        if self.mode == Mode::Compile {
            self.emitter.emit_ldi(i32::from(val));
            return Ok(());
        }
        if self.operands.len() >= EXPR_STACK_SIZE - 1 {
            return Err(LangError::TooComplex);
        }
        self.operands.push(val);
        Ok(())
    }

    pub(crate) fn pop_operand(&mut self) -> Result<i16, LangError> {
        if self.mode == Mode::Compile {
            return Ok(0);
        }
        self.operands.pop().ok_or(LangError::TooComplex)
    }

    pub(crate) fn push_operator_stack(&mut self, tok: OpTok) -> Result<(), LangError> {
        if self.operators.len() >= EXPR_STACK_SIZE - 1 {
            return Err(LangError::TooComplex);
        }
        self.operators.push(tok);
        Ok(())
    }

    pub(crate) fn pop_operator_stack(&mut self) -> Result<OpTok, LangError> {
        self.operators.pop().ok_or(LangError::TooComplex)
    }

    fn top_operator(&self) -> OpTok {
        *self.operators.last().unwrap_or(&OpTok::Sentinel)
    }

    fn match_binary(&self) -> Option<(OpTok, usize)> {
        let a = self.peek();
        if a == 0 {
            return None;
        }
        let b = self.peek_at(1);
        for &(x, y, tok) in &BINARY2 {
            if a == x && b == y {
                return Some((tok, 2));
            }
        }
        for &(x, tok) in &BINARY1 {
            if a == x {
                return Some((tok, 1));
            }
        }
        None
    }

    fn match_unary(&self) -> Option<OpTok> {
        let a = self.peek();
        UNARY.iter().find(|&&(x, _)| x == a).map(|&(_, tok)| tok)
    }

    /// Pop one operator and apply it: compute in interpret mode, emit the
    /// matching opcode in compile mode.
    fn apply_operator(&mut self) -> Result<(), LangError> {
        let token = self.pop_operator_stack()?;
        let operand1 = self.pop_operand()?;
        let compile = self.mode == Mode::Compile;

        let result = if !token.is_unary() {
            let operand2 = self.pop_operand()?;
            if compile {
                let op = match token {
                    OpTok::Pow => Opcode::Pow,
                    OpTok::Mul => Opcode::Mul,
                    OpTok::Div => Opcode::Div,
                    OpTok::Mod => Opcode::Mod,
                    OpTok::Add => Opcode::Add,
                    OpTok::Sub => Opcode::Sub,
                    OpTok::Gt => Opcode::Gt,
                    OpTok::Gte => Opcode::Gte,
                    OpTok::Lt => Opcode::Lt,
                    OpTok::Lte => Opcode::Lte,
                    OpTok::Eql => Opcode::Eql,
                    OpTok::Neql => Opcode::Neql,
                    OpTok::And => Opcode::And,
                    OpTok::Or => Opcode::Or,
                    OpTok::BitAnd => Opcode::Bitand,
                    OpTok::BitOr => Opcode::Bitor,
                    OpTok::BitXor => Opcode::Bitxor,
                    OpTok::Lsh => Opcode::Lsh,
                    OpTok::Rsh => Opcode::Rsh,
                    _ => unreachable!("binary token"),
                };
                self.emitter.emit(op);
                return Ok(());
            }
            match token {
                OpTok::Pow => {
                    let mut ret: i16 = 1;
                    let mut i = 0;
                    while i < operand1 {
                        ret = ret.wrapping_mul(operand2);
                        i += 1;
                    }
                    ret
                }
                OpTok::Mul => operand2.wrapping_mul(operand1),
                OpTok::Div => {
                    if operand1 == 0 {
                        return Err(LangError::DivZero);
                    }
                    operand2.wrapping_div(operand1)
                }
                OpTok::Mod => {
                    if operand1 == 0 {
                        return Err(LangError::DivZero);
                    }
                    operand2.wrapping_rem(operand1)
                }
                OpTok::Add => operand2.wrapping_add(operand1),
                OpTok::Sub => operand2.wrapping_sub(operand1),
                OpTok::Gt => i16::from(operand2 > operand1),
                OpTok::Gte => i16::from(operand2 >= operand1),
                OpTok::Lt => i16::from(operand2 < operand1),
                OpTok::Lte => i16::from(operand2 <= operand1),
                OpTok::Eql => i16::from(operand2 == operand1),
                OpTok::Neql => i16::from(operand2 != operand1),
                OpTok::And => i16::from(operand2 != 0 && operand1 != 0),
                OpTok::Or => i16::from(operand2 != 0 || operand1 != 0),
                OpTok::BitAnd => operand2 & operand1,
                OpTok::BitOr => operand2 | operand1,
                OpTok::BitXor => operand2 ^ operand1,
                OpTok::Lsh => {
                    let sh = operand1 as u16;
                    if sh >= 16 { 0 } else { ((operand2 as u16) << sh) as i16 }
                }
                OpTok::Rsh => {
                    let sh = operand1 as u16;
                    if sh >= 16 {
                        if operand2 < 0 { -1 } else { 0 }
                    } else {
                        operand2 >> sh
                    }
                }
                _ => unreachable!("binary token"),
            }
        } else {
            if compile {
                match token {
                    OpTok::UnaryMinus => self.emitter.emit(Opcode::Neg),
                    OpTok::UnaryPlus => {}
                    OpTok::Not => self.emitter.emit(Opcode::Not),
                    OpTok::BitNot => self.emitter.emit(Opcode::Bitnot),
                    OpTok::DerefWord => self.emitter.emit(Opcode::Ldaword),
                    OpTok::DerefByte => self.emitter.emit(Opcode::Ldabyte),
                    _ => unreachable!("unary token"),
                }
                return Ok(());
            }
            match token {
                OpTok::UnaryMinus => operand1.wrapping_neg(),
                OpTok::UnaryPlus => operand1,
                OpTok::Not => i16::from(operand1 == 0),
                OpTok::BitNot => !operand1,
                OpTok::DerefWord => self.mem.read_word(operand1 as u16),
                OpTok::DerefByte => i16::from(self.mem.read_byte(operand1 as u16)),
                _ => unreachable!("unary token"),
            }
        };
        self.push_operand(result)
    }

    /// Push a binary operator, first draining every stacked operator of
    /// equal or higher precedence.
    fn push_operator(&mut self, tok: OpTok) -> Result<(), LangError> {
        while precedence(self.top_operator()) >= precedence(tok) {
            self.apply_operator()?;
        }
        self.push_operator_stack(tok)
    }

    /// Parse `[expr]` and return the index value (0 in compile mode; the
    /// index code is left on the VM stack instead).
    pub(crate) fn parse_subscript(&mut self) -> Result<i16, LangError> {
        self.push_operator_stack(OpTok::Sentinel)?;
        self.expect(b'[')?;
        let idx = self.eval(false)?;
        self.expect(b']')?;
        self.pop_operator_stack()?;
        Ok(idx)
    }

    /// One atom: variable (with optional subscript, call or address-of),
    /// literal, parenthesised subexpression, or unary operator + atom.
    fn primary(&mut self) -> Result<(), LangError> {
        self.eat_space();
        if self.at_eol() {
            return Err(LangError::BadExpr);
        }

        let b = self.peek();
        if b == b'&' || is_alpha(b) {
            let mut addressmode = false;
            if b == b'&' {
                addressmode = true;
                self.advance();
                if !is_alpha(self.peek()) {
                    return Err(LangError::ExpectVar);
                }
            }
            let name = self.scan_name();

            let mut idx = None;
            if self.peek() == b'[' {
                idx = Some(self.parse_subscript()?);
            } else if self.peek() == b'(' {
                // Function invocation.
                if self.only_constants {
                    return Err(LangError::NotConst);
                }
                if addressmode {
                    return Err(LangError::ExpectVar);
                }
                self.call_in_expression(&name)?;
                self.eat_space();
                return Ok(());
            }

            if self.mode == Mode::Compile {
                // Compile-time peek: a constant's value is baked in as an
                // immediate instead of generating a load.
                let (v, info) = self.get_var(&name, idx, addressmode, true)?;
                if info.is_const {
                    self.push_operand(v)?;
                    self.eat_space();
                    return Ok(());
                }
            }

            let (v, info) = self.get_var(&name, idx, addressmode, false)?;
            if self.only_constants && !info.is_const {
                return Err(LangError::NotConst);
            }
            if self.mode == Mode::Interpret {
                self.push_operand(v)?;
            }
            self.eat_space();
        } else if is_digit(b) {
            let v = self.parse_int()?;
            self.push_operand(v)?;
            self.eat_space();
        } else if b == b'$' {
            self.advance();
            let v = self.parse_hex()?;
            self.push_operand(v)?;
            self.eat_space();
        } else if b == b'\'' {
            self.advance();
            let ch = self.peek() as i16;
            self.advance();
            if self.peek() != b'\'' {
                return Err(LangError::BadNum);
            }
            self.advance();
            self.push_operand(ch)?;
            self.eat_space();
        } else if b == b'(' {
            self.advance();
            self.push_operator_stack(OpTok::Sentinel)?;
            self.expression()?;
            self.expect(b')')?;
            self.pop_operator_stack()?;
        } else if let Some(tok) = self.match_unary() {
            self.push_operator_stack(tok)?;
            self.advance();
            self.primary()?;
        } else {
            return Err(LangError::Extra((b as char).to_string()));
        }
        Ok(())
    }

    /// `primary (binop primary)*`, then drain down to the sentinel.
    fn expression(&mut self) -> Result<(), LangError> {
        self.primary()?;
        while let Some((tok, len)) = self.match_binary() {
            self.push_operator(tok)?;
            self.pos += len;
            self.primary()?;
        }
        while self.top_operator() != OpTok::Sentinel {
            self.apply_operator()?;
        }
        Ok(())
    }

    /// Evaluate the expression at the cursor. With `check_no_more`, only
    /// a `;` or end of line may follow. Returns the value (0 in compile
    /// mode, where the result is on the VM stack instead).
    pub(crate) fn eval(&mut self, check_no_more: bool) -> Result<i16, LangError> {
        self.eat_space();
        if self.at_eol() {
            return Err(LangError::BadExpr);
        }
        self.expression()?;
        if check_no_more && self.peek() != b';' && !self.at_eol() {
            return Err(LangError::Extra(self.rest()));
        }
        self.pop_operand()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eightball_core::RecordingConsole;

    fn interp() -> Interp {
        Interp::new(Box::new(RecordingConsole::new()))
    }

    fn eval_str(interp: &mut Interp, text: &str) -> Result<i16, LangError> {
        interp.clear_expr_stacks();
        interp.lnbuf = text.as_bytes().to_vec();
        interp.pos = 0;
        interp.eval(true)
    }

    #[test]
    fn test_precedence() {
        let mut i = interp();
        assert_eq!(eval_str(&mut i, "2+3*4"), Ok(14));
        assert_eq!(eval_str(&mut i, "(2+3)*4"), Ok(20));
        assert_eq!(eval_str(&mut i, "10-2-3"), Ok(5));
        assert_eq!(eval_str(&mut i, "1+2 == 3 && 4 > 3"), Ok(1));
        // `^` is pow and binds tighter than `|`; xor is spelled `!`.
        assert_eq!(eval_str(&mut i, "1 | 2 ^ 3"), Ok(9));
        assert_eq!(eval_str(&mut i, "2^10"), Ok(1024));
    }

    #[test]
    fn test_two_char_operators_before_one_char() {
        let mut i = interp();
        assert_eq!(eval_str(&mut i, "4<=4"), Ok(1));
        assert_eq!(eval_str(&mut i, "1<<4"), Ok(16));
        assert_eq!(eval_str(&mut i, "-24>>2"), Ok(-6));
        assert_eq!(eval_str(&mut i, "5!=5"), Ok(0));
        assert_eq!(eval_str(&mut i, "5!3"), Ok(6));
    }

    #[test]
    fn test_unary_operators() {
        let mut i = interp();
        assert_eq!(eval_str(&mut i, "-5"), Ok(-5));
        assert_eq!(eval_str(&mut i, "+5"), Ok(5));
        assert_eq!(eval_str(&mut i, "!5"), Ok(0));
        assert_eq!(eval_str(&mut i, "!0"), Ok(1));
        assert_eq!(eval_str(&mut i, "~0"), Ok(-1));
        assert_eq!(eval_str(&mut i, "- -3"), Ok(3));
    }

    #[test]
    fn test_literals() {
        let mut i = interp();
        assert_eq!(eval_str(&mut i, "$ff"), Ok(255));
        assert_eq!(eval_str(&mut i, "$ffff"), Ok(-1));
        assert_eq!(eval_str(&mut i, "'A'"), Ok(65));
        assert_eq!(eval_str(&mut i, "' '"), Ok(32));
    }

    #[test]
    fn test_word_arithmetic_wraps() {
        let mut i = interp();
        assert_eq!(eval_str(&mut i, "32767+1"), Ok(-32768));
        assert_eq!(eval_str(&mut i, "0-32768"), Ok(-32768));
    }

    #[test]
    fn test_division_by_zero() {
        let mut i = interp();
        assert_eq!(eval_str(&mut i, "1/0"), Err(LangError::DivZero));
        assert_eq!(eval_str(&mut i, "1%0"), Err(LangError::DivZero));
        // The evaluator is still usable afterwards.
        i.clear_expr_stacks();
        assert_eq!(eval_str(&mut i, "6/2"), Ok(3));
    }

    #[test]
    fn test_memory_deref() {
        let mut i = interp();
        i.mem.write_word(0x1000, 513);
        assert_eq!(eval_str(&mut i, "*$1000"), Ok(513));
        assert_eq!(eval_str(&mut i, "^$1000"), Ok(1));
    }

    #[test]
    fn test_trailing_junk_rejected() {
        let mut i = interp();
        assert!(matches!(eval_str(&mut i, "1 2"), Err(LangError::Extra(_))));
        assert_eq!(eval_str(&mut i, ""), Err(LangError::BadExpr));
        assert!(eval_str(&mut i, "1+2 ; pr.nl").is_ok());
    }

    #[test]
    fn test_too_complex_overflows_cleanly() {
        let mut i = interp();
        let deep = "((((((((((((((((1))))))))))))))))";
        assert_eq!(eval_str(&mut i, deep), Err(LangError::TooComplex));
    }

    #[test]
    fn test_variables_in_expressions() {
        let mut i = interp();
        i.create_scalar("x", crate::vars::DeclKind::Word, 10).expect("declared");
        assert_eq!(eval_str(&mut i, "x*x+1"), Ok(101));
        // Address-of followed by dereference round-trips.
        assert_eq!(eval_str(&mut i, "*&x"), Ok(10));
    }
}
