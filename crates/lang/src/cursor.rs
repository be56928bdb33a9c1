//! Lexical cursor.
//!
//! Source is ASCII, so the cursor walks a byte slice. `peek` returns 0 at
//! end of line, which keeps the parsing code shaped like the pointer walk
//! it models: every routine checks for the NUL it would have found at the
//! end of a C string.
//!
//! The cursor over the *current* line is part of [`crate::Interp`]
//! (`lnbuf` + `pos`); [`Scan`] is a detached scanner for the one place the
//! front-end reads a second line at the same time (matching a `call`
//! against the formal list of its `sub`).

use crate::Interp;
use crate::error::LangError;

#[inline]
pub(crate) fn is_alpha(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_uppercase()
}

#[inline]
pub(crate) fn is_digit(b: u8) -> bool {
    b.is_ascii_digit()
}

#[inline]
fn is_hex_digit(b: u8) -> bool {
    // Hex literals use lowercase digits only.
    is_digit(b) || (b'a'..=b'f').contains(&b)
}

impl Interp {
    /// Byte at the cursor, or 0 at end of line.
    #[inline]
    pub(crate) fn peek(&self) -> u8 {
        *self.lnbuf.get(self.pos).unwrap_or(&0)
    }

    /// Byte `off` positions past the cursor, or 0 past end of line.
    #[inline]
    pub(crate) fn peek_at(&self, off: usize) -> u8 {
        *self.lnbuf.get(self.pos + off).unwrap_or(&0)
    }

    #[inline]
    pub(crate) fn advance(&mut self) {
        if self.pos < self.lnbuf.len() {
            self.pos += 1;
        }
    }

    #[inline]
    pub(crate) fn at_eol(&self) -> bool {
        self.pos >= self.lnbuf.len()
    }

    /// Consume spaces at the cursor.
    pub(crate) fn eat_space(&mut self) {
        while self.peek() == b' ' {
            self.pos += 1;
        }
    }

    /// Does the text at the cursor start with `s`?
    pub(crate) fn looking_at(&self, s: &str) -> bool {
        self.lnbuf[self.pos..].starts_with(s.as_bytes())
    }

    /// Expect a single-character token at the cursor; consume it and any
    /// following spaces.
    pub(crate) fn expect(&mut self, token: u8) -> Result<(), LangError> {
        if self.peek() == token {
            self.advance();
            self.eat_space();
            Ok(())
        } else {
            Err(LangError::Expected(token as char))
        }
    }

    /// Scan an identifier (`[A-Za-z][A-Za-z0-9]*`) and return the full
    /// lexeme. Returns an empty string when the cursor is not at one.
    pub(crate) fn scan_name(&mut self) -> String {
        let mut name = String::new();
        if !is_alpha(self.peek()) {
            return name;
        }
        while is_alpha(self.peek()) || is_digit(self.peek()) {
            name.push(self.peek() as char);
            self.advance();
        }
        name
    }

    /// Parse a decimal integer literal at the cursor.
    pub(crate) fn parse_int(&mut self) -> Result<i16, LangError> {
        if !is_digit(self.peek()) {
            return Err(LangError::BadNum);
        }
        let mut val: i16 = 0;
        while is_digit(self.peek()) {
            val = val.wrapping_mul(10).wrapping_add((self.peek() - b'0') as i16);
            self.advance();
        }
        Ok(val)
    }

    /// Parse a hexadecimal literal (after the `$`), lowercase digits only.
    pub(crate) fn parse_hex(&mut self) -> Result<i16, LangError> {
        if !is_hex_digit(self.peek()) {
            return Err(LangError::BadNum);
        }
        let mut val: u16 = 0;
        while is_hex_digit(self.peek()) {
            let d = match self.peek() {
                b @ b'a'..=b'f' => b - b'a' + 10,
                b => b - b'0',
            };
            val = val.wrapping_mul(16).wrapping_add(d as u16);
            self.advance();
        }
        Ok(val as i16)
    }

    /// The unconsumed remainder of the line, for `?extra` reports.
    pub(crate) fn rest(&self) -> String {
        String::from_utf8_lossy(&self.lnbuf[self.pos.min(self.lnbuf.len())..]).into_owned()
    }

    /// Skip forward to the next `;` or end of line (statement skipping
    /// while the skip flag is set).
    pub(crate) fn skip_statement(&mut self) {
        while !self.at_eol() && self.peek() != b';' {
            self.advance();
        }
    }
}

/// Detached scanner over a line other than the current one.
pub(crate) struct Scan<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scan<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        Scan {
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    #[inline]
    pub(crate) fn peek(&self) -> u8 {
        *self.bytes.get(self.pos).unwrap_or(&0)
    }

    #[inline]
    pub(crate) fn advance(&mut self) {
        if self.pos < self.bytes.len() {
            self.pos += 1;
        }
    }

    pub(crate) fn eat_space(&mut self) {
        while self.peek() == b' ' {
            self.pos += 1;
        }
    }

    /// Consume `s` if the scanner is looking at it.
    pub(crate) fn eat(&mut self, s: &str) -> bool {
        if self.bytes[self.pos..].starts_with(s.as_bytes()) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    pub(crate) fn scan_name(&mut self) -> String {
        let mut name = String::new();
        while is_alpha(self.peek()) || is_digit(self.peek()) {
            name.push(self.peek() as char);
            self.advance();
        }
        name
    }
}
