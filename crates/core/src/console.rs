//! Console I/O seam.
//!
//! Platform character I/O is an external collaborator: the language core
//! only ever talks to a [`Console`]. The REPL and the batch CLI plug in
//! [`StdConsole`]; tests plug in [`RecordingConsole`] to capture output
//! and script keyboard input.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, BufRead, Read, Write};
use std::rc::Rc;

/// Character-level console the language statements are written against.
pub trait Console {
    /// Write a single character.
    fn putc(&mut self, ch: u8);

    /// Write a string.
    fn print(&mut self, s: &str);

    /// Blocking single-key read (`kbd.ch`).
    fn read_key(&mut self) -> io::Result<u8>;

    /// Blocking line read (`kbd.ln`), without the trailing newline.
    fn read_line(&mut self) -> io::Result<String>;

    /// Switch the display width (the `mode` statement). Implementations
    /// without a notion of screen width just ignore it.
    fn set_mode(&mut self, _columns: u8) {}
}

/// Console backed by stdin/stdout.
pub struct StdConsole;

impl StdConsole {
    pub fn new() -> Self {
        StdConsole
    }
}

impl Default for StdConsole {
    fn default() -> Self {
        StdConsole::new()
    }
}

impl Console for StdConsole {
    fn putc(&mut self, ch: u8) {
        let mut out = io::stdout();
        let _ = out.write_all(&[ch]);
        let _ = out.flush();
    }

    fn print(&mut self, s: &str) {
        let mut out = io::stdout();
        let _ = out.write_all(s.as_bytes());
        let _ = out.flush();
    }

    fn read_key(&mut self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        io::stdin().read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }
}

/// Console that records output and replays scripted input.
///
/// Output is shared through an [`OutputHandle`] so a test can keep reading
/// it after the console itself has been moved into the interpreter.
pub struct RecordingConsole {
    out: OutputHandle,
    input: VecDeque<u8>,
}

/// Cloneable view of a [`RecordingConsole`]'s output.
#[derive(Clone)]
pub struct OutputHandle(Rc<RefCell<Vec<u8>>>);

impl OutputHandle {
    /// Everything written so far, lossily decoded.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

impl RecordingConsole {
    pub fn new() -> Self {
        RecordingConsole {
            out: OutputHandle(Rc::new(RefCell::new(Vec::new()))),
            input: VecDeque::new(),
        }
    }

    pub fn handle(&self) -> OutputHandle {
        self.out.clone()
    }

    /// Queue bytes to be returned by `read_key` / `read_line`.
    pub fn push_input(&mut self, bytes: &[u8]) {
        self.input.extend(bytes.iter().copied());
    }
}

impl Default for RecordingConsole {
    fn default() -> Self {
        RecordingConsole::new()
    }
}

impl Console for RecordingConsole {
    fn putc(&mut self, ch: u8) {
        self.out.0.borrow_mut().push(ch);
    }

    fn print(&mut self, s: &str) {
        self.out.0.borrow_mut().extend_from_slice(s.as_bytes());
    }

    fn read_key(&mut self) -> io::Result<u8> {
        self.input
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no scripted input"))
    }

    fn read_line(&mut self) -> io::Result<String> {
        let mut line = Vec::new();
        loop {
            match self.input.pop_front() {
                None | Some(b'\n') => break,
                Some(b) => line.push(b),
            }
        }
        Ok(String::from_utf8_lossy(&line).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_console_captures_output() {
        let mut con = RecordingConsole::new();
        let out = con.handle();
        con.print("abc");
        con.putc(b'\n');
        assert_eq!(out.text(), "abc\n");
        out.clear();
        assert_eq!(out.text(), "");
    }

    #[test]
    fn test_recording_console_scripted_input() {
        let mut con = RecordingConsole::new();
        con.push_input(b"x\nhello\n");
        assert_eq!(con.read_key().expect("key"), b'x');
        assert_eq!(con.read_key().expect("key"), b'\n');
        assert_eq!(con.read_line().expect("line"), "hello");
        assert!(con.read_key().is_err());
    }
}
