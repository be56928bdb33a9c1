//! Program store.
//!
//! The stored program is an ordered sequence of source lines; every
//! editor command addresses them by 1-based index. Lines are owned by the
//! store - execution copies the current line into the interpreter's line
//! buffer, so jumps simply reload from here.
//!
//! Source files are plain text, one statement-line per text-line, split
//! on any LF/CR on load (so LF, CR and CRLF files all work); empty
//! segments are dropped. Lines are not numbered on disk.

use crate::Interp;
use crate::error::LangError;
use crate::machine::LINE_MAX;
use std::fs;
use std::path::Path;

pub struct Program {
    lines: Vec<String>,
}

impl Program {
    pub fn new() -> Self {
        Program { lines: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, idx: usize) -> &str {
        &self.lines[idx]
    }

    /// Insert before 0-based index `at` (clamped to the end).
    pub fn insert(&mut self, at: usize, line: &str) {
        let at = at.min(self.lines.len());
        self.lines.insert(at, line.to_string());
    }

    pub fn append(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }

    /// Replace the 1-based line `num`. False when out of range.
    pub fn change(&mut self, num: i16, text: &str) -> bool {
        let Some(idx) = self.index_of(num) else {
            return false;
        };
        self.lines[idx] = text.to_string();
        true
    }

    /// Delete the 1-based inclusive range. An inverted range deletes
    /// nothing; the range is clamped to the program.
    pub fn delete_range(&mut self, start: i16, end: i16) {
        if end < start {
            return;
        }
        let Some(first) = self.index_of(start.max(1)) else {
            return;
        };
        let last = (end as usize).min(self.lines.len());
        self.lines.drain(first..last);
    }

    /// 0-based index for a 1-based line number.
    pub fn index_of(&self, num: i16) -> Option<usize> {
        if num < 1 || num as usize > self.lines.len() {
            return None;
        }
        Some(num as usize - 1)
    }

    /// `new`: drop the whole program.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn source_bytes(&self) -> usize {
        self.lines.iter().map(|l| l.len() + 1).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.lines.iter()
    }
}

impl Default for Program {
    fn default() -> Self {
        Program::new()
    }
}

impl Interp {
    /// `:r "name"`: clear variables and program, then load the file.
    /// Reports the number of lines loaded.
    pub fn read_file(&mut self, path: &Path) -> Result<usize, LangError> {
        self.console.print("Reading ");
        self.console.print(&path.display().to_string());
        self.console.print(":");

        let bytes = fs::read(path).map_err(|_| LangError::File)?;

        self.clear_vars();
        self.program.clear();

        let mut count = 0usize;
        for seg in bytes.split(|&b| b == b'\n' || b == b'\r') {
            if seg.is_empty() {
                continue;
            }
            if seg.len() > LINE_MAX {
                return Err(LangError::File);
            }
            self.program.append(&String::from_utf8_lossy(seg));
            count += 1;
        }
        self.print_dec(count as i16);
        self.console.print(" lines\n");
        Ok(count)
    }

    /// `:w "name"`: write the program, one line per text line.
    pub fn write_file(&mut self, path: &Path) -> Result<(), LangError> {
        self.console.print("Writing ");
        self.console.print(&path.display().to_string());
        self.console.print(":");

        let mut text = String::new();
        for line in self.program.iter() {
            text.push_str(line);
            text.push('\n');
        }
        fs::write(path, text).map_err(|_| LangError::File)?;
        self.console.print("OK\n");
        Ok(())
    }

    /// `:l [start[,end]]`: list with 1-based line numbers.
    pub(crate) fn list(&mut self, start: i16, end: i16) {
        for num in 1..=self.program.len() {
            let num = num as i16;
            if num >= start && num <= end {
                let line = self.program.line(num as usize - 1).to_string();
                self.print_dec(num);
                self.console.print(": ");
                self.console.print(&line);
                self.console.putc(b'\n');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eightball_core::RecordingConsole;
    use std::io::Write;

    fn interp() -> Interp {
        Interp::new(Box::new(RecordingConsole::new()))
    }

    #[test]
    fn test_insert_and_change() {
        let mut p = Program::new();
        p.append("two");
        p.insert(0, "one");
        p.insert(99, "three");
        assert_eq!(p.len(), 3);
        assert_eq!(p.line(0), "one");
        assert_eq!(p.line(2), "three");
        assert!(p.change(2, "TWO"));
        assert_eq!(p.line(1), "TWO");
        assert!(!p.change(4, "nope"));
        assert!(!p.change(0, "nope"));
    }

    #[test]
    fn test_delete_range() {
        let mut p = Program::new();
        for l in ["a", "b", "c", "d"] {
            p.append(l);
        }
        p.delete_range(2, 3);
        assert_eq!(p.len(), 2);
        assert_eq!(p.line(0), "a");
        assert_eq!(p.line(1), "d");
        // Inverted and out-of-range deletes are no-ops.
        p.delete_range(2, 1);
        p.delete_range(9, 12);
        assert_eq!(p.len(), 2);
        p.delete_range(1, 99);
        assert!(p.is_empty());
    }

    #[test]
    fn test_file_roundtrip_preserves_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("prog.8b");

        let mut i = interp();
        i.program.append("word x = 1");
        i.program.append("pr.dec x ; pr.nl");
        i.write_file(&path).expect("written");

        let mut j = interp();
        let count = j.read_file(&path).expect("read");
        assert_eq!(count, 2);
        assert_eq!(j.program().line(0), "word x = 1");
        assert_eq!(j.program().line(1), "pr.dec x ; pr.nl");
    }

    #[test]
    fn test_read_accepts_any_eol_convention() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("prog.8b");
        let mut f = std::fs::File::create(&path).expect("create");
        f.write_all(b"one\r\ntwo\rthree\n").expect("write");
        drop(f);

        let mut i = interp();
        assert_eq!(i.read_file(&path).expect("read"), 3);
        assert_eq!(i.program().line(1), "two");
        assert_eq!(i.program().line(2), "three");
    }

    #[test]
    fn test_read_clears_previous_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("prog.8b");
        std::fs::write(&path, "pr.nl\n").expect("write");

        let mut i = interp();
        i.program.append("old line");
        i.exec_immediate("word x = 5");
        i.read_file(&path).expect("read");
        assert_eq!(i.program().len(), 1);
        // Variables were cleared too.
        assert_eq!(
            i.get_var("x", None, false, false).map(|_| ()),
            Err(LangError::ExpectVar)
        );
    }

    #[test]
    fn test_missing_file_reports_file_error() {
        let mut i = interp();
        assert_eq!(
            i.read_file(Path::new("/nonexistent/nope.8b")).map(|_| ()),
            Err(LangError::File)
        );
    }

    #[test]
    fn test_overlong_line_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("prog.8b");
        std::fs::write(&path, format!("{}\n", "x".repeat(300))).expect("write");
        let mut i = interp();
        assert_eq!(i.read_file(&path).map(|_| ()), Err(LangError::File));
    }
}
