//! EightBall language front-end.
//!
//! EightBall is a small imperative language for 16-bit targets: word and
//! byte variables, arrays with pass-by-reference, if/else, for and while
//! loops, and subroutines with arguments and return values. This crate
//! is the complete front-end: the line-editor data model, a direct
//! interpreter, and a single-pass compiler emitting bytecode for the
//! companion stack VM (see `eightball-core` for the opcode contract).
//!
//! One statement traversal drives both back-ends. The [`Interp`] owns
//! all state; feed it lines and it interprets them, stores them, or -
//! via the `comp` statement - compiles the stored program:
//!
//! ```
//! use eightball::Interp;
//! use eightball_core::RecordingConsole;
//!
//! let console = RecordingConsole::new();
//! let output = console.handle();
//! let mut interp = Interp::new(Box::new(console));
//! interp.exec_immediate("word n = 6 ; pr.dec n * 7 ; pr.nl");
//! assert_eq!(output.text(), "42\n\n");
//! ```

pub mod cursor;
pub mod emitter;
pub mod error;
pub mod expr;
pub mod machine;
pub mod program;
pub mod statement;
pub mod subs;
pub mod vars;

mod controlflow;

pub use error::LangError;
pub use machine::{EditMode, Interp, Mode, RunOutcome};
pub use program::Program;
pub use subs::SUB_NAME_CHARS;
pub use vars::VAR_NAME_CHARS;

use std::path::Path;

/// Load a source file and run it interpreted, with the given console.
/// Library-level equivalent of `:r "file"` followed by `run`.
pub fn run_file(
    path: &Path,
    console: Box<dyn eightball_core::Console>,
) -> Result<RunOutcome, LangError> {
    let mut interp = Interp::new(console);
    interp.read_file(path)?;
    Ok(interp.run_program())
}

/// Load a source file and compile it to a bytecode file. Equivalent of
/// `:r "src"` followed by `comp "out"`.
pub fn compile_file(
    src: &Path,
    out: &Path,
    console: Box<dyn eightball_core::Console>,
) -> Result<RunOutcome, LangError> {
    let mut interp = Interp::new(console);
    interp.read_file(src)?;
    Ok(interp.comp(out))
}
