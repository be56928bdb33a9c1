//! Shared foundation for the EightBall language toolchain.
//!
//! This crate holds the pieces both the front-end (interpreter + compiler)
//! and a bytecode VM need to agree on:
//!
//! - [`opcode`] - the opcode set and the VM contract constants
//! - [`mem`] - the 64K byte-addressable target memory model and the
//!   downward-growing variable arena
//! - [`console`] - the console I/O seam the language's print/keyboard
//!   statements go through

pub mod console;
pub mod mem;
pub mod opcode;

pub use console::{Console, OutputHandle, RecordingConsole, StdConsole};
pub use mem::{Arena, Memory, VAR_ARENA_LIM, VAR_ARENA_TOP};
pub use opcode::{
    FRAME_ARGS_OFFSET, Opcode, RT_CALL_STACK_LIM, RT_CALL_STACK_TOP, RT_PC_START,
};
