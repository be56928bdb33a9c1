//! Compiler tests: stored programs in, emitted bytecode out.
//!
//! These pin down the emitted encodings the VM contract depends on:
//! little-endian immediates, forward-branch fixups, loop back-edges,
//! absolute vs frame-relative addressing, and subroutine linkage.

use eightball::{Interp, RunOutcome};
use eightball_core::{Opcode, OutputHandle, RecordingConsole};
use std::path::PathBuf;

fn op(o: Opcode) -> u8 {
    o.into()
}

/// Store `lines` as the program, compile it, and return the bytecode.
fn compile(lines: &[&str]) -> (Vec<u8>, OutputHandle) {
    let con = RecordingConsole::new();
    let out = con.handle();
    let mut interp = Interp::new(Box::new(con));
    interp.feed_line(":i 1");
    for line in lines {
        interp.feed_line(line);
    }
    interp.feed_line(".");

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("out.8bc");
    assert_eq!(interp.comp(&path), RunOutcome::Completed, "comp failed: {}", out.text());
    (std::fs::read(&path).expect("bytecode written"), out)
}

fn read_imm(bytes: &[u8], at: usize) -> u16 {
    u16::from(bytes[at]) | (u16::from(bytes[at + 1]) << 8)
}

#[test]
fn test_simple_program_encoding() {
    let (bytes, _) = compile(&["pr.dec 42", "end"]);
    assert_eq!(
        bytes,
        vec![
            op(Opcode::Ldimm),
            42,
            0,
            op(Opcode::Prdec),
            op(Opcode::End),
            op(Opcode::End),
        ]
    );
}

#[test]
fn test_global_variable_absolute_addressing() {
    let (bytes, _) = compile(&["word x = 5", "x = x + 1", "end"]);
    // The first global word is carved from the top of the call stack.
    let addr = eightball_core::RT_CALL_STACK_TOP - 1;
    assert_eq!(
        bytes,
        vec![
            op(Opcode::Ldimm),
            5,
            0,
            op(Opcode::Pshword),
            op(Opcode::LdawordImm),
            (addr & 0xff) as u8,
            (addr >> 8) as u8,
            op(Opcode::Ldimm),
            1,
            0,
            op(Opcode::Add),
            op(Opcode::StawordImm),
            (addr & 0xff) as u8,
            (addr >> 8) as u8,
            op(Opcode::End),
            op(Opcode::End),
        ]
    );
}

#[test]
fn test_if_else_forward_fixups() {
    let (bytes, _) = compile(&[
        "word x = 1",
        "if x",
        "pr.dec 1",
        "else",
        "pr.dec 2",
        "endif",
        "end",
    ]);
    // Layout: decl [0..4], guard load [4..7], NOT [7], BRNCH [8..11],
    // then-block [11..15], else-jump [15..18], else-block [18..22],
    // END END [22..24].
    assert_eq!(bytes[7], op(Opcode::Not));
    assert_eq!(bytes[8], op(Opcode::BrnchImm));
    // The false-branch lands at the else block.
    assert_eq!(read_imm(&bytes, 9), 18);
    assert_eq!(bytes[15], op(Opcode::JmpImm));
    // The jump over the else block lands at the endif.
    assert_eq!(read_imm(&bytes, 16), 22);
    assert_eq!(bytes[22], op(Opcode::End));
}

#[test]
fn test_while_reevaluates_guard() {
    let (bytes, _) = compile(&["word x = 3", "while x > 0", "x = x - 1", "endwhile", "end"]);
    // Guard starts at 4; its NOT/BRNCH sit at 11/12, the loop body at
    // 15, the back-jump at 25, and the loop exit at 28.
    assert_eq!(bytes[11], op(Opcode::Not));
    assert_eq!(bytes[12], op(Opcode::BrnchImm));
    assert_eq!(read_imm(&bytes, 13), 28);
    assert_eq!(bytes[25], op(Opcode::JmpImm));
    // endwhile jumps back to the PC before the guard expression.
    assert_eq!(read_imm(&bytes, 26), 4);
    assert_eq!(bytes[28], op(Opcode::End));
}

#[test]
fn test_for_loop_back_edge() {
    let (bytes, _) = compile(&["word i = 0", "for i = 1 : 3", "endfor", "end"]);
    // The limit is parked on the call stack at 13; endfor's compare
    // branches back to the PC captured just after the for header.
    assert_eq!(bytes[13], op(Opcode::Pshword));
    assert_eq!(bytes[14], op(Opcode::Popword));
    assert_eq!(bytes[25], op(Opcode::Gte));
    assert_eq!(bytes[26], op(Opcode::BrnchImm));
    assert_eq!(read_imm(&bytes, 27), 14);
    // The parked limit is dropped on exit.
    assert_eq!(bytes[29], op(Opcode::Popword));
    assert_eq!(bytes[30], op(Opcode::Drop));
}

#[test]
fn test_call_is_linked_to_sub_entry() {
    let (bytes, _) = compile(&["call f()", "end", "sub f()", "return 0", "endsub"]);
    assert_eq!(bytes[0], op(Opcode::JsrImm));
    // Statement-level call drops the unused return value.
    assert_eq!(bytes[3], op(Opcode::Drop));
    assert_eq!(bytes[4], op(Opcode::End));
    // The linker patched the placeholder with the sub's entry, which
    // begins with SP -> FP.
    let entry = read_imm(&bytes, 1);
    assert_eq!(entry, 5);
    assert_eq!(bytes[usize::from(entry)], op(Opcode::Sptofp));
    // return: FP -> SP discards locals, then RTS.
    assert_eq!(bytes[9], op(Opcode::Fptosp));
    assert_eq!(bytes[10], op(Opcode::Rts));
}

#[test]
fn test_unresolved_call_reports_link_error() {
    let con = RecordingConsole::new();
    let out = con.handle();
    let mut interp = Interp::new(Box::new(con));
    interp.feed_line(":i 1");
    interp.feed_line("call ghost()");
    interp.feed_line("end");
    interp.feed_line(".");

    let dir = tempfile::tempdir().expect("tempdir");
    let path: PathBuf = dir.path().join("out.8bc");
    assert_eq!(interp.comp(&path), RunOutcome::Errored);
    assert!(out.text().contains("?link"));
    // Nothing was written.
    assert!(!path.exists());
}

#[test]
fn test_sub_locals_are_frame_relative() {
    let (bytes, _) = compile(&["end", "sub f(word a)", "word b = a + 1", "return b", "endsub"]);
    // Formal `a` sits above the frame linkage at +4.
    assert_eq!(bytes[2], op(Opcode::LdrwordImm));
    assert_eq!(read_imm(&bytes, 3), 4);
    // Local `b` is below the frame pointer at -2.
    assert_eq!(bytes[9], op(Opcode::Pshword));
    assert_eq!(bytes[10], op(Opcode::LdrwordImm));
    assert_eq!(read_imm(&bytes, 11), 0xfffe);
}

#[test]
fn test_argument_bytes_discarded_after_call() {
    let (bytes, _) = compile(&[
        "call f(1, 2)",
        "end",
        "sub f(word a, byte b)",
        "return 0",
        "endsub",
    ]);
    // Args: word push (2 bytes) + byte push (1 byte) = 3 to discard.
    let jsr = bytes
        .iter()
        .position(|&b| b == op(Opcode::JsrImm))
        .expect("jsr emitted");
    assert_eq!(bytes[jsr + 3], op(Opcode::Ldimm));
    assert_eq!(read_imm(&bytes, jsr + 4), 3);
    assert_eq!(bytes[jsr + 6], op(Opcode::Discard));
    assert_eq!(bytes[jsr + 7], op(Opcode::Drop));
}

#[test]
fn test_prmsg_inline_string() {
    let (bytes, _) = compile(&["pr.msg \"hi\"", "end"]);
    assert_eq!(
        bytes,
        vec![op(Opcode::Prmsg), b'h', b'i', 0, op(Opcode::End), op(Opcode::End)]
    );
}

#[test]
fn test_constant_folded_into_immediate() {
    let (bytes, _) = compile(&["const k = 7", "pr.dec k", "end"]);
    // No storage, no load: the constant becomes LDIMM 7.
    assert_eq!(
        bytes,
        vec![
            op(Opcode::Ldimm),
            7,
            0,
            op(Opcode::Prdec),
            op(Opcode::End),
            op(Opcode::End),
        ]
    );
}

#[test]
fn test_compile_progress_reported() {
    let (_, out) = compile(&["end", "sub f()", "return 0", "endsub"]);
    let text = out.text();
    // One dot per line, the sub name, and the output file report.
    assert!(text.contains("...."));
    assert!(text.contains("[f]"));
    assert!(text.contains("Writing "));
}

#[test]
fn test_no_placeholders_survive_in_branches() {
    let (bytes, _) = compile(&[
        "word x = 2",
        "while x > 0",
        "if x == 1",
        "pr.dec x",
        "else",
        "pr.hex x",
        "endif",
        "x = x - 1",
        "endwhile",
        "end",
    ]);
    // Walk the stream; every control-transfer immediate must point
    // inside the program, never at the 0xffff placeholder.
    let mut i = 0usize;
    while i < bytes.len() {
        let opcode = Opcode::try_from(bytes[i]).expect("valid opcode stream");
        if opcode.has_immediate() {
            if matches!(opcode, Opcode::BrnchImm | Opcode::JmpImm | Opcode::JsrImm) {
                let target = read_imm(&bytes, i + 1);
                assert_ne!(target, 0xffff, "unpatched placeholder at {}", i);
                assert!((target as usize) < bytes.len());
            }
            i += 3;
        } else if opcode.has_inline_string() {
            i += 1;
            while bytes[i] != 0 {
                i += 1;
            }
            i += 1;
        } else {
            i += 1;
        }
    }
}
