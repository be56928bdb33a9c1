//! EightBall batch CLI.
//!
//! Compile or run a source file without starting the interactive
//! editor, and disassemble compiled bytecode.

use clap::{Parser as ClapParser, Subcommand};
use eightball::RunOutcome;
use eightball_core::{Opcode, StdConsole};
use std::path::{Path, PathBuf};
use std::process;

#[derive(ClapParser)]
#[command(name = "ebc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "EightBall compiler - compile or run .8b programs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a source file to VM bytecode
    Build {
        /// Input source file
        input: PathBuf,

        /// Output bytecode path (defaults to the input with .8bc)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a source file through the interpreter
    Run {
        /// Input source file
        input: PathBuf,
    },

    /// Disassemble a bytecode file
    Dis {
        /// Bytecode file
        input: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env(),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output } => {
            let output = output.unwrap_or_else(|| input.with_extension("8bc"));
            run_build(&input, &output);
        }
        Commands::Run { input } => run_run(&input),
        Commands::Dis { input } => run_dis(&input),
    }
}

fn run_build(input: &Path, output: &Path) {
    match eightball::compile_file(input, output, Box::new(StdConsole::new())) {
        Ok(RunOutcome::Completed) => {}
        Ok(_) => process::exit(1),
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}

fn run_run(input: &Path) {
    match eightball::run_file(input, Box::new(StdConsole::new())) {
        Ok(RunOutcome::Completed) => {}
        Ok(_) => process::exit(1),
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}

fn run_dis(input: &Path) {
    let bytes = match std::fs::read(input) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Failed to read {}: {}", input.display(), e);
            process::exit(1);
        }
    };

    let mut pc = usize::from(eightball_core::RT_PC_START);
    let mut i = 0usize;
    while i < bytes.len() {
        let Ok(op) = Opcode::try_from(bytes[i]) else {
            println!("{:04x}: ??       ; ${:02x}", pc, bytes[i]);
            pc += 1;
            i += 1;
            continue;
        };
        if op.has_immediate() {
            if i + 2 >= bytes.len() {
                println!("{:04x}: {} <truncated>", pc, op);
                break;
            }
            let imm = u16::from(bytes[i + 1]) | (u16::from(bytes[i + 2]) << 8);
            println!("{:04x}: {} ${:04x}", pc, op, imm);
            pc += 3;
            i += 3;
        } else if op.has_inline_string() {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len() && bytes[end] != 0 {
                end += 1;
            }
            let msg = String::from_utf8_lossy(&bytes[start..end]);
            println!("{:04x}: {} \"{}\"", pc, op, msg);
            let len = end - start + 2;
            pc += len;
            i += len;
        } else {
            println!("{:04x}: {}", pc, op);
            pc += 1;
            i += 1;
        }
    }
}
