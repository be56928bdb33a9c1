//! eightball - the interactive EightBall environment.
//!
//! A read-eval-print loop over the language front-end: lines typed at
//! the prompt execute immediately, the editor commands (`:r :w :l :c :a
//! :i :d`) maintain the stored program, `run` interprets it and
//! `comp "file"` compiles it to VM bytecode.
//!
//! Usage:
//!   eightball                 # empty program
//!   eightball program.8b      # load a source file first

mod config;

use clap::Parser as ClapParser;
use config::ReplConfig;
use eightball::{EditMode, Interp, RunOutcome};
use eightball_core::StdConsole;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::debug;

#[derive(ClapParser)]
#[command(name = "eightball")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "EightBall - interactive interpreter and compiler", long_about = None)]
struct Args {
    /// Source file to load into the program store at startup
    file: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = ReplConfig::load();

    if let Err(e) = run(&args, &config) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args, config: &ReplConfig) -> Result<(), String> {
    let mut interp = Interp::new(Box::new(StdConsole::new()));

    // The break flag: SIGINT while a program runs stops it at the next
    // statement boundary instead of killing the process.
    let break_flag = Arc::new(AtomicBool::new(false));
    #[cfg(unix)]
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&break_flag))
        .map_err(|e| format!("Failed to install break handler: {}", e))?;
    interp.set_interrupt_flag(break_flag);

    if config.banner {
        interp.banner(env!("CARGO_PKG_VERSION"));
    }

    if let Some(file) = &args.file {
        if let Err(e) = interp.read_file(file) {
            return Err(format!("{}: {}", file.display(), e));
        }
    }

    let mut rl = DefaultEditor::new().map_err(|e| format!("Failed to init line editor: {}", e))?;
    let history = config.history_path();
    if let Some(path) = &history {
        // First run: no history yet.
        let _ = rl.load_history(path);
    }

    loop {
        let prompt = match interp.edit {
            EditMode::Off => "",
            _ => config.edit_prompt.as_str(),
        };
        match rl.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = rl.add_history_entry(&line);
                }
                debug!(line = %line, "input");
                if interp.feed_line(&line) == RunOutcome::Quit {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(format!("Input error: {}", e)),
        }
    }

    if let Some(path) = &history {
        let _ = rl.save_history(path);
    }
    Ok(())
}
