//! Thin JSON-driven driver over the `chronovm-core` pipeline.
//!
//! Mirrors `ouros-cli`'s relationship to `ouros`: no VM logic lives here,
//! only argument parsing and JSON plumbing around the library's public
//! functions (spec.md §6). Front-end compilation is out of scope (spec.md
//! §1) — this binary consumes an already-compiled instruction array.

use std::fs;
use std::io::{self, Read};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use chronovm_core::{analyse_step, compress_trace, run_to_halt, GcPolicy, Instruction, Program, RunLimits, SourceMap};

/// Run a ChronoVM program to halt and print a derived pipeline artefact.
#[derive(Parser)]
#[command(name = "chronovm", version, about)]
struct Cli {
    /// Path to a JSON document with `instructions` and `source_map`. Reads
    /// stdin if omitted.
    #[arg(long, global = true)]
    input: Option<String>,

    /// Maximum micro-steps before `ExecutionLimitExceeded` (spec.md §5).
    #[arg(long, default_value_t = 5_000, global = true)]
    max_steps: usize,

    /// Collect after every RET and HALT instead of never collecting.
    #[arg(long, global = true)]
    gc: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the compressed semantic steps for the whole run.
    Compress,
    /// Print the full `analyse_step` aggregate for one trace index.
    Step {
        /// Index into the micro-step trace (0 is the initial state).
        index: usize,
    },
}

#[derive(Deserialize)]
struct InputDocument {
    instructions: Vec<Instruction>,
    #[serde(default)]
    source_map: SourceMap,
}

#[derive(Serialize)]
struct ErrorPayload<'a> {
    error: &'a str,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            let payload = ErrorPayload { error: &message };
            println!("{}", serde_json::to_string_pretty(&payload).expect("error payload always serialises"));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let raw = read_input(cli.input.as_deref()).map_err(|e| format!("failed to read input: {e}"))?;
    let document: InputDocument = serde_json::from_str(&raw).map_err(|e| format!("invalid input document: {e}"))?;
    let program = Program::new(document.instructions);

    let limits = RunLimits {
        max_steps: cli.max_steps,
        gc: if cli.gc { GcPolicy::AfterReturnAndHalt } else { GcPolicy::Disabled },
    };
    let (trace, error) = run_to_halt(&program, limits);

    match &cli.command {
        Command::Compress => {
            let steps = compress_trace(&trace, &program, &document.source_map);
            print_json(&steps)?;
        }
        Command::Step { index } => {
            let analysis = analyse_step(&trace, &program, *index).map_err(|e| e.to_string())?;
            print_json(&analysis)?;
        }
    }

    if let Some(err) = error {
        eprintln!("execution stopped early: {err}");
    }
    Ok(())
}

fn read_input(path: Option<&str>) -> io::Result<String> {
    match path {
        Some(path) => fs::read_to_string(path),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value).map_err(|e| format!("failed to serialise output: {e}"))?;
    println!("{json}");
    Ok(())
}
