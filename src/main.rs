// main.rs - Run a source file through the interpreter

use anyhow::{Context, Result};
use clap::Parser;
use forge::{Interpreter, InterpreterConfig};
use std::fs;
use std::path::PathBuf;
use tracing::info;

/// Interpret a Forth-like source file
#[derive(Parser)]
#[command(name = "forge", version, about)]
struct Args {
    /// Source file to run
    file: PathBuf,

    /// Fail on identifiers that name no word, variable or constant
    #[arg(long)]
    strict: bool,

    /// Deepest allowed nesting of word calls
    #[arg(long, default_value_t = InterpreterConfig::default().max_call_depth)]
    max_call_depth: usize,

    /// Log filter (e.g. `debug`, `forge::interpreter=trace`)
    #[arg(long, env = "FORGE_LOG", default_value = "warn")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Program output owns stdout; diagnostics go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let bytes = fs::read(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    info!(file = %args.file.display(), bytes = bytes.len(), "loaded source");

    let config = InterpreterConfig {
        strict: args.strict,
        max_call_depth: args.max_call_depth,
    };
    let mut interpreter = Interpreter::new(config);
    interpreter.run_source(&args.file.display().to_string(), &bytes)?;

    Ok(())
}
