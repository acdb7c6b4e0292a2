//! GN Script CLI

use clap::{Parser, Subcommand};
use gnscript::error::report_error;
use gnscript::{CompileError, Interpreter, ScriptError};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "gns", version, about = "GN Script interpreter")]
struct Cli {
    /// Log filter (e.g. `debug`, `gnscript=trace`); defaults to $GNS_LOG or `warn`
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a GN Script file
    Run {
        /// Script to execute
        file: PathBuf,
    },
    /// Start an interactive session
    Repl,
    /// Parse and dump AST as JSON (debug)
    Parse {
        /// Source file to parse
        file: PathBuf,
    },
    /// Tokenize and dump tokens (debug)
    Tokens {
        /// Source file to tokenize
        file: PathBuf,
    },
}

fn init_tracing(filter: Option<&str>) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = match filter {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_env("GNS_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log.as_deref());

    let result = match cli.command.unwrap_or(Command::Repl) {
        Command::Run { file } => run_file(&file),
        Command::Repl => run_repl(),
        Command::Parse { file } => parse_file(&file),
        Command::Tokens { file } => tokenize_file(&file),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn read_source(path: &Path) -> Result<(String, String), CompileError> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| CompileError::io_error(format!("{}: {e}", path.display())))?;
    Ok((path.display().to_string(), source))
}

/// Print a front-end error with its source context, or pass anything else up
fn report(filename: &str, source: &str, err: ScriptError) -> Box<dyn std::error::Error> {
    match err {
        ScriptError::Compile(e) if e.span().is_some() => {
            if report_error(filename, source, &e).is_ok() {
                return "compilation failed".into();
            }
            e.into()
        }
        other => other.into(),
    }
}

fn run_file(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (filename, source) = read_source(path)?;
    let mut interpreter = Interpreter::new();
    interpreter
        .run_named(&filename, &source)
        .map_err(|e| report(&filename, &source, e))
}

fn run_repl() -> Result<(), Box<dyn std::error::Error>> {
    let mut repl = gnscript::repl::Repl::new()?;
    repl.run()?;
    Ok(())
}

fn parse_file(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (filename, source) = read_source(path)?;

    let program = gnscript::lexer::tokenize(&source)
        .and_then(|tokens| gnscript::parser::parse(&filename, &source, tokens))
        .map_err(|e| report(&filename, &source, e.into()))?;

    println!("{}", serde_json::to_string_pretty(&program)?);
    Ok(())
}

fn tokenize_file(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (filename, source) = read_source(path)?;

    let tokens =
        gnscript::lexer::tokenize(&source).map_err(|e| report(&filename, &source, e.into()))?;
    for (tok, span) in &tokens {
        println!("{:?} @ {}..{}", tok, span.start, span.end);
    }

    Ok(())
}
