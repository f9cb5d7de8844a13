use anyhow::Context;
use argh::FromArgs;
use smallsh::{ExitCode, Interpreter, LineSource, ShellState, jobs};
use std::fs::File;
use std::io::{self, BufReader, IsTerminal};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(FromArgs)]
/// A small shell. Reads commands from standard input, or from SCRIPT when given.
struct Args {
    #[argh(positional)]
    /// file to read commands from; no prompt is shown
    script: Option<PathBuf>,
}

fn main() {
    init_logging();
    let args: Args = argh::from_env();

    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("smallsh: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run(args: Args) -> anyhow::Result<ExitCode> {
    let source = match args.script {
        Some(path) => {
            let file = File::open(&path).with_context(|| path.display().to_string())?;
            LineSource::Reader(Box::new(BufReader::new(file)))
        }
        None if io::stdin().is_terminal() => LineSource::Terminal,
        None => LineSource::Reader(Box::new(io::stdin().lock())),
    };

    jobs::install_signal_handlers()?;

    let interactive = matches!(source, LineSource::Terminal);
    let mut interpreter = Interpreter::new(ShellState::new(interactive));
    interpreter.run(source)
}

/// Logging is off unless `SMALLSH_LOG` asks for it, e.g. `SMALLSH_LOG=debug`.
fn init_logging() {
    let filter = EnvFilter::try_from_env("SMALLSH_LOG").unwrap_or_else(|_| EnvFilter::new("off"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}
