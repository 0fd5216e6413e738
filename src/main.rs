use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use retouch::{AppContext, Operation, Signal, StatusLevel};

/// Headless front end to the editing pipeline.
#[derive(Parser, Debug)]
#[command(
    name = "retouch",
    about = "Apply edits to an image without opening a window",
    long_about = "Loads an image, runs each --op in order on its editing queue, and\n\
                  optionally prints metadata or writes the result.\n\n\
                  Example:\n  \
                  retouch photo.jpg --op contrast=0.2 --op box-blur=3 --op undo -o out.png"
)]
struct CliArgs {
    /// Image to open.
    input: PathBuf,

    /// Operation to apply: `contrast=0.2`, `gaussian-blur=4`, `flip`, ...
    /// `undo` reverts the previous one. Repeat to chain.
    #[arg(long = "op", value_name = "OP")]
    ops: Vec<String>,

    /// Print image metadata after editing.
    #[arg(long)]
    info: bool,

    /// Output file. The format follows the extension.
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Seconds to wait for each queued step.
    #[arg(long, default_value_t = 120, value_name = "SECS")]
    timeout: u64,
}

fn main() -> anyhow::Result<()> {
    retouch::logging::init();
    let args = CliArgs::parse();
    let timeout = Duration::from_secs(args.timeout);

    let config = retouch::config::load_pipeline_config();
    let mut app = AppContext::with_defaults(config).context("failed to set up pipeline")?;
    let signals = app.subscribe();

    app.open(&args.input)
        .with_context(|| format!("failed to open {}", args.input.display()))?;
    app.wait_idle(timeout)?;
    check_errors(&signals)?;

    for op in &args.ops {
        if op == "undo" {
            app.undo()?;
        } else {
            let operation: Operation = op
                .parse()
                .with_context(|| format!("invalid --op {op:?}"))?;
            app.apply(operation)?;
        }
        app.wait_idle(timeout)?;
        check_errors(&signals)?;
    }

    if args.info {
        if let Some(metadata) = app.metadata()? {
            for (key, value) in metadata {
                println!("{key}: {value}");
            }
        }
    }

    if let Some(output) = args.output {
        app.save(&output, None)?;
        app.wait_idle(timeout)?;
        check_errors(&signals)?;
    }
    Ok(())
}

fn check_errors(signals: &mpsc::Receiver<Signal>) -> anyhow::Result<()> {
    for signal in signals.try_iter() {
        if let Signal::Status(status) = signal {
            if status.level == StatusLevel::Error {
                bail!("{}", status.message);
            }
            tracing::info!("{}", status.message);
        }
    }
    Ok(())
}
