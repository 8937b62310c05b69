//! Replays a recorded key trace through the predictive tap-hold engine and
//! prints the resulting HID actions, one per line.

mod host;
mod replay;
mod trace;

use anyhow::{Context, Result};
use clap::Parser;
use pth_core::Settings;
use std::path::PathBuf;
use tracing::Level;

#[derive(Parser)]
#[command(name = "pth-replay")]
#[command(about = "Replay a key trace through the predictive tap-hold engine")]
struct Args {
    /// Trace file (JSON with layout, keymap and events)
    trace: PathBuf,

    /// Engine settings (JSON); defaults apply to missing fields
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Log engine decisions to stderr
    #[arg(short, long)]
    debug: bool,
}

fn load_settings(path: Option<&PathBuf>) -> Result<Settings> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = load_settings(args.settings.as_ref())?;
    settings.debug |= args.debug;
    settings.validate()?;

    tracing_subscriber::fmt()
        .with_max_level(if settings.debug { Level::DEBUG } else { Level::WARN })
        .with_writer(std::io::stderr)
        .init();

    let trace = trace::Trace::load(&args.trace)?;
    let actions = replay::run(&trace, settings)?;
    for action in &actions {
        println!("{:>6} {}", action.t, action.text);
    }
    Ok(())
}
