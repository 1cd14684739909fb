//! Depth-capture binary: tiled live view of a depth camera.

use std::fs::File;
use std::process::ExitCode;
use std::sync::Mutex;

use clap::Parser;
use depth_capture::highgui::HighGuiDisplay;
use depth_capture::{V4l2Hub, ViewerConfig};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> ExitCode {
    let config = ViewerConfig::parse();

    if let Err(err) = init_logging(&config) {
        eprintln!("Error: {err}");
        return ExitCode::FAILURE;
    }

    let mut hub = V4l2Hub::new(&config);
    let mut display = HighGuiDisplay;
    depth_capture::run(&mut hub, &mut display, &config);

    ExitCode::SUCCESS
}

/// Log to stderr filtered by `RUST_LOG` (default `info`), plus everything at
/// debug level to `--log-file` when given.
fn init_logging(config: &ViewerConfig) -> std::io::Result<()> {
    let stderr = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        );

    let file = match &config.log_file {
        Some(path) => Some(
            fmt::layer()
                .with_writer(Mutex::new(File::create(path)?))
                .with_ansi(false)
                .with_filter(LevelFilter::DEBUG),
        ),
        None => None,
    };

    tracing_subscriber::registry().with(stderr).with(file).init();
    Ok(())
}
