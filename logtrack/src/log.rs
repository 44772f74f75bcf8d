use logtrack_core::Tracker;
use std::io::{self, IsTerminal};
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, prelude::*};

use crate::layer::TrackingLayer;

#[derive(Default, Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Level {
    Silent,
    Error,
    #[default]
    Warn,
    Info,
    Debug,
}

impl From<Level> for LevelFilter {
    fn from(level: Level) -> LevelFilter {
        match level {
            Level::Silent => LevelFilter::OFF,
            Level::Error => LevelFilter::ERROR,
            Level::Warn => LevelFilter::WARN,
            Level::Info => LevelFilter::INFO,
            Level::Debug => LevelFilter::DEBUG,
        }
    }
}

/// Install the global subscriber: diagnostics to stderr, filtered by
/// `RUST_LOG` or `level`, and optionally every event fed to `tracker`.
///
/// The tracker sees events regardless of the stderr filter.
pub fn init_tracing(level: Level, tracker: Option<Arc<Tracker>>) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from(level).into())
        .from_env_lossy();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_target(true)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(tracker.map(TrackingLayer::new))
        .init();
}
