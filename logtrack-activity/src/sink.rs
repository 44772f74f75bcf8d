//! Sinks accept finished events and activities.
//!
//! The engine only opens, feeds and closes a sink; transport, buffering and
//! persistence are the sink's business.
//!
//! ```rust,ignore
//! let (sink, mut rx) = logtrack_activity::ChannelSink::new();
//! // hand `sink` to a tracker, then drain `rx`
//! while let Some(item) = rx.recv().await {
//!     // ...
//! }
//! ```

use miette::Diagnostic;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::events::Trackable;

#[derive(Debug, Error, Diagnostic)]
pub enum SinkError {
    #[error("failed to open sink {target}: {source}")]
    Open {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("sink is not open")]
    NotOpen,

    #[error("sink receiver has been dropped")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Destination for finished telemetry.
pub trait EventSink: Send + Sync {
    /// Acquire the underlying resource. Called once at tracker start-up.
    fn open(&self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Take ownership of a finished event or activity.
    fn accept(&self, item: Trackable) -> Result<(), SinkError>;

    /// Release the underlying resource.
    fn close(&self) {}
}

/// Sink that forwards every item to an unbounded channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Trackable>,
}

impl ChannelSink {
    /// Create the sink together with the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Trackable>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn accept(&self, item: Trackable) -> Result<(), SinkError> {
        self.tx.send(item).map_err(|_| SinkError::Closed)
    }
}

/// Sink that writes one JSON document per line.
pub struct JsonLinesSink {
    path: Option<PathBuf>,
    out: Mutex<Option<Box<dyn Write + Send>>>,
}

impl JsonLinesSink {
    /// Append to the file at `path`; the file is opened (and created) by [`EventSink::open`].
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            out: Mutex::new(None),
        }
    }

    /// Write to an already open writer (stdout, a buffer, ...).
    pub fn writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            path: None,
            out: Mutex::new(Some(Box::new(writer))),
        }
    }
}

impl EventSink for JsonLinesSink {
    fn open(&self) -> Result<(), SinkError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file: File = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| SinkError::Open {
                target: path.display().to_string(),
                source,
            })?;
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        *out = Some(Box::new(BufWriter::new(file)));
        Ok(())
    }

    fn accept(&self, item: Trackable) -> Result<(), SinkError> {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        let writer = out.as_mut().ok_or(SinkError::NotOpen)?;
        serde_json::to_writer(&mut *writer, &item)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    fn close(&self) {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(mut writer) = out.take()
            && let Err(e) = writer.flush()
        {
            tracing::warn!(target: "logtrack::sink", "failed to flush sink on close: {e}");
        }
    }
}
