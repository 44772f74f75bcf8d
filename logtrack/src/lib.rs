//! `tracing` integration for logtrack.
//!
//! Install a [`TrackingLayer`] to turn annotated log lines into activities
//! and events:
//!
//! ```rust,ignore
//! use tracing_subscriber::prelude::*;
//!
//! let tracker = Arc::new(Tracker::new(TrackerConfig::default(), Arc::new(sink)));
//! tracker.start()?;
//! tracing_subscriber::registry()
//!     .with(logtrack::TrackingLayer::new(tracker.clone()))
//!     .init();
//!
//! tracing::info!("#beg=Checkout");
//! tracing::info!("#opn=save #rsn=order.json");
//! tracing::info!("#end=Checkout");
//! ```

pub mod demo;
mod layer;
pub mod log;
pub mod replay;

pub use layer::TrackingLayer;
pub use logtrack_activity as activity;
pub use logtrack_core as engine;
