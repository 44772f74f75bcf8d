use std::fmt;

/// Target of demo events. Targets under `logtrack` are not tracked.
pub const DEMO_TARGET: &str = "demo";

#[derive(Debug)]
struct DemoError;

impl fmt::Display for DemoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("test exception")
    }
}

impl std::error::Error for DemoError {}

/// Emit a short annotated session through `tracing`: an activity holding a
/// warning and an error, followed by standalone datagrams.
pub fn run() {
    let app = module_path!();
    let span = tracing::info_span!("demo", app);
    let _guard = span.enter();

    tracing::info!(target: DEMO_TARGET, "Starting an activity #beg=Test");
    tracing::warn!(target: DEMO_TARGET, "First log message #app={app} #msg='1 Test warning message'");
    tracing::error!(
        target: DEMO_TARGET,
        error = &DemoError as &(dyn std::error::Error + 'static),
        "Second log message #app={app} #msg='2 Test error message'"
    );
    tracing::info!(target: DEMO_TARGET, "Ending an activity #end= #app={app}");

    tracing::debug!(target: DEMO_TARGET, "First datagram message #app={app} #msg='Test datagram message'");
    tracing::trace!(target: DEMO_TARGET, "Second datagram message #app={app} #msg='Test datagram message'");
    tracing::trace!(target: DEMO_TARGET, "Whole datagram message #rcd={} #rsn={app}", 37128);
}
