//! Diagnostics setup for the envmon binaries.
//!
//! Each binary installs one global subscriber right after loading its
//! configuration; the libraries only emit events. `RUST_LOG` overrides the
//! filter. Without it envmon logs at `info` and the HTTP stack at `warn`,
//! which keeps per-request noise out of the device journal.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;

const DEFAULT_DIRECTIVES: &str = "info,hyper=warn,h2=warn,tower=warn";

/// Human-readable output on stderr.
///
/// ```no_run
/// envmon_core::logging::init();
/// tracing::info!(pid = 4242, "Mission launched");
/// ```
pub fn init() {
    init_with_format(LogFormat::Text);
}

/// One JSON object per event, with event fields flattened to the top
/// level so `mission_id` and `pid` are directly queryable.
pub fn init_json() {
    init_with_format(LogFormat::Json);
}

/// Install the subscriber selected by `log_format`. Later calls are
/// ignored.
pub fn init_with_format(format: LogFormat) {
    if let Err(e) = try_init(format) {
        tracing::debug!(error = %e, "Logging already initialised");
    }
}

/// Like [`init_with_format`], but reports an already-installed subscriber.
pub fn try_init(format: LogFormat) -> Result<(), TryInitError> {
    let events = fmt::layer().with_writer(std::io::stderr).with_target(true);
    let subscriber = tracing_subscriber::registry().with(filter());

    match format {
        LogFormat::Text => subscriber.with(events.with_thread_ids(true)).try_init(),
        LogFormat::Json => subscriber
            .with(events.json().flatten_event(true).with_current_span(false))
            .try_init(),
    }
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}
