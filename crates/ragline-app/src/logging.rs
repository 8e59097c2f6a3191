//! Tracing setup for the binary.
//!
//! Human-readable logs go to stderr under an `EnvFilter`. Retrieval audit
//! events are additionally appended to the query log file when one is
//! configured.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use ragline_vector::QUERY_LOG_TARGET;
use tracing::Subscriber;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Layer that appends query log events to `path`, creating the file if needed.
pub fn query_log_layer<S>(path: &Path) -> std::io::Result<impl Layer<S>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .with_filter(filter_fn(|meta| meta.target() == QUERY_LOG_TARGET)))
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `default_level`. An empty `query_log` disables the
/// query log.
pub fn init_tracing(default_level: &str, query_log: &str) -> std::io::Result<()> {
    // Logs go to stderr; stdout carries only the JSON result.
    let stderr = fmt::layer().with_writer(std::io::stderr).with_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
    );
    let query_log = if query_log.trim().is_empty() {
        None
    } else {
        Some(query_log_layer(Path::new(query_log))?)
    };

    tracing_subscriber::registry()
        .with(stderr)
        .with(query_log)
        .init();
    Ok(())
}
