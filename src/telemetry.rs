//! Telemetry initialization.
//!
//! Structured logging via `tracing`, configured from the environment:
//!
//! - `RUST_LOG` filters as usual (default `warn`, the CLI's `-v`/`-vv`
//!   raise it to `info`/`debug`).
//! - `BYTEPATCH_LOG_FORMAT=json` switches stderr output to JSON events.
//!
//! Engine diagnostics do not flow through here — they go through the
//! explicit [`DiagnosticsSink`](crate::diag::DiagnosticsSink) value so a
//! dry run and a real run produce identical diagnostics. The pipeline
//! mirrors summaries to `tracing` for operators.

use tracing_subscriber::EnvFilter;

/// Initialize the global subscriber.
///
/// `verbosity` is the count of `-v` flags: 0 = warnings, 1 = info,
/// 2+ = debug. `RUST_LOG`, when set, wins outright.
pub fn init(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let json = std::env::var("BYTEPATCH_LOG_FORMAT").is_ok_and(|v| v == "json");
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
