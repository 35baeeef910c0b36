//! Log output for the daemon
//!
//! `RUST_LOG` wins when set; otherwise every edgenode crate logs at the
//! level given on the command line. Each process gets one correlation id.

use std::io;
use std::sync::OnceLock;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

const CRATES: &[&str] = &[
    "edgenode",
    "edgenode_core",
    "edgenode_store",
    "edgenode_origin",
    "edgenode_transform",
];

/// How log lines are rendered
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum TracingFormat {
    /// Multi-line, human readable
    Pretty,
    /// One line per event
    Compact,
    /// One JSON object per event
    Json,
}

/// Minimum severity logged
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

static CORRELATION_ID: OnceLock<Uuid> = OnceLock::new();

/// Correlation id of this process
pub fn correlation_id() -> Uuid {
    *CORRELATION_ID.get_or_init(Uuid::new_v4)
}

fn default_directives(level: LogLevel) -> String {
    CRATES
        .iter()
        .map(|name| format!("{name}={}", level.directive()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber
pub fn init_tracing(format: TracingFormat, level: LogLevel) -> miette::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(level)))
        .map_err(|e| miette::miette!("Invalid log filter: {e}"))?;
    let registry = tracing_subscriber::registry().with(filter);
    let fmt = tracing_subscriber::fmt::layer().with_writer(io::stderr);

    match format {
        TracingFormat::Pretty => registry.with(fmt.pretty().with_thread_names(true)).init(),
        TracingFormat::Compact => registry.with(fmt.compact().with_target(false)).init(),
        TracingFormat::Json => registry
            .with(fmt.json().with_current_span(true).with_span_list(true))
            .init(),
    }

    tracing::info!(
        correlation_id = %correlation_id(),
        version = env!("CARGO_PKG_VERSION"),
        ?format,
        "Logging initialized"
    );
    Ok(())
}
