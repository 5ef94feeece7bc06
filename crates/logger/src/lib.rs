//! Tracing setup shared by the mesh binaries.
//!
//! `RUST_LOG` overrides the default level; `MESH_LOG_FORMAT=json` switches
//! from the compact human format to one JSON object per line.

use std::env::var;

use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{
    Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError,
};

/// Environment variable selecting the output format
pub const LOG_FORMAT_ENV: &str = "MESH_LOG_FORMAT";

pub fn init() {
    let _ = try_init(LevelFilter::INFO);
}

/// Install the global subscriber with `level` as the default directive.
///
/// Fails if a global subscriber is already set.
pub fn try_init(level: LevelFilter) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let log_layer = match log_format().as_str() {
        "json" => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(env_filter)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .without_time()
            .with_writer(std::io::stderr)
            .with_filter(env_filter)
            .boxed(),
    };

    tracing_subscriber::registry().with(log_layer).try_init()
}

/// Map `-v` style verbosity counts to a level: 0 is `warn`, 1 `info`, 2 `debug`, more `trace`.
pub fn level_from_verbosity(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

fn log_format() -> String {
    var(LOG_FORMAT_ENV)
        .inspect_err(|error| {
            if !matches!(error, std::env::VarError::NotPresent) {
                warn!("Failed to read {LOG_FORMAT_ENV}, falling back to default: {error}")
            }
        })
        .unwrap_or_default()
}
