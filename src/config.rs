//! Process-wide runtime settings.
//!
//! The worker count and pinning of the system pool come from, in order of precedence,
//! an explicit [`init`], the `LCGRAPH_THREADS` / `LCGRAPH_PIN_THREADS` environment
//! variables read on first pool use, and finally the machine's available parallelism.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::concurrency::pool;

/// Environment variable holding the worker count.
pub const THREADS_ENV: &str = "LCGRAPH_THREADS";
/// Environment variable enabling worker pinning (`1`/`true`/`yes`/`on`).
pub const PIN_THREADS_ENV: &str = "LCGRAPH_PIN_THREADS";

/// Settings for the process-wide thread pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Worker count; `None` uses the available parallelism.
    pub threads: Option<usize>,
    /// Pin worker `i` to CPU `i % cpus`.
    pub pin_threads: bool,
}

impl RuntimeConfig {
    /// Reads the environment, falling back to defaults for unset or malformed values.
    pub fn from_env() -> Self {
        Self::try_from_env().unwrap_or_else(|err| {
            tracing::warn!(error = %format!("{err:#}"), "ignoring malformed runtime environment");
            Self::default()
        })
    }

    /// Reads the environment, failing on malformed values.
    pub fn try_from_env() -> Result<Self> {
        let threads = match std::env::var(THREADS_ENV) {
            Ok(raw) => Some(
                raw.trim()
                    .parse::<usize>()
                    .with_context(|| format!("{THREADS_ENV}={raw:?} is not a thread count"))?,
            ),
            Err(_) => None,
        };
        let pin_threads = match std::env::var(PIN_THREADS_ENV) {
            Ok(raw) => parse_flag(&raw)
                .with_context(|| format!("{PIN_THREADS_ENV}={raw:?} is not a boolean"))?,
            Err(_) => false,
        };
        Ok(Self {
            threads,
            pin_threads,
        })
    }

    /// Parses a JSON document such as `{"threads": 8, "pin_threads": true}`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("invalid runtime config")
    }

    /// Reads and parses a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("in {}", path.display()))
    }

    /// The worker count this config asks for, at least one.
    pub fn resolved_threads(&self) -> usize {
        self.threads
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, usize::from))
            .max(1)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Creates the system pool from `config`.
///
/// The first initialisation wins, whether explicit or implicit through first pool use;
/// later calls change nothing and return `false`.
pub fn init(config: &RuntimeConfig) -> bool {
    let created = pool::init_system_pool(config);
    if created {
        tracing::info!(
            threads = config.resolved_threads(),
            pin_threads = config.pin_threads,
            "runtime initialised"
        );
    } else {
        tracing::info!(?config, "runtime already initialised; config ignored");
    }
    created
}
