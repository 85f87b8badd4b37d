//! Tracing helpers
// (c) 2024 Ross Younger

use std::{
    fs::File,
    io::Write,
    sync::{Arc, Mutex},
};

use anyhow::Context;
use indicatif::MultiProgress;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

const STANDARD_ENV_VAR: &str = "RUST_LOG";
const LOG_FILE_DETAIL_ENV_VAR: &str = "RUST_LOG_FILE_DETAIL";

/// How chatty we should be.
///
/// This is passed explicitly to the components that care (external tool flags, ping, progress display).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// Errors only; no progress display
    Quiet,
    /// The usual
    #[default]
    Normal,
    /// Extra detail
    Verbose,
    /// Everything
    Debug,
}

impl Verbosity {
    /// Selects a verbosity from command-line style flags. The most verbose wins.
    #[must_use]
    pub fn from_flags(quiet: bool, verbose: bool, debug: bool) -> Self {
        if debug {
            Self::Debug
        } else if verbose {
            Self::Verbose
        } else if quiet {
            Self::Quiet
        } else {
            Self::Normal
        }
    }

    /// The level at which we log our own events
    #[must_use]
    pub fn trace_level(self) -> &'static str {
        match self {
            Self::Quiet => "error",
            Self::Normal => "info",
            Self::Verbose => "debug",
            Self::Debug => "trace",
        }
    }

    /// Convenience accessor
    #[must_use]
    pub fn is_quiet(self) -> bool {
        self == Self::Quiet
    }
}

/// Result type for `filter_for()`
struct FilterResult {
    filter: EnvFilter,
    used_env: bool, // Did we use the environment variable we were requested to?
}

/// Log filter setup:
/// Use a given environment variable; if it wasn't present, log only our own items at a given trace level.
fn filter_for(trace_level: &str, key: &str) -> anyhow::Result<FilterResult> {
    EnvFilter::try_from_env(key)
        .map(|filter| FilterResult {
            filter,
            used_env: true,
        })
        .or_else(|e| {
            // The env var was unset or invalid. Which is it?
            if std::env::var(key).is_ok() {
                anyhow::bail!("{key} (set in environment) was invalid: {e}");
            }
            // It was unset. Fall back.
            Ok(FilterResult {
                filter: EnvFilter::new(format!("speedtest_ssh={trace_level}")),
                used_env: false,
            })
        })
}

/// Set up rust tracing, to console (via an optional `MultiProgress`) and optionally to file.
///
/// By default we log only our events (`speedtest_ssh`), at a level given by the `Verbosity`.
/// This can be overridden by setting `RUST_LOG`.
///
/// **CAUTION:** If this function fails, tracing won't be set up; callers must take extra care to report the error.
pub fn setup(
    verbosity: Verbosity,
    display: Option<&MultiProgress>,
    filename: Option<&str>,
) -> anyhow::Result<()> {
    let trace_level = verbosity.trace_level();
    let mut layers = Vec::new();

    /////// Console output, via the MultiProgress if there is one

    let filter = filter_for(trace_level, STANDARD_ENV_VAR)?;
    // If we used the environment variable, show log targets; otherwise we're only logging ourselves, so do not.
    let format = fmt::layer().compact().with_target(filter.used_env);

    match display {
        None => {
            let format = format
                .with_writer(std::io::stderr)
                .with_filter(filter.filter)
                .boxed();
            layers.push(format);
        }
        Some(mp) => {
            let format = format
                .with_writer(ProgressWriter::wrap(mp))
                .with_filter(filter.filter)
                .boxed();
            layers.push(format);
        }
    };

    //////// File output

    if let Some(filename) = filename {
        let out_file = Arc::new(File::create(filename).context("Failed to open log file")?);
        let filter = if std::env::var(LOG_FILE_DETAIL_ENV_VAR).is_ok() {
            FilterResult {
                filter: EnvFilter::try_from_env(LOG_FILE_DETAIL_ENV_VAR)?,
                used_env: true,
            }
        } else {
            filter_for(trace_level, STANDARD_ENV_VAR)?
        };
        let layer = fmt::layer()
            .with_writer(out_file)
            .with_target(filter.used_env)
            .compact()
            .with_ansi(false)
            .with_filter(filter.filter)
            .boxed();
        layers.push(layer);
    }

    ////////

    tracing_subscriber::registry().with(layers).init();

    Ok(())
}

/// A wrapper type so tracing can output in a way that doesn't mess up `MultiProgress`
struct ProgressWriter {
    display: MultiProgress,
}

impl ProgressWriter {
    fn wrap(display: &MultiProgress) -> Mutex<Self> {
        Mutex::new(Self {
            display: display.clone(),
        })
    }
}

impl Write for ProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let msg = std::str::from_utf8(buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let msg = msg.trim_end_matches('\n');
        if self.display.is_hidden() {
            eprintln!("{msg}");
        } else {
            self.display.println(msg)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
