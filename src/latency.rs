//! Round-trip latency measurement using the system `ping`
// (c) 2024 Ross Younger

use std::{path::PathBuf, process::Stdio};

use tokio::process::Command;
use tracing::{debug, Level};

use crate::{
    config::Configuration,
    error::{Error, Result},
    os::{AbstractPlatform as _, PingWait, Platform},
    util::{
        process::{find_exe, tee},
        Verbosity,
    },
};

/// Interval between echo requests, as understood by `ping -i`
const INTERVAL: &str = "0.1";

/// Runs the platform `ping` utility against a host and reports the mean round trip time.
#[derive(Debug, Clone)]
pub struct LatencyProbe {
    program: PathBuf,
    count: u8,
    wait_secs: u16,
    wait_style: PingWait,
    verbosity: Verbosity,
}

impl LatencyProbe {
    /// Locates the ping program named by the configuration.
    pub fn new(config: &Configuration, verbosity: Verbosity) -> Result<Self> {
        Ok(Self {
            program: find_exe(&config.ping_program)?,
            count: config.ping_count,
            wait_secs: config.ping_wait,
            wait_style: Platform::ping_wait(),
            verbosity,
        })
    }

    /// Overrides the platform's spelling of the wait option
    #[must_use]
    pub fn with_wait_style(mut self, style: PingWait) -> Self {
        self.wait_style = style;
        self
    }

    fn command(&self, host: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        let _ = cmd
            .arg(format!("-i{INTERVAL}"))
            .arg(format!("-c{}", self.count))
            .arg(self.wait_style.arg(self.wait_secs));
        if self.verbosity < Verbosity::Verbose {
            let _ = cmd.arg("-q");
        }
        let _ = cmd.arg(host).stdin(Stdio::null());
        cmd
    }

    /// Pings `host` and returns the mean round trip time in milliseconds.
    pub async fn measure(&self, host: &str) -> Result<f64> {
        let level = if self.verbosity >= Verbosity::Verbose {
            Level::INFO
        } else {
            Level::DEBUG
        };
        let (status, output) = tee(&mut self.command(host), level)
            .await
            .map_err(|e| Error::Probe(format!("could not run {}: {e}", self.program.display())))?;
        if !status.success() {
            return Err(Error::Probe(format!("{host} did not respond ({status})")));
        }
        let rtt = parse_mean_rtt(&output)?;
        debug!("mean round trip to {host}: {rtt} ms");
        Ok(rtt)
    }
}

/// Extracts the mean from ping's closing summary, e.g.
/// `rtt min/avg/max/mdev = 0.030/0.045/0.062/0.010 ms`.
///
/// This is the third-from-last `/`-separated field of the whole output.
pub fn parse_mean_rtt(output: &str) -> Result<f64> {
    let fields: Vec<_> = output.trim().split('/').collect();
    let Some(avg) = fields.len().checked_sub(3).map(|i| fields[i]) else {
        return Err(Error::Probe("no round trip summary in ping output".into()));
    };
    avg.trim()
        .parse()
        .map_err(|e| Error::Probe(format!("unexpected ping output `{avg}`: {e}")))
}
