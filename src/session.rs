//! One complete measurement run
// (c) 2024 Ross Younger

use std::io::ErrorKind;

use indicatif::MultiProgress;
use tracing::{debug, info, warn};

use crate::{
    config::Configuration,
    controller::{measure, Measurement},
    error::{Error, Result},
    latency::LatencyProbe,
    payload::PayloadGenerator,
    report::Report,
    transfer::{Strategy, Transfer as _},
    util::{time::StopwatchChain, Verbosity},
    ConnectionParameters,
};

/// What a run produced
#[derive(Debug, Clone)]
pub struct Outcome {
    /// The figures to print
    pub report: Report,
    /// The raw measurement behind the report
    pub measurement: Measurement,
    /// Per-phase timings
    pub timing: StopwatchChain,
}

/// Ties the pieces together for a single run against one remote host.
///
/// Resources are acquired in the order scratch file, transfer strategy, and released in reverse,
/// whether or not the measurement succeeded.
#[derive(Debug)]
pub struct Session<'a> {
    params: &'a ConnectionParameters,
    config: &'a Configuration,
    verbosity: Verbosity,
    display: MultiProgress,
    payload: PayloadGenerator,
}

impl<'a> Session<'a> {
    /// Constructor
    #[must_use]
    pub fn new(
        params: &'a ConnectionParameters,
        config: &'a Configuration,
        verbosity: Verbosity,
        display: &MultiProgress,
    ) -> Self {
        Self {
            params,
            config,
            verbosity,
            display: display.clone(),
            payload: PayloadGenerator::default(),
        }
    }

    /// Uses a different payload source
    #[must_use]
    pub fn with_payload(mut self, payload: PayloadGenerator) -> Self {
        self.payload = payload;
        self
    }

    /// Runs the measurement.
    pub async fn run(&self) -> Result<Outcome> {
        if self.config.duration == 0 {
            return Err(Error::config("the test duration must be at least one second"));
        }
        let mut timing = StopwatchChain::new_running("setup");

        let probe = if self.config.ping {
            Some(LatencyProbe::new(self.config, self.verbosity)?)
        } else {
            None
        };
        let scratch = tempfile::Builder::new()
            .prefix("speedtest-ssh.")
            .tempfile()?
            .into_temp_path();
        debug!("local scratch file is {}", scratch.display());

        let mut strategy =
            Strategy::open(self.params, self.config, self.verbosity, &self.display).await?;
        info!(
            "Testing {} via {} ({}s)",
            self.params.user_host(),
            self.config.mode,
            self.config.duration
        );

        let result = async {
            let ping = match &probe {
                Some(p) => {
                    timing.next("ping");
                    Some(p.measure(self.params.host()).await?)
                }
                None => None,
            };
            timing.next("measurement");
            let measurement =
                measure(&mut strategy, &self.payload, &scratch, self.config.budget()).await?;
            Ok::<_, Error>((ping, measurement))
        }
        .await;

        timing.next("teardown");
        debug!("removing {}", strategy.remote());
        strategy.close().await;
        if let Err(e) = scratch.close() {
            if e.kind() != ErrorKind::NotFound {
                warn!("failed to remove local scratch file: {e}");
            }
        }
        timing.stop();

        let (ping, measurement) = result?;
        Ok(Outcome {
            report: Report::new(&measurement, ping),
            measurement,
            timing,
        })
    }
}
