//! Result formatting
// (c) 2024 Ross Younger

use std::{fmt::Display, time::Duration};

use human_repr::{HumanCount as _, HumanDuration as _, HumanThroughput as _};
use tracing::info;

use crate::controller::Measurement;

const MEBIBYTE: f64 = 1024. * 1024.;
const NANOS_PER_SEC: f64 = 1e9;

/// A transfer rate in megabits per second, for human consumption.
///
/// Sizes are in binary megabytes (MiB), so one "megabit" here is 2<sup>20</sup> bits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BitRate {
    /// If None, we were unable to compute a rate
    mbits: Option<f64>,
}

impl BitRate {
    /// Computes `8 * (bytes / 1024²) / (nanos / 1e9)`
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(bytes: u64, nanos: u64) -> Self {
        if nanos == 0 {
            // divide by zero is not meaningful
            return Self { mbits: None };
        }
        let mebibytes = bytes as f64 / MEBIBYTE;
        let secs = nanos as f64 / NANOS_PER_SEC;
        Self {
            mbits: Some(8. * mebibytes / secs),
        }
    }

    /// The rate in megabits per second, if known
    #[must_use]
    pub fn mbits(&self) -> Option<f64> {
        self.mbits
    }
}

impl Display for BitRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.mbits {
            None => f.write_str("unknown"),
            Some(r) => write!(f, "{r:.2}"),
        }
    }
}

/// The lines we print at the end of a run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Report {
    /// Mean round trip time, in milliseconds
    pub ping_ms: Option<f64>,
    /// Upload rate of the final iteration
    pub upload: BitRate,
    /// Download rate of the final iteration
    pub download: BitRate,
}

impl Report {
    /// Builds a report from the final iteration of a measurement
    #[must_use]
    pub fn new(measurement: &Measurement, ping_ms: Option<f64>) -> Self {
        let last = &measurement.last;
        Self {
            ping_ms,
            upload: BitRate::new(last.size_bytes, last.upload_nanos),
            download: BitRate::new(last.size_bytes, last.download_nanos),
        }
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ping) = self.ping_ms {
            writeln!(f, "Ping: {ping} ms")?;
        }
        writeln!(f, "Upload Speed: {} Mbit/s", self.upload)?;
        write!(f, "Download Speed: {} Mbit/s", self.download)
    }
}

/// Logs the extra detail requested by `--statistics`
#[allow(clippy::cast_precision_loss)]
pub fn output_statistics(measurement: &Measurement) {
    let last = &measurement.last;
    info!(
        "{} iterations; final payload {}",
        measurement.iterations,
        last.size_bytes.human_count_bytes()
    );
    info!(
        "Final upload took {}, download {}",
        Duration::from_nanos(last.upload_nanos).human_duration(),
        Duration::from_nanos(last.download_nanos).human_duration()
    );
    if last.upload_nanos != 0 {
        info!(
            "Final upload rate {}",
            (last.size_bytes as f64 * NANOS_PER_SEC / last.upload_nanos as f64)
                .human_throughput_bytes()
        );
    }
    info!(
        "Total data moved: {}",
        measurement.total_bytes.human_count_bytes()
    );
}

#[cfg(test)]
mod test {
    use super::{BitRate, Report};
    use crate::controller::{IterationResult, Measurement};

    const MIB: u64 = 1024 * 1024;
    const SEC: u64 = 1_000_000_000;

    #[test]
    fn rates() {
        let r = BitRate::new(MIB, SEC);
        assert!((r.mbits().unwrap() - 8.0).abs() < 1e-9);
        assert_eq!(r.to_string(), "8.00");
        assert_eq!(BitRate::new(10 * MIB, 4 * SEC).to_string(), "20.00");
        assert_eq!(BitRate::new(3 * MIB, 7 * SEC).to_string(), "3.43");
    }

    #[test]
    fn zero_time_is_unknown() {
        let r = BitRate::new(MIB, 0);
        assert_eq!(r.mbits(), None);
        assert_eq!(r.to_string(), "unknown");
    }

    #[test]
    fn monotonic() {
        let mut prev = 0.;
        for size in [MIB, 2 * MIB, 16 * MIB, 1024 * MIB] {
            let r = BitRate::new(size, SEC).mbits().unwrap();
            assert!(r > prev);
            prev = r;
        }
        let fast = BitRate::new(8 * MIB, SEC).mbits().unwrap();
        let slow = BitRate::new(8 * MIB, 2 * SEC).mbits().unwrap();
        assert!((fast / slow - 2.0).abs() < 1e-9);
    }

    fn measurement(up: u64, down: u64) -> Measurement {
        Measurement {
            last: IterationResult {
                upload_nanos: up,
                download_nanos: down,
                size_bytes: 4 * MIB,
            },
            iterations: 2,
            total_bytes: 12 * MIB,
            remaining_nanos: 0,
        }
    }

    #[test]
    fn report_lines() {
        let r = Report::new(&measurement(SEC, 2 * SEC), None);
        assert_eq!(
            r.to_string(),
            "Upload Speed: 32.00 Mbit/s\nDownload Speed: 16.00 Mbit/s"
        );
        let r = Report::new(&measurement(SEC, 0), Some(0.045));
        assert_eq!(
            r.to_string(),
            "Ping: 0.045 ms\nUpload Speed: 32.00 Mbit/s\nDownload Speed: unknown Mbit/s"
        );
    }
}
