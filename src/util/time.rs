//! Time utilities
// (c) 2024 Ross Younger

use std::{cmp::max, future::Future, time::Duration};

use human_repr::HumanDuration;
use tokio::time::Instant;

/// Runs a future to completion, returning its output and how long it took in nanoseconds.
///
/// The clock is tokio's monotonic clock, so paused test runtimes measure virtual time.
pub async fn timed<F, T>(fut: F) -> (T, u64)
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    let output = fut.await;
    (output, as_nanos(start.elapsed()))
}

/// Converts a Duration into whole nanoseconds, saturating.
#[must_use]
pub fn as_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

#[derive(Debug, Default, Clone)]
/// A simple named stopwatch.
/// This stopwatch does not currently support resuming or splits.
pub struct Stopwatch {
    /// Display name
    pub name: String,
    start_: Option<Instant>,
    stop_: Option<Instant>,
}

impl Stopwatch {
    /// Creates a running stopwatch.
    /// If you wanted to create a stopped stopwatch, use `::default()`
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            start_: Some(Instant::now()),
            stop_: None,
        }
    }

    /// Stops this stopwatch
    /// Panics: It is a logic error to call stop more than once.
    pub fn stop(&mut self) -> Option<Duration> {
        assert!(self.stop_.is_none(), "Stopwatch already stopped");
        self.stop_ = Some(Instant::now());
        self.elapsed()
    }

    /// Time between start and stop, if both happened
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        match (self.start_, self.stop_) {
            (Some(start), Some(stop)) => Some(stop - start),
            _ => None,
        }
    }

    /// Stops this stopwatch, starts a new one where it left off
    pub fn chain(&mut self, new_name: &str) -> Self {
        let _ = self.stop();
        Self {
            name: new_name.to_string(),
            start_: self.stop_,
            stop_: None,
        }
    }

    /// Formatter for --profile mode
    fn fmt_ln(&self, f: &mut std::fmt::Formatter<'_>, width: usize) -> std::fmt::Result {
        if let Some(t) = self.elapsed() {
            writeln!(f, "  {:width$}: {}", self.name, t.human_duration())
        } else {
            writeln!(f, "  {:width$}: None", self.name)
        }
    }
}

/// A chain of stopwatches, intended for instrumenting program elapsed time.
#[derive(Debug, Default, Clone)]
pub struct StopwatchChain {
    watches: Vec<Stopwatch>,
}

impl StopwatchChain {
    /// Creates a chain with its first stopwatch already running
    #[must_use]
    pub fn new_running(name: &str) -> Self {
        Self {
            watches: vec![Stopwatch::new(name)],
        }
    }

    /// Stops the current stopwatch (if there is one), adds a new stopwatch to the chain and starts it.
    pub fn next(&mut self, name: &str) {
        let new1 = match self.watches.last_mut() {
            None => Stopwatch::new(name),
            Some(latest) => latest.chain(name),
        };
        self.watches.push(new1);
    }
    /// Stops the chain. This is final, you cannot restart or call next().
    pub fn stop(&mut self) {
        let _ = self.watches.last_mut().map(Stopwatch::stop);
    }

    /// Extracts a single stopwatch by name, if it was present
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Stopwatch> {
        self.watches.iter().find(|&sw| sw.name == name)
    }
}

/// Simple display formatting
impl std::fmt::Display for StopwatchChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut largest = 0usize;
        for sw in &self.watches {
            largest = max(largest, sw.name.len());
        }

        for sw in &self.watches {
            sw.fmt_ln(f, largest)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{timed, Stopwatch, StopwatchChain};

    #[test]
    fn new_stopwatch_is_running() {
        let mut a = Stopwatch::new("");
        assert!(a.stop().is_some());
    }
    #[test]
    fn default_stopwatch_is_not_running() {
        let mut a = Stopwatch::default();
        assert!(a.stop().is_none());
    }
    #[test]
    #[should_panic(expected = "already stopped")]
    fn cannot_stop_twice() {
        let mut a = Stopwatch::new("a");
        let _ = a.stop();
        let _ = a.stop();
    }

    #[test]
    fn finished_chain() {
        let mut c = StopwatchChain::new_running("a");
        c.next("b");
        c.next("c");
        c.stop();
        assert!(c.find("b").and_then(Stopwatch::elapsed).is_some());
        assert!(c.find("nope").is_none());
        let s = c.to_string();
        assert_eq!(s.lines().count(), 3);
    }
    #[test]
    #[should_panic(expected = "already stopped")]
    fn cannot_restart_stopped_chain() {
        let mut c = StopwatchChain::default();
        c.next("a");
        c.stop();
        c.next("b");
    }

    #[tokio::test(start_paused = true)]
    async fn timed_measures_virtual_time() {
        let ((), nanos) = timed(tokio::time::sleep(Duration::from_millis(400))).await;
        assert!(nanos >= 400_000_000);
        assert!(nanos <= 402_000_000);
    }
}
