//! The adaptive measurement loop
// (c) 2024 Ross Younger

use std::{path::Path, time::Duration};

use human_repr::{HumanCount as _, HumanDuration as _};
use tracing::{debug, trace};

use crate::{
    error::{Error, Result},
    payload::PayloadGenerator,
    transfer::Transfer,
    util::time::{as_nanos, timed},
};

/// Payload size of the first iteration
pub const BASE_SIZE: u64 = 2 * 1024 * 1024;

/// We stop once the last iteration, scaled by this, would not fit in the remaining budget
const OVERSHOOT_GUARD: f64 = 1.5;

/// Timings of one upload/download round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationResult {
    /// Time taken by the upload
    pub upload_nanos: u64,
    /// Time taken by the download
    pub download_nanos: u64,
    /// Payload size, in bytes
    pub size_bytes: u64,
}

impl IterationResult {
    /// Combined time of the round trip
    #[must_use]
    pub fn total_nanos(&self) -> u64 {
        self.upload_nanos.saturating_add(self.download_nanos)
    }
}

/// The outcome of a measurement run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    /// The final (largest) iteration, which is the one reported
    pub last: IterationResult,
    /// Number of iterations run
    pub iterations: u32,
    /// Bytes moved in either direction across all iterations
    pub total_bytes: u64,
    /// Budget left over at the end; negative if we overran
    pub remaining_nanos: i64,
}

/// Loop bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LoopState {
    remaining: i64,
    size: u64,
    last: u64,
}

impl LoopState {
    fn new(budget: Duration) -> Self {
        Self {
            remaining: i64::try_from(as_nanos(budget)).unwrap_or(i64::MAX),
            size: BASE_SIZE,
            last: 0,
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn finished(&self) -> bool {
        (OVERSHOOT_GUARD * self.last as f64) as i64 >= self.remaining.saturating_sub(1)
    }

    /// Scales up the payload by the largest power of two that the remaining time suggests, and at least doubles it.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    fn grow(&mut self) {
        if self.last == 0 {
            return;
        }
        let ratio = self.remaining as f64 / self.last as f64;
        let factor = (ratio.log2().floor() as u32).max(1);
        self.size = self.size.saturating_mul(2u64.saturating_pow(factor));
    }

    fn record(&mut self, nanos: u64) {
        self.last = nanos;
        self.remaining = self
            .remaining
            .saturating_sub(i64::try_from(nanos).unwrap_or(i64::MAX));
    }
}

/// Runs one round trip at the given size: fill the payload, clear the remote, time the upload,
/// discard the local copy, time the download.
pub async fn run_iteration<T: Transfer>(
    transfer: &mut T,
    payload: &PayloadGenerator,
    scratch: &Path,
    size: u64,
) -> Result<IterationResult> {
    payload.fill(scratch, size).await?;
    transfer.clean_remote().await?;
    let (result, upload_nanos) = timed(transfer.put(scratch)).await;
    result?;
    tokio::fs::remove_file(scratch).await?;
    let (result, download_nanos) = timed(transfer.get(scratch)).await;
    result?;
    Ok(IterationResult {
        upload_nanos,
        download_nanos,
        size_bytes: size,
    })
}

/// Repeats round trips of increasing size until the time budget is used up.
///
/// The first iteration always runs, at [`BASE_SIZE`]. A failed iteration ends the run; it is not retried.
pub async fn measure<T: Transfer>(
    transfer: &mut T,
    payload: &PayloadGenerator,
    scratch: &Path,
    budget: Duration,
) -> Result<Measurement> {
    if budget.is_zero() {
        return Err(Error::config("the test duration must be at least one second"));
    }
    let mut state = LoopState::new(budget);
    let mut iterations = 0u32;
    let mut total_bytes = 0u64;
    let mut last = None;

    while !state.finished() {
        state.grow();
        trace!(
            "iteration {} at {}; {} remaining",
            iterations + 1,
            state.size.human_count_bytes(),
            Duration::from_nanos(state.remaining.try_into().unwrap_or_default()).human_duration()
        );
        let result = run_iteration(transfer, payload, scratch, state.size).await?;
        debug!(
            "{} round trip: up {}, down {}",
            result.size_bytes.human_count_bytes(),
            Duration::from_nanos(result.upload_nanos).human_duration(),
            Duration::from_nanos(result.download_nanos).human_duration(),
        );
        state.record(result.total_nanos());
        iterations += 1;
        total_bytes = total_bytes.saturating_add(result.size_bytes.saturating_mul(2));
        last = Some(result);
    }

    // The first iteration always runs, so this only fails for a degenerate budget
    let last = last.ok_or_else(|| Error::config("time budget too small for a single iteration"))?;
    Ok(Measurement {
        last,
        iterations,
        total_bytes,
        remaining_nanos: state.remaining,
    })
}
