//! Progress reporting for transfers
// (c) 2024 Ross Younger

use console::Term;
use indicatif::{MultiProgress, ProgressBar, ProgressFinish, ProgressStyle};
use tracing::warn;

/// Receives cumulative progress of a single transfer.
///
/// Implementations must not assume how often, or how many times, they will be called.
pub trait ProgressObserver {
    /// `done` is the number of bytes transferred so far;
    /// `remaining` is the number of bytes not yet transferred.
    fn update(&mut self, done: u64, remaining: u64);

    /// Reports progress of a transfer whose size is not known in advance.
    ///
    /// The default implementation ignores it.
    fn advance(&mut self, _done: u64) {}
}

/// The no-op observer
impl ProgressObserver for () {
    fn update(&mut self, _done: u64, _remaining: u64) {}
}

pub(crate) const MAX_UPDATE_FPS: u8 = 20;

const PROGRESS_STYLE_COMPACT: &str =
    "{msg:.dim} {wide_bar:.cyan} {eta} @ {decimal_bytes_per_sec} [{decimal_total_bytes:.dim}]";

// 11111111111111111111111111111111111111111111111111111111111111111111111111111111
// Upload   [==============================            ] 2m30s @ 123.4MB/s [1.24GB]
// 11111111111111111111111111111111111111111111111111111111111111111111111111111111

// We need about 30 characters for the data readout.
// A useful progress bar needs maybe 20 characters.
const DATA_AND_PROGRESS: usize = 50;

const PROGRESS_STYLE_OVERLONG: &str =
    "{wide_msg:.dim} [{decimal_total_bytes:.dim}]\n{wide_bar:.cyan} {eta} @ {decimal_bytes_per_sec}";

fn use_long_style(terminal: &Term, msg_size: usize) -> bool {
    let term_width = terminal.size().1 as usize; // this returns a reasonable default if it can't detect
    msg_size + DATA_AND_PROGRESS > term_width
}

fn progress_style_for(terminal: &Term, msg_size: usize) -> &'static str {
    if use_long_style(terminal, msg_size) {
        PROGRESS_STYLE_OVERLONG
    } else {
        PROGRESS_STYLE_COMPACT
    }
}

/// Drives an `indicatif` progress bar from transfer callbacks.
///
/// The bar length is fixed on the first update.
/// A bar which only ever receives [`ProgressObserver::advance`] has no length.
#[derive(Debug)]
pub struct ProgressBarObserver {
    bar: ProgressBar,
    total: Option<u64>,
}

impl ProgressBarObserver {
    /// Creates a bar within `display`, or a hidden one if `quiet`.
    #[must_use]
    pub fn new(display: &MultiProgress, label: &str, quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let style = ProgressStyle::with_template(progress_style_for(
                &Term::stderr(),
                label.len(),
            ))
            .unwrap_or_else(|e| {
                warn!("progress bar style: {e}");
                ProgressStyle::default_bar()
            });
            display.add(
                ProgressBar::no_length()
                    .with_style(style)
                    .with_message(label.to_string())
                    .with_finish(ProgressFinish::AndClear),
            )
        };
        Self { bar, total: None }
    }

    /// Current position of the underlying bar
    #[must_use]
    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Length of the underlying bar, once known
    #[must_use]
    pub fn length(&self) -> Option<u64> {
        self.bar.length()
    }

    /// Removes the bar from the display
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressObserver for ProgressBarObserver {
    fn update(&mut self, done: u64, remaining: u64) {
        let total = if let Some(t) = self.total {
            t
        } else {
            let t = done + remaining;
            self.bar.set_length(t);
            self.total = Some(t);
            t
        };
        self.bar.set_position(done.min(total));
    }

    fn advance(&mut self, done: u64) {
        self.bar.set_position(done);
    }
}
