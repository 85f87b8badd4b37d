//! OS abstraction layer
// (c) 2024 Ross Younger

use std::path::PathBuf;

/// How a platform's `ping` utility spells its wait-timeout option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingWait {
    /// `-W<milliseconds>` (macOS and the BSDs)
    Millis,
    /// `-w<seconds>` (Linux and most others)
    Seconds,
}

impl PingWait {
    /// Renders the option for a given number of seconds
    #[must_use]
    pub fn arg(self, seconds: u16) -> String {
        match self {
            PingWait::Millis => format!("-W{}", u32::from(seconds) * 1000),
            PingWait::Seconds => format!("-w{seconds}"),
        }
    }
}

/// General platform abstraction trait.
/// The active implementation should be pulled into this crate
/// Implementations should be called `Platform`, e.g. [unix::Platform].
///
/// Usage:
/// ```
///    use speedtest_ssh::os::Platform;
///    use speedtest_ssh::os::AbstractPlatform as _;
///    println!("{:?}", Platform::system_config_path());
/// ```
pub trait AbstractPlatform {
    /// The absolute path to the user configuration file, if one is defined on this platform.
    ///
    /// If somehow we could not determine the path to use, returns None (and may emit a warning).
    fn user_config_path() -> Option<PathBuf>;

    /// The absolute path to the system configuration file, if one is defined on this platform.
    fn system_config_path() -> Option<PathBuf>;

    /// The wait-timeout spelling understood by this platform's `ping`
    fn ping_wait() -> PingWait;
}

#[cfg(any(unix, doc))]
mod unix;

#[cfg(any(unix, doc))]
pub use unix::*;

static_assertions::assert_cfg!(unix, "This OS is not yet supported");
