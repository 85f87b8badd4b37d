// (c) 2024 Ross Younger
//! # Configuration management
//!
//! speedtest-ssh obtains run-time configuration from the following sources, in order:
//! 1. Command-line options
//! 2. Environment variables of the form `SPEEDTEST_SSH_<FIELD>` (e.g. `SPEEDTEST_SSH_DURATION=30`)
//! 3. The user's configuration file (typically `~/.speedtest-ssh.toml`)
//! 4. The system-wide configuration file (typically `/etc/speedtest-ssh.toml`)
//! 5. Hard-wired defaults
//!
//! Each option may appear in multiple places, but only the first match is used.
//!
//! ## File format
//!
//! Configuration files are TOML.
//!
//! ### Example
//!
//! ```toml
//! # our ssh servers don't have rsync installed
//! mode = "ssh"
//! duration = 30
//! ping = true
//! ```
//!
//! ## Configurable options
//!
//! The full list of supported fields is defined by [Configuration].
//!
//! On the command line:
//! * `speedtest-ssh --show-config` outputs a list of supported fields, their current values, and where each value came from.
//! * `speedtest-ssh --config-files` outputs the list of configuration files for the current user and platform.

mod structure;
pub use structure::{Configuration, Overrides};

mod manager;
pub use manager::Manager;

pub(crate) const BASE_CONFIG_FILENAME: &str = "speedtest-ssh.toml";
