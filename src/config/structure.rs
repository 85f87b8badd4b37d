//! Configuration structure
// (c) 2024 Ross Younger

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transfer::Mode;

/// The set of configurable options supported by speedtest-ssh.
///
/// **Note:** The implementation of `default()` for this struct returns the hard-wired configuration defaults.
///
/// Connection details (host, user, password, port) are deliberately not part of this structure;
/// they are resolved per run and passed as [`ConnectionParameters`](crate::ConnectionParameters).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Configuration {
    /// Approximately how long the throughput test should take, in seconds [default: 20]
    pub duration: u32,

    /// The transfer method [default: rsync]
    pub mode: Mode,

    /// Measures round-trip latency with `ping` before the throughput test [default: false]
    pub ping: bool,

    /// Number of echo requests the latency probe sends [default: 10]
    pub ping_count: u8,

    /// Maximum time to wait for the latency probe, in seconds [default: 3]
    pub ping_wait: u16,

    /// The ssh client program to use [default: `ssh`]
    pub ssh: String,

    /// The rsync program to use [default: `rsync`]
    pub rsync: String,

    /// The password relay helper to use when a password is supplied [default: `sshpass`]
    pub sshpass: String,

    /// The ping program to use [default: `ping`]
    pub ping_program: String,

    /// Remote directory in which the test file is created [default: `/tmp`]
    pub remote_dir: String,
}

impl Configuration {
    /// Accessor for `duration`, as a Duration
    #[must_use]
    pub fn budget(&self) -> Duration {
        Duration::from_secs(self.duration.into())
    }
}

impl Default for Configuration {
    /// **(Unusual!)**
    /// Returns the hard-wired configuration defaults.
    fn default() -> Self {
        Self {
            duration: 20,
            mode: Mode::Rsync,
            ping: false,
            ping_count: 10,
            ping_wait: 3,
            ssh: "ssh".into(),
            rsync: "rsync".into(),
            sshpass: "sshpass".into(),
            ping_program: "ping".into(),
            remote_dir: "/tmp".into(),
        }
    }
}

/// Field names of [`Configuration`], used when reporting on configuration sources
pub(crate) const FIELD_NAMES: &[&str] = &[
    "duration",
    "mode",
    "ping",
    "ping_count",
    "ping_wait",
    "ssh",
    "rsync",
    "sshpass",
    "ping_program",
    "remote_dir",
];

/// Configuration values supplied on the command line.
///
/// Only the fields that were actually given are serialized, so lower-priority sources fill in the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Overrides {
    /// See [`Configuration::duration`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    /// See [`Configuration::mode`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    /// See [`Configuration::ping`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping: Option<bool>,
    /// See [`Configuration::ssh`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh: Option<String>,
    /// See [`Configuration::rsync`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsync: Option<String>,
}

#[cfg(test)]
mod test {
    use super::{Configuration, FIELD_NAMES};

    #[test]
    fn field_names_match() {
        let v = serde_json::to_value(Configuration::default()).unwrap();
        let obj = v.as_object().unwrap();
        assert_eq!(obj.len(), FIELD_NAMES.len());
        for f in FIELD_NAMES {
            assert!(obj.contains_key(*f), "missing {f}");
        }
    }

    #[test]
    fn duration_accessor() {
        let c = Configuration::default();
        assert_eq!(c.budget().as_secs(), 20);
    }
}
