//! Moving the test file to and from the remote host
// (c) 2024 Ross Younger
//!
//! Two strategies are provided:
//! * [`DirectChannel`] streams the file over an authenticated ssh session owned by this process;
//! * [`ExternalTool`] delegates each transfer to an external rsync process.
//!
//! Both are wrapped in [`Strategy`], which is the only place the configured [`Mode`] is inspected.

use std::{path::Path, str::FromStr};

use indicatif::MultiProgress;
use serde::{de, Deserialize, Serialize};
use strum::VariantNames;
use tracing::warn;

use crate::{config::Configuration, error::Result, util::Verbosity, ConnectionParameters};

mod artifact;
pub use artifact::RemoteArtifact;

mod direct;
pub use direct::DirectChannel;

mod external;
pub use external::{parse_version, ExternalTool};

mod shell;
pub use shell::RemoteShell;
#[cfg(test)]
pub(crate) use shell::test as test_support;

/// Selects the transfer method
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
    clap::ValueEnum,
    Serialize,
)]
#[strum(serialize_all = "lowercase")] // N.B. this applies to EnumString, not Display
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Runs rsync over ssh for each transfer
    #[default]
    Rsync,
    /// Streams the file over a single ssh session
    Ssh,
}

impl<'de> Deserialize<'de> for Mode {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let lower = s.to_ascii_lowercase();
        // requires strum::EnumString && strum::VariantNames && #[strum(serialize_all = "lowercase")]
        FromStr::from_str(&lower).map_err(|_| de::Error::unknown_variant(&s, Mode::VARIANTS))
    }
}

/// The operations a transfer strategy provides.
///
/// Every strategy owns exactly one remote artifact for its lifetime.
#[allow(async_fn_in_trait)]
pub trait Transfer {
    /// Copies the local file at `local` to the remote artifact, replacing it if present.
    async fn put(&mut self, local: &Path) -> Result<()>;
    /// Copies the remote artifact to `local`, replacing it if present.
    async fn get(&mut self, local: &Path) -> Result<()>;
    /// Removes the remote artifact. Succeeds if it is already absent.
    async fn clean_remote(&mut self) -> Result<()>;
    /// The remote path this strategy transfers to and from
    fn remote(&self) -> &RemoteArtifact;
}

/// A ready-to-use transfer strategy
#[derive(Debug)]
pub enum Strategy {
    /// See [`DirectChannel`]
    Direct(DirectChannel),
    /// See [`ExternalTool`]
    External(ExternalTool),
}

impl Strategy {
    /// Sets up the strategy selected by `config.mode`.
    pub async fn open(
        params: &ConnectionParameters,
        config: &Configuration,
        verbosity: Verbosity,
        display: &MultiProgress,
    ) -> Result<Self> {
        Ok(match config.mode {
            Mode::Ssh => Self::Direct(DirectChannel::open(params, config, verbosity, display).await?),
            Mode::Rsync => Self::External(ExternalTool::open(params, config, verbosity).await?),
        })
    }

    /// Removes the remote artifact and releases the session.
    ///
    /// This always runs to completion; failures are logged, not returned.
    pub async fn close(mut self) {
        if let Err(e) = self.clean_remote().await {
            warn!("failed to remove remote file {}: {e}", self.remote());
        }
        let shell = match &mut self {
            Self::Direct(d) => d.shell_mut(),
            Self::External(x) => x.shell_mut(),
        };
        if let Err(e) = shell.close().await {
            warn!("failed to close ssh session: {e}");
        }
    }
}

impl Transfer for Strategy {
    async fn put(&mut self, local: &Path) -> Result<()> {
        match self {
            Self::Direct(d) => d.put(local).await,
            Self::External(x) => x.put(local).await,
        }
    }

    async fn get(&mut self, local: &Path) -> Result<()> {
        match self {
            Self::Direct(d) => d.get(local).await,
            Self::External(x) => x.get(local).await,
        }
    }

    async fn clean_remote(&mut self) -> Result<()> {
        match self {
            Self::Direct(d) => d.clean_remote().await,
            Self::External(x) => x.clean_remote().await,
        }
    }

    fn remote(&self) -> &RemoteArtifact {
        match self {
            Self::Direct(d) => d.remote(),
            Self::External(x) => x.remote(),
        }
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr as _;

    use super::Mode;

    #[test]
    fn mode_names() {
        assert_eq!(Mode::from_str("rsync").unwrap(), Mode::Rsync);
        assert_eq!(Mode::from_str("ssh").unwrap(), Mode::Ssh);
        assert!(Mode::from_str("scp").is_err());
        assert_eq!(Mode::default(), Mode::Rsync);
    }

    #[test]
    fn deserialize_any_case() {
        #[derive(serde::Deserialize)]
        struct W {
            mode: Mode,
        }
        let w: W = serde_json::from_str(r#"{"mode":"SSH"}"#).unwrap();
        assert_eq!(w.mode, Mode::Ssh);
        let e = serde_json::from_str::<W>(r#"{"mode":"ftp"}"#).err().unwrap();
        assert!(e.to_string().contains("ftp"));
    }
}
