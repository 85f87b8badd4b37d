//! Transfers delegated to an external rsync process
// (c) 2024 Ross Younger

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Stdio,
};

use tokio::process::Command;
use tracing::{debug, info, warn, Level};

use super::{shell::PASSWORD_ENV, RemoteArtifact, RemoteShell, Transfer};
use crate::{
    config::Configuration,
    error::{Error, Result},
    util::{
        process::{find_exe, run, tee},
        Verbosity,
    },
    ConnectionParameters,
};

/// rsync releases up to and including this one don't understand `--info=progress2`
const LAST_LEGACY_VERSION: &[u32] = &[3, 1, 0];

/// Extracts the dotted version number from `rsync --version` output.
///
/// This looks for the text between the first occurrence of `version` and the following `protocol`,
/// e.g. `rsync  version 3.2.7  protocol version 31` yields `[3, 2, 7]`.
/// A leading `v` on the number is tolerated.
#[must_use]
pub fn parse_version(output: &str) -> Option<Vec<u32>> {
    let (_, rest) = output.split_once("version")?;
    let (number, _) = rest.split_once("protocol")?;
    let number = number.trim();
    let number = number.strip_prefix('v').unwrap_or(number);
    if number.is_empty() {
        return None;
    }
    number.split('.').map(|s| s.parse().ok()).collect()
}

fn is_legacy(version: Option<&[u32]>) -> bool {
    version.map_or(true, |v| v <= LAST_LEGACY_VERSION)
}

/// Runs rsync over ssh for every transfer.
///
/// The rsync command line is fixed when this struct is created; each transfer only appends its source and destination.
#[derive(Debug)]
pub struct ExternalTool {
    shell: RemoteShell,
    remote: RemoteArtifact,
    program: PathBuf,
    args: Vec<OsString>,
    quiet: bool,
    legacy: bool,
}

impl ExternalTool {
    /// Checks the rsync installation, authenticates to the remote host and prepares a fresh remote artifact name.
    pub async fn open(
        params: &ConnectionParameters,
        config: &Configuration,
        verbosity: Verbosity,
    ) -> Result<Self> {
        let rsync = find_exe(&config.rsync)?;
        let legacy = probe_version(&rsync).await?;
        if legacy {
            info!("Old version of rsync detected. Output will be more verbose.");
        }

        let shell = RemoteShell::open(params, config).await?;
        let remote = RemoteArtifact::generate(&config.remote_dir).restricted();
        debug!("remote file will be {remote}");

        let (program, mut args) = match shell.helper() {
            Some(helper) => (
                helper.to_path_buf(),
                vec![OsString::from("-e"), rsync.into_os_string()],
            ),
            None => (rsync, Vec::new()),
        };
        let progress = if legacy {
            "--progress"
        } else {
            "--info=progress2"
        };
        args.extend(["-hh", progress].map(OsString::from));
        match verbosity {
            Verbosity::Verbose => args.push(OsString::from("--verbose")),
            Verbosity::Debug => args.extend(["--verbose", "-vvv"].map(OsString::from)),
            Verbosity::Quiet | Verbosity::Normal => (),
        }
        args.push(format!("--rsh={}", shell.rsh()).into());

        Ok(Self {
            shell,
            remote,
            program,
            args,
            quiet: verbosity.is_quiet(),
            legacy,
        })
    }

    pub(super) fn shell_mut(&mut self) -> &mut RemoteShell {
        &mut self.shell
    }

    /// Whether the installed rsync needed the older progress option
    #[must_use]
    pub fn legacy(&self) -> bool {
        self.legacy
    }

    fn remote_spec(&self) -> OsString {
        format!("{}:{}", self.shell.user_host(), self.remote).into()
    }

    fn command(&self, src: OsString, dest: OsString) -> Command {
        let mut cmd = Command::new(&self.program);
        let _ = cmd.args(&self.args).arg(src).arg(dest).stdin(Stdio::null());
        if let Some(pw) = self.shell.password() {
            let _ = cmd.env(PASSWORD_ENV, pw);
        }
        if self.quiet {
            let _ = cmd.stdout(Stdio::null());
        }
        cmd
    }

    async fn transfer(&self, mut cmd: Command, what: &str) -> Result<()> {
        let status = run(&mut cmd).await?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::transfer(
                format!("rsync {what} {} failed ({status})", self.remote),
                Some(status),
            ))
        }
    }
}

/// Runs `rsync --version` and decides whether the legacy progress flag is needed.
async fn probe_version(rsync: &Path) -> Result<bool> {
    let mut cmd = Command::new(rsync);
    let _ = cmd.arg("--version").stdin(Stdio::null());
    let (status, output) = tee(&mut cmd, Level::DEBUG)
        .await
        .map_err(|e| Error::config(format!("could not run {}: {e}", rsync.display())))?;
    if !status.success() {
        return Err(Error::config(format!(
            "{} --version failed ({status})",
            rsync.display()
        )));
    }
    let version = parse_version(&output);
    if version.is_none() {
        warn!("could not determine rsync version; assuming it is old");
    }
    Ok(is_legacy(version.as_deref()))
}

impl Transfer for ExternalTool {
    async fn put(&mut self, local: &Path) -> Result<()> {
        let cmd = self.command(local.as_os_str().to_owned(), self.remote_spec());
        self.transfer(cmd, "upload to").await
    }

    async fn get(&mut self, local: &Path) -> Result<()> {
        let cmd = self.command(self.remote_spec(), local.as_os_str().to_owned());
        self.transfer(cmd, "download from").await
    }

    async fn clean_remote(&mut self) -> Result<()> {
        self.shell.remove(self.remote.as_str()).await
    }

    fn remote(&self) -> &RemoteArtifact {
        &self.remote
    }
}

#[cfg(test)]
mod test {
    use std::path::Path;

    use super::{is_legacy, parse_version, ExternalTool};
    use crate::{
        config::Configuration,
        error::Error,
        transfer::{shell::test::fake_config, Transfer as _},
        util::{process::test::fake_tool, Verbosity},
        ConnectionParameters,
    };

    /// A stand-in for rsync which copies its last two arguments, ignoring any `host:` prefix
    fn fake_rsync(dir: &Path, version_line: &str) -> String {
        let body = format!(
            r#"if [ "$1" = "--version" ]; then echo "{version_line}"; echo "Copyright (C) 1996-2022"; exit 0; fi
echo "$@" >> "$(dirname "$0")/rsync.log"
for a in "$@"; do src="$dst"; dst="$a"; done
exec cp "${{src#*:}}" "${{dst#*:}}""#
        );
        fake_tool(dir, "rsync", &body).to_string_lossy().into()
    }

    fn setup(dir: &Path, version_line: &str) -> Configuration {
        let mut config = fake_config(dir);
        config.rsync = fake_rsync(dir, version_line);
        config
    }

    fn rsync_log(dir: &Path) -> String {
        std::fs::read_to_string(dir.join("rsync.log")).unwrap_or_default()
    }

    fn params() -> ConnectionParameters {
        ConnectionParameters::new("somehost", None, None, Some(2022))
    }

    #[test]
    fn versions() {
        assert_eq!(
            parse_version("rsync  version 3.2.7  protocol version 31\nCopyright"),
            Some(vec![3, 2, 7])
        );
        assert_eq!(
            parse_version("rsync  version v3.2.3  protocol version 31"),
            Some(vec![3, 2, 3])
        );
        assert_eq!(
            parse_version("rsync version 3.0.0 protocol 31"),
            Some(vec![3, 0, 0])
        );
        assert_eq!(parse_version("openrsync: protocol version 29"), None);
        assert_eq!(parse_version("rsync version three protocol 31"), None);
        assert_eq!(parse_version("nothing useful"), None);
    }

    #[test]
    fn legacy_threshold() {
        assert!(is_legacy(Some(&[3, 0, 9])));
        assert!(is_legacy(Some(&[3, 1, 0])));
        assert!(is_legacy(Some(&[3, 1])));
        assert!(!is_legacy(Some(&[3, 1, 1])));
        assert!(!is_legacy(Some(&[3, 2, 7])));
        assert!(is_legacy(None));
    }

    #[tokio::test]
    async fn old_rsync_uses_legacy_progress() {
        let dir = tempfile::tempdir().unwrap();
        let config = setup(dir.path(), "rsync version 3.0.0 protocol 31");
        let mut tool = ExternalTool::open(&params(), &config, Verbosity::Normal)
            .await
            .unwrap();
        assert!(tool.legacy());
        let src = dir.path().join("payload");
        std::fs::write(&src, b"some data").unwrap();
        tool.put(&src).await.unwrap();
        let log = rsync_log(dir.path());
        assert!(log.contains("-hh --progress --rsh="), "{log}");
        assert!(!log.contains("--info=progress2"));
        assert!(!log.contains("--verbose"));
        tool.shell_mut().close().await.unwrap();
    }

    #[tokio::test]
    async fn transfers_and_flags() {
        let dir = tempfile::tempdir().unwrap();
        let config = setup(dir.path(), "rsync  version 3.2.7  protocol version 31");
        let mut tool = ExternalTool::open(&params(), &config, Verbosity::Debug)
            .await
            .unwrap();
        assert!(!tool.legacy());
        let remote = tool.remote().as_str().to_string();
        assert!(!remote.contains(':'));
        assert!(!remote.contains(' '));
        assert!(!remote.rsplit('/').next().unwrap().contains('.'));

        let src = dir.path().join("payload");
        std::fs::write(&src, b"0123456789").unwrap();
        tool.put(&src).await.unwrap();
        assert_eq!(std::fs::read(&remote).unwrap(), b"0123456789");
        std::fs::remove_file(&src).unwrap();
        tool.get(&src).await.unwrap();
        assert_eq!(std::fs::read(&src).unwrap(), b"0123456789");

        let log = rsync_log(dir.path());
        let first = log.lines().next().unwrap();
        assert!(first.starts_with("-hh --info=progress2 --verbose -vvv --rsh="), "{first}");
        assert!(first.contains("ControlPath="));
        assert!(first.contains("-p 2022"));
        assert!(first.ends_with(&format!("somehost:{remote}")));

        tool.clean_remote().await.unwrap();
        assert!(!Path::new(&remote).exists());
        tool.clean_remote().await.unwrap();
        tool.shell_mut().close().await.unwrap();
    }

    #[tokio::test]
    async fn failed_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let config = setup(dir.path(), "rsync  version 3.2.7  protocol version 31");
        let mut tool = ExternalTool::open(&params(), &config, Verbosity::Quiet)
            .await
            .unwrap();
        // nothing has been uploaded, so there is nothing to fetch
        let e = tool.get(&dir.path().join("dest")).await.unwrap_err();
        assert!(matches!(e, Error::Transfer { status: Some(_), .. }), "{e:?}");
        tool.shell_mut().close().await.unwrap();
    }

    #[tokio::test]
    async fn broken_rsync() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fake_config(dir.path());
        config.rsync = fake_tool(dir.path(), "rsync", "exit 2")
            .to_string_lossy()
            .into();
        let e = ExternalTool::open(&params(), &config, Verbosity::Normal)
            .await
            .unwrap_err();
        assert!(matches!(e, Error::Configuration(_)), "{e:?}");
    }

    #[tokio::test]
    async fn missing_rsync() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fake_config(dir.path());
        config.rsync = dir.path().join("absent").to_string_lossy().into();
        let e = ExternalTool::open(&params(), &config, Verbosity::Normal)
            .await
            .unwrap_err();
        assert!(matches!(e, Error::Configuration(_)), "{e:?}");
    }

    #[tokio::test]
    async fn password_without_helper() {
        let dir = tempfile::tempdir().unwrap();
        let config = setup(dir.path(), "rsync  version 3.2.7  protocol version 31");
        let p = ConnectionParameters::new("somehost", None, Some("pw".into()), None);
        let e = ExternalTool::open(&p, &config, Verbosity::Normal)
            .await
            .unwrap_err();
        assert!(e.to_string().contains("cannot authenticate without helper"));
    }
}
