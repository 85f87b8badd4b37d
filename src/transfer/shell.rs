//! Remote command execution over a multiplexed ssh session
// (c) 2024 Ross Younger

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Stdio,
};

use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, trace, warn};

use crate::{
    config::Configuration,
    error::{Error, Result},
    util::process::{find_exe, run, shell_quote},
    ConnectionParameters,
};

/// Environment variable the password relay helper reads the password from
pub(crate) const PASSWORD_ENV: &str = "SSHPASS";

/// How long an idle ssh control master lingers if we fail to shut it down
const CONTROL_PERSIST_SECS: u16 = 60;

/// An authenticated ssh session to the remote host.
///
/// The first connection becomes an OpenSSH control master; every later command is multiplexed over it,
/// so authentication happens once per session. The session must be shut down with [`RemoteShell::close`];
/// dropping it without doing so makes a best-effort synchronous attempt.
pub struct RemoteShell {
    ssh: PathBuf,
    helper: Option<PathBuf>,
    password: Option<String>,
    user_host: String,
    port: Option<u16>,
    control_dir: TempDir,
    open: bool,
}

impl RemoteShell {
    /// Resolves the executables we need and opens the session.
    pub async fn open(params: &ConnectionParameters, config: &Configuration) -> Result<Self> {
        let mut shell = Self::new(params, config)?;
        debug!("opening ssh session to {}", shell.user_host);
        shell.open = true;
        if let Err(e) = shell.execute("true").await {
            // there is no master to shut down
            shell.open = false;
            return Err(Error::transfer(
                format!("could not open ssh session to {}: {e}", shell.user_host),
                None,
            ));
        }
        Ok(shell)
    }

    fn new(params: &ConnectionParameters, config: &Configuration) -> Result<Self> {
        let ssh = find_exe(&config.ssh)?;
        let helper = match params.password() {
            None => None,
            Some(_) => Some(find_exe(&config.sshpass).map_err(|e| {
                Error::config(format!(
                    "a password was given, but cannot authenticate without helper: {e}"
                ))
            })?),
        };
        let control_dir = tempfile::Builder::new()
            .prefix("speedtest-ssh.")
            .tempdir()?;
        Ok(Self {
            ssh,
            helper,
            password: params.password().map(str::to_owned),
            user_host: params.user_host(),
            port: params.port(),
            control_dir,
            open: false,
        })
    }

    /// The password relay helper in use, if any
    pub(crate) fn helper(&self) -> Option<&Path> {
        self.helper.as_deref()
    }

    /// The password to hand to the relay helper, if any
    pub(crate) fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// `[user@]host` of the remote
    pub(crate) fn user_host(&self) -> &str {
        &self.user_host
    }

    fn control_path(&self) -> PathBuf {
        self.control_dir.path().join("ctl")
    }

    /// The ssh options common to every invocation
    fn ssh_options(&self) -> Vec<OsString> {
        let mut control_path = OsString::from("ControlPath=");
        control_path.push(self.control_path());
        let mut opts: Vec<OsString> = vec![
            "-o".into(),
            "ControlMaster=auto".into(),
            "-o".into(),
            control_path,
            "-o".into(),
            format!("ControlPersist={CONTROL_PERSIST_SECS}").into(),
        ];
        if let Some(port) = self.port {
            opts.push("-p".into());
            opts.push(port.to_string().into());
        }
        opts
    }

    /// A remote shell command line suitable for rsync's `--rsh` option.
    /// It shares this session's control master.
    pub(crate) fn rsh(&self) -> String {
        std::iter::once(self.ssh.as_os_str().to_owned())
            .chain(self.ssh_options())
            .map(|s| shell_quote(&s.to_string_lossy()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Builds a synchronous command running ssh with the given trailing arguments,
    /// wrapped by the password helper if there is one.
    fn std_command(&self, tail: &[OsString]) -> std::process::Command {
        let mut cmd = if let (Some(helper), Some(password)) = (&self.helper, &self.password) {
            let mut c = std::process::Command::new(helper);
            let _ = c.arg("-e").arg(&self.ssh).env(PASSWORD_ENV, password);
            c
        } else {
            std::process::Command::new(&self.ssh)
        };
        let _ = cmd.args(self.ssh_options()).args(tail);
        cmd
    }

    /// Builds a command which runs `remote_cmd` on the remote host.
    /// The caller is responsible for quoting within `remote_cmd`.
    pub(crate) fn remote_command(&self, remote_cmd: &str) -> Command {
        let tail: Vec<OsString> = vec![
            "--".into(),
            self.user_host.clone().into(),
            remote_cmd.into(),
        ];
        Command::from(self.std_command(&tail))
    }

    /// Runs a remote command to completion, failing if it exits unsuccessfully.
    pub async fn execute(&self, remote_cmd: &str) -> Result<()> {
        let mut cmd = self.remote_command(remote_cmd);
        let _ = cmd.stdin(Stdio::null());
        let status = run(&mut cmd).await?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::transfer(
                format!("remote command `{remote_cmd}` failed ({status})"),
                Some(status),
            ))
        }
    }

    /// Removes a remote file. A file that does not exist is not an error.
    pub async fn remove(&self, path: &str) -> Result<()> {
        debug!("removing remote file (if it exists): {path}");
        self.execute(&format!("rm -f -- {}", shell_quote(path))).await
    }

    fn exit_args(&self) -> Vec<OsString> {
        vec![
            "-O".into(),
            "exit".into(),
            "--".into(),
            self.user_host.clone().into(),
        ]
    }

    /// Shuts down the control master.
    pub async fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        trace!("closing ssh session");
        let mut cmd = Command::from(self.std_command(&self.exit_args()));
        let _ = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let status = run(&mut cmd).await?;
        if !status.success() {
            // This happens if the master never started, or already went away
            debug!("ssh control master exit returned {status}");
        }
        Ok(())
    }
}

impl std::fmt::Debug for RemoteShell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteShell")
            .field("ssh", &self.ssh)
            .field("helper", &self.helper)
            .field("user_host", &self.user_host)
            .field("port", &self.port)
            .field("control_dir", &self.control_dir.path())
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}

impl Drop for RemoteShell {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        warn!("ssh session was not closed cleanly; shutting it down");
        let mut cmd = self.std_command(&self.exit_args());
        let _ = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .inspect_err(|e| warn!("failed to stop ssh control master: {e}"));
    }
}
