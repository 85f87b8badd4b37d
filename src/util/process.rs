//! Subprocess helpers
// (c) 2024 Ross Younger

use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
};

use tokio::{
    io::{AsyncBufReadExt as _, BufReader},
    process::Command,
};
use tracing::{debug, info, Level};

use crate::error::{Error, Result};

/// Locates an executable.
///
/// A bare name is looked up on `PATH`; anything containing a path separator is used as given.
/// The result is canonicalised and must be executable by the current user.
pub fn find_exe(name: &str) -> Result<PathBuf> {
    let candidate = if name.contains(std::path::MAIN_SEPARATOR) {
        Some(PathBuf::from(name))
    } else {
        std::env::var_os("PATH").and_then(|paths| {
            std::env::split_paths(&paths)
                .map(|dir| dir.join(name))
                .find(|p| p.is_file())
        })
    };
    let Some(candidate) = candidate else {
        return Err(Error::config(format!("cannot find {name} executable")));
    };
    let exe = candidate
        .canonicalize()
        .map_err(|e| Error::config(format!("cannot find {name} executable: {e}")))?;
    if !exe.is_file() || !is_executable(&exe) {
        return Err(Error::config(format!(
            "cannot find valid {name} executable (tried {})",
            exe.display()
        )));
    }
    Ok(exe)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use nix::unistd::{access, AccessFlags};
    access(path, AccessFlags::X_OK).is_ok()
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Quotes a single word in the manner of a POSIX shell.
pub(crate) fn shell_quote(s: &str) -> String {
    let safe = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c));
    if safe {
        s.to_owned()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

fn quote(arg: &OsStr) -> String {
    shell_quote(&arg.to_string_lossy())
}

/// Renders a command line for logging.
///
/// Environment variables are deliberately not shown; they may carry credentials.
#[must_use]
pub fn describe(cmd: &Command) -> String {
    let std = cmd.as_std();
    std::iter::once(std.get_program())
        .chain(std.get_args())
        .map(quote)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs a command to completion, returning its exit status.
///
/// Standard streams are inherited unless the caller has already configured them.
pub async fn run(cmd: &mut Command) -> Result<ExitStatus> {
    debug!("running command: {}", describe(cmd));
    let status = cmd.kill_on_drop(true).status().await?;
    debug!("command exited with {status}");
    Ok(status)
}

/// Runs a command to completion, capturing its standard output.
/// Each line is logged at the given level as it arrives.
pub async fn tee(cmd: &mut Command, level: Level) -> Result<(ExitStatus, String)> {
    debug!("running command: {}", describe(cmd));
    let mut child = cmd
        .stdout(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;
    let mut output = String::new();
    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if level == Level::INFO {
                info!("{line}");
            } else {
                debug!("{line}");
            }
            output.push_str(&line);
            output.push('\n');
        }
    }
    let status = child.wait().await?;
    debug!("command exited with {status}");
    Ok((status, output))
}
