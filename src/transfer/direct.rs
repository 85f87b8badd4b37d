//! Transfers over an ssh session owned by this process
// (c) 2024 Ross Younger

use std::{io, path::Path, process::Stdio};

use indicatif::MultiProgress;
use tokio::{
    fs::File,
    io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _},
};
use tracing::{debug, trace};

use super::{RemoteArtifact, RemoteShell, Transfer};
use crate::{
    config::Configuration,
    error::{Error, Result},
    progress::{ProgressBarObserver, ProgressObserver},
    util::{process::shell_quote, Verbosity},
    ConnectionParameters,
};

/// Transfer buffer size
const CHUNK_SIZE: usize = 256 * 1024;

/// Streams the test file through `cat` on the remote host, over a multiplexed ssh session.
///
/// Per-transfer progress is reported through a [`ProgressBarObserver`].
#[derive(Debug)]
pub struct DirectChannel {
    shell: RemoteShell,
    remote: RemoteArtifact,
    display: MultiProgress,
    quiet: bool,
    /// Size of the most recent upload; the remote artifact is expected to be this long
    last_len: Option<u64>,
}

impl DirectChannel {
    /// Authenticates to the remote host and prepares a fresh remote artifact name.
    pub async fn open(
        params: &ConnectionParameters,
        config: &Configuration,
        verbosity: Verbosity,
        display: &MultiProgress,
    ) -> Result<Self> {
        let shell = RemoteShell::open(params, config).await?;
        let remote = RemoteArtifact::generate(&config.remote_dir);
        debug!("remote file will be {remote}");
        Ok(Self {
            shell,
            remote,
            display: display.clone(),
            quiet: verbosity.is_quiet(),
            last_len: None,
        })
    }

    pub(super) fn shell_mut(&mut self) -> &mut RemoteShell {
        &mut self.shell
    }

    fn observer(&self, label: &str) -> ProgressBarObserver {
        ProgressBarObserver::new(&self.display, label, self.quiet)
    }

    /// Builds the error for a pipe to or from ssh which broke mid-transfer, collecting the exit status if there is one.
    async fn channel_failed(
        &self,
        child: &mut tokio::process::Child,
        what: &str,
        err: &io::Error,
    ) -> Error {
        let status = child.wait().await.ok();
        debug!("remote {what} broke off: {err}; exit status {status:?}");
        let context = match status {
            Some(st) => format!("{what} {} failed: {err} ({st})", self.remote),
            None => format!("{what} {} failed: {err}", self.remote),
        };
        Error::transfer(context, status)
    }

    async fn check_exit(&self, child: &mut tokio::process::Child, what: &str) -> Result<()> {
        let status = child.wait().await?;
        trace!("remote {what} exited with {status}");
        if status.success() {
            Ok(())
        } else {
            Err(Error::transfer(
                format!("{what} {} failed ({status})", self.remote),
                Some(status),
            ))
        }
    }
}

/// Which side of a [`pump`] failed
#[derive(Debug)]
enum PumpError {
    Read(io::Error),
    Write(io::Error),
}

fn report<O: ProgressObserver>(observer: &mut O, done: u64, total: Option<u64>) {
    match total {
        Some(t) => observer.update(done, t.saturating_sub(done)),
        None => observer.advance(done),
    }
}

/// Copies `reader` to `writer` in chunks, reporting progress against the expected total if there is one.
async fn pump<R, W, O>(
    reader: &mut R,
    writer: &mut W,
    total: Option<u64>,
    observer: &mut O,
) -> std::result::Result<u64, PumpError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    O: ProgressObserver,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut done = 0u64;
    report(observer, 0, total);
    loop {
        let n = reader.read(&mut buf).await.map_err(PumpError::Read)?;
        if n == 0 {
            break;
        }
        writer
            .write_all(&buf[..n])
            .await
            .map_err(PumpError::Write)?;
        done += n as u64;
        report(observer, done, total);
    }
    writer.flush().await.map_err(PumpError::Write)?;
    Ok(done)
}

impl Transfer for DirectChannel {
    async fn put(&mut self, local: &Path) -> Result<()> {
        let mut file = File::open(local).await?;
        let len = file.metadata().await?.len();
        let mut cmd = self
            .shell
            .remote_command(&format!("cat > {}", shell_quote(self.remote.as_str())));
        let _ = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .kill_on_drop(true);
        let mut child = cmd.spawn()?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::transfer("ssh stdin unavailable", None))?;
        let mut observer = self.observer("Upload");
        let sent = pump(&mut file, &mut stdin, Some(len), &mut observer).await;
        observer.finish();
        // Closing stdin lets the remote cat finish
        drop(stdin);
        let sent = match sent {
            Ok(n) => n,
            Err(PumpError::Read(e)) => return Err(e.into()),
            Err(PumpError::Write(e)) => {
                return Err(self.channel_failed(&mut child, "upload to", &e).await)
            }
        };
        self.check_exit(&mut child, "upload to").await?;
        trace!("sent {sent} bytes");
        self.last_len = Some(sent);
        Ok(())
    }

    async fn get(&mut self, local: &Path) -> Result<()> {
        let mut file = File::create(local).await?;
        let mut cmd = self
            .shell
            .remote_command(&format!("cat -- {}", shell_quote(self.remote.as_str())));
        let _ = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true);
        let mut child = cmd.spawn()?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::transfer("ssh stdout unavailable", None))?;
        let mut observer = self.observer("Download");
        let received = pump(&mut stdout, &mut file, self.last_len, &mut observer).await;
        observer.finish();
        drop(stdout);
        let received = match received {
            Ok(n) => n,
            Err(PumpError::Read(e)) => {
                return Err(self.channel_failed(&mut child, "download from", &e).await)
            }
            Err(PumpError::Write(e)) => return Err(e.into()),
        };
        self.check_exit(&mut child, "download from").await?;
        trace!("received {received} bytes");
        if let Some(expected) = self.last_len {
            if received != expected {
                return Err(Error::transfer(
                    format!(
                        "download from {} was truncated: got {received} of {expected} bytes",
                        self.remote
                    ),
                    None,
                ));
            }
        }
        Ok(())
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
    use indicatif::MultiProgress;

    use super::{pump, DirectChannel};
    use crate::{
        config::Configuration,
        error::Error,
        transfer::{shell::test::fake_config, Transfer as _},
        util::Verbosity,
        ConnectionParameters,
    };

    #[derive(Default)]
    struct Recorder {
        sized: Vec<(u64, u64)>,
        r#unsized: Vec<u64>,
    }
    impl crate::progress::ProgressObserver for Recorder {
        fn update(&mut self, done: u64, remaining: u64) {
            self.sized.push((done, remaining));
        }
        fn advance(&mut self, done: u64) {
            self.r#unsized.push(done);
        }
    }

    async fn open(config: &Configuration) -> DirectChannel {
        let params = ConnectionParameters::new("somehost", None, None, None);
        let mp = MultiProgress::new();
        DirectChannel::open(&params, config, Verbosity::Quiet, &mp)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn pump_reports_progress() {
        let data = vec![7u8; 600_000];
        let mut out = Vec::new();
        let mut rec = Recorder::default();
        let n = pump(&mut data.as_slice(), &mut out, Some(600_000), &mut rec)
            .await
            .unwrap();
        assert_eq!(n, 600_000);
        assert_eq!(out, data);
        assert_eq!(rec.sized.first(), Some(&(0, 600_000)));
        assert_eq!(rec.sized.last(), Some(&(600_000, 0)));
        assert!(rec.sized.windows(2).all(|w| w[0].0 <= w[1].0));
        assert!(rec.r#unsized.is_empty());
    }

    #[tokio::test]
    async fn pump_without_known_length() {
        let data = vec![7u8; 600_000];
        let mut out = Vec::new();
        let mut rec = Recorder::default();
        let n = pump(&mut data.as_slice(), &mut out, None, &mut rec)
            .await
            .unwrap();
        assert_eq!(n, 600_000);
        assert!(rec.sized.is_empty());
        assert_eq!(rec.r#unsized.first(), Some(&0));
        assert_eq!(rec.r#unsized.last(), Some(&600_000));
    }

    #[tokio::test]
    async fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut chan = open(&fake_config(dir.path())).await;

        let src = dir.path().join("src");
        let body: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&src, &body).unwrap();
        chan.put(&src).await.unwrap();
        let remote = std::path::PathBuf::from(chan.remote().as_str());
        assert_eq!(std::fs::read(&remote).unwrap(), body);

        let dest = dir.path().join("dest");
        chan.get(&dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), body);

        chan.clean_remote().await.unwrap();
        assert!(!remote.exists());
        // already gone is fine
        chan.clean_remote().await.unwrap();
        chan.shell_mut().close().await.unwrap();
    }

    #[tokio::test]
    async fn get_without_remote_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut chan = open(&fake_config(dir.path())).await;
        let e = chan.get(&dir.path().join("dest")).await.unwrap_err();
        assert!(matches!(e, Error::Transfer { .. }), "{e:?}");
        chan.shell_mut().close().await.unwrap();
    }

    #[tokio::test]
    async fn get_before_put_has_unknown_length() {
        let dir = tempfile::tempdir().unwrap();
        let mut chan = open(&fake_config(dir.path())).await;
        // something else put the file there, so we don't know how long it is
        std::fs::write(chan.remote().as_str(), vec![1u8; 100_000]).unwrap();
        let dest = dir.path().join("dest");
        chan.get(&dest).await.unwrap();
        assert_eq!(std::fs::metadata(&dest).unwrap().len(), 100_000);
        chan.clean_remote().await.unwrap();
        chan.shell_mut().close().await.unwrap();
    }

    #[tokio::test]
    async fn put_into_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fake_config(dir.path());
        config.remote_dir = "/nonexistent/remote/dir".into();
        let mut chan = open(&config).await;
        // much larger than a pipe buffer, so the write side sees the remote go away
        let src = dir.path().join("src");
        std::fs::write(&src, vec![0u8; 2 * 1024 * 1024]).unwrap();
        let e = chan.put(&src).await.unwrap_err();
        assert!(
            matches!(e, Error::Transfer { status: Some(st), .. } if !st.success()),
            "{e:?}"
        );
        assert!(e.to_string().contains("/nonexistent/remote/dir/"), "{e}");
        chan.shell_mut().close().await.unwrap();
    }

    #[tokio::test]
    async fn put_missing_local_file_is_local_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut chan = open(&fake_config(dir.path())).await;
        let e = chan.put(&dir.path().join("absent")).await.unwrap_err();
        assert!(matches!(e, Error::Io(_)), "{e:?}");
        chan.shell_mut().close().await.unwrap();
    }
}
