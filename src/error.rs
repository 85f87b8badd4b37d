//! Error taxonomy
// (c) 2024 Ross Younger

use std::process::ExitStatus;

/// Everything that can go wrong during a measurement run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required executable is missing or unusable, or the setup is otherwise invalid.
    /// Fatal; never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A transfer failed. This aborts the run; failed iterations are not retried.
    #[error("transfer failed: {context}")]
    Transfer {
        /// What we were trying to do
        context: String,
        /// Exit status of the subprocess, if there was one
        status: Option<ExitStatus>,
    },

    /// The latency probe failed
    #[error("ping failed: {0}")]
    Probe(String),

    /// Local filesystem or randomness source failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn config<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub(crate) fn transfer<S: Into<String>>(context: S, status: Option<ExitStatus>) -> Self {
        Self::Transfer {
            context: context.into(),
            status,
        }
    }
}

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod test {
    use super::Error;

    #[test]
    fn messages() {
        let e = Error::config("cannot find rsync executable");
        assert_eq!(
            e.to_string(),
            "configuration error: cannot find rsync executable"
        );
        let e = Error::transfer("upload to host:/tmp/x", None);
        assert_eq!(e.to_string(), "transfer failed: upload to host:/tmp/x");
        let e = Error::Probe("ping exit code: 1".into());
        assert_eq!(e.to_string(), "ping failed: ping exit code: 1");
    }

    #[test]
    fn io_converts() {
        fn inner() -> super::Result<()> {
            let _ = std::fs::File::open("/nonexistent/definitely/not/here")?;
            Ok(())
        }
        assert!(matches!(inner(), Err(Error::Io(_))));
    }
}
