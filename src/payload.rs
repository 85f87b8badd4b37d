//! Random payload generation
// (c) 2024 Ross Younger

use std::path::{Path, PathBuf};

use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncReadExt as _, AsyncWriteExt as _},
};
use tracing::trace;

use crate::error::Result;

/// Block size for reading from the randomness source.
pub const BLOCK_SIZE: usize = 1024 * 1024;

/// Default randomness source
pub const DEFAULT_SOURCE: &str = "/dev/urandom";

/// Fills files with random bytes, a block at a time.
///
/// A file is only ever topped up: if it already holds enough data, it is truncated and nothing is read.
/// This lets one scratch file be reused across iterations of increasing size.
#[derive(Debug, Clone)]
pub struct PayloadGenerator {
    source: PathBuf,
}

impl Default for PayloadGenerator {
    fn default() -> Self {
        Self::with_source(DEFAULT_SOURCE)
    }
}

impl PayloadGenerator {
    /// Uses the given byte stream as the randomness source
    pub fn with_source<P: AsRef<Path>>(source: P) -> Self {
        Self {
            source: source.as_ref().to_path_buf(),
        }
    }

    /// Ensures that `path` exists and contains exactly `size` bytes.
    ///
    /// The source is opened only if more data is needed.
    pub async fn fill(&self, path: &Path, size: u64) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        // stream position is unreliable in append mode; ask the filesystem
        let mut done = file.metadata().await?.len();
        if done < size {
            trace!("topping up {path:?} from {done} to {size} bytes");
            let mut source = File::open(&self.source).await?;
            let mut block = vec![0u8; BLOCK_SIZE];
            while done < size {
                source.read_exact(&mut block).await?;
                file.write_all(&block).await?;
                done += BLOCK_SIZE as u64;
            }
            file.flush().await?;
        }
        file.set_len(size).await?;
        Ok(())
    }
}
