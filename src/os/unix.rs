// OS abstraction layer - Unix implementation
// (c) 2024 Ross Younger

use std::path::PathBuf;

use tracing::warn;

use super::{AbstractPlatform, PingWait};
use crate::config::BASE_CONFIG_FILENAME;

fn bsdish() -> bool {
    cfg!(any(
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "freebsd",
        target_os = "macos"
    ))
}

#[derive(Debug, Clone, Copy)]
/// Concrete implementation of [`AbstractPlatform`] for Unix-like platforms
pub struct Platform {}

impl AbstractPlatform for Platform {
    fn user_config_path() -> Option<PathBuf> {
        // ~/.<filename> for now
        let Some(mut d) = dirs::home_dir() else {
            warn!("could not determine home directory");
            return None;
        };
        d.push(format!(".{BASE_CONFIG_FILENAME}"));
        Some(d)
    }

    fn system_config_path() -> Option<PathBuf> {
        let mut p = PathBuf::from("/etc");
        p.push(BASE_CONFIG_FILENAME);
        Some(p)
    }

    fn ping_wait() -> PingWait {
        if bsdish() {
            PingWait::Millis
        } else {
            PingWait::Seconds
        }
    }
}
