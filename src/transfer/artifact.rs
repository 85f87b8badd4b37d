//! Naming of the remote test file
// (c) 2024 Ross Younger

use std::fmt::Display;

/// Length of the random component of a generated name
const RANDOM_CHARS: usize = 8;

/// The remote path used as the upload target and download source for one session.
///
/// Generated names look like `/tmp/speedtest-ssh_2024-10-18_12-34-56.123456_AbCd1234.tmp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteArtifact(String);

impl RemoteArtifact {
    /// Generates a fresh, unique-enough name within the given remote directory.
    #[must_use]
    pub fn generate(remote_dir: &str) -> Self {
        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.6f");
        let random: String = std::iter::repeat_with(fastrand::alphanumeric)
            .take(RANDOM_CHARS)
            .collect();
        let dir = remote_dir.trim_end_matches('/');
        Self::from_raw(&format!("{dir}/speedtest-ssh_{stamp}_{random}.tmp"))
    }

    /// Wraps a path, rewriting `:` to `-` and space to `_` in the file name.
    /// The directory is left as configured.
    #[must_use]
    pub fn from_raw(raw: &str) -> Self {
        Self::map_name(raw, |c| match c {
            ':' => '-',
            ' ' => '_',
            c => c,
        })
    }

    /// A variant of this name which is safe to hand to tools with fussy argument parsing
    /// (notably older releases of rsync).
    ///
    /// In the file name, everything other than ASCII alphanumerics, `_` and `-` becomes `_`.
    /// The directory is left as configured.
    #[must_use]
    pub fn restricted(&self) -> Self {
        Self::map_name(&self.0, |c| {
            if c.is_ascii_alphanumeric() || "_-".contains(c) {
                c
            } else {
                '_'
            }
        })
    }

    /// Applies `f` to each character of the last path component
    fn map_name(path: &str, f: impl Fn(char) -> char) -> Self {
        let (dir, name) = match path.rsplit_once('/') {
            Some((d, n)) => (Some(d), n),
            None => (None, path),
        };
        let name: String = name.chars().map(f).collect();
        Self(match dir {
            Some(d) => format!("{d}/{name}"),
            None => name,
        })
    }

    /// The path as a string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RemoteArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod test {
    use super::RemoteArtifact;

    fn component_ok(name: &str, extra: &str) -> bool {
        name.split('/')
            .filter(|c| !c.is_empty())
            .all(|c| c.chars().all(|ch| ch.is_ascii_alphanumeric() || extra.contains(ch)))
    }

    #[test]
    fn generated_names_are_filename_safe() {
        let a = RemoteArtifact::generate("/tmp");
        assert!(a.as_str().starts_with("/tmp/speedtest-ssh_"));
        assert!(a.as_str().ends_with(".tmp"));
        assert!(component_ok(a.as_str(), "_.-"), "{a}");
        let r = a.restricted();
        assert!(component_ok(r.as_str(), "_-"), "{r}");
        assert!(r.as_str().starts_with("/tmp/speedtest-ssh_"));
    }

    #[test]
    fn names_differ() {
        let a = RemoteArtifact::generate("/tmp/");
        let b = RemoteArtifact::generate("/tmp/");
        assert_ne!(a, b);
        assert!(!a.as_str().contains("//"));
    }

    #[test]
    fn colons_and_spaces() {
        let a = RemoteArtifact::from_raw("/tmp/speedtest-ssh_2024-01-02 03:04:05.678_x y.tmp");
        assert_eq!(
            a.as_str(),
            "/tmp/speedtest-ssh_2024-01-02_03-04-05.678_x_y.tmp"
        );
        let r = a.restricted();
        assert_eq!(
            r.as_str(),
            "/tmp/speedtest-ssh_2024-01-02_03-04-05_678_x_y_tmp"
        );
        assert!(component_ok(r.as_str(), "_.-"));
    }

    #[test]
    fn restricted_keeps_directory() {
        let a = RemoteArtifact::from_raw("/var/tmp/.scratch/x.tmp");
        assert_eq!(a.restricted().as_str(), "/var/tmp/.scratch/x_tmp");
        assert_eq!(RemoteArtifact::from_raw("x.y").restricted().as_str(), "x_y");
    }

    #[test]
    fn restricted_rewrites_punctuation() {
        let a = RemoteArtifact::from_raw("/tmp/a'b;c$d(e).tmp");
        assert_eq!(a.restricted().as_str(), "/tmp/a_b_c_d_e__tmp");
    }

    #[test]
    fn directory_kept_verbatim() {
        let a = RemoteArtifact::generate("/my dir:2/");
        assert!(a.as_str().starts_with("/my dir:2/speedtest-ssh_"), "{a}");
        let name = a.as_str().rsplit('/').next().unwrap();
        assert!(!name.contains(' ') && !name.contains(':'), "{a}");
        let r = a.restricted();
        assert!(r.as_str().starts_with("/my dir:2/speedtest-ssh_"), "{r}");
        assert!(!r.as_str().ends_with(".tmp"));
    }
}
