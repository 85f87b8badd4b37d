//! Remote connection parameters
// (c) 2024 Ross Younger

use std::fmt::Debug;

/// Everything we need to know to reach the remote host.
///
/// These are resolved before a measurement starts and do not change afterwards.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectionParameters {
    host: String,
    user: Option<String>,
    password: Option<String>,
    port: Option<u16>,
}

impl ConnectionParameters {
    /// Constructor.
    ///
    /// `host` may be given as `user@host`; an explicit `user` takes priority over one embedded in the host.
    #[must_use]
    pub fn new(
        host: &str,
        user: Option<String>,
        password: Option<String>,
        port: Option<u16>,
    ) -> Self {
        let (embedded_user, host) = match host.split_once('@') {
            Some((u, h)) if !u.is_empty() => (Some(u.to_string()), h),
            _ => (None, host),
        };
        Self {
            host: host.to_string(),
            user: user.or(embedded_user),
            password,
            port,
        }
    }

    /// The hostname (or address) of the remote
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }
    /// The remote username, if one was given
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }
    /// The password, if one was given
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
    /// The ssh port, if one was given
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// The `[user@]host` form that ssh-like tools expect
    #[must_use]
    pub fn user_host(&self) -> String {
        match &self.user {
            Some(u) => format!("{u}@{}", self.host),
            None => self.host.clone(),
        }
    }
}

impl Debug for ConnectionParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionParameters")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("port", &self.port)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::ConnectionParameters;

    #[test]
    fn plain_host() {
        let p = ConnectionParameters::new("myhost", None, None, None);
        assert_eq!(p.host(), "myhost");
        assert!(p.user().is_none());
        assert_eq!(p.user_host(), "myhost");
    }

    #[test]
    fn embedded_user() {
        let p = ConnectionParameters::new("fred@myhost", None, None, Some(2222));
        assert_eq!(p.host(), "myhost");
        assert_eq!(p.user(), Some("fred"));
        assert_eq!(p.user_host(), "fred@myhost");
        assert_eq!(p.port(), Some(2222));
    }

    #[test]
    fn explicit_user_wins() {
        let p = ConnectionParameters::new("fred@myhost", Some("wilma".into()), None, None);
        assert_eq!(p.user_host(), "wilma@myhost");
    }

    #[test]
    fn password_not_in_debug() {
        let p = ConnectionParameters::new("h", None, Some("hunter2".into()), None);
        let s = format!("{p:?}");
        assert!(!s.contains("hunter2"));
        assert!(s.contains("<redacted>"));
        assert_eq!(p.password(), Some("hunter2"));
    }
}
