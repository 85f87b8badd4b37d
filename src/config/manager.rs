//! Configuration file wrangling
// (c) 2024 Ross Younger

use super::{structure::FIELD_NAMES, Configuration};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    value::Value,
    Figment, Metadata, Provider,
};
use serde::Deserialize;
use std::{fmt::Display, path::Path};
use tabled::{settings::style::Style, Table, Tabled};

use tracing::trace;

use crate::os::{AbstractPlatform as _, Platform};

/// Environment variable prefix for configuration fields, e.g. `SPEEDTEST_SSH_DURATION`
pub(crate) const ENV_PREFIX: &str = "SPEEDTEST_SSH_";

// SYSTEM DEFAULTS //////////////////////////////////////////////////////////////////////////////////////////////

/// A `[https://docs.rs/figment/latest/figment/trait.Provider.html](figment::Provider)` that holds
/// our set of fixed system default options
#[derive(Debug, Default)]
struct SystemDefault {}

impl SystemDefault {
    const META_NAME: &str = "default";
}

impl Provider for SystemDefault {
    fn metadata(&self) -> Metadata {
        figment::Metadata::named(Self::META_NAME)
    }

    fn data(
        &self,
    ) -> std::result::Result<
        figment::value::Map<figment::Profile, figment::value::Dict>,
        figment::Error,
    > {
        Serialized::defaults(Configuration::default()).data()
    }
}

// CONFIG MANAGER /////////////////////////////////////////////////////////////////////////////////////////////

/// Processes and merges all possible configuration sources.
///
/// In increasing order of priority:
/// 1. Hard-wired defaults
/// 2. The system configuration file
/// 3. The user configuration file
/// 4. Environment variables (`SPEEDTEST_SSH_<FIELD>`)
/// 5. Anything merged in later, typically command-line options
///
/// Configuration file locations are platform-dependent.
/// To see what applies on the current platform, run `speedtest-ssh --config-files`.
#[derive(Debug, Default)]
pub struct Manager {
    /// Configuration data
    data: Figment,
}

fn add_file(f: Figment, path: Option<&Path>) -> Figment {
    let Some(path) = path else {
        return f;
    };
    if !path.exists() {
        trace!("configuration file {path:?} not present");
        return f;
    }
    f.merge(Toml::file(path))
}

fn env_provider() -> Env {
    // The password has its own handling and must never be echoed back by --show-config
    Env::prefixed(ENV_PREFIX).filter(|k| !k.as_str().eq_ignore_ascii_case("password"))
}

impl Manager {
    /// Initialises this structure, reading the set of config files appropriate to the platform
    /// and the current user.
    #[must_use]
    pub fn new() -> Self {
        let mut data = Figment::new().merge(SystemDefault::default());
        data = add_file(data, Platform::system_config_path().as_deref());
        // N.B. This may leave data in a fused-error state, if a data file isn't parseable.
        data = add_file(data, Platform::user_config_path().as_deref());
        data = data.merge(env_provider());
        Self { data }
    }

    /// Testing/internal constructor, does not read files or environment
    #[must_use]
    pub fn without_files() -> Self {
        let data = Figment::new().merge(SystemDefault::default());
        Self { data }
    }

    /// Returns the list of configuration files we read.
    ///
    /// This is a function of platform and the current user id.
    #[must_use]
    pub fn config_files() -> Vec<String> {
        [Platform::system_config_path(), Platform::user_config_path()]
            .into_iter()
            .flatten()
            .map(|p| p.into_os_string().to_string_lossy().into())
            .collect()
    }

    /// Merges in a data set, which is some sort of [figment::Provider](https://docs.rs/figment/latest/figment/trait.Provider.html).
    pub fn merge_provider<T>(&mut self, provider: T)
    where
        T: Provider,
    {
        let f = std::mem::take(&mut self.data);
        self.data = f.merge(provider); // in the error case, this leaves the provider in a fused state
    }

    /// Merges in a data set from a TOML file
    pub fn merge_toml_file<T>(&mut self, toml: T)
    where
        T: AsRef<Path>,
    {
        self.merge_provider(Toml::file_exact(toml.as_ref()));
    }

    /// Attempts to extract a particular struct from the data.
    ///
    /// Within this crate `T` is usually [Configuration], but it isn't intrinsically required to be.
    pub fn get<'de, T>(&self) -> std::result::Result<T, figment::Error>
    where
        T: Deserialize<'de>,
    {
        self.data.extract::<T>()
    }
}

// PRETTY PRINT SUPPORT ///////////////////////////////////////////////////////////////////////////////////////

#[derive(Tabled)]
struct PrettyConfig {
    field: String,
    value: String,
    source: String,
}

impl PrettyConfig {
    fn render_source(meta: Option<&Metadata>) -> String {
        if let Some(m) = meta {
            m.source
                .as_ref()
                .map_or_else(|| m.name.to_string(), figment::Source::to_string)
        } else {
            String::new()
        }
    }

    fn render_value(value: &Value) -> String {
        match value {
            Value::String(_tag, s) => s.to_string(),
            Value::Char(_tag, c) => c.to_string(),
            Value::Bool(_tag, b) => b.to_string(),
            Value::Num(_tag, num) => {
                if let Some(i) = num.to_i128() {
                    i.to_string()
                } else if let Some(u) = num.to_u128() {
                    u.to_string()
                } else if let Some(ff) = num.to_f64() {
                    ff.to_string()
                } else {
                    "<number>".into()
                }
            }
            Value::Empty(_tag, _) => "<empty>".into(),
            Value::Dict(_tag, _dict) => "<table>".into(),
            Value::Array(_tag, vec) => {
                format!(
                    "[{}]",
                    vec.iter()
                        .map(PrettyConfig::render_value)
                        .collect::<Vec<_>>()
                        .join(",")
                )
            }
        }
    }
}

impl Display for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut output = Vec::<PrettyConfig>::new();
        for field in FIELD_NAMES {
            let value = match self.data.find_value(field) {
                Ok(v) => v,
                Err(e) => {
                    writeln!(f, "error on field {field}: {e}")?;
                    continue;
                }
            };
            let meta = self.data.find_metadata(field);
            output.push(PrettyConfig {
                field: (*field).into(),
                value: PrettyConfig::render_value(&value),
                source: PrettyConfig::render_source(meta),
            });
        }
        write!(f, "{}", Table::new(output).with(Style::sharp()))
    }
}

#[cfg(test)]
mod test {
    use crate::config::{Configuration, Manager, Overrides};
    use crate::transfer::Mode;
    use crate::util::make_test_tempfile;
    use figment::providers::Serialized;

    #[test]
    fn defaults() {
        let mgr = Manager::without_files();
        let result: Configuration = mgr.get().unwrap();
        assert_eq!(result, Configuration::default());
    }

    #[test]
    fn cli_overrides_defaults() {
        let entered = Overrides {
            duration: Some(5),
            mode: Some(Mode::Ssh),
            ..Default::default()
        };
        let mut mgr = Manager::without_files();
        mgr.merge_provider(Serialized::defaults(entered));
        let result: Configuration = mgr.get().unwrap();
        assert_eq!(
            result,
            Configuration {
                duration: 5,
                mode: Mode::Ssh,
                ..Default::default()
            }
        );
    }

    #[test]
    fn file_then_cli() {
        let (path, _dir) = make_test_tempfile(
            r#"
            duration = 7
            ping = true
            mode = "SSH"
            remote_dir = "/var/tmp"
            "#,
            "test.toml",
        );
        let mut mgr = Manager::without_files();
        mgr.merge_toml_file(&path);
        let result: Configuration = mgr.get().unwrap();
        assert_eq!(result.duration, 7);
        assert!(result.ping);
        assert_eq!(result.mode, Mode::Ssh);
        assert_eq!(result.remote_dir, "/var/tmp");

        mgr.merge_provider(Serialized::defaults(Overrides {
            duration: Some(3),
            ..Default::default()
        }));
        let result: Configuration = mgr.get().unwrap();
        assert_eq!(result.duration, 3);
        assert!(result.ping);
    }

    #[test]
    fn bad_value() {
        let (path, _dir) = make_test_tempfile(r#"mode = "carrier-pigeon""#, "test.toml");
        let mut mgr = Manager::without_files();
        mgr.merge_toml_file(&path);
        assert!(mgr.get::<Configuration>().is_err());
    }

    #[test]
    fn display_shows_sources() {
        let (path, _dir) = make_test_tempfile("ping_count = 4", "test.toml");
        let mut mgr = Manager::without_files();
        mgr.merge_toml_file(&path);
        let s = mgr.to_string();
        assert!(s.contains("ping_count"));
        assert!(s.contains("test.toml"));
        assert!(s.contains("default"));
    }
}
