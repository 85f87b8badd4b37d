// speedtest-ssh command-line arguments
// (c) 2024 Ross Younger

use clap::Parser;

use crate::{config::Overrides, transfer::Mode, util::Verbosity, ConnectionParameters};

/// Environment variable which may carry the ssh password
pub(crate) const PASSWORD_ENV_VAR: &str = "SPEEDTEST_SSH_PASSWORD";

/// Options that switch us into another mode i.e. which don't require a host argument
pub(crate) const MODE_OPTIONS: &[&str] = &["show_config", "config_files"];

#[derive(Debug, Parser, Clone)]
#[command(
    author,
    version(env!("SPEEDTEST_SSH_VERSION_STRING")),
    about,
    before_help = "e.g.   speedtest-ssh -n 30 fred@my-server",
    infer_long_args(true)
)]
#[command(help_template(
    "\
{name} version {version}
{about-with-newline}
{usage-heading} {usage}
{before-help}
{all-args}{after-help}
"
))]
#[command(styles=super::styles::CLAP_STYLES)]
#[allow(clippy::struct_excessive_bools)]
pub(crate) struct CliArgs {
    // MODE SELECTION ======================================================================
    /// Outputs the configuration, then exits
    ///
    /// The table shows where each value came from: defaults, a configuration file, the environment or the command line.
    #[arg(long, help_heading("Configuration"))]
    pub show_config: bool,

    /// Outputs the paths to configuration file(s), then exits
    #[arg(long, help_heading("Configuration"))]
    pub config_files: bool,

    // CONNECTION ==========================================================================
    /// Remote username [default: as configured for ssh]
    ///
    /// Takes priority over a username given as part of HOST.
    #[arg(short, long, help_heading("Connection"))]
    pub user: Option<String>,

    /// Password for the remote host
    ///
    /// Requires `sshpass`. Prefer key-based authentication, or at least the environment variable;
    /// anything on the command line is visible to other users of this machine.
    #[arg(long, env = PASSWORD_ENV_VAR, hide_env_values = true, help_heading("Connection"))]
    pub password: Option<String>,

    /// Remote ssh port [default: as configured for ssh]
    #[arg(short, long, help_heading("Connection"))]
    pub port: Option<u16>,

    /// The ssh client program to use
    #[arg(long, help_heading("Connection"), value_name("PROGRAM"))]
    pub ssh: Option<String>,

    // MEASUREMENT =========================================================================
    /// Approximately how long the throughput test should take, in seconds [default: 20]
    #[arg(short = 'n', long, value_name("SECONDS"))]
    pub duration: Option<u32>,

    /// Transfer method [default: rsync]
    #[arg(short, long)]
    pub mode: Option<Mode>,

    /// Measures round-trip latency with `ping` before the throughput test
    #[arg(long)]
    pub ping: bool,

    /// The rsync program to use
    #[arg(long, value_name("PROGRAM"))]
    pub rsync: Option<String>,

    // OUTPUT ==============================================================================
    /// Quiet mode
    ///
    /// Switches off progress display; reports only errors and the results
    #[arg(short, long, action, conflicts_with_all(["verbose", "debug"]))]
    pub quiet: bool,

    /// Outputs more detail, including the external tools' own progress
    #[arg(short, long, action)]
    pub verbose: bool,

    /// Outputs additional statistics about the run
    #[arg(short = 's', long, alias("stats"), action, conflicts_with("quiet"))]
    pub statistics: bool,

    // DEBUG ===============================================================================
    /// Enable detailed debug output
    ///
    /// This has the same effect as setting `RUST_LOG=speedtest_ssh=trace` in the environment.
    /// If present, `RUST_LOG` overrides this option.
    #[arg(short, long, action, help_heading("Debug"))]
    pub debug: bool,

    /// Prints timing profile data after completion
    #[arg(long, action, help_heading("Debug"))]
    pub profile: bool,

    /// Log to a file
    ///
    /// By default the log receives everything printed to stderr.
    /// To override this behaviour, set the environment variable `RUST_LOG_FILE_DETAIL` (same semantics as `RUST_LOG`).
    #[arg(short('l'), long, action, help_heading("Debug"), value_name("FILE"))]
    pub log_file: Option<String>,

    // POSITIONAL ARGUMENTS ================================================================
    /// The remote host, as HOST or USER@HOST
    #[arg(
        conflicts_with_all(MODE_OPTIONS),
        required_unless_present_any(MODE_OPTIONS),
        value_name = "HOST"
    )]
    pub host: Option<String>,
}

impl CliArgs {
    pub(crate) fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.verbose, self.debug)
    }

    /// The configuration values given on the command line
    pub(crate) fn overrides(&self) -> Overrides {
        Overrides {
            duration: self.duration,
            mode: self.mode,
            ping: self.ping.then_some(true),
            ssh: self.ssh.clone(),
            rsync: self.rsync.clone(),
        }
    }

    pub(crate) fn connection(&self) -> anyhow::Result<ConnectionParameters> {
        let host = self
            .host
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("a remote host must be specified"))?;
        if host.is_empty() || host.ends_with('@') {
            anyhow::bail!("invalid remote host `{host}`");
        }
        Ok(ConnectionParameters::new(
            host,
            self.user.clone(),
            self.password.clone(),
            self.port,
        ))
    }
}
