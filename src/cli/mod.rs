//! Command Line Interface for speedtest-ssh
// (c) 2024 Ross Younger
mod args;
mod cli_main;
pub(crate) mod styles;
pub use cli_main::cli;
