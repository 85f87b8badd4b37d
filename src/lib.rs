//! speedtest-ssh measures upload and download throughput, and optionally latency,
//! between this machine and a remote host reachable over ssh.
//!
//! A measurement repeatedly uploads and downloads a file of random data, growing the file
//! each time until the requested time budget is used up. The transfers themselves are made
//! either by streaming over an ssh session ([`transfer::DirectChannel`]) or by running rsync
//! ([`transfer::ExternalTool`]).
// (c) 2024 Ross Younger

mod cli;
pub use cli::cli;

pub mod config;
mod connection;
pub use connection::ConnectionParameters;
pub mod controller;
mod error;
pub use error::{Error, Result};
pub mod latency;
/// OS abstraction layer
pub mod os;
pub mod payload;
pub mod progress;
pub mod report;
pub mod session;
pub mod transfer;
/// Utilities
pub mod util;
