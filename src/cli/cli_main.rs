// Main CLI entrypoint
// (c) 2024 Ross Younger

use std::process::ExitCode;

use super::{args::CliArgs, styles};

use crate::{
    config::{Configuration, Manager},
    progress::MAX_UPDATE_FPS,
    report::output_statistics,
    session::Session,
    util::setup_tracing,
};
use anstream::{eprintln, println};
use clap::Parser;
use figment::providers::Serialized;
use indicatif::{MultiProgress, ProgressDrawTarget};
use tracing::{error, info};

/// Main CLI entrypoint
pub fn cli() -> anyhow::Result<ExitCode> {
    let args = CliArgs::parse();
    if args.config_files {
        println!("{:?}", Manager::config_files());
        return Ok(ExitCode::SUCCESS);
    }

    let mut manager = Manager::new();
    manager.merge_provider(Serialized::defaults(args.overrides()));
    if args.show_config {
        println!("{manager}");
        return Ok(ExitCode::SUCCESS);
    }
    let config = match manager.get::<Configuration>() {
        Ok(c) => c,
        Err(e) => {
            eprintln!(
                "{}ERROR{}: {e}",
                styles::ERROR.render(),
                styles::ERROR.render_reset()
            );
            return Ok(ExitCode::FAILURE);
        }
    };
    run(&args, &config)
}

#[tokio::main(flavor = "current_thread")]
async fn run(args: &CliArgs, config: &Configuration) -> anyhow::Result<ExitCode> {
    let verbosity = args.verbosity();
    let progress = MultiProgress::with_draw_target(if verbosity.is_quiet() {
        ProgressDrawTarget::hidden()
    } else {
        ProgressDrawTarget::stderr_with_hz(MAX_UPDATE_FPS)
    });
    setup_tracing(verbosity, Some(&progress), args.log_file.as_deref())
        .inspect_err(|e| eprintln!("{e:?}"))?;

    let params = args.connection()?;
    let session = Session::new(&params, config, verbosity, &progress);
    match session.run().await {
        Ok(outcome) => {
            println!("{}", outcome.report);
            if args.statistics {
                output_statistics(&outcome.measurement);
            }
            if args.profile {
                info!("Elapsed time by phase:\n{}", outcome.timing);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("{e}");
            Ok(ExitCode::FAILURE)
        }
    }
}
