//! The `nexus` binary: `daemon` (persistent stdio loop) and `run`
//! (single-shot) subcommands (§6.2). Parse args, init tracing, build the
//! core, run it, propagate errors with `anyhow` at this boundary only.

mod cli;
mod config;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use nexus_backends::ReferenceBackendFactory;
use nexus_daemon::Daemon;

use cli::{Cli, DaemonArgs, RunArgs, TopCommand};

fn init_tracing(verbose: bool) {
	let filter = if verbose { "debug" } else { "info" };
	let env_filter =
		tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
	tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
	let cli = Cli::parse();
	match cli.command {
		TopCommand::Daemon(args) => run_daemon(args).await,
		TopCommand::Run(args) => run_single_shot(args).await,
	}
}

async fn run_daemon(args: DaemonArgs) -> anyhow::Result<ExitCode> {
	init_tracing(args.verbose);
	let config = config::load_config(args.config.as_deref())?;
	tracing::info!(?config, "starting nexus daemon");

	let factory = Arc::new(ReferenceBackendFactory);
	let mut daemon = Daemon::new(config, factory);
	nexus_daemon::run_stdio(&mut daemon).await?;
	Ok(ExitCode::SUCCESS)
}

async fn run_single_shot(args: RunArgs) -> anyhow::Result<ExitCode> {
	init_tracing(args.verbose);
	let config = config::load_config(args.config.as_deref())?;
	let request = args.to_request();

	let factory = Arc::new(ReferenceBackendFactory);
	let mut daemon = Daemon::new(config, factory);
	let response = daemon.handle_request(request).await;
	daemon.shutdown().await;

	println!("{}", response.to_line());
	Ok(if response.ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
