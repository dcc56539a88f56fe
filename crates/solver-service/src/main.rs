use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use solver_config::{Config, ConfigLoader};
use solver_core::{Dispatch, SolverBuilder};
use solver_discovery::implementations::replay::ReplayDiscovery;
use solver_types::OrderId;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "oif-solver")]
#[command(about = "Order lifecycle solver", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(short, long, value_name = "FILE", default_value = "config/local.toml")]
	config: PathBuf,

	#[arg(long, env = "SOLVER_LOG_LEVEL", default_value = "info")]
	log_level: String,
}

#[derive(Subcommand)]
enum Commands {
	/// Follow order status events and fulfill won orders
	Start,
	/// Validate the configuration file
	Validate,
	/// Process one order at its current ledger status, then exit
	Replay {
		#[arg(long)]
		order_id: String,
	},
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	setup_tracing(&cli.log_level)?;

	match cli.command {
		Some(Commands::Start) | None => start_solver(&cli.config).await,
		Some(Commands::Validate) => validate_config(&cli.config).await,
		Some(Commands::Replay { ref order_id }) => replay_order(&cli.config, order_id).await,
	}
}

async fn load_config(path: &Path) -> Result<Config> {
	info!("Loading configuration from: {:?}", path);
	ConfigLoader::new()
		.with_file(path)
		.load()
		.await
		.context("Failed to load configuration")
}

async fn start_solver(path: &Path) -> Result<()> {
	let config = load_config(path).await?;
	info!("Starting solver {}", config.solver.name);

	let engine = SolverBuilder::new(config)
		.build()
		.await
		.context("Failed to build solver engine")?;

	info!("Solver started");
	engine
		.run(setup_shutdown_signal())
		.await
		.context("Solver engine failed")?;

	Ok(())
}

async fn validate_config(path: &Path) -> Result<()> {
	let config = load_config(path).await?;

	info!("Configuration is valid");
	info!("Solver name: {}", config.solver.name);
	info!("Ledger contract: {}", config.ledger.contract_address);
	info!("Bid policy: {:?}", config.auction.bid_policy);
	info!(
		"Confirmation policy: {:?}",
		config.settlement.confirmation_policy
	);
	for (network, settings) in &config.networks {
		info!(
			"  Network {}: custody network {}, deposit address {}",
			network,
			settings.custody_network.as_deref().unwrap_or(network),
			settings
				.deposit_address
				.as_deref()
				.unwrap_or("(from payment API)")
		);
	}

	Ok(())
}

async fn replay_order(path: &Path, order_id: &str) -> Result<()> {
	let config = load_config(path).await?;

	// Replay reads the ledger directly and needs no event stream.
	let engine = SolverBuilder::new(config)
		.with_discovery(Arc::new(ReplayDiscovery::new(Vec::new())))
		.build()
		.await
		.context("Failed to build solver engine")?;

	let dispatch = engine
		.replay(&OrderId::new(order_id))
		.await
		.with_context(|| format!("Failed to replay order {}", order_id))?;

	match dispatch {
		Dispatch::Failed(reason) => anyhow::bail!("Replay of order {} failed: {}", order_id, reason),
		other => info!("Replay finished: {:?}", other),
	}
	Ok(())
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.try_init()
		.context("Failed to initialize tracing")?;

	Ok(())
}

async fn setup_shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			error!("Failed to listen for Ctrl+C: {}", e);
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut sigterm) => {
				sigterm.recv().await;
			}
			Err(e) => {
				warn!("Failed to install SIGTERM handler: {}", e);
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
	info!("Shutdown signal received");
}
