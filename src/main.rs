//! Skipper - backrunning relay bot
//!
//! ## Commands
//!
//! - `start`: poll the mempool, dispatch every transaction to the backrunner
//!   and serve the relay API until interrupted
//! - `withdraw`: reclaim the base token from the multihop contract and exit
//!
//! Both take `--config <dir> --multihop <address> --key <hex private key>`.

#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(unused_must_use)]

use alloy::primitives::Address;
use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, Instrument};
use zeroize::Zeroizing;

use skipper::bot::{Backrunner, Bot, NoopStrategy};
use skipper::chain::{ChainClient, RpcChainClient};
use skipper::config::BotConfig;
use skipper::dispatch::Dispatcher;
use skipper::feed::{PollingFeed, TransactionFeed};
use skipper::logging::{self, LogFormat};
use skipper::relay::{sink_for_policy, RelayConfig, RelayServer};
use skipper::tx_builder::{GasPolicy, TxBuilder};
use skipper::wallet::OperatorKey;
use skipper::withdraw::{explorer_link, withdraw};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "skipper", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the feed, the backrunner and the relay API
    Start(CommonArgs),
    /// Withdraw the base token from the multihop contract
    Withdraw(CommonArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Path to bot configuration directory
    #[arg(long, default_value = "./config")]
    config: PathBuf,

    /// Address of the multihop contract
    #[arg(long)]
    multihop: Option<String>,

    /// Private key used for signing transactions (must be the deployer of the multihop contract)
    #[arg(long)]
    key: Option<String>,
}

/// Validated operator identity, resolved before any command runs
struct Operator {
    multihop: Address,
    key: OperatorKey,
}

impl Operator {
    fn from_args(args: &CommonArgs) -> Result<Self> {
        let multihop = args
            .multihop
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .context("missing --multihop flag")?;
        let multihop = Address::from_str(multihop.trim())
            .with_context(|| format!("invalid --multihop address: {}", multihop))?;

        let key = args
            .key
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .map(|v| Zeroizing::new(v.to_string()))
            .context("missing --key flag")?;
        let key = OperatorKey::from_hex(&key)?;

        Ok(Self { multihop, key })
    }
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    if let Err(e) = run(cli).await {
        eprintln!("fatal: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Start(args) => {
            let operator = Operator::from_args(&args)?;
            start_command(&args, operator).await
        }
        Command::Withdraw(args) => {
            let operator = Operator::from_args(&args)?;
            withdraw_command(&args, operator).await
        }
    }
}

async fn start_command(args: &CommonArgs, operator: Operator) -> Result<()> {
    let config = BotConfig::load(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;
    let format: LogFormat = config.logging.format.parse()?;
    logging::init(format, &config.logging.level)?;

    serve(config, operator).instrument(logging::service_span()).await
}

async fn serve(config: BotConfig, operator: Operator) -> Result<()> {
    info!("Starting backrunner");

    let client: Arc<dyn ChainClient> = Arc::new(RpcChainClient::dial(&config.eth_rpc)?);
    let tx_builder = TxBuilder::connect(client, operator.key, GasPolicy::from(&config.gas))
        .await
        .context("failed to connect to the chain")?;

    let bot = Arc::new(Bot::new(
        Arc::new(NoopStrategy),
        Arc::new(tx_builder),
        operator.multihop,
    ));
    bot.start().await.context("backrunner failed to start")?;
    println!("backrunner listening for transactions...");

    let backrunner: Arc<dyn Backrunner> = bot;
    let (sink, relay_queue) = sink_for_policy(config.relay.forward_policy, Arc::clone(&backrunner));
    let relay = RelayServer::new(RelayConfig::from(&config), sink);
    let relay_addr = relay.start().await.context("relay API failed to start")?;
    println!("api listening for requests on {}...", relay_addr);

    let feed = PollingFeed::new(
        &config.cosmos_rpc,
        Duration::from_millis(config.poll_ms),
        Duration::from_millis(config.feed_timeout_ms),
    )?;
    let mut transactions = feed.subscribe();
    if let Some(queue) = relay_queue {
        transactions = futures::stream::select(transactions, queue).boxed();
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal");
                shutdown_tx.send_replace(true);
            }
        }
        .in_current_span(),
    );

    let dispatcher = Dispatcher::new(backrunner, config.dispatch.max_in_flight);
    let stats = dispatcher.run(transactions, shutdown_rx).await;

    relay.stop().await?;
    info!(received = stats.received, "Shut down gracefully");
    Ok(())
}

async fn withdraw_command(args: &CommonArgs, operator: Operator) -> Result<()> {
    let config = BotConfig::load(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;
    logging::init(LogFormat::Text, &config.logging.level)?;

    let client: Arc<dyn ChainClient> = Arc::new(RpcChainClient::dial(&config.eth_rpc)?);
    let builder = TxBuilder::connect(client, operator.key, GasPolicy::from(&config.gas))
        .await
        .context("failed to connect to the chain")?;

    let signed = withdraw(&builder, operator.multihop, config.base_token)
        .await
        .context("withdraw failed")?;

    println!("tx: {}", explorer_link(signed.hash()));
    Ok(())
}
