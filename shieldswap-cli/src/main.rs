//! shieldswap
//!
//! Operator tooling for the private swap orchestrator. Everything the wallet
//! does before it proves can be exercised from here:
//! 1. Prime and repair the proving artifact cache of a network
//! 2. Look up the cheapest relay for a fee token
//! 3. Quote the relay fee of a transaction of a given gas size
//! 4. Read the live gas price

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use ethers::types::{Address, U256};
use serde::Serialize;
use shieldswap_artifacts::{ArtifactCache, ArtifactStore, HttpArtifactFetcher};
use shieldswap_common::{NetworkConfig, NetworkName, NetworkRegistry, RelayQuote};
use shieldswap_engine::{ChainClient, EthersChainClient};
use shieldswap_relay::RelaySelector;
use shieldswap_tx::relay_fee;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{CliConfig, LogFormat};

const DEFAULT_LOG_FILTER: &str =
    "shieldswap=info,shieldswap_artifacts=info,shieldswap_engine=info,shieldswap_relay=info,shieldswap_tx=info";

#[derive(Parser)]
#[command(name = "shieldswap", about = "Private swap orchestrator tooling")]
struct Cli {
    /// Configuration file; defaults to ./shieldswap.toml when present.
    #[arg(long, global = true, env = "SHIELDSWAP_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured networks.
    Networks,
    /// Make sure the proving artifacts of a network are cached and valid.
    PrimeArtifacts(NetworkArgs),
    /// Find the cheapest relay accepting a fee token.
    Relays(FeeTokenArgs),
    /// Relay fee for a transaction of `--gas` units at the live gas price.
    QuoteFee(QuoteFeeArgs),
    /// Live gas price of a network.
    GasPrice(NetworkArgs),
}

#[derive(Args)]
struct NetworkArgs {
    #[arg(long)]
    network: String,
}

#[derive(Args)]
struct FeeTokenArgs {
    #[arg(long)]
    network: String,
    /// ERC-20 fee token; omit together with --native.
    #[arg(long, required_unless_present = "native")]
    fee_token: Option<Address>,
    /// Pay in the network's native token.
    #[arg(long)]
    native: bool,
}

#[derive(Args)]
struct QuoteFeeArgs {
    #[command(flatten)]
    token: FeeTokenArgs,
    #[arg(long, default_value_t = 500_000)]
    gas: u64,
}

#[derive(Serialize)]
struct FeeQuote {
    network: NetworkName,
    relay: RelayQuote,
    gas_estimate: U256,
    gas_price: U256,
    relay_fee: U256,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.as_deref())?;
    init_tracing(config.log_format);

    let registry = config.registry();
    match cli.command {
        Commands::Networks => print_json(&registry.iter().collect::<Vec<_>>()),
        Commands::PrimeArtifacts(args) => prime_artifacts(&config, &registry, &args.network).await,
        Commands::Relays(args) => {
            let quote = find_relay(&config, &registry, &args).await?;
            print_json(&quote)
        }
        Commands::QuoteFee(args) => quote_fee(&config, &registry, args).await,
        Commands::GasPrice(args) => {
            let network = network(&registry, &args.network)?;
            let price = EthersChainClient::new(&network.rpc_url)?
                .gas_price(network.gas_type)
                .await?;
            print_json(&serde_json::json!({ "network": network.name, "gas_price": price }))
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn network<'a>(registry: &'a NetworkRegistry, name: &str) -> Result<&'a NetworkConfig> {
    Ok(registry.get(&NetworkName::new(name))?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn prime_artifacts(config: &CliConfig, registry: &NetworkRegistry, name: &str) -> Result<()> {
    let network = network(registry, name)?;
    let store = ArtifactStore::persistent(config.artifact_db())
        .with_context(|| format!("failed to open {}", config.artifact_db().display()))?;
    let cache = ArtifactCache::new(store, Arc::new(HttpArtifactFetcher::new()), config.poi.clone());

    let report = cache.ensure_artifacts(network).await;
    if report.is_complete() {
        info!(network = %network.name, fetched = report.fetch_count(), "artifacts ready");
    } else {
        warn!(network = %network.name, failed = report.failed.len(), "artifacts incomplete");
    }
    print_json(&report)
}

async fn find_relay(config: &CliConfig, registry: &NetworkRegistry, args: &FeeTokenArgs) -> Result<RelayQuote> {
    let network = network(registry, &args.network)?;
    let relays = RelaySelector::for_networks(registry.clone(), None)?
        .with_lookup_timeout(config.relay_lookup_timeout());
    relays.ensure_connected(&network.name).await?;

    let token = args.fee_token.unwrap_or_default();
    relays
        .find_relay(&network.name, token, args.native)
        .await
        .ok_or_else(|| anyhow!("no relay on {} accepts that fee token", network.name))
}

async fn quote_fee(config: &CliConfig, registry: &NetworkRegistry, args: QuoteFeeArgs) -> Result<()> {
    let network = network(registry, &args.token.network)?;
    let relay = find_relay(config, registry, &args.token).await?;
    let gas_price = EthersChainClient::new(&network.rpc_url)?
        .gas_price(network.gas_type)
        .await?;
    let gas_estimate = U256::from(args.gas);

    print_json(&FeeQuote {
        network: network.name.clone(),
        relay_fee: relay_fee(&relay, gas_estimate, gas_price),
        relay,
        gas_estimate,
        gas_price,
    })
}
