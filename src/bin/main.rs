//! `gas-refund-distributor` binary: `run` drives one full orchestrator
//! round against the configured chains; `show-config` prints the
//! resolved configuration for inspection.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use gas_refund::chain::ChainId;
use gas_refund::config::Config;
use gas_refund::logger::setup_logger;

#[derive(Parser)]
#[command(name = "gas-refund-distributor", version, about)]
struct Cli {
    /// Path to a TOML config file; defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Runs one orchestrator round: ingestion across all configured
    /// chains, a global re-validation pass, then Merkle sealing.
    Run,
    /// Prints the resolved configuration as TOML and exits.
    ShowConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::ShowConfig => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Run => {
            setup_logger(&config.log_filter);
            tracing::info!(chains = ?config.chains, "starting gas-refund-distributor run");
            run(&config).await
        }
    }
}

/// Assembles the real (non-fake) collaborators from `config.endpoints` and
/// drives one orchestrator round across every configured chain.
async fn run(config: &Config) -> anyhow::Result<()> {
    #[cfg(feature = "sqlite")]
    {
        use gas_refund::external::blockinfo::{BlockInfoService, HttpBlockInfoService};
        use gas_refund::external::explorer::HttpGasExplorer;
        use gas_refund::external::price_oracle::HttpPriceOracle;
        use gas_refund::external::stake::{HttpStakeSource, StakeSource};
        use gas_refund::external::subgraph::HttpSwapsSubgraph;
        use gas_refund::ingestion::IngestionContext;
        use gas_refund::stake::StakeAggregator;

        let db = gas_refund::db::SqliteDatabase::connect(&config.database_url).await?;
        let lock = gas_refund::external::lock::InProcessLock::default();
        let client = reqwest::Client::builder().timeout(config.http.timeout).build()?;

        let mut subgraph_endpoints = HashMap::new();
        let mut explorer_endpoints = HashMap::new();
        let mut price_oracle_endpoints = HashMap::new();
        let mut block_info_endpoints = HashMap::new();
        for chain in &config.chains {
            let endpoints = config
                .endpoints_for(*chain)
                .ok_or_else(|| anyhow::anyhow!("no endpoints configured for chain {chain}"))?;
            subgraph_endpoints.insert(*chain, endpoints.subgraph_url.clone());
            explorer_endpoints.insert(*chain, endpoints.explorer_url.clone());
            price_oracle_endpoints.insert(*chain, endpoints.price_oracle_url.clone());
            block_info_endpoints.insert(*chain, endpoints.block_info_url.clone());
        }

        let subgraph =
            HttpSwapsSubgraph::new(client.clone(), subgraph_endpoints, config.ingestion.page_size);
        let explorer = HttpGasExplorer::new(client.clone(), explorer_endpoints);
        let price_oracle = HttpPriceOracle::new(client.clone(), price_oracle_endpoints);
        let block_info = HttpBlockInfoService::new(client.clone(), block_info_endpoints);
        let windows = gas_refund::orchestrator::GenesisEpochWindowResolver::new(
            config.genesis_timestamp,
            config.epoch_length_seconds,
        );

        // SPSP and Safety Module staking contracts are global to the
        // deployment (not per aggregator chain); preloaded once over the
        // run's full block range, resolved against mainnet where both live.
        let now = chrono::Utc::now().timestamp();
        let start_block = block_info
            .block_after_timestamp(ChainId::Mainnet, config.genesis_timestamp)
            .await
            .map_err(|e| anyhow::anyhow!("failed to resolve run start block: {e}"))?;
        let end_block = block_info
            .block_after_timestamp(ChainId::Mainnet, now)
            .await
            .map_err(|e| anyhow::anyhow!("failed to resolve run end block: {e}"))?;

        let spsp_source = HttpStakeSource::new(client.clone(), config.spsp_url.clone());
        let sm_source = HttpStakeSource::new(client.clone(), config.safety_module_url.clone());
        let spsp_snapshot = spsp_source
            .preload(start_block, end_block)
            .await
            .map_err(|e| anyhow::anyhow!("failed to preload SPSP stake: {e}"))?;
        let sm_snapshot = sm_source
            .preload(start_block, end_block)
            .await
            .map_err(|e| anyhow::anyhow!("failed to preload Safety Module stake: {e}"))?;
        let stake = StakeAggregator::new(spsp_snapshot, sm_snapshot);

        // Reorg blacklists have no defined source contract in the spec;
        // an empty map disables reorg filtering until a deployment wires
        // its own reorg-detection feed in.
        let reorg_blacklist: HashMap<ChainId, std::collections::HashSet<String>> = HashMap::new();

        let mut ctx_by_chain = HashMap::new();
        for chain in &config.chains {
            ctx_by_chain.insert(
                *chain,
                IngestionContext {
                    subgraph: &subgraph,
                    explorer: &explorer,
                    block_info: &block_info,
                    price_oracle: &price_oracle,
                    stake: &stake,
                    reorg_blacklist: &reorg_blacklist,
                    gates: &config.epoch_gates,
                    caps: &config.budget_caps,
                    ingestion: &config.ingestion,
                    http: &config.http,
                },
            );
        }

        let results =
            gas_refund::orchestrator::run_round(&db, &lock, &windows, &ctx_by_chain, config).await;

        let mut any_failed = false;
        for result in results {
            match result.outcome {
                Ok(outcomes) => {
                    tracing::info!(chain = %result.chain, ?outcomes, "chain ingestion complete")
                }
                Err(e) => {
                    any_failed = true;
                    tracing::error!(chain = %result.chain, error = %e, "chain ingestion failed");
                }
            }
        }
        if any_failed {
            anyhow::bail!("one or more chains failed during this round");
        }
        Ok(())
    }
    #[cfg(not(feature = "sqlite"))]
    {
        anyhow::bail!("the `sqlite` feature must be enabled to run against a real database")
    }
}
