//! Command line interface for the CLMM position keeper.

mod config;
mod ops;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use clmm_keeper_data::Database;
use clmm_keeper_engine::context::EngineContext;
use config::KeeperConfig;
use dotenv::dotenv;
use ops::{Keeper, parse_position_pair, parse_protocol, parse_urgency};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "keeper-cli")]
#[command(about = "Automated CLMM position keeper", long_about = None)]
struct Cli {
    /// Pool protocol: orca or meteora
    #[arg(short, long, global = true, default_value = "orca")]
    protocol: String,

    /// Inclusion urgency: low, medium, high, very-high
    #[arg(short, long, global = true, default_value = "medium")]
    urgency: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open and fund a position
    Open {
        /// Pool address
        #[arg(long)]
        pool: String,
        /// Lower tick (Orca) or bin id (Meteora)
        #[arg(long)]
        lower: i32,
        /// Upper tick (Orca) or bin id (Meteora)
        #[arg(long)]
        upper: i32,
        /// Token A amount, raw units
        #[arg(long, default_value_t = 0)]
        amount_a: u64,
        /// Token B amount, raw units
        #[arg(long, default_value_t = 0)]
        amount_b: u64,
    },
    /// Drain and close a position
    Close {
        /// Position address
        #[arg(long)]
        position: String,
        /// Pool address
        #[arg(long)]
        pool: String,
    },
    /// Drain and close many positions concurrently
    CloseAll {
        /// POSITION:POOL pairs, repeatable
        #[arg(long = "pair", required = true)]
        pairs: Vec<String>,
    },
    /// Move a position to a new range in one transaction
    Rebalance {
        /// Position address
        #[arg(long)]
        position: String,
        /// Pool address
        #[arg(long)]
        pool: String,
        /// New lower tick or bin id
        #[arg(long)]
        lower: i32,
        /// New upper tick or bin id
        #[arg(long)]
        upper: i32,
        /// Token A amount for the new position, raw units
        #[arg(long, default_value_t = 0)]
        amount_a: u64,
        /// Token B amount for the new position, raw units
        #[arg(long, default_value_t = 0)]
        amount_b: u64,
    },
    /// Collect fees and rewards without touching liquidity
    Harvest {
        /// Position address
        #[arg(long)]
        position: String,
        /// Pool address
        #[arg(long)]
        pool: String,
    },
    /// Decode and value an already-landed transaction
    Summarize {
        /// Transaction signature, base58
        signature: String,
    },
}

fn pubkey(raw: &str) -> Result<Pubkey> {
    Pubkey::from_str(raw).map_err(|e| anyhow!("bad address {raw:?}: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let protocol = parse_protocol(&cli.protocol)?;
    let urgency = parse_urgency(&cli.urgency)?;

    let config = KeeperConfig::from_env()?;
    let wallet = solana_sdk::signature::read_keypair_file(&config.keypair_path)
        .map_err(|e| anyhow!("reading keypair {}: {e}", config.keypair_path))?;
    let rpc = Arc::new(RpcClient::new(config.rpc_url.clone()));
    let ctx = Arc::new(EngineContext::new(rpc, Arc::new(wallet), config.engine));

    let db = match &config.database_url {
        Some(url) => {
            let db = Database::connect(url).await.context("connecting database")?;
            db.migrate().await.context("running migrations")?;
            Some(db)
        }
        None => None,
    };
    let keeper = Keeper { ctx, db };

    match cli.command {
        Commands::Open {
            pool,
            lower,
            upper,
            amount_a,
            amount_b,
        } => {
            keeper
                .open(protocol, pubkey(&pool)?, lower, upper, amount_a, amount_b, urgency)
                .await?;
        }
        Commands::Close { position, pool } => {
            keeper
                .close(protocol, pubkey(&position)?, pubkey(&pool)?, urgency)
                .await?;
        }
        Commands::CloseAll { pairs } => {
            let positions = pairs
                .iter()
                .map(|p| parse_position_pair(p))
                .collect::<Result<Vec<_>>>()?;
            let total = positions.len();
            let closed = keeper.close_all(protocol, positions, urgency).await?;
            info!(closed, total, "close-all finished");
            if closed < total {
                return Err(anyhow!("{} of {total} positions failed to close", total - closed));
            }
        }
        Commands::Rebalance {
            position,
            pool,
            lower,
            upper,
            amount_a,
            amount_b,
        } => {
            keeper
                .rebalance(
                    protocol,
                    pubkey(&position)?,
                    pubkey(&pool)?,
                    lower,
                    upper,
                    amount_a,
                    amount_b,
                    urgency,
                )
                .await?;
        }
        Commands::Harvest { position, pool } => {
            keeper
                .harvest(protocol, pubkey(&position)?, pubkey(&pool)?, urgency)
                .await?;
        }
        Commands::Summarize { signature } => {
            keeper.summarize_signature(&signature).await?;
        }
    }
    Ok(())
}
