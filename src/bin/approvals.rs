use anyhow::Result;
use approval_indexer::config::Config;
use approval_indexer::error::ApprovalError;
use approval_indexer::explorer::EtherscanClient;
use approval_indexer::query::commands::{
    AllowanceQuery, cmd_add, cmd_allowance, cmd_batch_revoke, cmd_chains, cmd_delete, cmd_list,
    cmd_records, cmd_revoke, cmd_show,
};
use approval_indexer::query::formatters::OutputFormat;
use approval_indexer::service::{ApprovalService, CreateApprovalRequest, open_store};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "approvals")]
#[command(about = "Discover and manage token approvals granted by a wallet", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a wallet's history for approvals and store them
    List {
        wallet: String,
        #[arg(long, default_value = "ethereum")]
        chain: String,
    },
    Show {
        id: i64,
    },
    Revoke {
        id: i64,
    },
    BatchRevoke {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<i64>,
    },
    Delete {
        id: i64,
    },
    /// Record an approval by hand
    Add {
        #[arg(long)]
        wallet: String,
        #[arg(long)]
        contract: String,
        #[arg(long)]
        spender: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        symbol: String,
        #[arg(long, default_value = "Token")]
        token_type: String,
        #[arg(long)]
        amount: String,
        #[arg(long, default_value = "ethereum")]
        chain: String,
        #[arg(long, default_value = "false")]
        unlimited: bool,
        #[arg(long)]
        user_id: Option<i64>,
    },
    /// Stored records, without scanning
    Records {
        #[arg(long)]
        user_id: Option<i64>,
        #[arg(long)]
        chain: Option<String>,
    },
    /// Current on-chain allowance of an ERC20 token
    Allowance {
        wallet: String,
        contract: String,
        spender: String,
        #[arg(long, default_value = "ethereum")]
        chain: String,
    },
    Chains,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<ApprovalError>() {
            Some(err) if err.is_client_error() => eprintln!("{err}"),
            _ => eprintln!("Internal error: {e:#}"),
        }
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let format = OutputFormat::from(cli.format.as_str());

    let config = Config::from_env()?;
    let store = open_store(&config)?;
    let explorer = Arc::new(EtherscanClient::new(
        config.request_timeout,
        config.max_retries,
    )?);
    info!("Using {:?} storage", config.storage_backend);

    let service = ApprovalService::new(&config, explorer, store);

    match cli.command {
        Commands::List { wallet, chain } => {
            cmd_list(&service, &wallet, &chain, &format).await?;
        }
        Commands::Show { id } => {
            cmd_show(&service, id, &format).await?;
        }
        Commands::Revoke { id } => {
            cmd_revoke(&service, id).await?;
        }
        Commands::BatchRevoke { ids } => {
            cmd_batch_revoke(&service, &ids, &format).await?;
        }
        Commands::Delete { id } => {
            cmd_delete(&service, id).await?;
        }
        Commands::Add {
            wallet,
            contract,
            spender,
            name,
            symbol,
            token_type,
            amount,
            chain,
            unlimited,
            user_id,
        } => {
            let request = CreateApprovalRequest {
                user_id,
                wallet_address: wallet,
                contract_address: contract,
                token_name: name,
                token_symbol: symbol,
                token_type,
                spender_address: spender,
                approved_amount: amount,
                chain,
                is_unlimited: unlimited,
            };
            cmd_add(&service, request, &format).await?;
        }
        Commands::Records { user_id, chain } => {
            cmd_records(&service, user_id, chain.as_deref(), &format).await?;
        }
        Commands::Allowance {
            wallet,
            contract,
            spender,
            chain,
        } => {
            let query = AllowanceQuery {
                wallet,
                contract,
                spender,
                chain,
            };
            cmd_allowance(&service, query, &format).await?;
        }
        Commands::Chains => {
            cmd_chains(&service, &format)?;
        }
    }

    Ok(())
}
