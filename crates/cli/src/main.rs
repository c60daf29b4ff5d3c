use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mintline")]
#[command(about = "SMS/WhatsApp agent webhook with on-chain reply minting", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the webhook server (POST /sms and /whatsapp). Requires the collaborator
    /// credentials in the environment; exits listing any that are missing.
    Serve {
        /// Config file path (default: MINTLINE_CONFIG_PATH or ~/.mintline/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config or 3000; PORT env also applies)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Print a minted token's metadata via the contract's tokenURI getter.
    TokenUri {
        /// Token id (the reply's timestamp in milliseconds)
        id: u64,

        /// Config file path (default: MINTLINE_CONFIG_PATH or ~/.mintline/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("mintline {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Serve { config, port }) => {
            validate_environment();
            if let Err(e) = run_serve(config, port).await {
                log::error!("serve failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::TokenUri { id, config }) => {
            if let Err(e) = run_token_uri(id, config).await {
                log::error!("token-uri failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

/// Fatal startup check: print every missing required variable, then exit non-zero.
fn validate_environment() {
    let missing = lib::config::missing_required_env();
    if missing.is_empty() {
        return;
    }
    eprintln!("Error: Required environment variables are not set");
    for name in missing {
        eprintln!("{}=your_{}_here", name, name.to_lowercase());
    }
    std::process::exit(1);
}

async fn run_serve(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let mut config = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    let secrets = lib::config::Secrets::from_env()?;
    log::info!(
        "starting webhook server on {}:{}",
        config.gateway.bind,
        lib::config::resolve_port(&config)
    );
    lib::gateway::run_gateway(config, secrets).await
}

async fn run_token_uri(id: u64, config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let config = lib::config::load_config(config_path)?;
    let rpc_url = lib::config::resolve_chain_rpc_url(&config.chain)
        .ok_or_else(|| anyhow::anyhow!("CHAIN_RPC_URL is not set"))?;
    let contract_address: ethers_core::types::Address =
        lib::config::resolve_contract_address(&config.chain).parse()?;
    let evm = lib::chain::EvmClient::new(rpc_url);
    let contract = lib::chain::NftContract::new(
        contract_address,
        evm,
        config.chain.gas_limit.unwrap_or(300_000),
    );
    let uri = contract
        .token_uri(ethers_core::types::U256::from(id))
        .await?;
    println!("{}", uri);
    Ok(())
}
