use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "streamgated",
    about = "Streamgated — stream key authority and publish gatekeeper for an RTMP ingest server",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Streamgate HTTP server
    Serve {
        /// Port to listen on (default: $STREAMGATE_PORT or 8000)
        #[arg(long, env = "STREAMGATE_PORT", default_value = "8000")]
        port: u16,
        /// Host to bind (default: $STREAMGATE_HOST or 0.0.0.0)
        #[arg(long, env = "STREAMGATE_HOST", default_value = "0.0.0.0")]
        host: String,
        /// Log level: error, warn, info, debug (default: $STREAMGATE_LOG_LEVEL or info)
        #[arg(long, env = "STREAMGATE_LOG_LEVEL")]
        log_level: Option<String>,
    },
    /// Assign a stream key to a publisher, writing straight to the ledger
    /// file. Provisioning path for operators without the HTTP admin surface.
    Assign {
        /// Publisher display name
        name: String,
        /// Explicit stream key (omit to generate one)
        #[arg(long)]
        key: Option<String>,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let effective_log_level = match &cli.command {
        Commands::Serve { log_level, .. } => log_level
            .clone()
            .or_else(|| std::env::var("STREAMGATE_LOG_LEVEL").ok())
            .unwrap_or_else(|| "info".into()),
        _ => std::env::var("STREAMGATE_LOG_LEVEL").unwrap_or_else(|_| "warn".into()),
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&effective_log_level))
        .init();

    match cli.command {
        Commands::Serve {
            port,
            host,
            log_level: _,
        } => cmd_serve(host, port).await,

        Commands::Assign { name, key } => cmd_assign(name, key),
    }
}

// ── Command implementations ───────────────────────────────────────────────────

async fn cmd_serve(host: String, port: u16) -> Result<()> {
    let cfg = streamgate_server::ServerConfig {
        host,
        port,
        ..Default::default()
    };

    streamgate_server::run(cfg).await
}

fn cmd_assign(name: String, key: Option<String>) -> Result<()> {
    // Resolve data directory the same way the server does.
    let data_dir_env = std::env::var("STREAMGATE_DATA_DIR").ok().map(Into::into);
    let data_dir = streamgate_server::dirs::resolve_data_dir(data_dir_env.as_ref())?;

    let ledger = streamgate_server::store::KeyLedger::open(data_dir.join("keys.json"))?;
    let (key, generated) = ledger.upsert(&name, key.as_deref())?;

    if generated {
        println!("generated key for '{}': {key}", name.trim());
    } else {
        println!("stored supplied key for '{}'", name.trim());
    }
    Ok(())
}
