//! adid operator daemon.

use adid_crypto::{signing_key_from_hex, PartnerDirectory};
use adid_protocol::OperatorConfig;
use adid_service::{build_router, AppState};
use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "adid-operator",
    about = "Operator side of the adid signed identity and preference exchange"
)]
struct Args {
    /// Socket address to listen on.
    #[arg(long, env = "ADID_LISTEN", default_value = "127.0.0.1:8080")]
    listen: SocketAddr,

    /// Hostname this operator signs responses as.
    #[arg(long, env = "ADID_HOST")]
    host: String,

    /// File holding the hex-encoded Ed25519 private key.
    #[arg(long, env = "ADID_PRIVATE_KEY_FILE")]
    private_key_file: PathBuf,

    /// JSON file mapping partner domains to hex-encoded public keys.
    #[arg(long, env = "ADID_PARTNERS_FILE")]
    partners_file: PathBuf,

    /// Reject signed requests whose timestamp is further than this many
    /// seconds from now. Unset means no freshness check.
    #[arg(long, env = "ADID_MAX_SKEW_SECS")]
    max_skew_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let key_hex = std::fs::read_to_string(&args.private_key_file)
        .with_context(|| format!("reading private key from {}", args.private_key_file.display()))?;
    let signing_key = signing_key_from_hex(&key_hex).context("parsing operator private key")?;

    let partners_json = std::fs::read_to_string(&args.partners_file)
        .with_context(|| format!("reading partner keys from {}", args.partners_file.display()))?;
    let partners =
        PartnerDirectory::from_json_str(&partners_json).context("parsing partner key directory")?;
    tracing::info!(partners = partners.len(), "loaded partner key directory");

    let mut config = OperatorConfig::new(args.host, signing_key);
    if let Some(secs) = args.max_skew_secs {
        config.max_timestamp_skew = Some(Duration::from_secs(secs));
    }

    let state = AppState::new(config, partners)?;
    let app = build_router(state);

    tracing::info!(listen = %args.listen, "adid operator listening");
    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
