use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use speech_duplex::{create_router, AppState, Config, CredentialCache, HttpCredentialSource};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "speech-duplex")]
#[command(about = "Real-time speech recognition and synthesis pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the credential issuing service
    Serve {
        /// Config file (extension optional)
        #[arg(short, long, default_value = "config/speech-duplex")]
        config: String,
    },
    /// Fetch a speech credential the way clients do and print it
    Token {
        /// Issuing endpoint (defaults to speech.token_endpoint)
        #[arg(short, long)]
        endpoint: Option<String>,

        #[arg(short, long, default_value = "config/speech-duplex")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Serve { config } => serve(&config).await,
        Command::Token { endpoint, config } => token(endpoint, &config).await,
    }
}

async fn serve(path: &str) -> Result<()> {
    let cfg = Config::load(path)?;
    info!("Loaded config: {}", cfg.service.name);

    let state = AppState::from_config(&cfg);
    if state.issuer.is_none() {
        warn!("No speech key configured; /api/speech-token will answer 400");
    }

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")
}

async fn token(endpoint: Option<String>, path: &str) -> Result<()> {
    let endpoint = match endpoint {
        Some(endpoint) => endpoint,
        None => Config::load(path)?.speech.token_endpoint,
    };

    let cache = CredentialCache::new(Arc::new(HttpCredentialSource::new(endpoint)));
    let credential = cache.get_credential().await?;

    println!("region:  {}", credential.region);
    match credential.expires_at_utc() {
        Some(at) => println!("expires: {}", at.to_rfc3339()),
        None => println!("expires: unknown (malformed token)"),
    }
    Ok(())
}
