use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use backend::HttpBackend;
use clap::Parser;
use config::Config;
use github::GithubApp;
use lifecycle::Coordinator;
use log::{debug, info, warn};
use tower_http::trace::TraceLayer;

mod api;
mod backend;
mod config;
mod events;
mod github;
mod lifecycle;
mod messages;
mod models;
mod patterns;
mod signature;
#[cfg(test)]
mod testing;
mod utils;

#[derive(Clone)]
pub struct AppState {
    coordinator: Coordinator,
    /// Secret shared with github to sign webhook deliveries
    webhook_secret: Option<String>,
}

impl AppState {
    pub fn new(coordinator: Coordinator, webhook_secret: Option<String>) -> AppState {
        AppState {
            coordinator,
            webhook_secret,
        }
    }

    pub fn init(config: &Config) -> AppState {
        let reqwest = reqwest::Client::new();

        let backend = HttpBackend::new(reqwest.clone(), &config.api_base_url);
        let github = GithubApp::new(
            reqwest,
            &config.github_api_url,
            config.app_id,
            &config.private_key,
        );
        let coordinator = Coordinator::new(Arc::new(backend), Arc::new(github), config.messages());

        if config.webhook_secret.is_none() {
            warn!("WEBHOOK_SECRET not set, webhook signatures will not be verified");
        }

        AppState::new(coordinator, config.webhook_secret.clone())
    }
}

#[derive(Parser, Debug)]
#[command(name = "payobvio")]
#[command(bin_name = "payobvio")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Flag to disable HTTPS
    #[arg(long)]
    no_https: bool,

    #[arg(long, env = "PORT", default_value_t = 3001)]
    port: u16,

    /// PEM certificate used when serving HTTPS
    #[arg(long, default_value = "certs/cert.pem")]
    cert: PathBuf,

    /// PEM private key used when serving HTTPS
    #[arg(long, default_value = "certs/key.pem")]
    key: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::builder().format_timestamp(None).init();

    if dotenvy::dotenv().is_err() {
        warn!("Error reading .env file");
    } else {
        debug!("Loaded env vars from .env");
    }

    let cli = Cli::parse();

    let config = Config::from_env()?;
    debug!(
        "backend at {}, github api at {}, cluster {}",
        config.api_base_url, config.github_api_url, config.solana_network
    );

    let app_state = AppState::init(&config);

    let app = Router::new()
        .nest("/payobvio-github-app", api::router())
        .with_state(app_state)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    if cli.no_https {
        info!("Starting server on {addr} with HTTPS disabled...");

        axum_server::bind(addr)
            .serve(app.into_make_service())
            .await
            .context("Server exited")?;
    } else {
        info!("Starting server on {addr} with HTTPS...");

        let rustls_config = RustlsConfig::from_pem_file(&cli.cert, &cli.key)
            .await
            .context("Couldn't load TLS certificate")?;

        axum_server::bind_rustls(addr, rustls_config)
            .serve(app.into_make_service())
            .await
            .context("Server exited")?;
    }

    Ok(())
}
