use std::env;

use anyhow::Context;

use crate::messages::Messages;

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_SOLANA_NETWORK: &str = "devnet";

/// Process wide settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the web app and its `/api` endpoints
    pub api_base_url: String,
    pub solana_network: String,
    pub github_api_url: String,
    pub app_id: u64,
    /// PEM encoded RSA key of the GitHub App
    pub private_key: String,
    pub webhook_secret: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        let app_id = required("APP_ID")?
            .parse::<u64>()
            .context("APP_ID must be a number")?;

        Ok(Config {
            api_base_url: required("WEB_API_HOST")?.trim_end_matches('/').to_owned(),
            solana_network: optional("SOLANA_NETWORK")
                .unwrap_or_else(|| DEFAULT_SOLANA_NETWORK.into()),
            github_api_url: optional("GITHUB_API_URL")
                .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.into())
                .trim_end_matches('/')
                .to_owned(),
            app_id,
            private_key: required("CLIENT_PRIVATE_KEY")?,
            webhook_secret: optional("WEBHOOK_SECRET"),
        })
    }

    pub fn messages(&self) -> Messages {
        Messages::new(&self.api_base_url, &self.solana_network)
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).with_context(|| format!("Couldn't get {key} env var"))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}
