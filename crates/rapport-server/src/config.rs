use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

/// Secrets that ship in sample `.env` files and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["", "changeme", "change-me", "secret", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub hub_queue: usize,
    pub cors_origin: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let host = var("RAPPORT_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = var("RAPPORT_PORT")
            .unwrap_or_else(|| "8090".into())
            .parse()
            .context("RAPPORT_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let jwt_secret = var("RAPPORT_JWT_SECRET").context("RAPPORT_JWT_SECRET must be set")?;
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.trim()) {
            bail!("RAPPORT_JWT_SECRET is a placeholder, set a real secret");
        }

        let hub_queue: usize = var("RAPPORT_HUB_QUEUE")
            .unwrap_or_else(|| "64".into())
            .parse()
            .context("RAPPORT_HUB_QUEUE must be a positive integer")?;
        if hub_queue == 0 {
            bail!("RAPPORT_HUB_QUEUE must be at least 1");
        }

        Ok(Self {
            addr,
            db_path: PathBuf::from(var("RAPPORT_DB_PATH").unwrap_or_else(|| "rapport.db".into())),
            jwt_secret,
            hub_queue,
            cors_origin: var("RAPPORT_CORS_ORIGIN").filter(|o| !o.is_empty()),
        })
    }
}
