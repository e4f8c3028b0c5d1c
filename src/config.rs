//! Environment configuration.

use anyhow::Context;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// When set, order events are published to NATS; otherwise they are only
    /// logged.
    pub nats_url: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let port = match std::env::var("PORT") {
            Ok(raw) => raw.parse().context("PORT must be a number")?,
            Err(_) => 8080,
        };
        let nats_url = std::env::var("NATS_URL").ok().filter(|url| !url.is_empty());
        Ok(Self { database_url, port, nats_url })
    }
}
