use std::{fs, sync::Arc, time::Duration};

use anyhow::Context;
use energy_client::{
    analytics::{AnalyticsConfig, RateDefaults},
    db::PgStore,
    Services,
};
use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub uri: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub async fn connect(&self) -> anyhow::Result<PgStore> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.uri)
            .await
            .context("failed to connect to the energy database")?;
        Ok(PgStore::new(pool))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Maximum readings per bulk insert.
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl IngestConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub ingest: IngestConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub rates: RateDefaults,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("ENERGY_CONFIG").unwrap_or_else(|_| "energy-config.toml".to_string());
        let contents =
            fs::read_to_string(&path).with_context(|| format!("failed to read config file '{path}'"))?;
        Self::from_toml(&contents).with_context(|| format!("invalid config file '{path}'"))
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let cfg: Self = toml::from_str(contents)?;
        cfg.analytics
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid [analytics] section: {e}"))?;
        Ok(cfg)
    }

    /// Connects to the database and wires the services against it.
    pub async fn services(&self) -> anyhow::Result<(Arc<PgStore>, Services)> {
        let store = Arc::new(self.database.connect().await?);
        let services = Services::new(store.clone(), self.analytics.clone(), self.rates.clone());
        Ok((store, services))
    }
}
