mod cache;
mod handlers;
mod server;

use std::{env, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use untis_ics_core::prelude::*;

use crate::{cache::RedisCache, handlers::AppState};

const DEFAULT_CACHE_TTL_SECS: u64 = 15 * 60;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "untis_ics_server=info,untis_ics_core=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let redis_url = env::var("REDIS_URL")
        .map_err(|_| anyhow::anyhow!("REDIS_URL environment variable is required"))?;

    let config_path = env::var("UNTIS_ICS_CONFIG").ok().map(PathBuf::from);
    let config =
        SyncConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    let options = config.ics_options()?;

    let ttl = env::var("CACHE_TTL_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_CACHE_TTL_SECS);

    let redis = RedisCache::new(&redis_url, None).await?;
    let state = AppState {
        source: Arc::new(WebUntisProvider::new(config)?),
        cache: CalendarCache::new(redis, Duration::from_secs(ttl)),
        options,
    };

    server::start_server(state).await
}
