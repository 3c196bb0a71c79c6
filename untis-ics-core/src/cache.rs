use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{IcsOptions, Result, pipeline, providers::TimetableSource};

/// How long the last successfully built calendar is kept as a fallback
pub const LAST_GOOD_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn set_raw(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Where a served calendar came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    /// Rebuilding failed and the last good calendar was served instead
    Stale,
}

impl CacheStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Stale => "stale",
        }
    }
}

/// Calendar bytes cached under two keys: a short-lived fresh copy that is
/// served directly, and a long-lived last-good copy used both as the
/// previous output for stamp carry-forward and as a fallback when the
/// timetable service is down.
#[derive(Clone)]
pub struct CalendarCache<C: CacheBackend> {
    cache: C,
    ttl: Duration,
    /// Held while rebuilding so an expired calendar is fetched once
    rebuild: Arc<Mutex<()>>,
}

impl<C: CacheBackend> CalendarCache<C> {
    pub fn new(cache: C, ttl: Duration) -> Self {
        Self {
            cache,
            ttl,
            rebuild: Arc::new(Mutex::new(())),
        }
    }

    pub fn fresh_key(name: &str) -> String {
        format!("calendar:{}:fresh", name)
    }

    pub fn last_good_key(name: &str) -> String {
        format!("calendar:{}:last-good", name)
    }

    pub async fn fresh(&self, name: &str) -> Result<Option<Vec<u8>>> {
        self.cache.get_raw(&Self::fresh_key(name)).await
    }

    pub async fn last_good(&self, name: &str) -> Result<Option<Vec<u8>>> {
        self.cache.get_raw(&Self::last_good_key(name)).await
    }

    pub async fn store(&self, name: &str, calendar: &[u8]) -> Result<()> {
        self.cache
            .set_raw(&Self::fresh_key(name), calendar, self.ttl)
            .await?;
        self.cache
            .set_raw(&Self::last_good_key(name), calendar, LAST_GOOD_TTL)
            .await
    }

    async fn cached(&self, name: &str) -> Option<Vec<u8>> {
        self.fresh(name).await.unwrap_or_else(|e| {
            tracing::warn!("Failed to read cached calendar {}: {}", name, e);
            None
        })
    }

    /// Serve the cached calendar, rebuilding it from `source` once the
    /// fresh copy has expired. Cache errors are logged and treated as misses.
    pub async fn get_or_build<S>(
        &self,
        source: &S,
        options: &IcsOptions,
        generated_at: DateTime<Utc>,
    ) -> Result<(Vec<u8>, CacheStatus)>
    where
        S: TimetableSource + ?Sized,
    {
        let name = options.calendar_name.as_str();
        if let Some(calendar) = self.cached(name).await {
            return Ok((calendar, CacheStatus::Hit));
        }

        let _guard = self.rebuild.lock().await;
        // Another request may have rebuilt it while we waited.
        if let Some(calendar) = self.cached(name).await {
            return Ok((calendar, CacheStatus::Hit));
        }

        let previous = self.last_good(name).await.unwrap_or_else(|e| {
            tracing::warn!("Failed to read last good calendar {}: {}", name, e);
            None
        });
        let built = match source.fetch_records().await {
            Ok(records) => {
                pipeline::build_calendar(&records, options, generated_at, previous.as_deref())
            }
            Err(e) => Err(e),
        };

        match built {
            Ok(build) => {
                if let Err(e) = self.store(name, &build.bytes).await {
                    tracing::warn!("Failed to cache calendar {}: {}", name, e);
                }
                tracing::info!(
                    "Rebuilt calendar {} with {} events",
                    name,
                    build.outcome.events.len()
                );
                Ok((build.bytes, CacheStatus::Miss))
            }
            Err(e) => match previous {
                Some(calendar) => {
                    tracing::warn!("Serving last good calendar {}: {}", name, e);
                    Ok((calendar, CacheStatus::Stale))
                }
                None => Err(e),
            },
        }
    }

    /// Drop the fresh copy so the next request rebuilds.
    pub async fn invalidate(&self, name: &str) -> Result<()> {
        self.cache.delete(&Self::fresh_key(name)).await
    }
}
