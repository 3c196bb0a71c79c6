use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;

use untis_ics_core::{Error, Result, cache::CacheBackend};

/// Redis-backed calendar store
#[derive(Debug, Clone)]
pub struct RedisCache {
    connection: redis::aio::MultiplexedConnection,
    prefix: String,
}

impl RedisCache {
    pub async fn new(redis_url: &str, prefix: Option<String>) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::Config(format!("Failed to create Redis client: {}", e)))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| Error::Config(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self {
            connection,
            prefix: prefix.unwrap_or_else(|| "untis_ics".to_string()),
        })
    }

    fn build_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }
}

fn redis_error(action: &str, e: &redis::RedisError) -> Error {
    Error::Internal(format!("Redis {} failed: {}", action, e))
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn set_raw(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(self.build_key(key), value, ttl.as_secs().max(1))
            .await
            .map_err(|e| redis_error("SET", &e))
    }

    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection.clone();
        conn.get(self.build_key(key))
            .await
            .map_err(|e| redis_error("GET", &e))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(self.build_key(key))
            .await
            .map_err(|e| redis_error("DEL", &e))
    }
}
