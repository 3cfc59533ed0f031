//! Lazily established, shared Redis connection.

use redis::aio::MultiplexedConnection;
use redis::{Client, RedisResult};
use tokio::sync::RwLock;

use crate::config::RedisConfig;

/// Shared multiplexed Redis connection with a namespaced key builder.
pub struct RedisPool {
    client: Client,
    connection: RwLock<Option<MultiplexedConnection>>,
    key_prefix: String,
}

impl RedisPool {
    /// Create a new pool. No connection is made until first use.
    pub fn new(config: &RedisConfig) -> RedisResult<Self> {
        let client = Client::open(config.url.as_str())?;

        Ok(Self {
            client,
            connection: RwLock::new(None),
            key_prefix: config.key_prefix.clone(),
        })
    }

    /// Get the shared connection, establishing it if needed.
    pub async fn get_connection(&self) -> RedisResult<MultiplexedConnection> {
        {
            let conn = self.connection.read().await;
            if let Some(ref c) = *conn {
                return Ok(c.clone());
            }
        }

        let mut conn_guard = self.connection.write().await;

        // Another task may have connected while we waited
        if let Some(ref c) = *conn_guard {
            return Ok(c.clone());
        }

        match self.client.get_multiplexed_tokio_connection().await {
            Ok(conn) => {
                *conn_guard = Some(conn.clone());
                tracing::info!("Redis connection established");
                Ok(conn)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to connect to Redis");
                Err(e)
            }
        }
    }

    /// Drop the cached connection after a connection-level error.
    pub async fn reset_on_error(&self, error: &redis::RedisError) {
        if error.is_connection_dropped() || error.is_io_error() {
            let mut conn_guard = self.connection.write().await;
            *conn_guard = None;
        }
    }

    /// Build a namespaced key: `{prefix}:{part}:{part}...`
    pub fn key(&self, parts: &[&str]) -> String {
        let mut key = self.key_prefix.clone();
        for part in parts {
            key.push(':');
            key.push_str(part);
        }
        key
    }

    pub async fn ping(&self) -> RedisResult<()> {
        let mut conn = self.get_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_builder() {
        let pool = RedisPool::new(&RedisConfig::default()).unwrap();
        assert_eq!(pool.key(&["device", "0", "abc"]), "ara:push:device:0:abc");
        assert_eq!(pool.key(&[]), "ara:push");
    }
}
