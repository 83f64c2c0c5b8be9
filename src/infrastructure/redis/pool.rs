//! Redis connection pool for the job broker.
//!
//! Commands share one multiplexed connection. Blocking pops get their own
//! connection so they never stall the shared one.

use std::sync::atomic::{AtomicBool, Ordering};

use redis::aio::MultiplexedConnection;
use redis::{Client, RedisError, RedisResult};
use tokio::sync::RwLock;

use crate::config::RedisConfig;

/// Error type for Redis pool operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Redis operation failed
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    /// Pool has been closed during shutdown
    #[error("Redis pool is closed")]
    Closed,
}

/// Redis connection pool for broker operations.
pub struct RedisPool {
    /// Redis client for creating connections
    client: Client,

    /// Multiplexed connection (shared across tasks)
    connection: RwLock<Option<MultiplexedConnection>>,

    /// Whether the last connection attempt succeeded
    connected: AtomicBool,

    closed: AtomicBool,
}

impl RedisPool {
    /// Create a new Redis pool. No connection is made until first use.
    pub fn new(config: RedisConfig) -> Result<Self, PoolError> {
        let client = Client::open(config.url.as_str())?;

        Ok(Self {
            client,
            connection: RwLock::new(None),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    /// Get the shared connection, establishing it if none exists.
    pub async fn get_connection(&self) -> Result<MultiplexedConnection, PoolError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PoolError::Closed);
        }

        // Try to get existing connection
        {
            let conn = self.connection.read().await;
            if let Some(ref c) = *conn {
                return Ok(c.clone());
            }
        }

        // Need to create new connection
        self.connect().await
    }

    /// Establish a new connection.
    async fn connect(&self) -> Result<MultiplexedConnection, PoolError> {
        let mut conn_guard = self.connection.write().await;

        // Double-check in case another task connected while we waited
        if let Some(ref c) = *conn_guard {
            return Ok(c.clone());
        }

        match self.client.get_multiplexed_tokio_connection().await {
            Ok(conn) => {
                *conn_guard = Some(conn.clone());
                self.connected.store(true, Ordering::Release);
                tracing::info!("Redis pool connection established");
                Ok(conn)
            }
            Err(e) => {
                self.connected.store(false, Ordering::Release);
                tracing::error!(error = %e, "Failed to connect to Redis");
                Err(PoolError::Redis(e))
            }
        }
    }

    /// Open a connection that is not shared, for blocking commands.
    pub async fn dedicated_connection(&self) -> Result<MultiplexedConnection, PoolError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PoolError::Closed);
        }
        Ok(self.client.get_multiplexed_tokio_connection().await?)
    }

    /// Execute a Redis command on the shared connection.
    ///
    /// A dropped connection is cleared so the next call reconnects.
    pub async fn execute<F, T, Fut>(&self, f: F) -> Result<T, PoolError>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: std::future::Future<Output = RedisResult<T>>,
    {
        let conn = self.get_connection().await?;

        match f(conn).await {
            Ok(result) => Ok(result),
            Err(e) => {
                if e.is_connection_dropped() || e.is_io_error() {
                    self.reset_connection().await;
                }
                Err(PoolError::Redis(e))
            }
        }
    }

    async fn reset_connection(&self) {
        let mut conn_guard = self.connection.write().await;
        *conn_guard = None;
        self.connected.store(false, Ordering::Release);
    }

    /// Whether the last connection attempt succeeded.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire) && !self.closed.load(Ordering::Acquire)
    }

    /// Ping Redis to check connectivity.
    pub async fn ping(&self) -> Result<(), PoolError> {
        self.execute(|mut conn| async move {
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    /// Drop the shared connection and refuse further use.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.reset_connection().await;
        tracing::info!("Redis pool closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closed_pool_refuses_connections() {
        // Client::open only parses the URL, nothing is dialed here
        let pool = RedisPool::new(RedisConfig::default()).unwrap();
        assert!(!pool.is_connected());

        pool.close().await;
        pool.close().await;

        assert!(matches!(pool.get_connection().await, Err(PoolError::Closed)));
        assert!(matches!(pool.dedicated_connection().await, Err(PoolError::Closed)));
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let config = RedisConfig {
            url: "not a url".to_string(),
            ..RedisConfig::default()
        };
        assert!(matches!(RedisPool::new(config), Err(PoolError::Redis(_))));
    }
}
