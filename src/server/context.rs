//! Application context: the long-lived external handles of the service.
//!
//! Handles are acquired store, broker, listener and released in the reverse
//! order. Releases run concurrently under one timeout and happen at most once.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::error::AppError;
use crate::queue::JobSource;
use crate::redis::{BackoffConfig, ExponentialBackoff};
use crate::store::OutcomeStore;

/// Running HTTP listener
pub struct ListenerHandle {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

impl ListenerHandle {
    /// Serve `app` on `listener` until the handle is closed.
    pub fn spawn(listener: TcpListener, app: Router) -> std::io::Result<Self> {
        let addr = listener.local_addr()?;
        let (shutdown, signal) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = signal.await;
                })
                .await
        });

        tracing::info!(addr = %addr, "Listener started");
        Ok(Self {
            addr,
            shutdown,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and wait for the server task.
    pub async fn close(self) {
        let _ = self.shutdown.send(());
        match self.task.await {
            Ok(Ok(())) => tracing::info!(addr = %self.addr, "Listener closed"),
            Ok(Err(e)) => tracing::warn!(addr = %self.addr, error = %e, "Listener stopped with error"),
            Err(e) => tracing::warn!(addr = %self.addr, error = %e, "Listener task failed"),
        }
    }
}

/// Readiness of the backing services
#[derive(Debug, Clone, Serialize)]
pub struct Readiness {
    pub broker: bool,
    pub store: bool,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        self.broker && self.store
    }
}

/// Result of releasing the context
#[derive(Debug, Default)]
pub struct ReleaseResult {
    /// Handles released within the timeout, in completion order
    pub released: Vec<&'static str>,
    /// Handles still releasing when the timeout hit
    pub timed_out: Vec<&'static str>,
    /// The context had already been released
    pub already_released: bool,
}

type Release<'a> = Pin<Box<dyn Future<Output = &'static str> + Send + 'a>>;

pub struct AppContext {
    store: Arc<dyn OutcomeStore>,
    broker: Arc<dyn JobSource>,
    listener: Mutex<Option<ListenerHandle>>,
    released: AtomicBool,
}

impl AppContext {
    pub fn new(store: Arc<dyn OutcomeStore>, broker: Arc<dyn JobSource>) -> Self {
        Self {
            store,
            broker,
            listener: Mutex::new(None),
            released: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<dyn OutcomeStore> {
        &self.store
    }

    pub fn broker(&self) -> &Arc<dyn JobSource> {
        &self.broker
    }

    pub async fn attach_listener(&self, listener: ListenerHandle) {
        *self.listener.lock().await = Some(listener);
    }

    pub async fn listener_addr(&self) -> Option<SocketAddr> {
        self.listener.lock().await.as_ref().map(|l| l.local_addr())
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Ping broker and store once.
    pub async fn readiness(&self) -> Readiness {
        let (broker, store) = tokio::join!(self.broker.ping(), self.store.ping());
        Readiness {
            broker: broker.is_ok(),
            store: store.is_ok(),
        }
    }

    /// Wait until both broker and store answer, retrying with backoff.
    pub async fn wait_until_ready(
        &self,
        timeout: Duration,
        backoff: BackoffConfig,
    ) -> Result<(), AppError> {
        let started = Instant::now();
        let mut backoff = ExponentialBackoff::with_config(backoff);

        loop {
            let readiness = self.readiness().await;
            if readiness.is_ready() {
                tracing::info!(
                    broker = self.broker.backend_name(),
                    store = self.store.backend_name(),
                    waited_ms = started.elapsed().as_millis() as u64,
                    "Broker and store ready"
                );
                return Ok(());
            }

            let delay = backoff.next_delay();
            if started.elapsed() + delay > timeout {
                return Err(AppError::Unavailable(format!(
                    "not ready after {:?} (broker: {}, store: {})",
                    timeout, readiness.broker, readiness.store
                )));
            }

            tracing::warn!(
                broker_ready = readiness.broker,
                store_ready = readiness.store,
                attempt = backoff.attempt(),
                retry_in_ms = delay.as_millis() as u64,
                "Waiting for broker and store"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Release listener, broker and store. Only the first call does anything.
    pub async fn release(&self, timeout: Duration) -> ReleaseResult {
        if self.released.swap(true, Ordering::AcqRel) {
            return ReleaseResult {
                already_released: true,
                ..ReleaseResult::default()
            };
        }

        let listener = self.listener.lock().await.take();

        let mut pending: Vec<&'static str> = vec!["listener", "broker", "store"];
        let mut releases: FuturesUnordered<Release<'_>> = FuturesUnordered::new();
        releases.push(Box::pin(async move {
            if let Some(listener) = listener {
                listener.close().await;
            }
            "listener"
        }));
        releases.push(Box::pin(async {
            self.broker.close().await;
            "broker"
        }));
        releases.push(Box::pin(async {
            self.store.close().await;
            "store"
        }));

        let mut result = ReleaseResult::default();
        let _ = tokio::time::timeout(timeout, async {
            while let Some(name) = releases.next().await {
                result.released.push(name);
            }
        })
        .await;

        pending.retain(|name| !result.released.contains(name));
        if pending.is_empty() {
            tracing::info!(released = ?result.released, "Application context released");
        } else {
            tracing::warn!(
                timed_out = ?pending,
                timeout_ms = timeout.as_millis() as u64,
                "Release timed out"
            );
        }
        result.timed_out = pending;
        result
    }
}
