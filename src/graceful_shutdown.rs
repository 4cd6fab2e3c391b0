//! Component-registry shutdown coordinator shared by the server and
//! xfrd task sets, layered on top of [`crate::supervisor`]'s broadcast
//! signal.
//!
//! Grounded on heimdall's `graceful_shutdown.rs` (`broadcast::Sender`
//! fan-out plus a registry of named async shutdown closures awaited
//! with a timeout) — kept close to verbatim; this crate's cache-save
//! step (heimdall persists its resolver cache) has no counterpart here,
//! since zone content lives in the udb image, flushed by
//! [`crate::udb::Udb::close_clean`] as each holder drops it rather than
//! through an explicit shutdown hook.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::timeout;
use tracing::{error, info, warn};

type ShutdownResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
type ShutdownFn = Box<dyn Fn() -> tokio::task::JoinHandle<ShutdownResult> + Send + Sync>;

struct ShutdownComponent {
    name: String,
    shutdown_fn: ShutdownFn,
}

/// Fan-out shutdown signal plus a registry of named components to drain
/// in order when the signal fires.
pub struct GracefulShutdown {
    shutdown_tx: broadcast::Sender<()>,
    components: Arc<Mutex<Vec<ShutdownComponent>>>,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shutdown_tx,
            components: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub async fn register_component<F, Fut>(&self, name: String, shutdown_fn: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ShutdownResult> + Send + 'static,
    {
        let component = ShutdownComponent {
            name,
            shutdown_fn: Box::new(move || {
                let fut = shutdown_fn();
                tokio::spawn(fut)
            }),
        };
        self.components.lock().await.push(component);
    }

    /// Broadcast the stop signal, then drain every registered component
    /// with a bounded wait each (spec §4.K "waits bounded time, then
    /// SHUTDOWN").
    pub async fn shutdown(&self) -> ShutdownResult {
        info!("initiating graceful shutdown");

        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("failed to send shutdown signal: {}", e);
        }

        info!("waiting for in-flight queries to complete");
        tokio::time::sleep(Duration::from_millis(500)).await;

        let components = self.components.lock().await;
        let mut handles = Vec::new();
        for component in components.iter() {
            info!("shutting down component: {}", component.name);
            let handle = (component.shutdown_fn)();
            handles.push((component.name.clone(), handle));
        }
        drop(components);

        for (name, handle) in handles {
            match timeout(Duration::from_secs(5), handle).await {
                Ok(Ok(Ok(()))) => info!("component '{}' shut down successfully", name),
                Ok(Ok(Err(e))) => error!("component '{}' shutdown failed: {}", name, e),
                Ok(Err(e)) => error!("component '{}' shutdown task panicked: {}", name, e),
                Err(_) => warn!("component '{}' shutdown timed out", name),
            }
        }

        info!("graceful shutdown completed");
        Ok(())
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}
