//! Shared registry of live [`IrcClient`] connections (C4): assigns each a
//! stable id, keeps the strong reference, and fans a shutdown signal out to
//! all of them. An `IrcClient` only ever holds a `Weak` handle back to its
//! pool, so the two never form a reference cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;

use super::client::IrcClient;

pub struct ConnectParams {
    pub server_name: String,
    pub host: String,
    pub port: u16,
    pub encoding: String,
    pub nicknames: Vec<String>,
    pub ssl: bool,
    pub close_timeout: Duration,
}

pub struct IrcClientPool {
    clients: Mutex<HashMap<u64, Arc<IrcClient>>>,
    next_id: AtomicU64,
}

impl IrcClientPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            clients: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Connect a new client and register it. `register` runs after the
    /// connection exists but before it's visible to `close_all`, so callers
    /// (the user orchestrator) can subscribe to its event stream first.
    pub async fn connect(
        self: &Arc<Self>,
        params: ConnectParams,
        register: impl FnOnce(&Arc<IrcClient>),
    ) -> std::io::Result<Arc<IrcClient>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let client = IrcClient::connect(
            self,
            id,
            params.server_name,
            params.host,
            params.port,
            params.encoding,
            params.nicknames,
            params.ssl,
            params.close_timeout,
        )
        .await?;
        register(&client);
        self.clients.lock().insert(id, client.clone());
        Ok(client)
    }

    /// Called by an `IrcClient` when it tears itself down, whether from a
    /// graceful close, a read error, or nickname-negotiation exhaustion.
    pub fn closed(&self, id: u64) {
        self.clients.lock().remove(&id);
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    pub async fn close_all(&self) {
        let clients: Vec<Arc<IrcClient>> = self.clients.lock().values().cloned().collect();
        for client in clients {
            client.close(false).await;
        }
    }

    /// Spawn the task that closes every connection on SIGINT/SIGTERM/SIGQUIT.
    pub fn spawn_shutdown_handler(self: &Arc<Self>) {
        let pool = self.clone();
        tokio::spawn(async move {
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(err) => {
                    tracing::error!(error = %err, "failed to install SIGTERM handler");
                    return;
                }
            };
            let mut sigquit = match signal(SignalKind::quit()) {
                Ok(s) => s,
                Err(err) => {
                    tracing::error!(error = %err, "failed to install SIGQUIT handler");
                    return;
                }
            };

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
                _ = sigquit.recv() => {}
            }
            info!(clients = pool.client_count(), "shutdown signal received, closing irc clients");
            pool.close_all().await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_pool_starts_empty() {
        let pool = IrcClientPool::new();
        assert_eq!(pool.client_count(), 0);
    }
}
