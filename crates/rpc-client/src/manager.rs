//! Owner of several independent clients.
//!
//! Clients added here share nothing: each has its own session, transport,
//! scheduler and bookkeeping. The manager only offers bulk operations.

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::RwLock;
use tracing::info;

use crate::client::RpcClient;
use crate::types::{ConnectionOptions, ReconnectConfig};

/// Collection of clients with bulk disconnect.
#[derive(Default)]
pub struct ClientManager {
    clients: RwLock<Vec<Arc<RpcClient>>>,
}

impl ClientManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client and adds it to the collection. The client is not
    /// connected yet.
    pub async fn add_client(&self, options: ConnectionOptions) -> Arc<RpcClient> {
        self.add_client_with(options, ReconnectConfig::default()).await
    }

    pub async fn add_client_with(
        &self,
        options: ConnectionOptions,
        reconnect: ReconnectConfig,
    ) -> Arc<RpcClient> {
        let client = Arc::new(RpcClient::with_reconnect(options, reconnect));
        self.clients.write().await.push(client.clone());
        client
    }

    /// All clients, in the order they were added.
    pub async fn clients(&self) -> Vec<Arc<RpcClient>> {
        self.clients.read().await.clone()
    }

    /// First client registered under `client_id`.
    pub async fn get(&self, client_id: &str) -> Option<Arc<RpcClient>> {
        self.clients
            .read()
            .await
            .iter()
            .find(|c| c.client_id() == client_id)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Disconnects every client. Clients stay in the collection.
    pub async fn disconnect_all(&self) {
        let clients = self.clients().await;
        info!(count = clients.len(), "disconnecting all clients");
        join_all(clients.iter().map(|c| c.disconnect())).await;
    }
}
