//! # Content Client
//!
//! The application-facing controller. It spawns the content server task,
//! forwards each operation as one command message, and hands the server's
//! notifications back to application code as a typed event stream. All
//! caching and networking logic lives on the server side of the channel.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::protocol::{Command, Notification, ResourceQuery};
use crate::server::{ContentServer, create_client};
use crate::{DepotError, EngineConfig};

pub struct ContentClient {
    command_tx: mpsc::Sender<Command>,
    notification_rx: mpsc::Receiver<Notification>,
    shutdown_tx: broadcast::Sender<()>,
    server_handle: JoinHandle<()>,
}

impl ContentClient {
    /// Start the engine: build the shared HTTP client, spawn the content
    /// server task, and return the controller connected to it.
    pub fn start(config: EngineConfig) -> Result<Self, DepotError> {
        let config = Arc::new(config);
        let client = create_client(&config)?;

        let (command_tx, command_rx) = mpsc::channel(config.channel_capacity);
        let (notification_tx, notification_rx) = mpsc::channel(config.channel_capacity);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let mut server = ContentServer::new(
            Arc::clone(&config),
            client,
            command_rx,
            notification_tx,
            shutdown_rx,
        );
        let server_handle = tokio::spawn(async move {
            server.run().await;
        });

        Ok(Self {
            command_tx,
            notification_rx,
            shutdown_tx,
            server_handle,
        })
    }

    /// Register a content origin
    pub async fn add_server(&self, url: impl Into<String>) -> Result<(), DepotError> {
        self.send(Command::AddServer { url: url.into() }).await
    }

    /// Unregister a content origin; requests already bound to it finish
    /// normally
    pub async fn remove_server(&self, url: impl Into<String>) -> Result<(), DepotError> {
        self.send(Command::RemoveServer { url: url.into() }).await
    }

    /// Open or create a named cache store; `CacheReady` is emitted once it is
    /// usable
    pub async fn open_cache(&self, name: impl Into<String>) -> Result<(), DepotError> {
        self.send(Command::OpenCache { name: name.into() }).await
    }

    /// Close and destroy a named cache store
    pub async fn delete_cache(&self, name: impl Into<String>) -> Result<(), DepotError> {
        self.send(Command::DeleteCache { name: name.into() }).await
    }

    /// Begin a resource fetch; the outcome arrives as notifications carrying
    /// the query's request id
    pub async fn get_resource(&self, query: ResourceQuery) -> Result<(), DepotError> {
        self.send(Command::GetResource(query)).await
    }

    async fn send(&self, command: Command) -> Result<(), DepotError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| DepotError::Closed)
    }

    /// Receive the next notification from the server.
    ///
    /// Returns `None` once the server task has stopped and the channel
    /// drained.
    pub async fn recv(&mut self) -> Option<Notification> {
        self.notification_rx.recv().await
    }

    /// Stop the engine and wait for the server task to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.server_handle.await {
            debug!(error = %e, "Server task did not shut down cleanly");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::routing::get;
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::time::timeout;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn next(client: &mut ContentClient) -> Notification {
        timeout(Duration::from_secs(5), client.recv())
            .await
            .expect("timed out waiting for notification")
            .expect("engine stopped")
    }

    #[tokio::test]
    async fn test_end_to_end_fetch() {
        let origin = serve(Router::new().route("/logo.png", get(|| async { b"png bytes".to_vec() }))).await;
        let cache_root = tempdir().unwrap();

        let config = EngineConfig::builder()
            .with_cache_root(cache_root.path())
            .with_base_url(origin.clone())
            .build();
        let mut client = ContentClient::start(config).unwrap();

        client.open_cache("assets").await.unwrap();
        assert!(matches!(
            next(&mut client).await,
            Notification::CacheReady { name } if name == "assets"
        ));

        // The implicit base-url origin serves the fetch
        client
            .get_resource(ResourceQuery::new(1, "assets", "logo.png"))
            .await
            .unwrap();
        loop {
            match next(&mut client).await {
                Notification::Progress { request_id, progress } => {
                    assert_eq!(request_id, 1);
                    assert!(progress <= 100);
                }
                Notification::ResourceData(payload) => {
                    assert_eq!(payload.request_id, 1);
                    assert_eq!(payload.resource_data, "png bytes");
                    assert_eq!(payload.resource_url, format!("{origin}/logo.png"));
                    break;
                }
                other => panic!("unexpected notification: {other:?}"),
            }
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_commands_fail_after_shutdown() {
        let cache_root = tempdir().unwrap();
        let config = EngineConfig::builder()
            .with_cache_root(cache_root.path())
            .build();
        let client = ContentClient::start(config).unwrap();

        let command_tx = client.command_tx.clone();
        client.shutdown().await;

        let result = command_tx
            .send(Command::OpenCache {
                name: "assets".into(),
            })
            .await;
        assert!(result.is_err());
    }
}
