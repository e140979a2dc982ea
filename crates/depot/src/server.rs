//! # Content Server
//!
//! The background component of the engine: a single cooperative task owning
//! the origin registry, the map of open cache stores, and the table of
//! in-flight resource requests. It is driven entirely by messages — commands
//! from the client, completion events from spawned store opens and resource
//! requests, and the shutdown broadcast — so the shared registries are only
//! ever touched from this one execution context.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Client;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::cache::{CacheStore, DiskStore, StoreResult};
use crate::origin::OriginRegistry;
use crate::protocol::{Command, Notification, ResourceQuery};
use crate::request::{RequestEvent, ResourceRequest};
use crate::{DepotError, EngineConfig};

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &EngineConfig) -> Result<Client, DepotError> {
    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(5) // Allow multiple connections to same host
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    client_builder.build().map_err(DepotError::from)
}

/// Background content-serving component
pub struct ContentServer {
    config: Arc<EngineConfig>,
    client: Client,
    registry: OriginRegistry,
    stores: HashMap<String, CacheStore>,
    /// request id → origin URL the request is bound to
    inflight: HashMap<u64, String>,
    /// Destroy tasks still running for deleted store names; a reopen of the
    /// same name waits for the destroy so it really recreates from scratch
    pending_destroy: HashMap<String, tokio::task::JoinHandle<()>>,
    command_rx: mpsc::Receiver<Command>,
    notify_tx: mpsc::Sender<Notification>,
    store_tx: mpsc::Sender<(String, StoreResult<()>)>,
    store_rx: mpsc::Receiver<(String, StoreResult<()>)>,
    request_tx: mpsc::Sender<(u64, RequestEvent)>,
    request_rx: mpsc::Receiver<(u64, RequestEvent)>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl ContentServer {
    pub fn new(
        config: Arc<EngineConfig>,
        client: Client,
        command_rx: mpsc::Receiver<Command>,
        notify_tx: mpsc::Sender<Notification>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        let (store_tx, store_rx) = mpsc::channel(config.channel_capacity);
        let (request_tx, request_rx) = mpsc::channel(config.channel_capacity);

        let mut registry = OriginRegistry::new();
        if let Some(base_url) = &config.base_url {
            // The application's own base URL is the implicit first origin
            registry.add(base_url.clone());
        }

        Self {
            config,
            client,
            registry,
            stores: HashMap::new(),
            inflight: HashMap::new(),
            pending_destroy: HashMap::new(),
            command_rx,
            notify_tx,
            store_tx,
            store_rx,
            request_tx,
            request_rx,
            shutdown_rx,
        }
    }

    /// Drive the server until shutdown is signaled or the command channel
    /// closes.
    ///
    /// Commands are drained before internal completion events so a command
    /// sequence observes the state its predecessors left behind, not the
    /// results of work they started.
    pub async fn run(&mut self) {
        info!("Content server started");
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => {
                    info!("Content server shutting down");
                    break;
                }
                command = self.command_rx.recv() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            debug!("Command channel closed, stopping");
                            break;
                        }
                    }
                }
                Some((name, result)) = self.store_rx.recv() => {
                    self.on_store_opened(name, result).await;
                }
                Some((request_id, event)) = self.request_rx.recv() => {
                    self.on_request_event(request_id, event).await;
                }
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::AddServer { url } => self.registry.add(url),
            Command::RemoveServer { url } => self.registry.remove(&url),
            Command::OpenCache { name } => self.handle_open_cache(name).await,
            Command::DeleteCache { name } => self.handle_delete_cache(name).await,
            Command::GetResource(query) => self.handle_get_resource(query).await,
        }
    }

    async fn handle_open_cache(&mut self, name: String) {
        if let Some(store) = self.stores.get_mut(&name) {
            let ready = store.is_ready();
            let reopen = !ready && store.reopen_pending();
            if ready {
                // Already open: signal readiness again
                self.notify(Notification::CacheReady { name }).await;
            } else if reopen {
                self.spawn_store_open(name);
            }
            // An open is already in flight otherwise
            return;
        }

        let backend = Arc::new(DiskStore::new(&self.config.cache_root, &name));
        self.stores
            .insert(name.clone(), CacheStore::new(&name, backend));
        self.spawn_store_open(name);
    }

    fn spawn_store_open(&mut self, name: String) {
        let Some(store) = self.stores.get(&name) else {
            return;
        };
        let backend = store.backend();
        let store_tx = self.store_tx.clone();
        let pending = self.pending_destroy.remove(&name);
        tokio::spawn(async move {
            if let Some(pending) = pending {
                let _ = pending.await;
            }
            let result = backend.open().await;
            let _ = store_tx.send((name, result)).await;
        });
    }

    async fn on_store_opened(&mut self, name: String, result: StoreResult<()>) {
        let Some(store) = self.stores.get_mut(&name) else {
            // Deleted while the open was in flight
            debug!(name = %name, "Open completed for evicted store");
            return;
        };

        let notification = match result {
            Ok(()) => {
                store.mark_ready();
                Notification::CacheReady { name }
            }
            Err(e) => {
                store.mark_failed();
                let error = DepotError::CacheOpenFailed(name, e.to_string());
                error!(error = %error, "Cache store open failed");
                Notification::Error {
                    error: error.to_string(),
                    request_id: None,
                }
            }
        };
        self.notify(notification).await;
    }

    async fn handle_delete_cache(&mut self, name: String) {
        if let Some(store) = self.stores.remove(&name) {
            store.close();
        } else {
            debug!(name = %name, "Delete for store not open here");
        }

        // Destroy at the storage layer regardless of whether the store was
        // open in this server. Requests already holding the backend see their
        // write-backs fail, which is non-fatal to them.
        let cache_root = self.config.cache_root.clone();
        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = DiskStore::destroy(&cache_root, &task_name).await {
                warn!(name = %task_name, error = %e, "Failed to destroy store");
            }
        });
        self.pending_destroy.insert(name, handle);
    }

    async fn handle_get_resource(&mut self, query: ResourceQuery) {
        let request_id = query.request_id;

        let backend = match self.stores.get(&query.cache_name) {
            Some(store) if store.is_ready() => store.backend(),
            _ => {
                self.notify_error(
                    Some(request_id),
                    &DepotError::CacheUnavailable(query.cache_name.clone()),
                )
                .await;
                return;
            }
        };

        if self.inflight.contains_key(&request_id) {
            self.notify_error(Some(request_id), &DepotError::DuplicateRequest(request_id))
                .await;
            return;
        }

        let origin = match self.registry.select(query.preferred_server.as_deref()) {
            Ok(origin) => origin,
            Err(e) => {
                self.notify_error(Some(request_id), &e).await;
                return;
            }
        };

        let request = match ResourceRequest::new(
            &query,
            &origin,
            backend,
            self.client.clone(),
            self.request_tx.clone(),
        ) {
            Ok(request) => request,
            Err(e) => {
                self.notify_error(Some(request_id), &e).await;
                return;
            }
        };

        self.registry.acquire(&origin);
        self.inflight.insert(request_id, origin);
        debug!(
            request_id,
            resource = %query.resource_name,
            "Dispatching resource request"
        );

        let check_cache = query.return_cached;
        tokio::spawn(async move {
            let mut request = request;
            request.start(check_cache).await;
        });
    }

    async fn on_request_event(&mut self, request_id: u64, event: RequestEvent) {
        if !self.inflight.contains_key(&request_id) {
            // Terminal already processed; nothing may follow it outward
            debug!(request_id, "Dropping event for finished request");
            return;
        }

        match event {
            RequestEvent::Progress(progress) => {
                self.notify(Notification::Progress {
                    request_id,
                    progress,
                })
                .await;
            }
            RequestEvent::Data(payload) => {
                self.finish_request(request_id);
                self.notify(Notification::ResourceData(payload)).await;
            }
            RequestEvent::Failed(error) => {
                self.finish_request(request_id);
                self.notify(Notification::Error {
                    error: error.to_string(),
                    request_id: Some(request_id),
                })
                .await;
            }
        }
    }

    /// Tear down the bookkeeping of a terminated request: the origin load
    /// decrement and the in-flight entry, exactly once
    fn finish_request(&mut self, request_id: u64) {
        if let Some(origin) = self.inflight.remove(&request_id) {
            self.registry.release(&origin);
        }
    }

    async fn notify(&self, notification: Notification) {
        if self.notify_tx.send(notification).await.is_err() {
            debug!("Notification receiver dropped");
        }
    }

    async fn notify_error(&self, request_id: Option<u64>, error: &DepotError) {
        warn!(request_id = ?request_id, error = %error, "Reporting error");
        self.notify(Notification::Error {
            error: error.to_string(),
            request_id,
        })
        .await;
    }
}
