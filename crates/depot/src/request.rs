//! # Resource Request
//!
//! One in-flight fetch of a single named resource: cache lookup, streaming
//! network transfer with progress reporting, and cache write-back. The
//! request runs inside its own task and reports lifecycle events to the
//! owning server over a channel; exactly one terminal event is emitted.

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use crate::DepotError;
use crate::cache::{ResourceMetadata, StoreBackend};
use crate::protocol::{ResourcePayload, ResourceQuery, ResponseType};

/// Progress value reported while a transfer's total length is unknown.
///
/// Near-complete but never 100, signaling "still working" without claiming
/// completion.
pub(crate) const INDETERMINATE_PROGRESS: u8 = 99;

/// Lifecycle state of a resource request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestState {
    Created,
    LookingUp,
    Downloading,
    Caching,
    Completed,
}

/// Lifecycle events a request reports to its owner
#[derive(Debug)]
pub(crate) enum RequestEvent {
    /// Transfer progress, percentage in [0, 100]
    Progress(u8),
    /// Terminal: the fetch succeeded
    Data(ResourcePayload),
    /// Terminal: the fetch failed
    Failed(DepotError),
}

pub(crate) struct ResourceRequest {
    request_id: u64,
    resource_name: String,
    resource_url: String,
    response_type: ResponseType,
    store: Arc<dyn StoreBackend>,
    client: Client,
    events: mpsc::Sender<(u64, RequestEvent)>,
    state: RequestState,
}

impl ResourceRequest {
    /// Bind a request to a resolved origin and store backend.
    ///
    /// URL validation happens here, before any load accounting, so a bad
    /// origin/resource combination is a synchronous error with no side
    /// effects.
    pub(crate) fn new(
        query: &ResourceQuery,
        origin_url: &str,
        store: Arc<dyn StoreBackend>,
        client: Client,
        events: mpsc::Sender<(u64, RequestEvent)>,
    ) -> Result<Self, DepotError> {
        let resource_url = format!(
            "{}/{}",
            origin_url.trim_end_matches('/'),
            query.resource_name
        );
        Url::parse(&resource_url).map_err(|_| DepotError::UrlError(resource_url.clone()))?;

        Ok(Self {
            request_id: query.request_id,
            resource_name: query.resource_name.clone(),
            resource_url,
            response_type: query.response_type,
            store,
            client,
            events,
            state: RequestState::Created,
        })
    }

    /// Run the request lifecycle to completion.
    ///
    /// Callable exactly once; a second call is a no-op.
    pub(crate) async fn start(&mut self, check_cache: bool) {
        if self.state != RequestState::Created {
            debug!(request_id = self.request_id, "Request already started");
            return;
        }

        if check_cache {
            self.state = RequestState::LookingUp;
            match self.store.get(&self.resource_name).await {
                Ok(Some((data, _metadata))) => {
                    info!(
                        request_id = self.request_id,
                        resource = %self.resource_name,
                        size = data.len(),
                        "Serving resource from cache"
                    );
                    self.finish_with_data(data).await;
                    return;
                }
                Ok(None) => {
                    debug!(
                        request_id = self.request_id,
                        resource = %self.resource_name,
                        "Cache miss"
                    );
                }
                Err(e) => {
                    // Lookup failures fall through to the network exactly
                    // like misses
                    debug!(
                        request_id = self.request_id,
                        resource = %self.resource_name,
                        error = %e,
                        "Cache lookup failed, downloading"
                    );
                }
            }
        }

        self.state = RequestState::Downloading;
        match self.download().await {
            Ok((data, content_type)) => {
                self.state = RequestState::Caching;
                let metadata = ResourceMetadata::new(data.len() as u64)
                    .with_content_type_option(content_type);
                if let Err(e) = self
                    .store
                    .put(&self.resource_name, data.clone(), metadata)
                    .await
                {
                    // The data was already obtained; a failed write-back must
                    // never fail the request
                    warn!(
                        request_id = self.request_id,
                        resource = %self.resource_name,
                        error = %e,
                        "Cache write failed, delivering downloaded data anyway"
                    );
                }
                self.finish_with_data(data).await;
            }
            Err(e) => {
                self.state = RequestState::Completed;
                self.emit(RequestEvent::Failed(e)).await;
            }
        }
    }

    /// Stream the resource body, reporting progress along the way
    async fn download(&mut self) -> Result<(Bytes, Option<String>), DepotError> {
        info!(request_id = self.request_id, url = %self.resource_url, "Starting download");

        let response = self.client.get(&self.resource_url).send().await?;

        if !response.status().is_success() {
            return Err(DepotError::StatusCode(response.status()));
        }

        let total = response.content_length().filter(|len| *len > 0);
        if total.is_none() {
            debug!(url = %self.resource_url, "Content length not available");
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let mut buf = BytesMut::with_capacity(total.unwrap_or(8 * 1024) as usize);
        let mut last_progress = None;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buf.extend_from_slice(&chunk);

            let percent = match total {
                Some(total) => ((buf.len() as u64 * 100) / total).min(100) as u8,
                None => INDETERMINATE_PROGRESS,
            };
            if last_progress != Some(percent) {
                last_progress = Some(percent);
                self.emit(RequestEvent::Progress(percent)).await;
            }
        }

        debug!(
            request_id = self.request_id,
            url = %self.resource_url,
            size = buf.len(),
            "Download complete"
        );
        Ok((buf.freeze(), content_type))
    }

    async fn finish_with_data(&mut self, data: Bytes) {
        self.state = RequestState::Completed;
        let payload = ResourcePayload {
            request_id: self.request_id,
            resource_url: self.resource_url.clone(),
            resource_name: self.resource_name.clone(),
            resource_data: data,
            resource_type: self.response_type,
        };
        self.emit(RequestEvent::Data(payload)).await;
    }

    async fn emit(&self, event: RequestEvent) {
        // The owner dropping its receiver means nobody is listening anymore;
        // the request just runs out
        let _ = self.events.send((self.request_id, event)).await;
    }
}
