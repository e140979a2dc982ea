//! # Depot
//!
//! A library for distributing versioned content resources to applications,
//! with transparent local caching so repeat requests avoid the network.
//!
//! ## Features
//!
//! - Command-driven content server running as a background task
//! - Durable named cache stores with metadata and file-data partitions
//! - Load-aware selection across multiple registered origins
//! - Streaming downloads with progress notifications
//! - Non-fatal cache write-backs: downloaded data is always delivered

pub mod builder;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod origin;
pub mod protocol;
mod request;
pub mod server;

pub use builder::EngineConfigBuilder;
pub use cache::{CacheStore, DiskStore, ResourceMetadata, StoreBackend, StoreState};
pub use client::ContentClient;
pub use config::EngineConfig;
pub use error::DepotError;
pub use origin::{Origin, OriginRegistry};
pub use protocol::{
    Command, Notification, ResourcePayload, ResourceQuery, ResponseType, command_id,
    notification_id,
};
pub use server::{ContentServer, create_client};
