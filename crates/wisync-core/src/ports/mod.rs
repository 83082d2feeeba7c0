//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the sync engine
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IWorkItemClient`] - Remote work item fetch and write-back
//! - [`IDocumentStore`] - Backing notes, one per work item
//! - [`IContentCodec`] - Note rendering, normalization and field extraction
//! - [`IKeyValueStore`] - Durable storage for the pending change snapshot
//! - [`INotificationService`] - User-visible status messages

pub mod content_codec;
pub mod document_store;
pub mod key_value_store;
pub mod notification;
pub mod work_item_client;

pub use content_codec::IContentCodec;
pub use document_store::IDocumentStore;
pub use key_value_store::IKeyValueStore;
pub use notification::{INotificationService, Notification, NotificationPriority};
pub use work_item_client::{IWorkItemClient, RemoteItem, RemoteRelation, PARENT_RELATION};
