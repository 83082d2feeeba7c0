//! wisync Core - Domain types and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `WorkItemNode`, `FieldUpdates`, `PendingChangeSnapshot`
//! - **Port definitions** - Traits for adapters: `IWorkItemClient`, `IDocumentStore`,
//!   `IContentCodec`, `IKeyValueStore`, `INotificationService`
//! - **Configuration** - YAML-backed settings shared by the engine and the CLI
//!
//! # Architecture
//!
//! The domain module contains pure data types with no I/O.
//! Ports define trait interfaces that adapter crates implement; the
//! synchronization engine in `wisync-sync` only ever talks to these traits.

pub mod config;
pub mod domain;
pub mod ports;
