//! # Cadastre
//!
//! A multi-tenant geospatial feature store, usable both as a standalone
//! server binary and as a library.
//!
//! Principals own named, versioned collections of geometry + attributes,
//! scoped to logical databases. The core decides who may create, rename,
//! copy, drop, or query a collection; builds the physical tables, triggers,
//! and indexes for dynamically named schema objects; and composes spatial
//! predicates into dynamic queries.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! cadastre = { version = "0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cadastre::server::{AppState, create_router};
//! use cadastre::store::{SqliteStore, Store};
//!
//! let store = SqliteStore::new("./data/cadastre.db").unwrap();
//! store.initialize().unwrap();
//!
//! let state = Arc::new(AppState { store: Arc::new(store) });
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Includes the binary's CLI. Disable with
//!   `default-features = false`.

pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod query;
pub mod roles;
pub mod server;
pub mod store;
pub mod types;
pub mod usage;
