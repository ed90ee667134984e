//! # convex-orm: Identity-mapped models over JSON REST APIs
//!
//! Define model kinds once, declare how they relate, and work with live
//! instances whose state stays consistent however many responses mention
//! them.
//!
//! ## Features
//!
//! - **Identity map**: at most one live instance per model kind and id
//! - **Relations**: belongs-to, has-one and has-many, with foreign keys kept
//!   in sync with the related instances
//! - **Collections**: ordered, duplicate-free, stamped with the owner's id
//! - **Remote operations**: fetch, save, delete and collection queries with
//!   retries on a busy server and normalized errors
//! - **Batching**: capture several requests and send them in one round trip
//! - **Response caching**: optional in-memory or durable caching of GETs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use convex_orm::{
//!     Client, ConvexConfig, ModelDefinition, Registry, RelationOptions, RequestOptions,
//! };
//! use serde_json::json;
//!
//! # async fn run() -> convex_orm::ModelResult<()> {
//! let registry = Registry::new(Client::new(ConvexConfig::from_env()?)?);
//!
//! let user = registry.define(ModelDefinition::new("user"))?;
//! let item = registry.define(ModelDefinition::new("item"))?;
//! item.belongs_to(&user, RelationOptions::default());
//!
//! let instance = item.create(json!({"name": "Ben", "user_id": 1}))?;
//! instance.save(RequestOptions::new()).await?;
//!
//! let items = item.where_(json!({"user_id": 1}), RequestOptions::new().expand("user")).await?;
//! assert!(items.contains(&instance));
//! # Ok(())
//! # }
//! ```
//!
//! Behavior shared by several model kinds belongs in an ordinary extension
//! trait implemented for [`ModelType`] or [`Instance`].

pub mod batch;
pub mod client;
pub mod collection;
pub mod config;
pub mod error;
pub mod id;
pub mod logging;
pub mod model;
pub mod query;
pub mod registry;
pub mod relationships;
pub mod request;
pub mod testing;
pub mod transport;

pub use batch::Batch;
pub use client::{Client, ClientBuilder};
pub use collection::{Collection, CollectionItem, Populating};
pub use config::{ConvexConfig, ConvexConfigBuilder, RetryPolicy};
pub use error::{ModelError, ModelResult, ResponseError};
pub use id::{IdGenerator, UuidGenerator};
pub use logging::{init_logging, LoggingConfig};
pub use model::{Instance, ModelDefinition, ModelType, WeakInstance};
pub use query::Query;
pub use registry::Registry;
pub use relationships::{Relation, RelationConfig, RelationOptions, RelationTarget, RelationType};
pub use request::{CacheMode, Method, PendingRequest, Request, RequestConfig, RequestOptions};
pub use transport::{ReqwestTransport, Transport, TransportRequest, TransportResponse};

pub use convex_cache::{DurableStore, FileStore, MemoryStore, NullStore};
