//! Shared collaborators of every model
//!
//! A [`Client`] bundles the configuration with the transport, the id
//! generator, the durable store and the response cache. It is cheap to
//! clone.

use std::fmt;
use std::sync::Arc;

use convex_cache::{Cache, DurableStore, NullStore};
use serde_json::Value;

use crate::config::ConvexConfig;
use crate::error::ModelResult;
use crate::id::{IdGenerator, UuidGenerator};
use crate::transport::{ReqwestTransport, Transport};

/// Name of the cache holding GET responses
pub const RESPONSE_CACHE: &str = "responses";

struct ClientInner {
    config: ConvexConfig,
    transport: Arc<dyn Transport>,
    ids: Arc<dyn IdGenerator>,
    store: Arc<dyn DurableStore>,
    responses: Cache<Value>,
}

#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// A client with the HTTP transport, UUID ids and no durable storage
    pub fn new(config: ConvexConfig) -> ModelResult<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: ConvexConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    pub fn config(&self) -> &ConvexConfig {
        &self.inner.config
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    pub fn store(&self) -> &Arc<dyn DurableStore> {
        &self.inner.store
    }

    /// Cache of GET responses keyed by URL
    pub fn responses(&self) -> &Cache<Value> {
        &self.inner.responses
    }

    /// A fresh id for an unsaved instance
    pub fn generate_id(&self) -> String {
        self.inner.ids.generate()
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.inner.config)
            .field("durable", &self.inner.store.is_available())
            .finish()
    }
}

/// Builder for [`Client`]
pub struct ClientBuilder {
    config: ConvexConfig,
    transport: Option<Arc<dyn Transport>>,
    ids: Option<Arc<dyn IdGenerator>>,
    store: Option<Arc<dyn DurableStore>>,
}

impl ClientBuilder {
    pub fn new(config: ConvexConfig) -> Self {
        Self {
            config,
            transport: None,
            ids: None,
            store: None,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Validate the configuration and build the client
    pub fn build(self) -> ModelResult<Client> {
        self.config.validate()?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&self.config)?),
        };
        let ids = self.ids.unwrap_or_else(|| Arc::new(UuidGenerator));
        let store = self.store.unwrap_or_else(|| Arc::new(NullStore));

        if !store.is_available() {
            tracing::debug!("No durable storage available, persisted responses stay in memory");
        }

        let responses = Cache::new(RESPONSE_CACHE, &self.config.cache_config()?, store.clone());

        Ok(Client {
            inner: Arc::new(ClientInner {
                config: self.config,
                transport,
                ids,
                store,
                responses,
            }),
        })
    }
}
