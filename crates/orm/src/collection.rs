//! Collections of instances
//!
//! A [`Collection`] is an ordered, append-only list of instances of one
//! model kind that never holds the same instance twice. Collections held by
//! has-many relations stamp every pushed record with the owner's id.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ModelError, ModelResult, ResponseError};
use crate::model::{Instance, ModelType, WeakInstance};
use crate::query::query_from;
use crate::request::{Request, RequestConfig, RequestOptions};

/// Something that can be pushed into a collection
#[derive(Debug, Clone)]
pub enum CollectionItem {
    Instance(Instance),
    /// Attributes of an instance to create
    Data(Value),
}

impl From<Instance> for CollectionItem {
    fn from(instance: Instance) -> Self {
        Self::Instance(instance)
    }
}

impl From<&Instance> for CollectionItem {
    fn from(instance: &Instance) -> Self {
        Self::Instance(instance.clone())
    }
}

impl From<Value> for CollectionItem {
    fn from(data: Value) -> Self {
        Self::Data(data)
    }
}

impl From<Map<String, Value>> for CollectionItem {
    fn from(data: Map<String, Value>) -> Self {
        Self::Data(Value::Object(data))
    }
}

#[derive(Default)]
struct CollectionState {
    items: Vec<Instance>,
    attributes: Map<String, Value>,
    related: Option<(String, WeakInstance)>,
}

#[derive(Clone)]
pub struct Collection {
    model: ModelType,
    state: Arc<RwLock<CollectionState>>,
}

impl Collection {
    pub fn new(model: &ModelType) -> Self {
        Self {
            model: model.clone(),
            state: Arc::new(RwLock::new(CollectionState::default())),
        }
    }

    pub fn model(&self) -> &ModelType {
        &self.model
    }

    /// Attributes stamped onto every record pushed as data
    pub fn attributes(&self) -> Map<String, Value> {
        self.state.read().attributes.clone()
    }

    pub fn set_attributes(&self, attributes: Map<String, Value>) -> &Self {
        self.state.write().attributes = attributes;
        self
    }

    /// Set a single stamped attribute
    pub fn stamp(&self, key: impl Into<String>, value: Value) -> &Self {
        self.state.write().attributes.insert(key.into(), value);
        self
    }

    /// Name of the owning model, for collections held by a relation
    pub fn related_name(&self) -> Option<String> {
        self.state.read().related.as_ref().map(|(name, _)| name.clone())
    }

    /// The owner registered under `name`, if it is still alive
    pub fn related(&self, name: &str) -> Option<Instance> {
        let state = self.state.read();
        match &state.related {
            Some((related_name, owner)) if related_name == name => owner.upgrade(),
            _ => None,
        }
    }

    pub fn set_related(&self, name: impl Into<String>, owner: &Instance) -> &Self {
        self.state.write().related = Some((name.into(), owner.downgrade()));
        self
    }

    /// Append items, skipping instances that are already present.
    ///
    /// Presence is checked against the items' current ids, so an item whose
    /// id changed on save still matches the record the server returns.
    ///
    /// Data items are created through the model kind with the stamped
    /// attributes overriding theirs. Instances must be of this collection's
    /// kind.
    pub fn push<I, T>(&self, items: I) -> ModelResult<&Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<CollectionItem>,
    {
        for item in items {
            let instance = match item.into() {
                CollectionItem::Instance(instance) => {
                    if !instance.model().is(&self.model) {
                        return Err(ModelError::Validation(format!(
                            "cannot add a '{}' to a collection of '{}'",
                            instance.model().name(),
                            self.model.name()
                        )));
                    }
                    instance
                }
                CollectionItem::Data(Value::Object(mut data)) => {
                    data.extend(self.attributes());
                    self.model.create(Value::Object(data))?
                }
                CollectionItem::Data(other) => {
                    return Err(ModelError::Validation(format!(
                        "cannot add {} to a collection of '{}'",
                        other,
                        self.model.name()
                    )))
                }
            };

            let id = instance.id().ok_or_else(|| {
                ModelError::Validation(format!(
                    "cannot add a '{}' without an id to a collection",
                    self.model.name()
                ))
            })?;

            let mut state = self.state.write();
            let present = state
                .items
                .iter()
                .any(|item| item.ptr_eq(&instance) || item.id().as_deref() == Some(id.as_str()));
            if !present {
                state.items.push(instance);
            }
        }

        Ok(self)
    }

    /// Query the collection endpoint and push the results
    pub fn fetch(
        &self,
        query: Value,
        options: RequestOptions<'_>,
    ) -> BoxFuture<'static, ModelResult<Collection>> {
        let query = match query_from(query) {
            Ok(query) => query,
            Err(e) => return ModelType::ready(Err(e)),
        };
        let client = match self.model.client() {
            Ok(client) => client,
            Err(e) => return ModelType::ready(Err(e)),
        };

        let path = self.model.path();
        let request = Request::new(
            RequestConfig::get(path.clone())
                .with_query(query)
                .merge(&options),
        );
        let pending = request.dispatch(&client, options.batch);

        let collection = self.clone();
        async move {
            match pending.await? {
                Value::Array(items) => {
                    debug!("Fetched {} records from {}", items.len(), path);
                    collection.push(items)?;
                    Ok(collection)
                }
                other => Err(ResponseError::invalid(
                    None,
                    format!("expected a list from {}, got {}", path, other),
                )
                .into()),
            }
        }
        .boxed()
    }

    pub fn len(&self) -> usize {
        self.state.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Instance> {
        self.state.read().items.get(index).cloned()
    }

    pub fn first(&self) -> Option<Instance> {
        self.state.read().items.first().cloned()
    }

    pub fn last(&self) -> Option<Instance> {
        self.state.read().items.last().cloned()
    }

    pub fn contains(&self, instance: &Instance) -> bool {
        self.state.read().items.iter().any(|item| item.ptr_eq(instance))
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.state
            .read()
            .items
            .iter()
            .any(|item| item.id().as_deref() == Some(id))
    }

    /// Snapshot of the items in insertion order
    pub fn to_vec(&self) -> Vec<Instance> {
        self.state.read().items.clone()
    }

    pub fn ids(&self) -> Vec<String> {
        self.to_vec().iter().filter_map(Instance::id).collect()
    }

    pub fn iter(&self) -> std::vec::IntoIter<Instance> {
        self.to_vec().into_iter()
    }

    /// Projection of every item
    pub fn to_json(&self) -> Value {
        Value::Array(self.to_vec().iter().map(Instance::to_json).collect())
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = Instance;
    type IntoIter = std::vec::IntoIter<Instance>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl Serialize for Collection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Collection")
            .field("model", &self.model.name())
            .field("len", &state.items.len())
            .field("attributes", &state.attributes)
            .field("related", &state.related.as_ref().map(|(name, _)| name))
            .finish()
    }
}

/// A collection being filled by a query.
///
/// The collection is usable before the response arrives; awaiting resolves
/// to it once the results have been pushed.
pub struct Populating {
    collection: Collection,
    future: BoxFuture<'static, ModelResult<Collection>>,
}

impl Populating {
    pub(crate) fn new(
        collection: Collection,
        future: BoxFuture<'static, ModelResult<Collection>>,
    ) -> Self {
        Self { collection, future }
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }
}

impl Future for Populating {
    type Output = ModelResult<Collection>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().future.as_mut().poll(cx)
    }
}

impl fmt::Debug for Populating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Populating")
            .field("collection", &self.collection)
            .finish()
    }
}
