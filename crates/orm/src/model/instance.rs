//! Model instances
//!
//! An [`Instance`] is a shared handle to one record. Handles are cheap to
//! clone and compare by identity: within a model kind there is at most one
//! live instance per id, so two handles for the same id are the same
//! instance.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::batch::Batch;
use crate::collection::Collection;
use crate::error::{ModelError, ModelResult, ResponseError};
use crate::model::kind::{id_string, ID_KEY};
use crate::model::ModelType;
use crate::relationships::{owner_foreign_key, Relation, RelationType};
use crate::request::{PendingRequest, Request, RequestConfig, RequestOptions};

/// Attributes starting with this character are never sent to the server
pub const INTERNAL_PREFIX: char = '$';

/// Storage of one relation on an instance
#[derive(Clone)]
pub(crate) enum Related {
    One(Option<Instance>),
    Many(Collection),
}

#[derive(Default)]
struct InstanceState {
    fields: Map<String, Value>,
    related: HashMap<String, Related>,
    saved: bool,
    deleted: bool,
}

#[derive(Clone)]
pub struct Instance {
    model: ModelType,
    state: Arc<RwLock<InstanceState>>,
}

/// Non-owning handle to an [`Instance`]
#[derive(Clone)]
pub struct WeakInstance {
    model: ModelType,
    state: Weak<RwLock<InstanceState>>,
}

impl WeakInstance {
    pub fn upgrade(&self) -> Option<Instance> {
        self.state.upgrade().map(|state| Instance {
            model: self.model.clone(),
            state,
        })
    }
}

impl fmt::Debug for WeakInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakInstance")
            .field("model", &self.model.name())
            .field("alive", &(self.state.strong_count() > 0))
            .finish()
    }
}

impl Instance {
    /// An instance holding nothing but its id, not yet initialized
    pub(crate) fn bare(model: ModelType, id: Value, saved: bool) -> Self {
        let mut fields = Map::new();
        fields.insert(ID_KEY.to_string(), id);

        Self {
            model,
            state: Arc::new(RwLock::new(InstanceState {
                fields,
                saved,
                ..InstanceState::default()
            })),
        }
    }

    /// Install relation storage, apply data, then run the initialize hook
    pub(crate) fn initialize(&self, attributes: Map<String, Value>) -> ModelResult<()> {
        for relation in self.model.relations() {
            relation.initialize(self)?;
        }

        self.merge(attributes)?;

        if let Some(hook) = self.model.initialize_hook() {
            hook(self)?;
        }

        Ok(())
    }

    pub fn model(&self) -> &ModelType {
        &self.model
    }

    /// The id as a string; `None` after a reset
    pub fn id(&self) -> Option<String> {
        self.state.read().fields.get(ID_KEY).and_then(id_string)
    }

    /// The id exactly as stored
    pub fn raw_id(&self) -> Option<Value> {
        self.state
            .read()
            .fields
            .get(ID_KEY)
            .filter(|id| !id.is_null())
            .cloned()
    }

    /// Whether the server knows this instance
    pub fn is_saved(&self) -> bool {
        self.state.read().saved
    }

    pub fn is_new(&self) -> bool {
        !self.is_saved()
    }

    pub fn is_deleted(&self) -> bool {
        self.state.read().deleted
    }

    /// An attribute value.
    ///
    /// Foreign keys report the related instance's id. Other keys read the own
    /// attribute, falling back to the model defaults.
    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(relation) = self.model.relation_for_foreign_key(key) {
            return self.related(relation.key()).and_then(|related| related.raw_id());
        }

        self.state
            .read()
            .fields
            .get(key)
            .cloned()
            .or_else(|| self.model.defaults().get(key).cloned())
    }

    /// Snapshot of the own attributes, without defaults or relations
    pub fn fields(&self) -> Map<String, Value> {
        self.state.read().fields.clone()
    }

    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    pub fn downgrade(&self) -> WeakInstance {
        WeakInstance {
            model: self.model.clone(),
            state: Arc::downgrade(&self.state),
        }
    }

    /// Apply attributes.
    ///
    /// Plain attributes and foreign keys are applied before relation data, so
    /// nested data sees the final ids. `null` is a no-op. Deleted instances
    /// reject every change.
    pub fn set(&self, attributes: Value) -> ModelResult<()> {
        self.ensure_live()?;
        match attributes {
            Value::Null => Ok(()),
            Value::Object(attributes) => self.merge(attributes),
            other => Err(ModelError::Validation(format!(
                "cannot set {} on '{}'",
                other,
                self.model.name()
            ))),
        }
    }

    pub fn set_attribute(
        &self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> ModelResult<()> {
        self.ensure_live()?;
        let mut attributes = Map::new();
        attributes.insert(key.into(), value.into());
        self.merge(attributes)
    }

    pub(crate) fn merge(&self, attributes: Map<String, Value>) -> ModelResult<()> {
        let mut plain = Map::new();
        let mut foreign_keys = Vec::new();
        let mut nested = Vec::new();

        for (key, value) in attributes {
            if key == ID_KEY {
                plain.insert(key, value);
            } else if let Some(relation) = self.model.relation(&key) {
                nested.push((relation, value));
            } else if let Some(relation) = self.model.relation_for_foreign_key(&key) {
                foreign_keys.push((relation, value));
            } else {
                plain.insert(key, value);
            }
        }

        if !plain.is_empty() {
            self.state.write().fields.extend(plain);
        }

        for (relation, value) in foreign_keys {
            self.assign_foreign_key(&relation, value)?;
        }

        for (relation, value) in nested {
            self.assign_related(&relation, value)?;
        }

        Ok(())
    }

    pub(crate) fn has_related(&self, key: &str) -> bool {
        self.state.read().related.contains_key(key)
    }

    /// Store relation data unless the relation already has storage
    pub(crate) fn install_related(&self, key: &str, related: Related) {
        self.state
            .write()
            .related
            .entry(key.to_string())
            .or_insert(related);
    }

    fn put_related(&self, key: &str, related: Related) {
        // The previous value is dropped after the lock is released.
        let _previous = self.state.write().related.insert(key.to_string(), related);
    }

    /// The instance held by a singular relation
    pub fn related(&self, key: &str) -> Option<Instance> {
        match self.state.read().related.get(key) {
            Some(Related::One(instance)) => instance.clone(),
            _ => None,
        }
    }

    /// The collection held by a has-many relation
    pub fn collection(&self, key: &str) -> Option<Collection> {
        match self.state.read().related.get(key) {
            Some(Related::Many(collection)) => Some(collection.clone()),
            _ => None,
        }
    }

    fn single_relation(&self, key: &str) -> ModelResult<Relation> {
        match self.model.relation(key) {
            Some(relation) if relation.is_single() => Ok(relation),
            Some(_) => Err(ModelError::Relationship(format!(
                "'{}' on '{}' is a has-many relation",
                key,
                self.model.name()
            ))),
            None => Err(ModelError::Relationship(format!(
                "'{}' has no relation '{}'",
                self.model.name(),
                key
            ))),
        }
    }

    /// Point a singular relation at `related`, or clear it
    pub fn set_related(&self, key: &str, related: Option<Instance>) -> ModelResult<()> {
        let relation = self.single_relation(key)?;

        if let Some(related) = &related {
            let target = relation.target_of(&self.model)?;
            if !related.model().is(&target) {
                return Err(ModelError::Validation(format!(
                    "'{}' expects a '{}', got a '{}'",
                    key,
                    target.name(),
                    related.model().name()
                )));
            }
        }

        self.put_related(relation.key(), Related::One(related));
        Ok(())
    }

    /// Id of the instance behind a foreign key
    pub fn foreign_key(&self, foreign_key: &str) -> Option<String> {
        let relation = self.model.relation_for_foreign_key(foreign_key)?;
        self.related(relation.key()).and_then(|related| related.id())
    }

    /// Set a foreign key.
    ///
    /// The same id keeps the current related instance. A different id swaps
    /// in the live instance with that id, creating a stub when there is none.
    /// `null` clears the relation.
    pub fn set_foreign_key(&self, foreign_key: &str, id: impl Into<Value>) -> ModelResult<()> {
        let relation = self.model.relation_for_foreign_key(foreign_key).ok_or_else(|| {
            ModelError::Relationship(format!(
                "'{}' has no foreign key '{}'",
                self.model.name(),
                foreign_key
            ))
        })?;
        self.assign_foreign_key(&relation, id.into())
    }

    fn assign_foreign_key(&self, relation: &Relation, id: Value) -> ModelResult<()> {
        if id.is_null() {
            self.put_related(relation.key(), Related::One(None));
            return Ok(());
        }

        let wanted = id_string(&id).ok_or_else(|| {
            ModelError::Validation(format!(
                "'{}' on '{}' must be a string or number id, got {}",
                relation.foreign_key().unwrap_or(relation.key()),
                self.model.name(),
                id
            ))
        })?;

        let current = self.related(relation.key()).and_then(|current| current.id());
        if current.as_deref() == Some(wanted.as_str()) {
            return Ok(());
        }

        let target = relation.target_of(&self.model)?;
        let mut stub = Map::new();
        stub.insert(ID_KEY.to_string(), id);
        let related = target.create(Value::Object(stub))?;

        self.put_related(relation.key(), Related::One(Some(related)));
        Ok(())
    }

    fn assign_related(&self, relation: &Relation, value: Value) -> ModelResult<()> {
        match relation.relation_type() {
            RelationType::HasMany => {
                let collection = match self.collection(relation.key()) {
                    Some(collection) => collection,
                    None => {
                        relation.initialize(self)?;
                        self.collection(relation.key()).ok_or_else(|| {
                            ModelError::Relationship(format!(
                                "'{}' holds no collection",
                                relation.key()
                            ))
                        })?
                    }
                };

                match value {
                    Value::Null => {}
                    Value::Array(items) => {
                        collection.push(items)?;
                    }
                    item @ Value::Object(_) => {
                        collection.push(vec![item])?;
                    }
                    other => {
                        return Err(ModelError::Validation(format!(
                            "'{}' on '{}' expects a list, got {}",
                            relation.key(),
                            self.model.name(),
                            other
                        )))
                    }
                }
                Ok(())
            }
            RelationType::BelongsTo | RelationType::HasOne => match value {
                Value::Null => {
                    self.put_related(relation.key(), Related::One(None));
                    Ok(())
                }
                id @ (Value::String(_) | Value::Number(_)) => self.assign_foreign_key(relation, id),
                Value::Object(mut data) => {
                    let incoming = data.get(ID_KEY).and_then(id_string);

                    if let Some(current) = self.related(relation.key()) {
                        if incoming.is_none() || incoming == current.id() {
                            return current.merge(data);
                        }
                    }

                    if relation.relation_type() == RelationType::HasOne {
                        if let Some(owner_id) = self.raw_id() {
                            data.entry(owner_foreign_key(&self.model)).or_insert(owner_id);
                        }
                    }

                    let target = relation.target_of(&self.model)?;
                    let related = target.create(Value::Object(data))?;
                    self.put_related(relation.key(), Related::One(Some(related)));
                    Ok(())
                }
                other => Err(ModelError::Validation(format!(
                    "'{}' on '{}' expects an object or an id, got {}",
                    relation.key(),
                    self.model.name(),
                    other
                ))),
            },
        }
    }

    /// Instance path when `include_id` is true, collection path otherwise.
    /// `None` includes the id only for saved instances.
    pub fn path(&self, include_id: Option<bool>) -> String {
        let include_id = include_id.unwrap_or_else(|| self.is_saved());
        match (include_id, self.id()) {
            (true, Some(id)) => format!("{}/{}", self.model.path(), id),
            _ => self.model.path(),
        }
    }

    /// Drop every own attribute and relation
    pub fn reset(&self) -> &Self {
        let (fields, related) = {
            let mut state = self.state.write();
            (
                std::mem::take(&mut state.fields),
                std::mem::take(&mut state.related),
            )
        };
        drop((fields, related));
        self
    }

    /// A new unsaved instance with this one's attributes and foreign keys
    pub fn duplicate(&self) -> ModelResult<Instance> {
        let mut data = match self.to_json() {
            Value::Object(data) => data,
            _ => Map::new(),
        };
        data.remove(ID_KEY);
        for (key, _) in self.model.defaults() {
            if !self.state.read().fields.contains_key(key) {
                data.remove(key);
            }
        }
        self.model.create(Value::Object(data))
    }

    /// Server-facing projection.
    ///
    /// Defaults overlaid with own attributes, plus the foreign key of every
    /// populated singular relation. Internal (`$`-prefixed) attributes and
    /// relation data are left out.
    pub fn to_json(&self) -> Value {
        let relations = self.model.relations();

        let (merged, singles) = {
            let state = self.state.read();

            let mut merged = self.model.defaults().clone();
            merged.extend(state.fields.iter().map(|(k, v)| (k.clone(), v.clone())));

            let singles: Vec<(String, Instance)> = relations
                .iter()
                .filter_map(|relation| match state.related.get(relation.key()) {
                    Some(Related::One(Some(related))) => {
                        Some((relation.foreign_key()?.to_string(), related.clone()))
                    }
                    _ => None,
                })
                .collect();

            (merged, singles)
        };

        let mut output = Map::new();
        for (key, value) in merged {
            if key.starts_with(INTERNAL_PREFIX) || relations.iter().any(|r| r.key() == key) {
                continue;
            }
            output.insert(key, value);
        }

        for (foreign_key, related) in singles {
            if let Some(id) = related.raw_id() {
                output.insert(foreign_key, id);
            }
        }

        Value::Object(output)
    }

    /// Send a request on behalf of this instance, or add it to the batch in `options`
    pub fn request(
        &self,
        defaults: RequestConfig,
        options: RequestOptions<'_>,
    ) -> ModelResult<PendingRequest> {
        let client = self.model.client()?;
        let request = Request::new(defaults.merge(&options));
        Ok(request.dispatch(&client, options.batch))
    }

    fn ensure_live(&self) -> ModelResult<()> {
        if self.is_deleted() {
            return Err(ModelError::Deleted(self.model.name().to_string()));
        }
        Ok(())
    }

    fn apply_response(&self, data: Value) -> ModelResult<()> {
        match data {
            Value::Null => Ok(()),
            Value::Object(data) => self.merge(data),
            other => Err(ResponseError::invalid(
                None,
                format!("expected an object for '{}', got {}", self.model.name(), other),
            )
            .into()),
        }
    }

    /// Reload from the server. Unsaved instances resolve immediately.
    pub fn fetch(&self, options: RequestOptions<'_>) -> BoxFuture<'static, ModelResult<Instance>> {
        if let Err(e) = self.ensure_live() {
            return ModelType::ready(Err(e));
        }
        if !self.is_saved() {
            return ModelType::ready(Ok(self.clone()));
        }

        let pending = match self.request(RequestConfig::get(self.path(Some(true))), options) {
            Ok(pending) => pending,
            Err(e) => return ModelType::ready(Err(e)),
        };

        let instance = self.clone();
        async move {
            let data = pending.await?;
            instance.apply_response(data)?;
            Ok(instance)
        }
        .boxed()
    }

    /// Create (POST to the collection) or update (PUT to the instance)
    pub fn save(&self, options: RequestOptions<'_>) -> BoxFuture<'static, ModelResult<Instance>> {
        if let Err(e) = self.ensure_live() {
            return ModelType::ready(Err(e));
        }

        let config = if self.is_saved() {
            RequestConfig::put(self.path(Some(true)))
        } else {
            RequestConfig::post(self.model.path())
        };

        let pending = match self.request(config.with_payload(self.to_json()), options) {
            Ok(pending) => pending,
            Err(e) => return ModelType::ready(Err(e)),
        };

        let instance = self.clone();
        let previous = self.id();
        async move {
            let data = pending.await?;
            instance.state.write().saved = true;
            instance.apply_response(data)?;
            instance.rekey(previous)?;
            Ok(instance)
        }
        .boxed()
    }

    /// Delete on the server when saved, then forget the instance locally
    pub fn delete(&self, options: RequestOptions<'_>) -> BoxFuture<'static, ModelResult<()>> {
        let pending = if self.is_saved() {
            match self.request(RequestConfig::delete(self.path(Some(true))), options) {
                Ok(pending) => Some(pending),
                Err(e) => return ModelType::ready(Err(e)),
            }
        } else {
            None
        };

        let instance = self.clone();
        async move {
            if let Some(pending) = pending {
                pending.await?;
            }
            instance.forget();
            Ok(())
        }
        .boxed()
    }

    /// Run `callback` with a fresh batch, process it and return the
    /// callback's value
    pub async fn batch<F, R>(&self, callback: F) -> ModelResult<R>
    where
        F: FnOnce(&Instance, &Batch) -> R,
    {
        let batch = Batch::new(&self.model.client()?);
        let value = callback(self, &batch);
        batch.process().await?;
        Ok(value)
    }

    /// Move the cache entry after the server assigned a different id
    fn rekey(&self, previous: Option<String>) -> ModelResult<()> {
        let current = self.id();
        if previous == current {
            return Ok(());
        }

        let cache = self.model.cache();
        if let Some(previous) = &previous {
            if cache.get(previous).map_or(false, |cached| cached.ptr_eq(self)) {
                cache.remove(previous);
            }
        }

        if let Some(current) = &current {
            if let Some(existing) = cache.get(current) {
                if !existing.ptr_eq(self) {
                    warn!(
                        "Replacing cached {}#{} with a newly saved instance",
                        self.model.name(),
                        current
                    );
                }
            }
            cache.put(current.clone(), self.clone());
            debug!(
                "Re-keyed {} from {:?} to {}",
                self.model.name(),
                previous,
                current
            );
        }

        self.restamp_children(previous.as_deref())
    }

    /// Point the owner id stamped on has-many and has-one children at the
    /// current id. Children stamped with a different owner are left alone.
    fn restamp_children(&self, previous: Option<&str>) -> ModelResult<()> {
        let stamp_key = owner_foreign_key(&self.model);
        let stamp_value = self.raw_id().unwrap_or(Value::Null);

        let mut children = Vec::new();
        for relation in self.model.relations() {
            match relation.relation_type() {
                RelationType::HasMany => {
                    if let Some(collection) = self.collection(relation.key()) {
                        collection.stamp(stamp_key.clone(), stamp_value.clone());
                        children.extend(collection.to_vec());
                    }
                }
                RelationType::HasOne => children.extend(self.related(relation.key())),
                RelationType::BelongsTo => {}
            }
        }

        for child in children.into_iter().filter(|child| !child.is_deleted()) {
            let stamped = child.get(&stamp_key).filter(|value| !value.is_null());
            if stamped.as_ref().and_then(id_string).as_deref() == previous {
                child.set_attribute(stamp_key.clone(), stamp_value.clone())?;
            }
        }

        Ok(())
    }

    fn forget(&self) {
        if let Some(id) = self.id() {
            let cache = self.model.cache();
            if cache.get(&id).map_or(false, |cached| cached.ptr_eq(self)) {
                cache.remove(&id);
            }
        }

        let (fields, related) = {
            let mut state = self.state.write();
            state.saved = false;
            state.deleted = true;
            (
                std::mem::take(&mut state.fields),
                std::mem::take(&mut state.related),
            )
        };
        drop((fields, related));
        debug!("Deleted {} locally", self.model.name());
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Instance {}

impl Serialize for Instance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Instance")
            .field("model", &self.model.name())
            .field("id", &state.fields.get(ID_KEY))
            .field("saved", &state.saved)
            .field("deleted", &state.deleted)
            .field("fields", &state.fields.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelDefinition;
    use crate::relationships::RelationOptions;
    use crate::testing::mock_registry;
    use serde_json::json;

    #[test]
    fn test_to_json_projection() {
        let (registry, _) = mock_registry();
        let user = registry.define(ModelDefinition::new("user")).unwrap();
        let item = registry
            .define(ModelDefinition::new("item").default_value("status", "draft"))
            .unwrap();
        item.belongs_to(&user, RelationOptions::default());

        let instance = item
            .create(json!({
                "id": 1,
                "name": "Ben",
                "$selected": true,
                "user": {"id": 2, "name": "Owner"},
            }))
            .unwrap();

        assert_eq!(
            instance.to_json(),
            json!({"id": 1, "name": "Ben", "status": "draft", "user_id": 2})
        );
    }

    #[test]
    fn test_path() {
        let (registry, _) = mock_registry();
        let item = registry.define(ModelDefinition::new("item")).unwrap();

        let unsaved = item.create(Value::Null).unwrap();
        assert_eq!(unsaved.path(None), "/items");
        assert_eq!(unsaved.path(Some(true)), format!("/items/{}", unsaved.id().unwrap()));

        let saved = item.create(json!({"id": 7})).unwrap();
        assert_eq!(saved.path(None), "/items/7");
        assert_eq!(saved.path(Some(false)), "/items");
    }

    #[test]
    fn test_foreign_key_sync() {
        let (registry, _) = mock_registry();
        let item = registry.define(ModelDefinition::new("item")).unwrap();
        item.belongs_to("user", RelationOptions::default());
        let user = registry.define(ModelDefinition::new("user")).unwrap();

        let instance = item.create(json!({"user_id": 5})).unwrap();
        let stub = instance.related("user").unwrap();
        assert!(stub.model().is(&user));
        assert!(stub.is_saved());
        assert_eq!(instance.foreign_key("user_id").as_deref(), Some("5"));

        // same id keeps the instance
        instance.set_foreign_key("user_id", 5).unwrap();
        assert!(instance.related("user").unwrap() == stub);

        // a different id swaps it
        instance.set_foreign_key("user_id", "6").unwrap();
        assert_eq!(instance.related("user").unwrap().id().as_deref(), Some("6"));

        instance.set_foreign_key("user_id", Value::Null).unwrap();
        assert!(instance.related("user").is_none());
        assert_eq!(instance.foreign_key("user_id"), None);
    }

    #[test]
    fn test_nested_singular_merges_same_id() {
        let (registry, _) = mock_registry();
        let user = registry.define(ModelDefinition::new("user")).unwrap();
        let item = registry.define(ModelDefinition::new("item")).unwrap();
        item.belongs_to(&user, RelationOptions::default());

        let instance = item.create(json!({"user": {"id": 1, "name": "Ben"}})).unwrap();
        let owner = instance.related("user").unwrap();

        instance.set(json!({"user": {"age": 30}})).unwrap();
        assert!(instance.related("user").unwrap() == owner);
        assert_eq!(owner.get("age"), Some(json!(30)));

        instance.set(json!({"user": {"id": 2}})).unwrap();
        assert_eq!(instance.related("user").unwrap().id().as_deref(), Some("2"));
        assert!(user.cached("1").unwrap() == owner);
    }

    #[test]
    fn test_has_one_stamps_owner_id() {
        let (registry, _) = mock_registry();
        let item = registry.define(ModelDefinition::new("item")).unwrap();
        let profile = registry.define(ModelDefinition::new("profile")).unwrap();
        item.has_one(&profile, RelationOptions::default());

        let instance = item.create(json!({"id": 3, "profile": {"bio": "hi"}})).unwrap();
        let related = instance.related("profile").unwrap();
        assert_eq!(related.get("item_id"), Some(json!(3)));
    }

    #[test]
    fn test_set_related_checks_type() {
        let (registry, _) = mock_registry();
        let user = registry.define(ModelDefinition::new("user")).unwrap();
        let item = registry.define(ModelDefinition::new("item")).unwrap();
        item.belongs_to(&user, RelationOptions::default());

        let instance = item.create(Value::Null).unwrap();
        let other_item = item.create(Value::Null).unwrap();
        assert!(instance.set_related("user", Some(other_item)).is_err());
        assert!(instance.set_related("missing", None).is_err());

        let owner = user.create(json!({"id": 9})).unwrap();
        instance.set_related("user", Some(owner)).unwrap();
        assert_eq!(instance.to_json()["user_id"], json!(9));
    }

    #[test]
    fn test_reset_and_duplicate() {
        let (registry, _) = mock_registry();
        let item = registry
            .define(ModelDefinition::new("item").default_value("status", "draft"))
            .unwrap();

        let original = item.create(json!({"id": 1, "name": "Ben"})).unwrap();
        let copy = original.duplicate().unwrap();
        assert!(copy != original);
        assert!(!copy.is_saved());
        assert_eq!(copy.get("name"), Some(json!("Ben")));
        assert!(copy.fields().get("status").is_none());
        assert_ne!(copy.id(), original.id());

        original.reset();
        assert!(original.fields().is_empty());
        assert_eq!(original.id(), None);
        assert_eq!(original.get("status"), Some(json!("draft")));
    }

    #[test]
    fn test_initialize_hook_runs_once() {
        let (registry, _) = mock_registry();
        let item = registry
            .define(ModelDefinition::new("item").on_initialize(|instance| {
                let count = instance.get("$inits").and_then(|v| v.as_u64()).unwrap_or(0);
                instance.set_attribute("$inits", count + 1)
            }))
            .unwrap();

        let instance = item.create(json!({"id": 1})).unwrap();
        item.create(json!({"id": 1, "name": "again"})).unwrap();
        assert_eq!(instance.get("$inits"), Some(json!(1)));
        assert!(instance.to_json().get("$inits").is_none());
    }

    #[test]
    fn test_failed_initialize_unregisters() {
        let (registry, _) = mock_registry();
        let item = registry
            .define(ModelDefinition::new("item").on_initialize(|_| {
                Err(ModelError::Validation("rejected".to_string()))
            }))
            .unwrap();

        assert!(item.create(json!({"id": 1})).is_err());
        assert!(item.cached("1").is_none());
    }
}
