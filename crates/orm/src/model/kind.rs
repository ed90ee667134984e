//! Model kinds
//!
//! A [`ModelType`] is one defined kind of record: its name, collection
//! path, defaults, relations and identity cache. It is the factory for
//! [`Instance`]s and the entry point for collection queries.

use std::fmt;
use std::sync::{Arc, Weak};

use convex_cache::Cache;
use futures::future::{self, BoxFuture};
use futures::FutureExt;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::debug;

use crate::client::Client;
use crate::collection::{Collection, Populating};
use crate::error::{ModelError, ModelResult};
use crate::model::{InitializeHook, Instance, ModelDefinition};
use crate::registry::{Registry, RegistryInner};
use crate::relationships::{Relation, RelationConfig, RelationOptions, RelationTarget, RelationType};
use crate::request::RequestOptions;

/// Key of the identifier attribute
pub const ID_KEY: &str = "id";

pub(crate) struct ModelKind {
    name: String,
    plural: String,
    defaults: Map<String, Value>,
    initialize: Option<InitializeHook>,
    relations: RwLock<Vec<Relation>>,
    cache: Cache<Instance>,
    registry: Weak<RegistryInner>,
}

/// Handle to a defined model kind; clones share the same kind
#[derive(Clone)]
pub struct ModelType {
    kind: Arc<ModelKind>,
}

impl ModelType {
    pub(crate) fn build(
        definition: ModelDefinition,
        parent: Option<&ModelType>,
        registry: &Registry,
    ) -> ModelResult<Self> {
        let name = definition.validated_name()?;
        let plural = definition
            .plural
            .clone()
            .unwrap_or_else(|| format!("{}s", name));

        let mut defaults = parent.map(|p| p.defaults().clone()).unwrap_or_default();
        defaults.extend(definition.defaults);

        let initialize = definition
            .initialize
            .or_else(|| parent.and_then(|p| p.kind.initialize.clone()));
        let relations = parent.map(ModelType::relations).unwrap_or_default();

        let client = registry.client();
        let cache = Cache::new(
            name.clone(),
            &client.config().cache_config()?,
            client.store().clone(),
        );

        Ok(Self {
            kind: Arc::new(ModelKind {
                name,
                plural,
                defaults,
                initialize,
                relations: RwLock::new(relations),
                cache,
                registry: registry.downgrade(),
            }),
        })
    }

    pub(crate) fn from_kind(kind: Arc<ModelKind>) -> Self {
        Self { kind }
    }

    pub(crate) fn downgrade(&self) -> Weak<ModelKind> {
        Arc::downgrade(&self.kind)
    }

    pub fn name(&self) -> &str {
        &self.kind.name
    }

    pub fn plural(&self) -> &str {
        &self.kind.plural
    }

    /// Collection path, `/{plural}`
    pub fn path(&self) -> String {
        format!("/{}", self.kind.plural)
    }

    pub fn defaults(&self) -> &Map<String, Value> {
        &self.kind.defaults
    }

    /// Identity cache of this kind
    pub fn cache(&self) -> &Cache<Instance> {
        &self.kind.cache
    }

    /// The live instance registered under `id`, if any
    pub fn cached(&self, id: &str) -> Option<Instance> {
        self.kind.cache.get(id)
    }

    pub fn registry(&self) -> ModelResult<Registry> {
        Registry::from_weak(&self.kind.registry)
    }

    pub fn client(&self) -> ModelResult<Client> {
        Ok(self.registry()?.client().clone())
    }

    /// Whether both handles refer to the same kind
    pub fn is(&self, other: &ModelType) -> bool {
        Arc::ptr_eq(&self.kind, &other.kind)
    }

    pub fn relations(&self) -> Vec<Relation> {
        self.kind.relations.read().clone()
    }

    pub fn relation(&self, key: &str) -> Option<Relation> {
        self.kind
            .relations
            .read()
            .iter()
            .find(|relation| relation.key() == key)
            .cloned()
    }

    pub(crate) fn relation_for_foreign_key(&self, foreign_key: &str) -> Option<Relation> {
        self.kind
            .relations
            .read()
            .iter()
            .find(|relation| relation.foreign_key() == Some(foreign_key))
            .cloned()
    }

    pub(crate) fn initialize_hook(&self) -> Option<InitializeHook> {
        self.kind.initialize.clone()
    }

    /// Declare a relation; a relation with the same key is replaced
    pub fn relate(&self, config: RelationConfig) -> &Self {
        let relation = Relation::new(config);
        debug!(
            "Model '{}' {} '{}' as '{}'",
            self.name(),
            relation.relation_type(),
            relation.target_name(),
            relation.key()
        );

        let mut relations = self.kind.relations.write();
        match relations.iter().position(|existing| existing.key() == relation.key()) {
            Some(index) => relations[index] = relation,
            None => relations.push(relation),
        }
        drop(relations);
        self
    }

    pub fn belongs_to(&self, target: impl Into<RelationTarget>, options: RelationOptions) -> &Self {
        self.relate(RelationConfig::new(RelationType::BelongsTo, target, options))
    }

    pub fn has_one(&self, target: impl Into<RelationTarget>, options: RelationOptions) -> &Self {
        self.relate(RelationConfig::new(RelationType::HasOne, target, options))
    }

    pub fn has_many(&self, target: impl Into<RelationTarget>, options: RelationOptions) -> &Self {
        self.relate(RelationConfig::new(RelationType::HasMany, target, options))
    }

    /// Define a new kind inheriting defaults, relations and the initialize
    /// hook of this one
    pub fn extend(&self, definition: ModelDefinition) -> ModelResult<ModelType> {
        self.registry()?.register(definition, Some(self))
    }

    /// Construct an instance, or merge into the live one with the same id.
    ///
    /// Without an id the instance is unsaved and gets a generated one. With
    /// an id it is considered saved. The instance is registered in the
    /// identity cache before relations and data are applied, so nested data
    /// that refers back to it resolves to this same instance.
    pub fn create(&self, attributes: Value) -> ModelResult<Instance> {
        let mut attributes = match attributes {
            Value::Null => Map::new(),
            Value::Object(attributes) => attributes,
            other => {
                return Err(ModelError::Validation(format!(
                    "cannot create '{}' from {}",
                    self.name(),
                    other
                )))
            }
        };

        let (id, saved) = match attributes.get(ID_KEY).and_then(id_string) {
            Some(id) => (id, true),
            None => {
                let id = self.client()?.generate_id();
                attributes.insert(ID_KEY.to_string(), Value::String(id.clone()));
                (id, false)
            }
        };

        let raw_id = attributes.get(ID_KEY).cloned().unwrap_or(Value::Null);
        let (instance, fresh) = self
            .kind
            .cache
            .get_or_insert_with(id.clone(), || Instance::bare(self.clone(), raw_id, saved));

        if !fresh {
            debug!("Identity map hit for {}#{}", self.name(), id);
            instance.merge(attributes)?;
            return Ok(instance);
        }

        if let Err(e) = instance.initialize(attributes) {
            self.kind.cache.remove(&id);
            return Err(e);
        }

        Ok(instance)
    }

    /// Query the collection endpoint.
    ///
    /// The returned [`Populating`] exposes the collection right away and
    /// resolves once the response has been pushed into it.
    pub fn where_(&self, query: Value, options: RequestOptions<'_>) -> Populating {
        let collection = Collection::new(self);
        let future = collection.fetch(query, options);
        Populating::new(collection, future)
    }

    /// Query without filters
    pub fn all(&self, options: RequestOptions<'_>) -> Populating {
        self.where_(Value::Null, options)
    }

    /// First match of a query; fails with `NotFound` when there is none
    pub fn find(
        &self,
        query: Value,
        options: RequestOptions<'_>,
    ) -> BoxFuture<'static, ModelResult<Instance>> {
        let plural = self.plural().to_string();
        let populating = self.where_(query, options);

        async move {
            let collection = populating.await?;
            collection
                .first()
                .ok_or_else(|| ModelError::NotFound(format!("no {} matched the query", plural)))
        }
        .boxed()
    }

    /// A collection of this kind holding `items`
    pub fn collection<I, T>(&self, items: I) -> ModelResult<Collection>
    where
        I: IntoIterator<Item = T>,
        T: Into<crate::collection::CollectionItem>,
    {
        let collection = Collection::new(self);
        collection.push(items)?;
        Ok(collection)
    }

    pub(crate) fn ready<T: Send + 'static>(
        result: ModelResult<T>,
    ) -> BoxFuture<'static, ModelResult<T>> {
        future::ready(result).boxed()
    }
}

impl PartialEq for ModelType {
    fn eq(&self, other: &Self) -> bool {
        self.is(other)
    }
}

impl Eq for ModelType {}

impl fmt::Debug for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelType")
            .field("name", &self.kind.name)
            .field("plural", &self.kind.plural)
            .field("relations", &self.kind.relations.read().len())
            .field("cached", &self.kind.cache.len())
            .finish()
    }
}

/// String form of an id value; `None` for null and non-scalar values
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mock_registry;
    use serde_json::json;

    #[test]
    fn test_names_and_paths() {
        let (registry, _) = mock_registry();
        let item = registry.define(ModelDefinition::new("item")).unwrap();
        let person = registry.define(ModelDefinition::new("person").plural("people")).unwrap();

        assert_eq!(item.path(), "/items");
        assert_eq!(person.plural(), "people");
        assert_eq!(person.path(), "/people");
    }

    #[test]
    fn test_create_generates_id_for_unsaved() {
        let (registry, _) = mock_registry();
        let item = registry.define(ModelDefinition::new("item")).unwrap();

        let instance = item.create(json!({"name": "Ben"})).unwrap();
        assert_eq!(instance.id().as_deref(), Some("tmp-1"));
        assert!(!instance.is_saved());
        assert!(item.cached("tmp-1").unwrap() == instance);
    }

    #[test]
    fn test_identity_map_merges() {
        let (registry, _) = mock_registry();
        let item = registry.define(ModelDefinition::new("item")).unwrap();

        let first = item.create(json!({"id": 1, "name": "Ben"})).unwrap();
        let second = item.create(json!({"id": 1, "age": 30})).unwrap();

        assert!(first == second);
        assert!(first.is_saved());
        assert_eq!(first.get("name"), Some(json!("Ben")));
        assert_eq!(first.get("age"), Some(json!(30)));
        assert_eq!(item.cache().len(), 1);
    }

    #[test]
    fn test_create_rejects_scalars() {
        let (registry, _) = mock_registry();
        let item = registry.define(ModelDefinition::new("item")).unwrap();
        assert!(matches!(item.create(json!(5)), Err(ModelError::Validation(_))));
    }

    #[test]
    fn test_extend_inherits() {
        let (registry, _) = mock_registry();
        let base = registry
            .define(ModelDefinition::new("item").default_value("status", "draft"))
            .unwrap();
        base.belongs_to("user", RelationOptions::default());

        let special = base
            .extend(ModelDefinition::new("special").default_value("kind", "special"))
            .unwrap();

        assert_eq!(special.path(), "/specials");
        assert_eq!(special.defaults()["status"], "draft");
        assert_eq!(special.defaults()["kind"], "special");
        assert!(special.relation("user").is_some());
        assert!(base.defaults().get("kind").is_none());
        assert!(registry.get("special").is_some());
    }

    #[test]
    fn test_redeclaring_relation_replaces_it() {
        let (registry, _) = mock_registry();
        let item = registry.define(ModelDefinition::new("item")).unwrap();
        item.belongs_to("user", RelationOptions::default());
        item.belongs_to("user", RelationOptions::default().foreign_key("owner_id"));

        assert_eq!(item.relations().len(), 1);
        assert_eq!(item.relation("user").unwrap().foreign_key(), Some("owner_id"));
    }

    #[test]
    fn test_id_string() {
        assert_eq!(id_string(&json!("abc")), Some("abc".to_string()));
        assert_eq!(id_string(&json!(42)), Some("42".to_string()));
        assert_eq!(id_string(&json!(null)), None);
        assert_eq!(id_string(&json!("")), None);
        assert_eq!(id_string(&json!({"id": 1})), None);
    }
}
