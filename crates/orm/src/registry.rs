//! Model registry - defined model kinds and their shared client

use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::client::Client;
use crate::error::{ModelError, ModelResult};
use crate::model::{ModelDefinition, ModelType};

pub(crate) struct RegistryInner {
    client: Client,
    types: DashMap<String, ModelType>,
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        // Cached instances point back at their kind; clearing the in-memory
        // entries lets both be freed.
        for entry in self.types.iter() {
            entry.value().cache().clear();
        }
    }
}

/// Thread-safe table of model kinds by name.
///
/// Relations may name their target before it is defined; names are looked
/// up here the first time a relation is used.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    pub fn new(client: Client) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                client,
                types: DashMap::new(),
            }),
        }
    }

    pub fn client(&self) -> &Client {
        &self.inner.client
    }

    /// Define a new model kind
    pub fn define(&self, definition: ModelDefinition) -> ModelResult<ModelType> {
        self.register(definition, None)
    }

    pub(crate) fn register(
        &self,
        definition: ModelDefinition,
        parent: Option<&ModelType>,
    ) -> ModelResult<ModelType> {
        let name = definition.validated_name()?;

        match self.inner.types.entry(name.clone()) {
            Entry::Occupied(_) => Err(ModelError::Configuration(format!(
                "Model '{}' is already defined",
                name
            ))),
            Entry::Vacant(slot) => {
                let model = ModelType::build(definition, parent, self)?;
                slot.insert(model.clone());
                match parent {
                    Some(parent) => info!("Defined model '{}' extending '{}'", name, parent.name()),
                    None => info!("Defined model '{}'", name),
                }
                Ok(model)
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<ModelType> {
        self.inner.types.get(name).map(|entry| entry.value().clone())
    }

    /// Like [`Registry::get`], failing for unknown names
    pub fn resolve(&self, name: &str) -> ModelResult<ModelType> {
        self.get(name).ok_or_else(|| {
            ModelError::Relationship(format!("Model '{}' is not defined", name))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.types.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .types
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Forget every model kind and empty their caches, including the
    /// durable entries they own
    pub fn destroy(&self) {
        for entry in self.inner.types.iter() {
            entry.value().cache().destroy();
        }
        self.inner.types.clear();
        self.inner.client.responses().destroy();
        debug!("Registry destroyed");
    }

    pub(crate) fn downgrade(&self) -> Weak<RegistryInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn from_weak(inner: &Weak<RegistryInner>) -> ModelResult<Self> {
        inner
            .upgrade()
            .map(|inner| Self { inner })
            .ok_or_else(|| {
                ModelError::Configuration("the model registry has been dropped".to_string())
            })
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("models", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mock_registry;

    #[test]
    fn test_define_and_lookup() {
        let (registry, _) = mock_registry();
        let item = registry.define(ModelDefinition::new("item")).unwrap();

        assert!(registry.contains("item"));
        assert!(registry.get("item").unwrap().is(&item));
        assert_eq!(registry.names(), vec!["item".to_string()]);
        assert!(registry.resolve("user").is_err());
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let (registry, _) = mock_registry();
        registry.define(ModelDefinition::new("item")).unwrap();
        assert!(matches!(
            registry.define(ModelDefinition::new("item")),
            Err(ModelError::Configuration(_))
        ));
    }

    #[test]
    fn test_unnamed_definition_fails() {
        let (registry, _) = mock_registry();
        assert!(matches!(
            registry.define(ModelDefinition::unnamed()),
            Err(ModelError::Configuration(_))
        ));
    }

    #[test]
    fn test_destroy_forgets_models() {
        let (registry, _) = mock_registry();
        let item = registry.define(ModelDefinition::new("item")).unwrap();
        item.create(serde_json::json!({"id": 1})).unwrap();

        registry.destroy();
        assert!(item.cache().is_empty());
        assert!(registry.names().is_empty());
    }
}
