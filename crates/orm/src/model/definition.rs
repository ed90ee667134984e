//! Model definitions

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{ModelError, ModelResult};
use crate::model::Instance;

/// Hook run once when a new instance is constructed, after its data is applied
pub type InitializeHook = Arc<dyn Fn(&Instance) -> ModelResult<()> + Send + Sync>;

/// Everything a model kind is defined from.
///
/// ```rust
/// use convex_orm::ModelDefinition;
///
/// let definition = ModelDefinition::new("item")
///     .default_value("status", "draft")
///     .plural("items");
/// ```
#[derive(Clone, Default)]
pub struct ModelDefinition {
    pub(crate) name: Option<String>,
    pub(crate) plural: Option<String>,
    pub(crate) defaults: Map<String, Value>,
    pub(crate) initialize: Option<InitializeHook>,
}

impl ModelDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// A definition without a name; defining it fails
    pub fn unnamed() -> Self {
        Self::default()
    }

    /// Override the collection name (the name plus "s" otherwise)
    pub fn plural(mut self, plural: impl Into<String>) -> Self {
        self.plural = Some(plural.into());
        self
    }

    /// A value every instance reports until it sets its own
    pub fn default_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }

    pub fn defaults(mut self, defaults: Map<String, Value>) -> Self {
        self.defaults.extend(defaults);
        self
    }

    pub fn on_initialize<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Instance) -> ModelResult<()> + Send + Sync + 'static,
    {
        self.initialize = Some(Arc::new(hook));
        self
    }

    pub(crate) fn validated_name(&self) -> ModelResult<String> {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => Ok(name.to_string()),
            _ => Err(ModelError::Configuration("a model must have a name".to_string())),
        }
    }
}

impl fmt::Debug for ModelDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDefinition")
            .field("name", &self.name)
            .field("plural", &self.plural)
            .field("defaults", &self.defaults)
            .field("initialize", &self.initialize.is_some())
            .finish()
    }
}
