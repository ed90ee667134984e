//! Relation declarations and their runtime behavior

use std::fmt;
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::collection::Collection;
use crate::error::{ModelError, ModelResult};
use crate::model::{Instance, ModelKind, ModelType, Related};
use crate::registry::Registry;

/// Defines the type of relation between two model kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationType {
    /// The owner holds the target's id
    BelongsTo,
    /// The target holds the owner's id
    HasOne,
    /// Many targets hold the owner's id
    HasMany,
}

impl RelationType {
    /// Returns true if the relation holds at most one instance
    pub fn is_single(self) -> bool {
        !matches!(self, Self::HasMany)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BelongsTo => "belongsTo",
            Self::HasOne => "hasOne",
            Self::HasMany => "hasMany",
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The other side of a relation: a defined kind, or a name resolved
/// through the registry on first use
#[derive(Clone)]
pub struct RelationTarget {
    name: String,
    kind: Option<Weak<ModelKind>>,
}

impl RelationTarget {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the target is only known by name
    pub fn is_deferred(&self) -> bool {
        self.kind.is_none()
    }
}

impl From<&ModelType> for RelationTarget {
    fn from(model: &ModelType) -> Self {
        Self {
            name: model.name().to_string(),
            kind: Some(model.downgrade()),
        }
    }
}

impl From<&str> for RelationTarget {
    fn from(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: None,
        }
    }
}

impl From<String> for RelationTarget {
    fn from(name: String) -> Self {
        Self { name, kind: None }
    }
}

impl fmt::Debug for RelationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationTarget")
            .field("name", &self.name)
            .field("deferred", &self.is_deferred())
            .finish()
    }
}

/// Optional overrides for a relation declaration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationOptions {
    pub key: Option<String>,
    pub foreign_key: Option<String>,
}

impl RelationOptions {
    /// Attribute under which the related data lives
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Attribute holding the related id (singular relations only)
    pub fn foreign_key(mut self, foreign_key: impl Into<String>) -> Self {
        self.foreign_key = Some(foreign_key.into());
        self
    }
}

/// A full relation declaration
#[derive(Debug, Clone)]
pub struct RelationConfig {
    pub relation_type: RelationType,
    pub target: RelationTarget,
    pub options: RelationOptions,
}

impl RelationConfig {
    pub fn new(
        relation_type: RelationType,
        target: impl Into<RelationTarget>,
        options: RelationOptions,
    ) -> Self {
        Self {
            relation_type,
            target: target.into(),
            options,
        }
    }
}

struct RelationInner {
    relation_type: RelationType,
    target: RelationTarget,
    key: String,
    foreign_key: Option<String>,
    resolved: OnceCell<Weak<ModelKind>>,
}

/// A declared relation; clones share the memoized target
#[derive(Clone)]
pub struct Relation {
    inner: Arc<RelationInner>,
}

impl Relation {
    /// Apply the naming defaults.
    ///
    /// The key defaults to the target name, pluralized with "s" for has-many.
    /// Singular relations get a foreign key, `{key}_id` unless overridden.
    pub fn new(config: RelationConfig) -> Self {
        let RelationConfig {
            relation_type,
            target,
            options,
        } = config;

        let key = options.key.unwrap_or_else(|| match relation_type {
            RelationType::HasMany => format!("{}s", target.name()),
            _ => target.name().to_string(),
        });

        let foreign_key = if relation_type.is_single() {
            Some(options.foreign_key.unwrap_or_else(|| format!("{}_id", key)))
        } else {
            None
        };

        Self {
            inner: Arc::new(RelationInner {
                relation_type,
                target,
                key,
                foreign_key,
                resolved: OnceCell::new(),
            }),
        }
    }

    pub fn relation_type(&self) -> RelationType {
        self.inner.relation_type
    }

    pub fn is_single(&self) -> bool {
        self.inner.relation_type.is_single()
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn foreign_key(&self) -> Option<&str> {
        self.inner.foreign_key.as_deref()
    }

    pub fn target_name(&self) -> &str {
        self.inner.target.name()
    }

    /// The target kind, resolving a name through `registry` on first use
    pub fn target(&self, registry: &Registry) -> ModelResult<ModelType> {
        if let Some(kind) = self.inner.resolved.get().and_then(Weak::upgrade) {
            return Ok(ModelType::from_kind(kind));
        }

        let resolved = match &self.inner.target.kind {
            Some(kind) => kind.upgrade().map(ModelType::from_kind),
            None => registry.get(self.inner.target.name()),
        }
        .ok_or_else(|| {
            ModelError::Relationship(format!(
                "relation '{}' targets undefined model '{}'",
                self.inner.key,
                self.inner.target.name()
            ))
        })?;

        if self.inner.resolved.set(resolved.downgrade()).is_ok() {
            debug!("Resolved relation '{}' to model '{}'", self.inner.key, resolved.name());
        }
        Ok(resolved)
    }

    /// Resolve the target through the owner's registry
    pub fn target_of(&self, owner: &ModelType) -> ModelResult<ModelType> {
        self.target(&owner.registry()?)
    }

    /// Install the relation's storage on a freshly constructed instance.
    ///
    /// Singular relations start empty. Has-many relations get a collection
    /// whose items are stamped with `{owner name}_id` and which knows its
    /// owner.
    pub(crate) fn initialize(&self, owner: &Instance) -> ModelResult<()> {
        if owner.has_related(self.key()) {
            return Ok(());
        }

        let related = match self.inner.relation_type {
            RelationType::BelongsTo | RelationType::HasOne => Related::One(None),
            RelationType::HasMany => {
                let target = self.target_of(owner.model())?;
                let collection = Collection::new(&target);

                let mut stamp = Map::new();
                stamp.insert(
                    owner_foreign_key(owner.model()),
                    owner.raw_id().unwrap_or(Value::Null),
                );
                collection.set_attributes(stamp);
                collection.set_related(owner.model().name(), owner);

                Related::Many(collection)
            }
        };

        owner.install_related(self.key(), related);
        Ok(())
    }
}

/// Name of the attribute pointing back at an instance of `owner`
pub(crate) fn owner_foreign_key(owner: &ModelType) -> String {
    format!("{}_id", owner.name())
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("type", &self.inner.relation_type)
            .field("target", &self.inner.target.name())
            .field("key", &self.inner.key)
            .field("foreign_key", &self.inner.foreign_key)
            .finish()
    }
}
