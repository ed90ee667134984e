//! Cache configuration and builder

use serde::{Deserialize, Serialize};
use service_builder::builder;

/// Default namespace for durable keys
pub const DEFAULT_NAMESPACE: &str = "convex-";

/// Cache configuration shared by every cache of an application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[builder]
pub struct CacheConfig {
    /// Namespace prepended to every durable key
    #[builder(default = "DEFAULT_NAMESPACE.to_string()", getter)]
    pub namespace: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl CacheConfig {
    /// Durable key prefix for a cache named `name`
    pub fn prefix_for(&self, name: &str) -> String {
        format!("{}{}:", self.namespace, name)
    }
}
