//! Unique id generation for unsaved instances

use uuid::Uuid;

/// Produces globally unique identifiers
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random (v4) UUIDs
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
