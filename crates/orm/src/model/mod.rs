//! Model kinds, their definitions and instances

pub mod definition;
pub mod instance;
pub mod kind;

pub use definition::*;
pub use instance::{Instance, WeakInstance, INTERNAL_PREFIX};
pub use kind::{id_string, ModelType, ID_KEY};

pub(crate) use instance::Related;
pub(crate) use kind::ModelKind;
