//! Durable store implementations

pub mod file;
pub mod memory;
pub mod null;

pub use file::*;
pub use memory::*;
pub use null::*;
