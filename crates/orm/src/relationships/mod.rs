//! Relations between model kinds
//!
//! Three kinds of relation are supported:
//!
//! - **belongs to**: the owner stores the target's id in a foreign key
//! - **has one**: the target stores the owner's id
//! - **has many**: a collection of targets that store the owner's id

pub mod relation;

pub use relation::*;
