//! Provider implementations.

pub mod memory;

pub use memory::{InMemoryDestination, InMemorySource};
