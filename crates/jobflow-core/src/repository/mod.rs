//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (jobflow-infra) implements. The core crate never depends on any
//! specific storage technology.

pub mod job;
pub mod memory;
pub mod tool;

pub use job::JobRepository;
pub use memory::{InMemoryJobRepository, InMemoryToolRegistry};
pub use tool::ToolRegistry;
