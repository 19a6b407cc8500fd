//! Business logic and port definitions for Jobflow.
//!
//! This crate defines the "ports" (repository, queue, and tool client
//! traits) that the infrastructure layer implements, plus the logic built on
//! them: job store, workflow validation and execution, and the orchestrator.
//! It depends only on `jobflow-types` -- never on `jobflow-infra` or any
//! database/IO crate.

pub mod event;
pub mod orchestrator;
pub mod queue;
pub mod repository;
pub mod service;
pub mod tool;
pub mod workflow;
