//! Shared domain types for Jobflow.
//!
//! This crate contains the core domain types used across the Jobflow
//! orchestrator: Job, WorkflowDefinition, Tool, QueueMessage, lifecycle
//! events, configuration, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod job;
pub mod queue;
pub mod tool;
pub mod workflow;
