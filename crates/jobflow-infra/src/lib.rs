//! Infrastructure layer for Jobflow.
//!
//! Contains implementations of the ports defined in `jobflow-core`: SQLite
//! job and tool storage, a durable SQLite queue transport, the HTTP JSON-RPC
//! tool client, and configuration loading.

pub mod config;
pub mod queue;
pub mod sqlite;
pub mod tool;
