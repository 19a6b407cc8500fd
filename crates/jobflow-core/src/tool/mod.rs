//! Tool client port.
//!
//! `ToolClient` is how the executor reaches a registered tool. The HTTP
//! JSON-RPC implementation lives in jobflow-infra; tests substitute scripted
//! clients.

pub mod client;

pub use client::ToolClient;
