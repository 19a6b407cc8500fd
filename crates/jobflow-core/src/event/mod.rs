//! Job lifecycle event bus.
//!
//! Provides an `EventBus` that distributes `JobEvent` messages to all
//! subscribers via a `tokio::sync::broadcast` channel, and a per-job
//! filtered `JobSubscription`.

pub mod bus;

pub use bus::{DEFAULT_EVENT_CAPACITY, EventBus, JobSubscription};
