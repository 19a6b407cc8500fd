//! Tool endpoint clients.

pub mod http;

pub use http::HttpToolClient;
