//! Core library for the transport-stream fan-out proxy: one upstream
//! ingress per configured stream, many concurrent HTTP subscribers.

pub mod admission;
pub mod app;
pub mod broker;
pub mod config;
pub mod error;
pub mod events;
pub mod observability;
pub mod puller;
pub mod source;
pub mod stats;
pub mod stream;
pub mod subscriber;
pub mod ts;

pub use app::App;
pub use config::{ProcessConfig, StreamConfig};
pub use stream::{CredentialPolicy, StreamHandle};
