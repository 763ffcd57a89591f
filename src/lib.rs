//! # weather-stream-client
//!
//! A WebSocket client for a weather-streaming server, with auto-reconnection
//! and keepalive.
//!
//! ## Features
//!
//! - **Auto-reconnection** with capped exponential backoff and a retry budget
//! - **Manual and visibility-triggered recovery** after the budget runs out
//! - **Typed wire protocol** for welcome, weather updates, subscription
//!   confirmations and heartbeats
//! - **Send gating** so frames are never written to a dead connection
//! - **Metrics** for observability
//!
//! ## Example
//!
//! ```ignore
//! use weather_stream_client::{ClientConfig, DashboardHandler, WeatherClient, WeatherUpdate};
//!
//! struct Printer;
//!
//! impl DashboardHandler for Printer {
//!     async fn on_weather_update(&self, update: &WeatherUpdate) {
//!         println!("{}: {:.1}°C", update.city, update.temperature);
//!     }
//! }
//!
//! let config = ClientConfig::builder()
//!     .host("localhost:8080", false)
//!     .build()?;
//!
//! let client = WeatherClient::new(config, Printer);
//! client.start().await?;
//! client.subscribe("Paris").await;
//! ```

mod client;
mod config;
mod connection;
mod dashboard;
mod error;
mod handler;
mod keepalive;
mod machine;
mod metrics;
mod protocol;
mod subscriptions;

pub use client::WeatherClient;
pub use config::{
    endpoint_url, BackoffConfig, ClientConfig, ClientConfigBuilder, ConfigError, KeepaliveConfig,
    ENDPOINT_PATH,
};
pub use dashboard::{
    DashboardEvent, DashboardState, Stats, STATUS_CONNECTED, STATUS_READY, STATUS_SEND_FAILED,
    STATUS_STOPPED,
};
pub use error::{Error, ErrorKind};
pub use handler::DashboardHandler;
pub use keepalive::KeepaliveMonitor;
pub use machine::{ConnectionPhase, FailureOutcome, ReconnectMachine};
pub use metrics::{Metrics, MetricsSnapshot};
pub use protocol::{
    Heartbeat, InboundMessage, OutboundMessage, SubscriptionConfirmed, WeatherUpdate, Welcome,
};
pub use subscriptions::SubscriptionSet;

/// Result type for weather-stream-client operations
pub type Result<T> = std::result::Result<T, Error>;
