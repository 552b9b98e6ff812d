//! Prometheus request and package-download metrics for an axum package
//! registry.
//!
//! The plugin observes inbound requests, derives best-effort identity and
//! client facts from the `authorization` and `user-agent` headers,
//! classifies paths against ordered exclusion and grouping rules, and
//! increments labeled counters once the response for each observed request
//! has completed. Counters are exposed in the Prometheus text format at a
//! configurable endpoint.
//!
//! ```no_run
//! use axum::{routing::get, Router};
//! use registry_metrics::{MetricsConfig, MetricsPlugin};
//!
//! # fn main() -> Result<(), registry_metrics::MetricsError> {
//! let config: MetricsConfig =
//!     serde_json::from_str(r#"{ "requestMetrics": { "enabled": true } }"#).unwrap();
//! let app = MetricsPlugin::new(config)?
//!     .install(Router::new().route("/-/ping", get(|| async { "{}" })));
//! # let _ = app;
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod config;
pub mod context;
pub mod error;
pub mod headers;
pub mod middleware;
pub mod plugin;
pub mod sink;

pub use config::{MetricsConfig, PackageGroup, DEFAULT_EXCLUDED_PATHS, DEFAULT_METRICS_PATH};
pub use error::MetricsError;
pub use headers::{derive_client, derive_identity, AuthScheme, ClientAgent, Identity, UNKNOWN};
pub use plugin::MetricsPlugin;
pub use sink::CONTENT_TYPE_METRICS;
