//! Prometheus metrics exporter for HomematicIP Cloud device state.
//!
//! This crate polls the cloud access point for the current group/device
//! topology and republishes each device's state as labeled metrics via an
//! HTTP `/metrics` endpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │  Cloud session  │────>│  Synchronizer   │────>│ Metric Registry │
//! │ (poll snapshot) │     │ (classify+write)│     │  (fixed schema) │
//! └─────────────────┘     └─────────────────┘     └────────┬────────┘
//!          │                                               │
//!          │ push events   ┌─────────────────┐             v
//!          └──────────────>│  Event Adapter  │      HTTP /metrics
//!                          └─────────────────┘
//! ```
//!
//! # Usage
//!
//! Run the exporter binary with a configuration file:
//!
//! ```bash
//! hmip-exporter-prometheus --config config.json5
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod classify;
pub mod config;
pub mod events;
pub mod http;
pub mod registry;
pub mod sync;

pub use classify::{DeviceClass, classify};
pub use config::ExporterConfig;
pub use events::EventAdapter;
pub use http::HttpServer;
pub use registry::{Metric, MetricRegistry, SharedRegistry};
pub use sync::{PollOutcome, Synchronizer};
