//! Calbridge Telemetry - Local observability
//!
//! Provides:
//! - `MetricsRegistry`: Prometheus counters, gauges and histograms for reconciliation
//! - `MetricsServer`: HTTP server for Prometheus scraping
//!
//! Nothing leaves the machine; the server binds to loopback by default.

pub mod metrics;
pub mod server;

pub use metrics::MetricsRegistry;
pub use server::MetricsServer;
