//! Metrics collection and exposition for Prometheus.
//!
//! Every service owns a registry; `all` mode shares one between them.

mod recorder;

pub use recorder::{Metrics, MetricsRecorder};
