//! Observability setup for pincache: structured logging and optional
//! OpenTelemetry trace export.

pub mod tracing_setup;
