//! HTTP request handlers for the gateway.

pub mod dataset;
