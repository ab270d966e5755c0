//! Raw telemetry samples as delivered by clients and media servers.
//!
//! Samples are consumed read-only: sources route them into snapshot builders, visit
//! middlewares turn them into reports and, when configured, copy them onto records.
mod client_sample;
mod sfu_sample;

pub use client_sample::*;
pub use sfu_sample::*;
