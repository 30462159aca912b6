//! Prometheus text exposition format.
//!
//! Renders a registry into the text exposition format for scraping by a
//! Prometheus server or compatible agent.

use prometheus::{Encoder, Registry, TextEncoder};

use crate::error::MetricsResult;

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render every family gathered from `registry`.
///
/// Families with no series yet (a labelled gauge that was never written)
/// are omitted.
pub fn render_prometheus(registry: &Registry) -> MetricsResult<String> {
    let encoder = TextEncoder::new();
    let families = registry.gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
