//! Domain types flowing through the pipeline.

pub mod ip;
pub mod outbound;

pub use ip::{IpRecord, QualityMetrics};
pub use outbound::{GeneratedOutbound, OutboundTemplate, Protocol, managed_tag};
