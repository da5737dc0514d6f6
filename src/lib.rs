// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod alerts;
pub mod api;
pub mod cluster;
pub mod config;
pub mod content;
pub mod dedup;
pub mod location;
pub mod metrics;
pub mod normalize;
pub mod oracle;
pub mod pipeline;
pub mod scheduler;
pub mod sources;
pub mod store;
pub mod types;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::config::PipelineConfig;
pub use crate::pipeline::Pipeline;
pub use crate::store::{MemoryStore, ReportStore};
pub use crate::types::{Cluster, RawSpan, Report, Sentiment};
