//! Axum HTTP API for region removal jobs.
//!
//! A request enters through the submit handler, is validated at the
//! boundary, and is driven by one pipeline task that owns one external
//! process at a time. Clients follow the job on a server-sent-event
//! stream until the single terminal event arrives.

pub mod config;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod metrics;
pub mod middleware;
pub mod pipeline;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use lifecycle::ArtifactJanitor;
pub use pipeline::{JobPipeline, PipelineState};
pub use routes::create_router;
pub use state::AppState;
