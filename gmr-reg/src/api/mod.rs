//! HTTP API handlers for gmr-reg

pub mod analyses;
pub mod health;
pub mod schemas;
pub mod submissions;

pub use analyses::{
    deep_read_analysis, list_analyses, publish_analysis, suppress_analysis, unpublish_analysis,
};
pub use health::health_routes;
pub use schemas::{get_analysis_type, list_analysis_types, register_analysis_type};
pub use submissions::submit_payload;
