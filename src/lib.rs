//! Matchmate - client core for the Matchmate personality-matching app
//!
//! Two pieces do the real work:
//! - an authenticated request gateway that refreshes expired sessions
//!   exactly once no matter how many requests hit a 401 together
//! - a match pipeline that checks eligibility, loads candidates, narrows
//!   them to the viewer's residence and applies age filters locally

pub mod config;
pub mod core;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use crate::core::{MatchPipeline, MatchSource, PipelinePhase, PipelineSnapshot, ViewerLocation};
pub use models::{Candidate, Credentials, FilterOptions, User};
pub use services::{ApiClient, ApiError, Gateway, GatewayError};
