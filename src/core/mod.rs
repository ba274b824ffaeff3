// Core logic exports
pub mod filters;
pub mod pipeline;
pub mod refresh;

pub use filters::{apply_filters, matches_age_bounds, matches_location, narrow_by_location, ViewerLocation};
pub use pipeline::{CycleOutcome, MatchCounts, MatchPipeline, MatchSource, PipelineError, PipelinePhase, PipelineSnapshot};
pub use refresh::{Admission, RefreshCoordinator, RefreshOutcome, SessionError};
