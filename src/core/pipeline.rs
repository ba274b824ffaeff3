use crate::core::filters::{apply_filters, narrow_by_location, ViewerLocation};
use crate::models::{Candidate, FilterOptions, MatchesResponse, TestSummary, UserInfo};
use crate::services::api::ApiError;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

pub const NO_MATCHES_MESSAGE: &str = "No matches yet. Check back once more people have completed their tests.";
pub const TESTS_INCOMPLETE_MESSAGE: &str = "Complete your tests to see your matches.";
pub const ACTIVE_TESTS_MESSAGE: &str = "You have tests waiting. Finish them to unlock matches.";

/// Where the pipeline gets its data
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MatchSource: Send + Sync {
    /// Tests the viewer has not completed yet
    async fn available_tests(&self) -> Result<Vec<TestSummary>, ApiError>;
    /// Raw candidate list plus the viewer's aggregate score
    async fn matches(&self) -> Result<MatchesResponse, ApiError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    #[default]
    Idle,
    CheckingEligibility,
    HasActiveTests,
    FetchingMatches,
    MatchesLoaded,
    Error,
}

/// User-visible failure of a refresh cycle
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum PipelineError {
    #[error("Your session has ended. Please sign in again.")]
    SessionEnded,

    #[error("{0}")]
    Retryable(String),
}

impl PipelineError {
    fn from_api(err: &ApiError) -> Self {
        if err.is_session_expired() {
            return PipelineError::SessionEnded;
        }
        PipelineError::Retryable(format!(
            "Could not load your matches. Please try again. ({})",
            err
        ))
    }
}

/// Whether a refresh cycle's result was kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Applied,
    /// The pipeline was reset while this cycle ran; its result was dropped
    Superseded,
    /// Another cycle was already loading, so no new one was started
    InFlight,
}

/// Everything the presentation layer needs, copied out in one go
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineSnapshot {
    pub phase: PipelinePhase,
    pub is_loading: bool,
    /// Candidates after location narrowing, before user filters
    pub candidates: Vec<Candidate>,
    /// Candidates to display
    pub filtered: Vec<Candidate>,
    pub filters: FilterOptions,
    pub message: Option<String>,
    pub error: Option<PipelineError>,
    pub user_info: Option<UserInfo>,
    /// Count reported by the backend, before any client-side narrowing
    pub matches_count: Option<usize>,
    pub active_tests: Vec<TestSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatchCounts {
    pub total: usize,
    pub filtered: usize,
    pub reported: Option<usize>,
}

struct PipelineState {
    snapshot: PipelineSnapshot,
    viewer: ViewerLocation,
    current_cycle: u64,
}

impl PipelineState {
    fn clear_candidates(&mut self) {
        self.snapshot.candidates.clear();
        self.snapshot.filtered.clear();
        self.snapshot.user_info = None;
        self.snapshot.matches_count = None;
    }

    fn fail(&mut self, err: &ApiError) {
        self.clear_candidates();
        self.snapshot.active_tests.clear();
        self.snapshot.phase = PipelinePhase::Error;
        self.snapshot.message = None;
        self.snapshot.error = Some(PipelineError::from_api(err));
    }

    fn load_empty(&mut self, message: &str) {
        self.clear_candidates();
        self.snapshot.active_tests.clear();
        self.snapshot.phase = PipelinePhase::MatchesLoaded;
        self.snapshot.message = Some(message.to_string());
        self.snapshot.error = None;
    }
}

/// Match candidate pipeline
///
/// # Stages
/// 1. Eligibility: are there tests left to take?
/// 2. Retrieval of the raw candidate list
/// 3. Location narrowing against the viewer's residence
/// 4. Age filters, re-run on demand without touching the network
///
/// Only one cycle loads at a time: a [`refresh`](Self::refresh) issued
/// while another is loading returns [`CycleOutcome::InFlight`] without
/// touching the network. Results are still tagged with their cycle number
/// so a cycle that outlives a [`reset`](Self::reset) cannot overwrite
/// newer state.
pub struct MatchPipeline<S: MatchSource> {
    source: S,
    state: Mutex<PipelineState>,
}

impl<S: MatchSource> MatchPipeline<S> {
    pub fn new(source: S, viewer: ViewerLocation) -> Self {
        Self {
            source,
            state: Mutex::new(PipelineState {
                snapshot: PipelineSnapshot::default(),
                viewer,
                current_cycle: 0,
            }),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn lock(&self) -> MutexGuard<'_, PipelineState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the viewer's location; used from the next refresh on
    pub fn set_viewer(&self, viewer: ViewerLocation) {
        self.lock().viewer = viewer;
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        self.lock().snapshot.clone()
    }

    pub fn counts(&self) -> MatchCounts {
        let state = self.lock();
        MatchCounts {
            total: state.snapshot.candidates.len(),
            filtered: state.snapshot.filtered.len(),
            reported: state.snapshot.matches_count,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.lock().snapshot.is_loading
    }

    /// Re-derive the displayed list from the unfiltered one
    pub fn apply_filters(&self, options: FilterOptions) -> Vec<Candidate> {
        let mut state = self.lock();
        state.snapshot.filters = options;
        state.snapshot.filtered = apply_filters(&state.snapshot.candidates, &options);
        tracing::debug!(
            "Filters {:?} applied: {} of {} candidates shown",
            options,
            state.snapshot.filtered.len(),
            state.snapshot.candidates.len()
        );
        state.snapshot.filtered.clone()
    }

    /// Drop all loaded data, keeping the active filters
    ///
    /// Used when the session changes. A cycle still loading is discarded
    /// when it lands and no longer blocks a new refresh.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.current_cycle += 1;
        let filters = state.snapshot.filters;
        state.snapshot = PipelineSnapshot {
            filters,
            ..PipelineSnapshot::default()
        };
    }

    fn begin_cycle(&self) -> Option<u64> {
        let mut state = self.lock();
        if state.snapshot.is_loading {
            return None;
        }
        state.current_cycle += 1;
        state.snapshot.phase = PipelinePhase::CheckingEligibility;
        state.snapshot.is_loading = true;
        state.snapshot.error = None;
        Some(state.current_cycle)
    }

    /// Move to `phase` if `cycle` is still the newest one
    fn advance(&self, cycle: u64, phase: PipelinePhase) -> bool {
        let mut state = self.lock();
        if state.current_cycle != cycle {
            return false;
        }
        state.snapshot.phase = phase;
        true
    }

    fn commit<F>(&self, cycle: u64, apply: F) -> CycleOutcome
    where
        F: FnOnce(&mut PipelineState),
    {
        let mut state = self.lock();
        if state.current_cycle != cycle {
            tracing::debug!(
                "Discarding result of refresh cycle {} (current is {})",
                cycle,
                state.current_cycle
            );
            return CycleOutcome::Superseded;
        }
        apply(&mut *state);
        state.snapshot.is_loading = false;
        CycleOutcome::Applied
    }

    /// Check eligibility, fetch candidates and rebuild both views
    pub async fn refresh(&self) -> CycleOutcome {
        let Some(cycle) = self.begin_cycle() else {
            tracing::debug!("Refresh requested while a cycle is loading, ignoring");
            return CycleOutcome::InFlight;
        };
        let _loading = LoadingGuard {
            state: &self.state,
            cycle,
        };
        tracing::debug!("Refresh cycle {} started", cycle);

        match self.source.available_tests().await {
            Ok(tests) if !tests.is_empty() => {
                tracing::info!("{} tests still open, skipping match retrieval", tests.len());
                return self.commit(cycle, |state| {
                    state.clear_candidates();
                    state.snapshot.phase = PipelinePhase::HasActiveTests;
                    state.snapshot.active_tests = tests;
                    state.snapshot.message = Some(ACTIVE_TESTS_MESSAGE.to_string());
                    state.snapshot.error = None;
                });
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Eligibility check failed: {}", e);
                return self.commit(cycle, |state| state.fail(&e));
            }
        }

        if !self.advance(cycle, PipelinePhase::FetchingMatches) {
            tracing::debug!("Refresh cycle {} superseded before match retrieval", cycle);
            return CycleOutcome::Superseded;
        }

        let result = self.source.matches().await;

        self.commit(cycle, |state| match result {
            Ok(response) => {
                let received = response.matches.len();
                let narrowed = narrow_by_location(response.matches, &state.viewer);
                tracing::info!(
                    "Loaded {} candidates ({} after location narrowing)",
                    received,
                    narrowed.len()
                );

                state.snapshot.filtered = apply_filters(&narrowed, &state.snapshot.filters);
                state.snapshot.candidates = narrowed;
                state.snapshot.user_info = response.user_info;
                state.snapshot.matches_count = response.matches_count;
                state.snapshot.active_tests.clear();
                state.snapshot.phase = PipelinePhase::MatchesLoaded;
                state.snapshot.error = None;
                state.snapshot.message = if state.snapshot.candidates.is_empty() {
                    Some(
                        response
                            .message
                            .filter(|m| !m.trim().is_empty())
                            .unwrap_or_else(|| NO_MATCHES_MESSAGE.to_string()),
                    )
                } else {
                    response.message
                };
            }
            Err(ApiError::NotFound(_)) => state.load_empty(NO_MATCHES_MESSAGE),
            Err(ApiError::BadRequest(_)) => state.load_empty(TESTS_INCOMPLETE_MESSAGE),
            Err(e) => {
                tracing::warn!("Match retrieval failed: {}", e);
                state.fail(&e);
            }
        })
    }

    /// True once a refresh ended because the session is gone
    pub fn session_ended(&self) -> bool {
        matches!(self.lock().snapshot.error, Some(PipelineError::SessionEnded))
    }
}

/// Clears the loading flag if the cycle's future is dropped before it commits
struct LoadingGuard<'a> {
    state: &'a Mutex<PipelineState>,
    cycle: u64,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if state.current_cycle == self.cycle && state.snapshot.is_loading {
            state.snapshot.is_loading = false;
            if matches!(
                state.snapshot.phase,
                PipelinePhase::CheckingEligibility | PipelinePhase::FetchingMatches
            ) {
                state.snapshot.phase = PipelinePhase::Idle;
            }
        }
    }
}
