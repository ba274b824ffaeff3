use crate::core::pipeline::MatchSource;
use crate::core::refresh::SessionError;
use crate::models::{
    AuthResponse, AvatarUpload, Credentials, LeaderboardEntry, LoginRequest, MatchDetails,
    MatchesResponse, ProfileUpdate, Question, SignUpRequest, TestDetails, TestHistory,
    TestResponseDetails, TestResult, TestSubmission, TestSummary, User, UserEnvelope, UserRank,
    UserScore,
};
use crate::services::gateway::{ApiResponse, Gateway, GatewayError, RequestSpec};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use validator::Validate;

/// Errors returned by the typed backend calls
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

impl ApiError {
    /// True when the session is gone and the user must sign in again
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::Gateway(GatewayError::SessionExpired(_)))
    }

    pub fn session_error(&self) -> Option<&SessionError> {
        match self {
            ApiError::Gateway(GatewayError::SessionExpired(e)) => Some(e),
            _ => None,
        }
    }
}

/// Typed client for the backend REST API
///
/// Every call goes through the [`Gateway`], so tokens are attached and
/// refreshed transparently.
pub struct ApiClient {
    gateway: Gateway,
    details_cache: moka::future::Cache<i64, MatchDetails>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(gateway: Gateway, details_ttl: Duration, details_capacity: u64) -> Self {
        let details_cache = moka::future::CacheBuilder::new(details_capacity)
            .time_to_live(details_ttl)
            .build();

        Self {
            gateway,
            details_cache,
        }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    async fn call(&self, spec: RequestSpec, what: &str) -> Result<ApiResponse, ApiError> {
        let response = self.gateway.send(spec).await?;
        check_status(response, what)
    }

    /// Sign in and install the returned session
    pub async fn login(&self, request: &LoginRequest) -> Result<User, ApiError> {
        request.validate()?;

        let spec = RequestSpec::post("/auth/login")
            .json(request)?
            .without_refresh();
        let response = self.call(spec, "Login").await?;
        let auth: AuthResponse = decode(&response, "login response")?;

        self.gateway
            .install_session(Credentials::new(auth.access_token, auth.refresh_token))
            .await;

        tracing::info!("Signed in as {}", auth.user.username);
        Ok(auth.user)
    }

    /// Create an account and install the returned session
    pub async fn signup(&self, request: &SignUpRequest) -> Result<User, ApiError> {
        request.validate()?;

        let spec = RequestSpec::post("/auth/signup")
            .json(request)?
            .without_refresh();
        let response = self.call(spec, "Sign-up").await?;
        let auth: AuthResponse = decode(&response, "sign-up response")?;

        self.gateway
            .install_session(Credentials::new(auth.access_token, auth.refresh_token))
            .await;

        tracing::info!("Signed up as {}", auth.user.username);
        Ok(auth.user)
    }

    /// Sign out locally; cached match details go with the session
    pub async fn logout(&self) {
        self.gateway.end_session().await;
        self.details_cache.invalidate_all();
    }

    /// Fetch the signed-in user's profile
    pub async fn me(&self) -> Result<User, ApiError> {
        let response = self.call(RequestSpec::get("/users/profile"), "Fetch profile").await?;
        decode(&response, "profile")
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError> {
        update.validate()?;

        let spec = RequestSpec::put("/users/profile").json(update)?;
        let response = self.call(spec, "Update profile").await?;
        let envelope: UserEnvelope = decode(&response, "profile update")?;
        Ok(envelope.user)
    }

    pub async fn upload_avatar(&self, upload: AvatarUpload) -> Result<User, ApiError> {
        let spec = RequestSpec::post("/users/profile/avatar").avatar(upload);
        let response = self.call(spec, "Upload avatar").await?;
        let envelope: UserEnvelope = decode(&response, "avatar upload")?;
        Ok(envelope.user)
    }

    /// Tests the user has not completed yet
    pub async fn available_tests(&self) -> Result<Vec<TestSummary>, ApiError> {
        let response = self.call(RequestSpec::get("/tests"), "Fetch tests").await?;
        if response.body.trim().is_empty() {
            return Ok(Vec::new());
        }
        let tests: Option<Vec<TestSummary>> = decode(&response, "test list")?;
        Ok(tests.unwrap_or_default())
    }

    /// A test with its questions and their answers
    pub async fn test_details(&self, test_id: &str) -> Result<TestDetails, ApiError> {
        let spec = RequestSpec::get(format!("/tests/{}", test_id));
        let response = self.call(spec, "Fetch test").await?;
        decode(&response, "test")
    }

    /// Questions of a test without the test's own metadata
    pub async fn test_questions(&self, test_id: &str) -> Result<Vec<Question>, ApiError> {
        let spec = RequestSpec::get(format!("/tests/{}/questions", test_id));
        let response = self.call(spec, "Fetch test questions").await?;
        let questions: Option<Vec<Question>> = decode(&response, "question list")?;
        Ok(questions.unwrap_or_default())
    }

    /// Submit the picked answers of a test
    ///
    /// A test that was already completed comes back as
    /// [`ApiError::BadRequest`] with the backend's message.
    pub async fn submit_test(
        &self,
        test_id: &str,
        submission: &TestSubmission,
    ) -> Result<TestResult, ApiError> {
        submission.validate()?;

        let spec =
            RequestSpec::post(format!("/test-responses/{}/submit", test_id)).json(submission)?;
        let response = self.call(spec, "Submit test").await?;
        let result: TestResult = decode(&response, "test result")?;

        // Scores moved, so cached compatibility blocks are stale
        self.details_cache.invalidate_all();
        tracing::info!(
            "Submitted test {} ({} answers), total score now {}",
            test_id,
            submission.responses.len(),
            result.total_score
        );
        Ok(result)
    }

    /// Per-question scores of a completed test
    pub async fn test_response_details(
        &self,
        test_response_id: i64,
    ) -> Result<TestResponseDetails, ApiError> {
        let spec = RequestSpec::get(format!("/test-responses/{}/details", test_response_id));
        let response = self.call(spec, "Fetch test response").await?;
        decode(&response, "test response details")
    }

    /// Raw match list
    ///
    /// 400 surfaces as [`ApiError::BadRequest`] (tests incomplete) and 404
    /// as [`ApiError::NotFound`] (no matches yet).
    pub async fn matches(&self) -> Result<MatchesResponse, ApiError> {
        let response = self.call(RequestSpec::get("/matches"), "Fetch matches").await?;
        if response.body.trim().is_empty() {
            return Ok(MatchesResponse::default());
        }
        decode(&response, "match list")
    }

    /// One match with its compatibility block, cached per candidate
    pub async fn match_details(&self, candidate_id: i64) -> Result<MatchDetails, ApiError> {
        if let Some(details) = self.details_cache.get(&candidate_id).await {
            tracing::trace!("Match details cache hit: {}", candidate_id);
            return Ok(details);
        }

        let spec = RequestSpec::get(format!("/matches/details/{}", candidate_id));
        let response = self.call(spec, "Fetch match details").await?;
        let details: MatchDetails = decode(&response, "match details")?;

        self.details_cache.insert(candidate_id, details.clone()).await;
        Ok(details)
    }

    pub async fn user_score(&self) -> Result<UserScore, ApiError> {
        let response = self
            .call(RequestSpec::get("/test-responses/score"), "Fetch score")
            .await?;
        decode(&response, "score")
    }

    pub async fn user_rank(&self) -> Result<UserRank, ApiError> {
        let response = self
            .call(RequestSpec::get("/test-responses/rank"), "Fetch rank")
            .await?;
        decode(&response, "rank")
    }

    pub async fn leaderboard(&self, limit: u32) -> Result<Vec<LeaderboardEntry>, ApiError> {
        let spec = RequestSpec::get("/test-responses/leaderboard").query("limit", limit);
        let response = self.call(spec, "Fetch leaderboard").await?;
        decode(&response, "leaderboard")
    }

    pub async fn test_history(&self, page: u32, limit: u32) -> Result<TestHistory, ApiError> {
        let spec = RequestSpec::get("/test-responses")
            .query("page", page)
            .query("limit", limit);
        let response = self.call(spec, "Fetch test history").await?;
        decode(&response, "test history")
    }
}

#[async_trait]
impl MatchSource for ApiClient {
    async fn available_tests(&self) -> Result<Vec<TestSummary>, ApiError> {
        ApiClient::available_tests(self).await
    }

    async fn matches(&self) -> Result<MatchesResponse, ApiError> {
        ApiClient::matches(self).await
    }
}

fn check_status(response: ApiResponse, what: &str) -> Result<ApiResponse, ApiError> {
    if response.is_success() {
        return Ok(response);
    }

    let message = response
        .error_message()
        .unwrap_or_else(|| format!("{} failed", what));

    tracing::debug!("{} failed with {}: {}", what, response.status, message);

    Err(match response.status {
        StatusCode::BAD_REQUEST => ApiError::BadRequest(message),
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized(message),
        StatusCode::NOT_FOUND => ApiError::NotFound(message),
        status => ApiError::Status {
            status: status.as_u16(),
            message,
        },
    })
}

fn decode<T: DeserializeOwned>(response: &ApiResponse, what: &str) -> Result<T, ApiError> {
    response
        .json()
        .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse {}: {}", what, e)))
}
