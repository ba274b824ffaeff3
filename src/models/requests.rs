use serde::{Deserialize, Serialize};
use std::str::FromStr;
use validator::{Validate, ValidationError};

/// Youngest and oldest ages the filter accepts
pub const MIN_FILTER_AGE: u32 = 18;
pub const MAX_FILTER_AGE: u32 = 100;

/// User-adjustable narrowing of the displayed match list
///
/// Validation belongs to the input boundary. The pipeline accepts any
/// combination, including an inverted range (which yields nothing).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_age_order"))]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    #[validate(range(min = 18, max = 100))]
    #[serde(default)]
    pub min_age: Option<u32>,
    #[validate(range(min = 18, max = 100))]
    #[serde(default)]
    pub max_age: Option<u32>,
}

impl FilterOptions {
    pub fn new(min_age: Option<u32>, max_age: Option<u32>) -> Self {
        Self { min_age, max_age }
    }

    pub fn is_empty(&self) -> bool {
        self.min_age.is_none() && self.max_age.is_none()
    }
}

fn validate_age_order(options: &FilterOptions) -> Result<(), ValidationError> {
    match (options.min_age, options.max_age) {
        (Some(min), Some(max)) if min > max => {
            let mut err = ValidationError::new("age_range");
            err.message = Some("minimum age cannot exceed maximum age".into());
            Err(err)
        }
        _ => Ok(()),
    }
}

/// Login request body
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
}

/// Sign-up request body
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    #[validate(length(min = 3))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6))]
    pub password: String,
    #[validate(length(min = 1))]
    pub first_name: String,
    #[validate(length(min = 1))]
    pub last_name: String,
    #[validate(range(min = 18, max = 100))]
    pub age: u32,
    #[validate(length(min = 1))]
    pub country: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
}

/// Refresh endpoint body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// Partial profile update; only present fields are sent
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[validate(length(min = 1))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub residence_country: Option<String>,
    #[validate(length(min = 1))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub residence_city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub languages: Option<Vec<String>>,
    #[validate(range(min = 100.0, max = 250.0))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[validate(range(min = 30.0, max = 300.0))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

/// The answer picked for one question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub question_id: i64,
    pub answer_id: i64,
}

/// Parses `QUESTION=ANSWER`, e.g. `12=40`
impl FromStr for QuestionAnswer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (question, answer) = s
            .split_once('=')
            .ok_or_else(|| format!("expected QUESTION=ANSWER, got '{}'", s))?;
        let parse = |part: &str, what: &str| {
            part.trim()
                .parse::<i64>()
                .map_err(|_| format!("{} id '{}' is not a number", what, part.trim()))
        };
        Ok(Self {
            question_id: parse(question, "question")?,
            answer_id: parse(answer, "answer")?,
        })
    }
}

/// Body of `POST /test-responses/:testId/submit`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct TestSubmission {
    #[validate(length(min = 1))]
    pub responses: Vec<QuestionAnswer>,
}

impl TestSubmission {
    pub fn new(responses: Vec<QuestionAnswer>) -> Self {
        Self { responses }
    }

    /// Question ids covered by this submission, as the test listing spells them
    pub fn answered(&self) -> Vec<String> {
        self.responses
            .iter()
            .map(|r| r.question_id.to_string())
            .collect()
    }
}

/// Avatar image to upload as a multipart part
#[derive(Debug, Clone)]
pub struct AvatarUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}
