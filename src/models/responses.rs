use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::models::domain::{Candidate, User, UserInfo};

/// Response for login and sign-up
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

/// Response of the refresh endpoint; a missing access token is a failure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Response for `GET /matches`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchesResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub user_info: Option<UserInfo>,
    /// Records that cannot be normalized are dropped; `null` reads as empty
    #[serde(default, deserialize_with = "candidates_skipping_invalid")]
    pub matches: Vec<Candidate>,
    #[serde(default)]
    pub matches_count: Option<usize>,
}

fn candidates_skipping_invalid<'de, D>(deserializer: D) -> Result<Vec<Candidate>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    let received = raw.len();
    let candidates: Vec<Candidate> = raw
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<Candidate>(value) {
            Ok(candidate) => Some(candidate),
            Err(e) => {
                tracing::warn!("Skipping match record that could not be read: {}", e);
                None
            }
        })
        .collect();
    if candidates.len() < received {
        tracing::warn!("Kept {} of {} match records", candidates.len(), received);
    }
    Ok(candidates)
}

/// Wrapper used by the profile endpoints (`{ user: {...} }`)
#[derive(Debug, Clone, Deserialize)]
pub struct UserEnvelope {
    pub user: User,
}

/// Error body the backend attaches to non-2xx responses
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    pub fn text(&self) -> Option<String> {
        self.message.clone().or_else(|| self.error.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserScore {
    #[serde(default)]
    pub id: Option<i64>,
    pub user_id: i64,
    pub total_score: f64,
    pub completed_tests_count: u32,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRank {
    pub rank: Option<u32>,
    pub total_score: f64,
    pub completed_tests_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: i64,
    pub total_score: f64,
    pub completed_tests_count: u32,
    pub username: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedTest {
    pub id: i64,
    pub test_id: i64,
    pub test_score: f64,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub test_title: Option<String>,
    #[serde(default)]
    pub test_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_count: u32,
}

/// Paginated test history (`GET /test-responses`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestHistory {
    pub test_responses: Vec<CompletedTest>,
    pub pagination: Pagination,
}

/// Stored result of one completed test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmittedTest {
    pub id: i64,
    pub user_id: i64,
    pub test_id: i64,
    pub test_score: f64,
    pub completed_at: DateTime<Utc>,
}

/// Score awarded for one answered question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResponse {
    pub id: i64,
    pub user_id: i64,
    pub question_id: i64,
    pub answer_id: i64,
    pub response_score: f64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Response of `POST /test-responses/:testId/submit`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub test_response: SubmittedTest,
    #[serde(default)]
    pub question_responses: Vec<QuestionResponse>,
    pub total_score: f64,
}

/// Response of `GET /test-responses/:id/details`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResponseDetails {
    pub test_response: SubmittedTest,
    #[serde(default)]
    pub question_responses: Vec<QuestionResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_match_list_reads_as_empty() {
        let response: MatchesResponse =
            serde_json::from_str(r#"{"message":"none","matches":null}"#).unwrap();
        assert!(response.matches.is_empty());
        assert_eq!(response.message.as_deref(), Some("none"));
    }

    #[test]
    fn test_unreadable_match_record_is_skipped() {
        let response: MatchesResponse = serde_json::from_value(json!({
            "matches": [
                { "id": 1, "username": "a" },
                { "username": "noid" },
                { "id": "3", "username": "c" },
            ],
            "matches_count": 3,
        }))
        .unwrap();

        let ids: Vec<i64> = response.matches.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(response.matches_count, Some(3));
    }

    #[test]
    fn test_match_list_that_is_not_a_list_is_rejected() {
        let result: Result<MatchesResponse, _> = serde_json::from_str(r#"{"matches":"oops"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_result_wire_shape() {
        let result: TestResult = serde_json::from_value(json!({
            "testResponse": {
                "id": 9,
                "user_id": 1,
                "test_id": 4,
                "test_score": 42.5,
                "completed_at": "2026-03-01T10:00:00Z",
            },
            "questionResponses": [{
                "id": 1,
                "user_id": 1,
                "question_id": 10,
                "answer_id": 100,
                "response_score": 5,
                "created_at": "2026-03-01T10:00:00Z",
            }],
            "totalScore": 310,
        }))
        .unwrap();

        assert_eq!(result.test_response.test_id, 4);
        assert_eq!(result.question_responses[0].response_score, 5.0);
        assert_eq!(result.total_score, 310.0);
    }
}
