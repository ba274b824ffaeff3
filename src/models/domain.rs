use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A match candidate in its canonical shape
///
/// The backend is inconsistent about field naming (`score_difference` vs
/// `scoreDifference`, `avatar_url` vs `avatarUrl`) and sometimes sends
/// numeric columns as strings. Everything is normalized through
/// [`RawCandidate`] so the pipeline only ever sees this struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCandidate")]
pub struct Candidate {
    pub id: i64,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub residence_country: Option<String>,
    pub residence_city: Option<String>,
    pub languages: Vec<String>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub avatar_url: Option<String>,
    pub total_score: f64,
    pub completed_tests_count: u32,
    /// Distance from the viewer's total score, as reported by the backend
    pub score_difference: Option<f64>,
}

impl Candidate {
    /// Name shown in match lists: first name (or username) and last initial
    pub fn display_name(&self) -> String {
        let first = self
            .first_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.username);

        match self
            .last_name
            .as_deref()
            .and_then(|n| n.trim().chars().next())
        {
            Some(initial) => format!("{} {}.", first, initial),
            None => first.to_string(),
        }
    }

    /// Bucket the score difference for display
    pub fn score_proximity(&self, thresholds: &ProximityThresholds) -> Option<ScoreProximity> {
        self.score_difference.map(|d| thresholds.classify(d))
    }
}

/// Wire shape of a candidate before normalization
#[derive(Debug, Default, Deserialize)]
pub struct RawCandidate {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default, rename = "firstName")]
    first_name_camel: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default, rename = "lastName")]
    last_name_camel: Option<String>,
    #[serde(default)]
    age: Option<Value>,
    #[serde(default)]
    gender: Option<String>,
    #[serde(default)]
    residence_country: Option<String>,
    #[serde(default, rename = "residenceCountry")]
    residence_country_camel: Option<String>,
    #[serde(default)]
    residence_city: Option<String>,
    #[serde(default, rename = "residenceCity")]
    residence_city_camel: Option<String>,
    #[serde(default)]
    languages: Option<Vec<String>>,
    #[serde(default)]
    height: Option<Value>,
    #[serde(default)]
    weight: Option<Value>,
    #[serde(default)]
    avatar_url: Option<String>,
    #[serde(default, rename = "avatarUrl")]
    avatar_url_camel: Option<String>,
    #[serde(default)]
    total_score: Option<Value>,
    #[serde(default, rename = "totalScore")]
    total_score_camel: Option<Value>,
    #[serde(default)]
    completed_tests_count: Option<Value>,
    #[serde(default, rename = "completedTestsCount")]
    completed_tests_count_camel: Option<Value>,
    #[serde(default)]
    score_difference: Option<Value>,
    #[serde(default, rename = "scoreDifference")]
    score_difference_camel: Option<Value>,
}

impl TryFrom<RawCandidate> for Candidate {
    type Error = String;

    fn try_from(raw: RawCandidate) -> Result<Self, Self::Error> {
        let id = raw
            .id
            .as_ref()
            .and_then(lenient_number)
            .map(|n| n as i64)
            .ok_or_else(|| "candidate is missing a numeric id".to_string())?;

        Ok(Self {
            id,
            username: raw.username.unwrap_or_default(),
            first_name: non_blank(raw.first_name.or(raw.first_name_camel)),
            last_name: non_blank(raw.last_name.or(raw.last_name_camel)),
            age: raw
                .age
                .as_ref()
                .and_then(lenient_number)
                .filter(|a| *a >= 0.0)
                .map(|a| a as u32),
            gender: non_blank(raw.gender),
            residence_country: non_blank(raw.residence_country.or(raw.residence_country_camel)),
            residence_city: non_blank(raw.residence_city.or(raw.residence_city_camel)),
            languages: raw.languages.unwrap_or_default(),
            height: raw.height.as_ref().and_then(lenient_number),
            weight: raw.weight.as_ref().and_then(lenient_number),
            avatar_url: non_blank(raw.avatar_url.or(raw.avatar_url_camel)),
            total_score: raw
                .total_score
                .or(raw.total_score_camel)
                .as_ref()
                .and_then(lenient_number)
                .unwrap_or(0.0),
            completed_tests_count: raw
                .completed_tests_count
                .or(raw.completed_tests_count_camel)
                .as_ref()
                .and_then(lenient_number)
                .map(|c| c.max(0.0) as u32)
                .unwrap_or(0),
            score_difference: raw
                .score_difference
                .or(raw.score_difference_camel)
                .as_ref()
                .and_then(lenient_number),
        })
    }
}

/// Accept JSON numbers and numeric strings (Postgres numerics arrive as text)
pub(crate) fn lenient_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// How close a candidate's total score is to the viewer's
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreProximity {
    Close,
    Moderate,
    Distant,
}

/// Upper bounds (inclusive) for the proximity buckets
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityThresholds {
    pub close: f64,
    pub moderate: f64,
}

impl ProximityThresholds {
    pub fn classify(&self, score_difference: f64) -> ScoreProximity {
        let d = score_difference.abs();
        if d <= self.close {
            ScoreProximity::Close
        } else if d <= self.moderate {
            ScoreProximity::Moderate
        } else {
            ScoreProximity::Distant
        }
    }
}

impl Default for ProximityThresholds {
    fn default() -> Self {
        Self {
            close: 50.0,
            moderate: 100.0,
        }
    }
}

/// The signed-in user's own profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "first_name")]
    pub first_name: Option<String>,
    #[serde(default, alias = "last_name")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default, alias = "residence_country")]
    pub residence_country: Option<String>,
    #[serde(default, alias = "residence_city")]
    pub residence_city: Option<String>,
    #[serde(default)]
    pub languages: Option<Vec<String>>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub is_additional_info_required: Option<bool>,
    #[serde(default, alias = "created_at")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "avatar_url")]
    pub avatar_url: Option<String>,
}

/// Access and refresh token pair
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// The viewer's aggregate test result as reported with the match list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub total_score: f64,
    #[serde(default)]
    pub completed_tests: u32,
    #[serde(default)]
    pub total_available_tests: u32,
}

/// A test the user has not completed yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSummary {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default, alias = "name")]
    pub title: String,
}

/// One selectable answer of a question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerOption {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default, alias = "text")]
    pub answer_text: String,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default)]
    pub question_text: String,
    /// `GET /tests/:id` calls these `answers`, `GET /tests/:id/questions` calls them `options`
    #[serde(default, alias = "options", deserialize_with = "null_as_empty")]
    pub answers: Vec<AnswerOption>,
}

impl Question {
    pub fn has_answer(&self, answer_id: &str) -> bool {
        self.answers.iter().any(|a| a.id == answer_id)
    }
}

/// A test together with its questions (`GET /tests/:id`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDetails {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default, alias = "name")]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub questions: Vec<Question>,
}

impl TestDetails {
    /// Questions with no entry in `answered`, in test order
    pub fn unanswered<'a>(&'a self, answered: &[String]) -> Vec<&'a Question> {
        self.questions
            .iter()
            .filter(|q| !answered.iter().any(|id| *id == q.id))
            .collect()
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("unexpected test id: {}", other))),
    }
}

/// Compatibility block returned with a single match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compatibility {
    pub score_difference: f64,
    pub compatibility_percentage: f64,
    pub your_score: f64,
}

impl Compatibility {
    pub fn band(&self) -> CompatibilityBand {
        match self.compatibility_percentage {
            p if p >= 80.0 => CompatibilityBand::Excellent,
            p if p >= 60.0 => CompatibilityBand::Good,
            p if p >= 40.0 => CompatibilityBand::Fair,
            _ => CompatibilityBand::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompatibilityBand {
    Excellent,
    Good,
    Fair,
    Low,
}

/// A single candidate together with its compatibility block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchDetails {
    #[serde(alias = "match_user")]
    pub candidate: Candidate,
    pub compatibility: Compatibility,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_candidate_normalizes_camel_case_fields() {
        let candidate: Candidate = serde_json::from_value(json!({
            "id": 7,
            "username": "deniz",
            "firstName": "Deniz",
            "scoreDifference": 42,
            "avatarUrl": "https://cdn.test/7.png",
            "residenceCountry": "TR",
        }))
        .unwrap();

        assert_eq!(candidate.score_difference, Some(42.0));
        assert_eq!(candidate.avatar_url.as_deref(), Some("https://cdn.test/7.png"));
        assert_eq!(candidate.residence_country.as_deref(), Some("TR"));
        assert_eq!(candidate.first_name.as_deref(), Some("Deniz"));
    }

    #[test]
    fn test_candidate_prefers_snake_case_when_both_present() {
        let candidate: Candidate = serde_json::from_value(json!({
            "id": "12",
            "username": "ece",
            "score_difference": "15.5",
            "scoreDifference": 99,
            "age": "31",
            "total_score": "410",
        }))
        .unwrap();

        assert_eq!(candidate.id, 12);
        assert_eq!(candidate.score_difference, Some(15.5));
        assert_eq!(candidate.age, Some(31));
        assert_eq!(candidate.total_score, 410.0);
    }

    #[test]
    fn test_candidate_tolerates_missing_optional_fields() {
        let candidate: Candidate = serde_json::from_value(json!({
            "id": 3,
            "username": "anon",
            "age": null,
            "languages": null,
        }))
        .unwrap();

        assert_eq!(candidate.age, None);
        assert_eq!(candidate.score_difference, None);
        assert!(candidate.languages.is_empty());
        assert_eq!(candidate.completed_tests_count, 0);
    }

    #[test]
    fn test_candidate_without_id_is_rejected() {
        let result: Result<Candidate, _> = serde_json::from_value(json!({ "username": "x" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_display_name() {
        let mut candidate: Candidate = serde_json::from_value(json!({
            "id": 1,
            "username": "kerem",
            "first_name": "Kerem",
            "last_name": "Yilmaz",
        }))
        .unwrap();
        assert_eq!(candidate.display_name(), "Kerem Y.");

        candidate.first_name = None;
        candidate.last_name = None;
        assert_eq!(candidate.display_name(), "kerem");
    }

    #[test]
    fn test_score_proximity_buckets() {
        let thresholds = ProximityThresholds::default();
        assert_eq!(thresholds.classify(0.0), ScoreProximity::Close);
        assert_eq!(thresholds.classify(50.0), ScoreProximity::Close);
        assert_eq!(thresholds.classify(51.0), ScoreProximity::Moderate);
        assert_eq!(thresholds.classify(100.0), ScoreProximity::Moderate);
        assert_eq!(thresholds.classify(180.0), ScoreProximity::Distant);
    }

    #[test]
    fn test_compatibility_band() {
        let mut c = Compatibility {
            score_difference: 10.0,
            compatibility_percentage: 85.0,
            your_score: 300.0,
        };
        assert_eq!(c.band(), CompatibilityBand::Excellent);
        c.compatibility_percentage = 60.0;
        assert_eq!(c.band(), CompatibilityBand::Good);
        c.compatibility_percentage = 45.0;
        assert_eq!(c.band(), CompatibilityBand::Fair);
        c.compatibility_percentage = 12.0;
        assert_eq!(c.band(), CompatibilityBand::Low);
    }

    #[test]
    fn test_test_details_accepts_both_answer_spellings() {
        let details: TestDetails = serde_json::from_value(json!({
            "id": 4,
            "name": "Values",
            "questions": [
                { "id": 10, "question_text": "Q1", "answers": [{ "id": 100, "answer_text": "Yes", "score": 5 }] },
                { "id": 11, "question_text": "Q2", "options": [{ "id": "101", "text": "No" }] },
                { "id": 12, "question_text": "Q3", "answers": null },
            ],
        }))
        .unwrap();

        assert_eq!(details.id, "4");
        assert_eq!(details.title, "Values");
        assert_eq!(details.questions[0].answers[0].score, Some(5.0));
        assert_eq!(details.questions[1].answers[0].id, "101");
        assert_eq!(details.questions[1].answers[0].answer_text, "No");
        assert!(details.questions[2].answers.is_empty());
        assert!(details.questions[0].has_answer("100"));
        assert!(!details.questions[0].has_answer("101"));
    }

    #[test]
    fn test_unanswered_questions_keep_test_order() {
        let details: TestDetails = serde_json::from_value(json!({
            "id": "t1",
            "questions": [
                { "id": 1, "question_text": "a" },
                { "id": 2, "question_text": "b" },
                { "id": 3, "question_text": "c" },
            ],
        }))
        .unwrap();

        let missing: Vec<&str> = details
            .unanswered(&["2".to_string()])
            .iter()
            .map(|q| q.id.as_str())
            .collect();
        assert_eq!(missing, vec!["1", "3"]);
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = Credentials::new("secret-access", "secret-refresh");
        let printed = format!("{:?}", creds);
        assert!(!printed.contains("secret"));
    }
}
