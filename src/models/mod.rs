// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{AnswerOption, Candidate, Compatibility, CompatibilityBand, Credentials, MatchDetails, ProximityThresholds, Question, ScoreProximity, TestDetails, TestSummary, User, UserInfo};
pub use requests::{AvatarUpload, FilterOptions, LoginRequest, ProfileUpdate, QuestionAnswer, RefreshTokenRequest, SignUpRequest, TestSubmission};
pub use responses::{AuthResponse, ErrorBody, LeaderboardEntry, MatchesResponse, QuestionResponse, RefreshResponse, SubmittedTest, TestHistory, TestResponseDetails, TestResult, UserEnvelope, UserRank, UserScore};
