use clap::{Parser, Subcommand};
use matchmate::config::{LoggingSettings, Settings};
use matchmate::core::{MatchPipeline, PipelineError, PipelinePhase, ViewerLocation};
use matchmate::models::{
    FilterOptions, LoginRequest, ProximityThresholds, QuestionAnswer, SignUpRequest,
    TestSubmission,
};
use matchmate::services::{
    ApiClient, ApiError, CredentialStore, FileCredentialStore, Gateway, GatewayError,
    MemoryCredentialStore,
};
use serde_json::json;
use std::process::ExitCode;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use validator::Validate;

#[derive(Parser)]
#[command(name = "matchmate")]
#[command(version, about = "Matchmate client: sign in, check open tests and browse matches", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to config/default.toml and config/local.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and store the session
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long, env = "MATCHMATE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and store the session
    Signup {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "MATCHMATE_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        age: u32,
        #[arg(long)]
        country: String,
        #[arg(long)]
        gender: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// List tests that are still open
    Tests,
    /// Show a test with its questions and answer ids
    Test { id: String },
    /// Answer every question of a test and submit it
    TakeTest {
        id: String,
        /// Picked answer as QUESTION=ANSWER; repeat once per question
        #[arg(short, long = "answer", required = true)]
        answers: Vec<QuestionAnswer>,
    },
    /// Show per-question scores of a completed test
    TestResult { id: i64 },
    /// Load matches and print the filtered list
    Matches {
        #[arg(long)]
        min_age: Option<u32>,
        #[arg(long)]
        max_age: Option<u32>,
    },
    /// Show one match with its compatibility
    Details { id: i64 },
    /// Show total score and rank
    Score,
    /// Show the leaderboard
    Leaderboard {
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },
    /// Show completed tests
    History {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Invalid input: {0}")]
    Invalid(#[from] validator::ValidationErrors),

    #[error("Unanswered questions: {}", .0.join(", "))]
    Unanswered(Vec<String>),

    #[error("Failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

fn init_logging(logging: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr);

    if logging.format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.json().init();
    }
}

fn build_client(settings: &Settings) -> Result<ApiClient, CliError> {
    let store: Arc<dyn CredentialStore> = match &settings.credentials.path {
        Some(path) => {
            info!("Using credential file {}", path);
            Arc::new(FileCredentialStore::new(path))
        }
        None => {
            warn!("No credential file configured; the session ends when this process exits");
            Arc::new(MemoryCredentialStore::new())
        }
    };

    let gateway = Gateway::new(settings.api.base_url.clone(), settings.api.timeout(), store)?;

    Ok(ApiClient::new(
        gateway,
        settings.cache.details_ttl(),
        settings.cache.details_capacity(),
    ))
}

fn print_json(value: &serde_json::Value) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn show_matches(
    client: ApiClient,
    filters: FilterOptions,
    thresholds: ProximityThresholds,
) -> Result<(), CliError> {
    filters.validate()?;

    let viewer = client.me().await?;
    let pipeline = MatchPipeline::new(client, ViewerLocation::from(&viewer));

    pipeline.refresh().await;
    let shown = pipeline.apply_filters(filters);
    let snapshot = pipeline.snapshot();

    if let Some(err) = &snapshot.error {
        error!("Match refresh failed: {}", err);
    }

    let matches: Vec<_> = shown
        .iter()
        .map(|c| {
            json!({
                "id": c.id,
                "name": c.display_name(),
                "age": c.age,
                "city": c.residence_city,
                "total_score": c.total_score,
                "score_difference": c.score_difference,
                "proximity": c.score_proximity(&thresholds),
            })
        })
        .collect();

    print_json(&json!({
        "phase": snapshot.phase,
        "counts": pipeline.counts(),
        "user_info": snapshot.user_info,
        "message": snapshot.message,
        "error": snapshot.error,
        "active_tests": snapshot.active_tests,
        "matches": matches,
    }))?;

    match snapshot.error {
        Some(err) if snapshot.phase == PipelinePhase::Error => Err(err.into()),
        _ => Ok(()),
    }
}

async fn run(cli: Cli, settings: Settings) -> Result<(), CliError> {
    let thresholds = settings.matching.thresholds();
    let client = build_client(&settings)?;

    match cli.command {
        Commands::Login { username, password } => {
            let user = client.login(&LoginRequest { username, password }).await?;
            print_json(&serde_json::to_value(&user)?)?;
        }
        Commands::Signup {
            username,
            email,
            password,
            first_name,
            last_name,
            age,
            country,
            gender,
        } => {
            let request = SignUpRequest {
                username,
                email,
                password,
                first_name,
                last_name,
                age,
                country,
                gender,
            };
            let user = client.signup(&request).await?;
            print_json(&serde_json::to_value(&user)?)?;
        }
        Commands::Logout => {
            client.logout().await;
            info!("Signed out");
        }
        Commands::Tests => {
            let tests = client.available_tests().await?;
            print_json(&serde_json::to_value(&tests)?)?;
        }
        Commands::Test { id } => {
            let test = client.test_details(&id).await?;
            print_json(&serde_json::to_value(&test)?)?;
        }
        Commands::TakeTest { id, answers } => {
            let submission = TestSubmission::new(answers);
            submission.validate()?;

            let test = client.test_details(&id).await?;
            let missing: Vec<String> = test
                .unanswered(&submission.answered())
                .iter()
                .map(|q| q.id.clone())
                .collect();
            if !missing.is_empty() {
                return Err(CliError::Unanswered(missing));
            }

            let result = client.submit_test(&id, &submission).await?;
            print_json(&serde_json::to_value(&result)?)?;
        }
        Commands::TestResult { id } => {
            let details = client.test_response_details(id).await?;
            print_json(&serde_json::to_value(&details)?)?;
        }
        Commands::Matches { min_age, max_age } => {
            show_matches(client, FilterOptions::new(min_age, max_age), thresholds).await?;
        }
        Commands::Details { id } => {
            let details = client.match_details(id).await?;
            print_json(&json!({
                "name": details.candidate.display_name(),
                "candidate": details.candidate,
                "compatibility": details.compatibility,
                "band": details.compatibility.band(),
            }))?;
        }
        Commands::Score => {
            let score = client.user_score().await?;
            let rank = client.user_rank().await?;
            print_json(&json!({ "score": score, "rank": rank.rank }))?;
        }
        Commands::Leaderboard { limit } => {
            let entries = client.leaderboard(limit).await?;
            print_json(&serde_json::to_value(&entries)?)?;
        }
        Commands::History { page, limit } => {
            let history = client.test_history(page, limit).await?;
            print_json(&serde_json::to_value(&history)?)?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(&settings.logging);

    match run(cli, settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Api(e)) if e.is_session_expired() => {
            error!("{}", e);
            eprintln!("Your session has ended. Run `matchmate login` to sign in again.");
            ExitCode::FAILURE
        }
        Err(CliError::Pipeline(PipelineError::SessionEnded)) => {
            eprintln!("Your session has ended. Run `matchmate login` to sign in again.");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
