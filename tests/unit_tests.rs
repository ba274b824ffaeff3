// Unit tests for the Matchmate public API

use matchmate::core::{
    apply_filters, matches_age_bounds, matches_location, narrow_by_location, Admission,
    RefreshCoordinator, SessionError, ViewerLocation,
};
use matchmate::models::{
    Candidate, Compatibility, CompatibilityBand, FilterOptions, ProximityThresholds,
    ScoreProximity, User,
};
use validator::Validate;

fn create_candidate(
    id: i64,
    age: Option<u32>,
    country: Option<&str>,
    city: Option<&str>,
) -> Candidate {
    Candidate {
        id,
        username: format!("user{}", id),
        first_name: Some(format!("First{}", id)),
        last_name: None,
        age,
        gender: None,
        residence_country: country.map(str::to_string),
        residence_city: city.map(str::to_string),
        languages: vec!["tr".to_string()],
        height: None,
        weight: None,
        avatar_url: None,
        total_score: 150.0,
        completed_tests_count: 3,
        score_difference: Some(25.0),
    }
}

fn mixed_candidates() -> Vec<Candidate> {
    vec![
        create_candidate(1, Some(19), Some("TR"), Some("Istanbul")),
        create_candidate(2, Some(27), Some("TR"), Some("Ankara")),
        create_candidate(3, None, Some("TR"), Some("Istanbul")),
        create_candidate(4, Some(34), Some("DE"), Some("Berlin")),
        create_candidate(5, Some(41), None, None),
        create_candidate(6, Some(30), Some("tr"), Some("ISTANBUL")),
    ]
}

fn ids(candidates: &[Candidate]) -> Vec<i64> {
    candidates.iter().map(|c| c.id).collect()
}

#[test]
fn test_country_only_viewer_ignores_city() {
    let viewer = ViewerLocation::new(Some("TR"), None);
    let narrowed = narrow_by_location(mixed_candidates(), &viewer);
    assert_eq!(ids(&narrowed), vec![1, 2, 3, 6]);
}

#[test]
fn test_country_and_city_viewer() {
    let viewer = ViewerLocation::new(Some("TR"), Some("Istanbul"));
    let narrowed = narrow_by_location(mixed_candidates(), &viewer);
    assert_eq!(ids(&narrowed), vec![1, 3, 6]);
}

#[test]
fn test_viewer_without_country_keeps_everyone() {
    let viewer = ViewerLocation::new(None, Some("Istanbul"));
    let narrowed = narrow_by_location(mixed_candidates(), &viewer);
    assert_eq!(narrowed, mixed_candidates());
}

#[test]
fn test_blank_viewer_fields_count_as_missing() {
    let viewer = ViewerLocation::new(Some("  "), Some(""));
    assert_eq!(viewer, ViewerLocation::default());
}

#[test]
fn test_viewer_from_user_profile() {
    let user = User {
        id: 1,
        username: "deniz".to_string(),
        residence_country: Some(" TR ".to_string()),
        residence_city: Some("Izmir".to_string()),
        ..Default::default()
    };

    let viewer = ViewerLocation::from(&user);
    assert_eq!(viewer.country.as_deref(), Some("TR"));
    assert_eq!(viewer.city.as_deref(), Some("Izmir"));
}

#[test]
fn test_narrowing_is_idempotent() {
    let viewer = ViewerLocation::new(Some("TR"), Some("Istanbul"));
    let once = narrow_by_location(mixed_candidates(), &viewer);
    let twice = narrow_by_location(once.clone(), &viewer);
    assert_eq!(once, twice);
}

#[test]
fn test_candidate_without_country_fails_country_check() {
    let viewer = ViewerLocation::new(Some("TR"), None);
    let candidate = create_candidate(9, Some(30), None, Some("Istanbul"));
    assert!(!matches_location(&candidate, &viewer));
}

#[test]
fn test_min_age_only() {
    let shown = apply_filters(&mixed_candidates(), &FilterOptions::new(Some(30), None));
    assert_eq!(ids(&shown), vec![4, 5, 6]);
}

#[test]
fn test_max_age_only() {
    let shown = apply_filters(&mixed_candidates(), &FilterOptions::new(None, Some(27)));
    assert_eq!(ids(&shown), vec![1, 2]);
}

#[test]
fn test_both_bounds_are_inclusive() {
    let shown = apply_filters(&mixed_candidates(), &FilterOptions::new(Some(27), Some(34)));
    assert_eq!(ids(&shown), vec![2, 4, 6]);
}

#[test]
fn test_inverted_range_yields_empty_list() {
    let shown = apply_filters(&mixed_candidates(), &FilterOptions::new(Some(40), Some(20)));
    assert!(shown.is_empty());
}

#[test]
fn test_unknown_age_only_passes_without_bounds() {
    let unknown = create_candidate(3, None, None, None);
    assert!(matches_age_bounds(&unknown, &FilterOptions::default()));
    assert!(!matches_age_bounds(&unknown, &FilterOptions::new(Some(18), None)));
    assert!(!matches_age_bounds(&unknown, &FilterOptions::new(None, Some(100))));
}

#[test]
fn test_filtered_is_ordered_subset() {
    let all = mixed_candidates();
    let options = [
        FilterOptions::new(Some(20), None),
        FilterOptions::new(None, Some(35)),
        FilterOptions::new(Some(25), Some(40)),
    ];

    for option in options {
        let shown = apply_filters(&all, &option);
        let positions: Vec<usize> = shown
            .iter()
            .map(|c| all.iter().position(|a| a.id == c.id).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }
}

#[test]
fn test_clearing_filters_restores_full_list() {
    let all = mixed_candidates();
    let narrowed = apply_filters(&all, &FilterOptions::new(Some(30), Some(35)));
    assert!(narrowed.len() < all.len());

    let cleared = apply_filters(&all, &FilterOptions::default());
    assert_eq!(cleared, all);
}

#[test]
fn test_filter_validation_bounds() {
    assert!(FilterOptions::new(Some(18), Some(100)).validate().is_ok());
    assert!(FilterOptions::new(Some(17), None).validate().is_err());
    assert!(FilterOptions::new(None, Some(101)).validate().is_err());
    assert!(FilterOptions::new(Some(40), Some(30)).validate().is_err());
    assert!(FilterOptions::default().validate().is_ok());
}

#[test]
fn test_score_proximity_bands() {
    let thresholds = ProximityThresholds::default();
    assert_eq!(thresholds.classify(0.0), ScoreProximity::Close);
    assert_eq!(thresholds.classify(50.0), ScoreProximity::Close);
    assert_eq!(thresholds.classify(-75.0), ScoreProximity::Moderate);
    assert_eq!(thresholds.classify(100.0), ScoreProximity::Moderate);
    assert_eq!(thresholds.classify(100.5), ScoreProximity::Distant);

    let mut candidate = create_candidate(1, Some(30), None, None);
    assert_eq!(candidate.score_proximity(&thresholds), Some(ScoreProximity::Close));
    candidate.score_difference = None;
    assert_eq!(candidate.score_proximity(&thresholds), None);
}

#[test]
fn test_compatibility_bands() {
    let band = |p: f64| {
        Compatibility {
            score_difference: 0.0,
            compatibility_percentage: p,
            your_score: 0.0,
        }
        .band()
    };

    assert_eq!(band(95.0), CompatibilityBand::Excellent);
    assert_eq!(band(80.0), CompatibilityBand::Excellent);
    assert_eq!(band(60.0), CompatibilityBand::Good);
    assert_eq!(band(45.0), CompatibilityBand::Fair);
    assert_eq!(band(10.0), CompatibilityBand::Low);
}

#[test]
fn test_candidate_wire_normalization() {
    let candidate: Candidate = serde_json::from_str(
        r#"{
            "id": "12",
            "username": "ece",
            "first_name": "Ece",
            "firstName": "Ignored",
            "age": "26",
            "residenceCountry": "TR",
            "totalScore": "310.5",
            "completed_tests_count": 6,
            "score_difference": null,
            "scoreDifference": 14
        }"#,
    )
    .unwrap();

    assert_eq!(candidate.id, 12);
    assert_eq!(candidate.first_name.as_deref(), Some("Ece"));
    assert_eq!(candidate.age, Some(26));
    assert_eq!(candidate.residence_country.as_deref(), Some("TR"));
    assert_eq!(candidate.total_score, 310.5);
    assert_eq!(candidate.completed_tests_count, 6);
    assert_eq!(candidate.score_difference, Some(14.0));
}

#[test]
fn test_coordinator_single_leader_then_waiters() {
    let mut coordinator = RefreshCoordinator::new();
    let epoch = coordinator.epoch();

    assert!(matches!(coordinator.on_unauthorized(epoch), Admission::Lead(_)));
    assert!(matches!(coordinator.on_unauthorized(epoch), Admission::Wait(_)));
    assert!(matches!(coordinator.on_unauthorized(epoch), Admission::Wait(_)));
    assert!(coordinator.is_refreshing());
    assert_eq!(coordinator.pending(), 3);
}

#[test]
fn test_coordinator_late_unauthorized_reuses_outcome() {
    let mut coordinator = RefreshCoordinator::new();
    let sent_at = coordinator.epoch();

    let _lead = coordinator.on_unauthorized(sent_at);
    coordinator.settle(Err(SessionError::Rejected { status: 401 }));

    match coordinator.on_unauthorized(sent_at) {
        Admission::Settled(outcome) => {
            assert_eq!(outcome, Err(SessionError::Rejected { status: 401 }))
        }
        other => panic!("expected settled outcome, got {:?}", other),
    }
    assert!(!coordinator.is_refreshing());
}
