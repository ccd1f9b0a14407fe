// tests/suggester_fallback.rs
//
// The external suggester is optional and untrusted: slow, failing or
// ungrounded output must degrade to the fixed fallback, never to an error.

use std::sync::Arc;
use std::time::Duration;

use safety_review_analyzer::ai_adapter::{
    build_suggester, MockSuggester, SuggestedKeyword, FALLBACK_SUMMARY,
};
use safety_review_analyzer::config::ai::AiConfig;
use safety_review_analyzer::facility::InMemoryLocationProvider;
use safety_review_analyzer::{Analyzer, CandidateSource, ReviewInput, SuggestError, Taxonomy};
use serial_test::serial;

fn analyzer() -> Analyzer {
    Analyzer::new(
        Arc::new(Taxonomy::builtin().expect("taxonomy")),
        Arc::new(InMemoryLocationProvider::default()),
    )
}

const REVIEW: &str = "The alley is dark and full of trash";

#[tokio::test]
async fn slow_suggester_falls_back_without_error() {
    let slow = MockSuggester::default().with_delay(Duration::from_millis(300));
    let out = analyzer()
        .analyze_with_suggestions(&ReviewInput::text(REVIEW), &slow, Duration::from_millis(25))
        .await
        .expect("deterministic part succeeds");

    let s = out.suggestions.expect("suggestion outcome present");
    assert!(!s.used);
    assert!(s.keywords.is_empty());
    assert_eq!(s.summary, FALLBACK_SUMMARY);
    assert_eq!(s.fallback_reason, Some("timeout"));
    // Rule-based results are unaffected.
    assert_eq!(out.recommendations.len(), 2);
}

#[tokio::test]
async fn failing_suggester_falls_back() {
    let broken = MockSuggester::failing(SuggestError::Http("connection reset".into()));
    let out = analyzer()
        .analyze_with_suggestions(&ReviewInput::text(REVIEW), &broken, Duration::from_secs(1))
        .await
        .expect("ok");
    let s = out.suggestions.expect("outcome");
    assert_eq!(s.fallback_reason, Some("http"));
    assert_eq!(broken.calls(), 1, "no retry");
}

#[tokio::test]
async fn ungrounded_suggestions_are_discarded() {
    let rogue = MockSuggester::new(vec![
        SuggestedKeyword::new("weather", "rainy").with_confidence(0.9),
        SuggestedKeyword::new("lighting", "strobe").with_confidence(0.9),
    ]);
    let out = analyzer()
        .analyze_with_suggestions(&ReviewInput::text(REVIEW), &rogue, Duration::from_secs(1))
        .await
        .expect("ok");
    let s = out.suggestions.expect("outcome");
    assert!(!s.used);
    assert_eq!(s.discarded, 2);
    assert_eq!(s.summary, FALLBACK_SUMMARY);
}

#[tokio::test]
async fn valid_suggestions_are_returned_separately_from_the_score() {
    let a = analyzer();
    let baseline = a.analyze(&ReviewInput::text(REVIEW)).expect("ok").score;

    let helpful = MockSuggester::new(vec![
        SuggestedKeyword::new("activity", "deserted").with_confidence(0.65),
        SuggestedKeyword::new("moon", "full"),
    ]);
    let out = a
        .analyze_with_suggestions(&ReviewInput::text(REVIEW), &helpful, Duration::from_secs(1))
        .await
        .expect("ok");
    let s = out.suggestions.expect("outcome");
    assert!(s.used);
    assert_eq!(s.discarded, 1);
    assert_eq!(s.keywords.len(), 1);
    assert_eq!(s.keywords[0].keyword, "deserted");
    assert_eq!(s.keywords[0].source, CandidateSource::Suggestion);
    assert_eq!(s.keywords[0].weight, 3);

    assert_eq!(out.score, baseline);
    assert!(out.recommendations.iter().all(|c| c.keyword != "deserted"));
}

#[test]
#[serial]
fn mock_mode_env_selects_the_mock_provider() {
    std::env::set_var("AI_TEST_MODE", "mock");
    let s = build_suggester(&AiConfig::default());
    std::env::remove_var("AI_TEST_MODE");
    assert_eq!(s.provider_name(), "mock");

    let s = build_suggester(&AiConfig::default());
    assert_eq!(s.provider_name(), "disabled");
}
