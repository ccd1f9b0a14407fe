// src/analyze/mod.rs
//! Analysis pipeline entry: preprocess → match → blend context → merge → score.
//!
//! `Analyzer` owns everything a request needs that is built once (the shared
//! taxonomy, compiled keyword variants, the location provider). Every call
//! allocates its own request-local structures, so one `Analyzer` can be shared
//! across tasks without locking.

pub mod ai_adapter;
pub mod context;
pub mod matcher;
pub mod merge;
pub mod scoring;
pub mod weights;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::ValidationError;
use crate::preprocess::{Preprocessor, Redactions, Signals};
use crate::taxonomy::{KeywordRef, Polarity, Taxonomy};

pub use crate::analyze::ai_adapter::{suggest_bounded, KeywordSuggester, SuggestionOutcome};
pub use crate::analyze::context::{
    ContextAssessment, ContextBlender, LocationProvider, LocationSnapshot, RiskTier, TimeContext,
    TimePeriod,
};
pub use crate::analyze::matcher::KeywordMatcher;
pub use crate::analyze::merge::merge_candidates;
pub use crate::analyze::scoring::{compute_score, PrincipleScores, ScoreResult};
pub use crate::analyze::weights::{weight_table, Grade, WeightTable};

/// Where a candidate keyword came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CandidateSource {
    Text,
    Context,
    PublicData,
    Suggestion,
}

/// A recommended keyword with its confidence and explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateKeyword {
    pub category: String,
    pub keyword: String,
    pub confidence: f64,
    /// Short excerpt of the normalized text around the match (empty for non-text sources).
    pub evidence: String,
    pub rationale: String,
    pub source: CandidateSource,
    pub weight: u8,
    pub polarity: Polarity,
}

impl CandidateKeyword {
    pub fn to_ref(&self) -> KeywordRef {
        KeywordRef::new(self.category.clone(), self.keyword.clone())
    }
}

/// Everything the request layer hands to the core.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewInput {
    pub text: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub time_of_day: Option<String>,
    #[serde(default)]
    pub rating: Option<i64>,
    /// Explicit selections; when present they replace text-derived keywords for scoring.
    #[serde(default)]
    pub keywords: Option<Vec<KeywordRef>>,
}

impl ReviewInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_rating(mut self, rating: i64) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_time(mut self, time_of_day: impl Into<String>) -> Self {
        self.time_of_day = Some(time_of_day.into());
        self
    }

    pub fn with_keywords(mut self, keywords: Vec<KeywordRef>) -> Self {
        self.keywords = Some(keywords);
        self
    }
}

/// Full, explainable result for one review.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewAnalysis {
    /// Anonymous id (hash prefix of the original text).
    pub review_id: String,
    pub cleaned_text: String,
    pub normalized_text: String,
    pub tokens: Vec<String>,
    pub issues: Vec<String>,
    pub redactions: Redactions,
    pub signals: Signals,
    pub recommendations: Vec<CandidateKeyword>,
    pub score: ScoreResult,
    pub context: ContextAssessment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<SuggestionOutcome>,
}

pub struct Analyzer {
    taxonomy: Arc<Taxonomy>,
    preprocessor: Preprocessor,
    matcher: KeywordMatcher,
    blender: ContextBlender,
}

impl Analyzer {
    pub fn new(taxonomy: Arc<Taxonomy>, locations: Arc<dyn LocationProvider>) -> Self {
        Self {
            matcher: KeywordMatcher::new(&taxonomy),
            blender: ContextBlender::new(taxonomy.clone(), locations),
            preprocessor: Preprocessor::new(),
            taxonomy,
        }
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Deterministic pipeline. Rejected input never reaches the matcher.
    pub fn analyze(&self, input: &ReviewInput) -> Result<ReviewAnalysis, ValidationError> {
        let result = self.analyze_inner(input);
        if let Err(e) = &result {
            record_rejection(e);
        }
        result
    }

    fn analyze_inner(&self, input: &ReviewInput) -> Result<ReviewAnalysis, ValidationError> {
        let rating = scoring::validate_rating(input.rating)?;
        if let Some(k) = &input.keywords {
            if k.is_empty() {
                return Err(ValidationError::EmptyKeywordSelection);
            }
        }

        let pre = self.preprocessor.process(input.text.as_deref());
        if let Some(err) = pre.blocking_error() {
            return Err(err.clone());
        }
        if pre.oversized {
            return Err(ValidationError::TooLong {
                len: pre.original.trim().chars().count(),
            });
        }

        let text_matches = self.matcher.match_text(&pre.normalized, &pre.tokens);
        let blend = self.blender.blend(
            &text_matches,
            input.location.as_deref(),
            input.time_of_day.as_deref(),
        );
        let recommendations = merge_candidates([blend.matches, blend.derived]);

        let selected: Vec<KeywordRef> = match &input.keywords {
            Some(explicit) => explicit.clone(),
            None => recommendations.iter().map(CandidateKeyword::to_ref).collect(),
        };
        let score = compute_score(&self.taxonomy, rating, &selected);

        let review_id = crate::anon_hash(&pre.original);
        metrics::counter!("review_analyses_total").increment(1);
        info!(
            review = %review_id,
            recommendations = recommendations.len(),
            total = score.total,
            grade = %score.grade,
            risk = ?blend.assessment.risk_level,
            "review analyzed"
        );

        Ok(ReviewAnalysis {
            review_id,
            cleaned_text: pre.cleaned,
            normalized_text: pre.normalized,
            tokens: pre.tokens,
            issues: pre.issues,
            redactions: pre.redactions,
            signals: pre.signals,
            recommendations,
            score,
            context: blend.assessment,
            suggestions: None,
        })
    }

    /// Score an explicit keyword selection without any review text.
    pub fn score_selection(
        &self,
        rating: Option<i64>,
        keywords: &[KeywordRef],
    ) -> Result<ScoreResult, ValidationError> {
        let rating = scoring::validate_rating(rating)?;
        if keywords.is_empty() {
            return Err(ValidationError::EmptyKeywordSelection);
        }
        Ok(compute_score(&self.taxonomy, rating, keywords))
    }

    /// Deterministic pipeline plus one time-bounded suggester attempt.
    /// Suggester failures never turn into errors here.
    pub async fn analyze_with_suggestions(
        &self,
        input: &ReviewInput,
        suggester: &dyn KeywordSuggester,
        timeout: Duration,
    ) -> Result<ReviewAnalysis, ValidationError> {
        let mut analysis = self.analyze(input)?;
        let outcome =
            suggest_bounded(suggester, &analysis.normalized_text, &self.taxonomy, timeout).await;
        analysis.suggestions = Some(outcome);
        Ok(analysis)
    }
}

/// Counts a rejected review under its stable code.
pub fn record_rejection(e: &ValidationError) {
    metrics::counter!("review_rejections_total", "code" => e.code()).increment(1);
    warn!(code = e.code(), "review rejected");
}
