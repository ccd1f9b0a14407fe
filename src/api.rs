// src/api.rs
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use shuttle_axum::axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::analyze::ai_adapter::{build_suggester, DisabledSuggester, DynSuggester};
use crate::analyze::{
    record_rejection, weight_table, Analyzer, ReviewAnalysis, ReviewInput, ScoreResult,
    WeightTable,
};
use crate::config::ai::AiConfig;
use crate::error::ValidationError;
use crate::facility::InMemoryLocationProvider;
use crate::preprocess::require_text;
use crate::taxonomy::{KeywordRef, Taxonomy};

#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<Analyzer>,
    pub suggester: DynSuggester,
    pub suggest_timeout: Duration,
}

impl AppState {
    pub fn new(analyzer: Arc<Analyzer>, suggester: DynSuggester, suggest_timeout: Duration) -> Self {
        Self {
            analyzer,
            suggester,
            suggest_timeout,
        }
    }

    /// Builtin (or `TAXONOMY_PATH`) taxonomy, configured locations and suggester.
    pub fn from_env() -> anyhow::Result<Self> {
        let taxonomy = Arc::new(Taxonomy::load()?);
        let locations = Arc::new(InMemoryLocationProvider::load_default()?);
        let ai = AiConfig::load()?;
        Ok(Self::new(
            Arc::new(Analyzer::new(taxonomy, locations)),
            build_suggester(&ai),
            ai.timeout(),
        ))
    }

    /// Builtin taxonomy, no locations, suggester off.
    pub fn offline() -> anyhow::Result<Self> {
        let taxonomy = Arc::new(Taxonomy::builtin()?);
        Ok(Self::new(
            Arc::new(Analyzer::new(
                taxonomy,
                Arc::new(InMemoryLocationProvider::default()),
            )),
            Arc::new(DisabledSuggester),
            Duration::from_millis(AiConfig::default().timeout_ms),
        ))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/analyze", post(analyze))
        .route("/score", post(score))
        .route("/taxonomy", get(taxonomy))
        .route("/weights", get(weights))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Rejected input → 422 with a stable code.
pub struct ApiError(ValidationError);

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.0.to_string(), "code": self.0.code() });
        (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response()
    }
}

#[derive(Deserialize)]
struct AnalyzeReq {
    /// Raw JSON so a non-string value can be told apart from a missing one.
    #[serde(default)]
    text: Option<serde_json::Value>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    time_of_day: Option<String>,
    #[serde(default)]
    rating: Option<i64>,
    #[serde(default)]
    keywords: Option<Vec<KeywordRef>>,
}

impl AnalyzeReq {
    /// Non-string text is rejected here, before the analyzer sees it, so it
    /// is counted here too.
    fn into_input(self) -> Result<ReviewInput, ValidationError> {
        let text = require_text(self.text.as_ref())
            .inspect_err(record_rejection)?
            .map(str::to_string);
        Ok(ReviewInput {
            text,
            location: self.location,
            time_of_day: self.time_of_day,
            rating: self.rating,
            keywords: self.keywords,
        })
    }
}

async fn analyze(
    State(state): State<AppState>,
    Json(body): Json<AnalyzeReq>,
) -> Result<Json<ReviewAnalysis>, ApiError> {
    let input = body.into_input()?;
    let out = state
        .analyzer
        .analyze_with_suggestions(&input, state.suggester.as_ref(), state.suggest_timeout)
        .await?;
    Ok(Json(out))
}

#[derive(Deserialize)]
struct ScoreReq {
    #[serde(default)]
    rating: Option<i64>,
    #[serde(default)]
    keywords: Vec<KeywordRef>,
}

async fn score(
    State(state): State<AppState>,
    Json(body): Json<ScoreReq>,
) -> Result<Json<ScoreResult>, ApiError> {
    let out = state.analyzer.score_selection(body.rating, &body.keywords)?;
    Ok(Json(out))
}

async fn taxonomy(State(state): State<AppState>) -> Json<Taxonomy> {
    Json(state.analyzer.taxonomy().clone())
}

async fn weights() -> Json<WeightTable> {
    Json(weight_table())
}
