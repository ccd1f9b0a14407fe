//! Safety Review Service: binary entrypoint.
//! Boots the Axum HTTP server: taxonomy, locations and suggester from config,
//! plus the Prometheus `/metrics` route.

use safety_review_analyzer::metrics::Metrics;
use safety_review_analyzer::{router, AppState};
use shuttle_axum::ShuttleAxum;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact logs by default; `REVIEW_LOG_JSON=1` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("safety_review_analyzer=info,warn"));

    let json = std::env::var("REVIEW_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    // A subscriber installed by the runtime wins.
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let state = AppState::from_env()?;
    info!(
        keywords = state.analyzer.taxonomy().keyword_count(),
        suggester = state.suggester.provider_name(),
        "analyzer ready"
    );

    let mut app = router(state);
    match Metrics::init() {
        Ok(m) => app = app.merge(m.router()),
        Err(e) => warn!(error = %e, "metrics disabled"),
    }

    Ok(app.into())
}
