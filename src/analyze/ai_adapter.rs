// src/analyze/ai_adapter.rs
//! Optional keyword suggester: provider abstraction + file cache + daily limit.
//!
//! Suggestions are never trusted as-is. Every item is re-resolved against the
//! taxonomy, and anything the taxonomy does not know is dropped. Timeouts,
//! transport errors and malformed output all collapse into the same fallback
//! outcome; callers never see an error from here.

use std::fs;
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::analyze::merge::best_per_category;
use crate::analyze::{CandidateKeyword, CandidateSource};
use crate::config::ai::AiConfig;
use crate::error::SuggestError;
use crate::taxonomy::{KeywordRef, Lookup, Taxonomy};

pub const FALLBACK_SUMMARY: &str =
    "Additional keyword suggestions are unavailable right now; showing rule-based results only.";
pub const DEFAULT_SUGGESTION_CONFIDENCE: f64 = 0.5;
const MAX_RATIONALE_CHARS: usize = 160;

/// One raw item as returned by a suggester, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedKeyword {
    pub category: String,
    pub keyword: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub rationale: Option<String>,
}

impl SuggestedKeyword {
    pub fn new(category: impl Into<String>, keyword: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            keyword: keyword.into(),
            confidence: None,
            rationale: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

pub type SuggestFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<SuggestedKeyword>, SuggestError>> + Send + 'a>>;

pub trait KeywordSuggester: Send + Sync {
    fn suggest<'a>(&'a self, text: &'a str, taxonomy: &'a Taxonomy) -> SuggestFuture<'a>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

pub type DynSuggester = Arc<dyn KeywordSuggester>;

/// What the caller gets back from one bounded attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestionOutcome {
    pub provider: &'static str,
    /// False when the fallback was substituted.
    pub used: bool,
    pub keywords: Vec<CandidateKeyword>,
    /// Items dropped because the taxonomy does not know them.
    pub discarded: usize,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<&'static str>,
}

/// Single attempt under `limit`. Never fails; never retries.
pub async fn suggest_bounded(
    suggester: &dyn KeywordSuggester,
    text: &str,
    taxonomy: &Taxonomy,
    limit: Duration,
) -> SuggestionOutcome {
    let provider = suggester.provider_name();
    let raw = match tokio::time::timeout(limit, suggester.suggest(text, taxonomy)).await {
        Ok(Ok(raw)) => raw,
        Ok(Err(e)) => return fallback(provider, 0, e),
        Err(_) => return fallback(provider, 0, SuggestError::Timeout),
    };

    let (keywords, discarded) = validate_suggestions(taxonomy, raw);
    if keywords.is_empty() {
        return fallback(
            provider,
            discarded,
            SuggestError::Malformed("no suggestion matched the taxonomy".into()),
        );
    }

    debug!(provider, accepted = keywords.len(), discarded, "suggestions accepted");
    SuggestionOutcome {
        provider,
        used: true,
        summary: format!("{} additional keyword(s) suggested", keywords.len()),
        keywords,
        discarded,
        fallback_reason: None,
    }
}

fn fallback(provider: &'static str, discarded: usize, err: SuggestError) -> SuggestionOutcome {
    let reason = err.reason();
    if err == SuggestError::Disabled {
        debug!(provider, "suggester disabled");
    } else {
        warn!(provider, reason, error = %err, "suggester fell back");
    }
    metrics::counter!("suggester_fallbacks_total", "reason" => reason).increment(1);
    SuggestionOutcome {
        provider,
        used: false,
        keywords: Vec::new(),
        discarded,
        summary: FALLBACK_SUMMARY.to_string(),
        fallback_reason: Some(reason),
    }
}

/// Keep only taxonomy-grounded items; weight and polarity always come from
/// the taxonomy, never from the suggester. Returns (accepted, discarded).
pub fn validate_suggestions(
    taxonomy: &Taxonomy,
    raw: Vec<SuggestedKeyword>,
) -> (Vec<CandidateKeyword>, usize) {
    let mut discarded = 0;
    let mut accepted = Vec::with_capacity(raw.len());

    for s in raw {
        let r = KeywordRef::new(s.category.trim(), s.keyword.trim());
        let Lookup::Found(cat, kw) = taxonomy.lookup(&r) else {
            debug!(category = %r.category, keyword = %r.keyword, "ungrounded suggestion dropped");
            discarded += 1;
            continue;
        };
        let confidence = s
            .confidence
            .filter(|c| c.is_finite())
            .map(|c| c.clamp(0.0, 1.0))
            .unwrap_or(DEFAULT_SUGGESTION_CONFIDENCE);
        let rationale = s
            .rationale
            .as_deref()
            .map(sanitize_rationale)
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| "suggested by the external suggester".to_string());
        accepted.push(CandidateKeyword {
            category: cat.name.clone(),
            keyword: kw.keyword.clone(),
            confidence,
            evidence: String::new(),
            rationale,
            source: CandidateSource::Suggestion,
            weight: kw.weight,
            polarity: kw.polarity,
        });
    }

    (best_per_category(accepted), discarded)
}

/// Single line, collapsed whitespace, at most 160 characters.
pub fn sanitize_rationale(input: &str) -> String {
    let mut out = String::with_capacity(MAX_RATIONALE_CHARS);
    let mut n = 0;
    for word in input.split_whitespace() {
        let needed = word.chars().count() + usize::from(n > 0);
        if n + needed > MAX_RATIONALE_CHARS {
            let room = MAX_RATIONALE_CHARS.saturating_sub(n + usize::from(n > 0));
            if room > 0 {
                if n > 0 {
                    out.push(' ');
                }
                out.extend(word.chars().take(room));
            }
            break;
        }
        if n > 0 {
            out.push(' ');
        }
        out.push_str(word);
        n += needed;
    }
    out
}

// ------------------------------------------------------------
// Concrete suggesters
// ------------------------------------------------------------

/// Always reports `Disabled`; used when no provider is configured.
pub struct DisabledSuggester;

impl KeywordSuggester for DisabledSuggester {
    fn suggest<'a>(&'a self, _text: &'a str, _taxonomy: &'a Taxonomy) -> SuggestFuture<'a> {
        Box::pin(async { Err(SuggestError::Disabled) })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Deterministic suggester for tests and local runs.
#[derive(Clone)]
pub struct MockSuggester {
    result: Result<Vec<SuggestedKeyword>, SuggestError>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl Default for MockSuggester {
    fn default() -> Self {
        Self::new(vec![SuggestedKeyword {
            category: "maintenance".into(),
            keyword: "clean".into(),
            confidence: Some(0.6),
            rationale: Some("mock suggestion".into()),
        }])
    }
}

impl MockSuggester {
    pub fn new(fixed: Vec<SuggestedKeyword>) -> Self {
        Self {
            result: Ok(fixed),
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(err: SuggestError) -> Self {
        Self {
            result: Err(err),
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `suggest` calls so far (shared across clones).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl KeywordSuggester for MockSuggester {
    fn suggest<'a>(&'a self, _text: &'a str, _taxonomy: &'a Taxonomy) -> SuggestFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let out = self.result.clone();
        let delay = self.delay;
        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            out
        })
    }
    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// OpenAI Chat Completions in JSON mode.
pub struct OpenAiSuggester {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiSuggester {
    pub fn new(api_key: impl Into<String>, model: Option<&str>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("safety-review-analyzer/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            model: model.unwrap_or("gpt-4o-mini").to_string(),
        })
    }

    async fn fetch(&self, text: &str, taxonomy: &Taxonomy) -> Result<Vec<SuggestedKeyword>, SuggestError> {
        if self.api_key.is_empty() {
            return Err(SuggestError::Disabled);
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct ResponseFormat {
            r#type: &'static str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
            response_format: ResponseFormat,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }
        #[derive(Deserialize)]
        struct Payload {
            keywords: Vec<SuggestedKeyword>,
        }

        let sys = system_prompt(taxonomy);
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: &sys,
                },
                Msg {
                    role: "user",
                    content: text,
                },
            ],
            temperature: 0.0,
            max_tokens: 300,
            response_format: ResponseFormat {
                r#type: "json_object",
            },
        };

        let resp = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| SuggestError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(SuggestError::Http(format!("status {}", resp.status())));
        }
        let body: Resp = resp
            .json()
            .await
            .map_err(|e| SuggestError::Malformed(e.to_string()))?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| SuggestError::Malformed("no choices".into()))?;
        let payload: Payload =
            serde_json::from_str(content).map_err(|e| SuggestError::Malformed(e.to_string()))?;
        Ok(payload.keywords)
    }
}

fn system_prompt(taxonomy: &Taxonomy) -> String {
    let mut vocab = String::new();
    for c in taxonomy.categories() {
        let kws: Vec<&str> = c.keywords.iter().map(|k| k.keyword.as_str()).collect();
        vocab.push_str(&format!("- {}: {}\n", c.name, kws.join(", ")));
    }
    format!(
        "You tag neighborhood safety reviews. Choose at most one keyword per category, \
         only from this list:\n{vocab}\
         Reply with JSON: {{\"keywords\": [{{\"category\": str, \"keyword\": str, \
         \"confidence\": number 0..1, \"rationale\": short sentence}}]}}."
    )
}

impl KeywordSuggester for OpenAiSuggester {
    fn suggest<'a>(&'a self, text: &'a str, taxonomy: &'a Taxonomy) -> SuggestFuture<'a> {
        Box::pin(self.fetch(text, taxonomy))
    }
    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

// ------------------------------------------------------------
// Caching wrapper (file cache + daily limit)
// ------------------------------------------------------------

pub struct CachingSuggester<S: KeywordSuggester> {
    inner: S,
    cache_dir: PathBuf,
    daily_limit: u32,
    counter: Mutex<DailyCounter>,
}

impl<S: KeywordSuggester> CachingSuggester<S> {
    pub fn new(inner: S, cache_dir: PathBuf, daily_limit: u32) -> Self {
        if let Err(e) = fs::create_dir_all(&cache_dir) {
            warn!(dir = %cache_dir.display(), error = %e, "cannot create suggestion cache dir");
        }
        let counter = load_daily_counter(&cache_dir).unwrap_or_default();
        Self {
            inner,
            cache_dir,
            daily_limit,
            counter: Mutex::new(counter),
        }
    }

    async fn suggest_impl(
        &self,
        text: &str,
        taxonomy: &Taxonomy,
    ) -> Result<Vec<SuggestedKeyword>, SuggestError> {
        let key = cache_key(text);
        if let Some(hit) = read_cache_file(&self.cache_dir, &key) {
            debug!(key = %key, "suggestion cache hit");
            return Ok(hit);
        }

        // Only real calls count against the limit. The slot is taken before
        // the call so concurrent requests cannot overshoot it.
        self.reserve_slot()?;

        let fresh = match self.inner.suggest(text, taxonomy).await {
            Ok(fresh) => fresh,
            Err(e) => {
                self.release_slot();
                return Err(e);
            }
        };
        if !fresh.is_empty() {
            if let Err(e) = write_cache_file(&self.cache_dir, &key, &fresh) {
                debug!(error = %e, "suggestion cache write failed");
            }
        }
        Ok(fresh)
    }

    fn reserve_slot(&self) -> Result<(), SuggestError> {
        let mut g = self.counter.lock().unwrap_or_else(|e| e.into_inner());
        if g.is_expired() {
            g.reset_to_today();
        }
        if g.count >= self.daily_limit {
            return Err(SuggestError::Limited);
        }
        g.count += 1;
        if let Err(e) = save_daily_counter(&self.cache_dir, &g) {
            debug!(error = %e, "daily counter write failed");
        }
        Ok(())
    }

    /// Failed calls give their slot back.
    fn release_slot(&self) {
        let mut g = self.counter.lock().unwrap_or_else(|e| e.into_inner());
        if g.is_expired() {
            return;
        }
        g.count = g.count.saturating_sub(1);
        if let Err(e) = save_daily_counter(&self.cache_dir, &g) {
            debug!(error = %e, "daily counter write failed");
        }
    }
}

impl<S: KeywordSuggester> KeywordSuggester for CachingSuggester<S> {
    fn suggest<'a>(&'a self, text: &'a str, taxonomy: &'a Taxonomy) -> SuggestFuture<'a> {
        Box::pin(self.suggest_impl(text, taxonomy))
    }
    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }
}

/// * `AI_TEST_MODE=mock` → deterministic mock
/// * disabled config → `DisabledSuggester`
/// * `openai` → OpenAI wrapped with caching + daily limit
pub fn build_suggester(config: &AiConfig) -> DynSuggester {
    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(MockSuggester::default());
    }

    if !config.enabled {
        return Arc::new(DisabledSuggester);
    }

    match config.provider.as_str() {
        "openai" => match OpenAiSuggester::new(config.api_key.clone(), config.model.as_deref()) {
            Ok(p) => Arc::new(CachingSuggester::new(
                p,
                default_cache_dir(),
                config.daily_limit,
            )),
            Err(e) => {
                warn!(error = %e, "OpenAI suggester unavailable");
                Arc::new(DisabledSuggester)
            }
        },
        other => {
            warn!(provider = other, "unsupported suggester provider");
            Arc::new(DisabledSuggester)
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache/suggest")
}

fn cache_key(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest[..16].iter().map(|b| format!("{b:02x}")).collect()
}

fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

fn read_cache_file(dir: &Path, key: &str) -> Option<Vec<SuggestedKeyword>> {
    let s = fs::read_to_string(cache_path(dir, key)).ok()?;
    serde_json::from_str(&s).ok()
}

fn write_atomic(path: &Path, body: &str) -> io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    let mut f = fs::File::create(&tmp)?;
    f.write_all(body.as_bytes())?;
    fs::rename(tmp, path)
}

fn write_cache_file(dir: &Path, key: &str, value: &[SuggestedKeyword]) -> io::Result<()> {
    let json = serde_json::to_string(value).map_err(io::Error::other)?;
    write_atomic(&cache_path(dir, key), &json)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DailyCounter {
    date: String,
    count: u32,
}

impl Default for DailyCounter {
    fn default() -> Self {
        Self {
            date: today(),
            count: 0,
        }
    }
}

impl DailyCounter {
    fn is_expired(&self) -> bool {
        self.date != today()
    }
    fn reset_to_today(&mut self) {
        self.date = today();
        self.count = 0;
    }
}

fn today() -> String {
    chrono::Local::now().date_naive().to_string()
}

fn counter_path(dir: &Path) -> PathBuf {
    dir.join("daily_count.json")
}

fn load_daily_counter(dir: &Path) -> io::Result<DailyCounter> {
    let s = fs::read_to_string(counter_path(dir))?;
    serde_json::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn save_daily_counter(dir: &Path, dc: &DailyCounter) -> io::Result<()> {
    let json = serde_json::to_string(dc).map_err(io::Error::other)?;
    write_atomic(&counter_path(dir), &json)
}
