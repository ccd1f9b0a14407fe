// src/preprocess.rs
//! Review text sanitation: validation, PII/profanity redaction, normalization,
//! tokenization, and auxiliary signal extraction (emotions, places, times).

use crate::error::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;

pub const MIN_TEXT_CHARS: usize = 5;
pub const MAX_TEXT_CHARS: usize = 1000;

pub const EMAIL_PLACEHOLDER: &str = "[EMAIL]";
pub const PHONE_PLACEHOLDER: &str = "[PHONE]";
pub const PROFANITY_PLACEHOLDER: &str = "[CENSORED]";

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email regex")
});

// 010-1234-5678, 02 123 4567, +82 10 1234 5678, 555.123.4567
static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+\d{1,3}[-.\s]?)?\b\d{2,4}[-.\s]?\d{3,4}[-.\s]?\d{4}\b").expect("phone regex")
});

const PROFANITY_EN: &[&str] = &[
    "fuck", "fucking", "fucked", "shit", "shitty", "damn", "bastard", "asshole", "bitch",
];
const PROFANITY_KO: &[&str] = &["시발", "씨발", "개새끼", "병신", "존나"];

static PROFANITY_RE: Lazy<Regex> = Lazy::new(|| {
    let en = PROFANITY_EN
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|");
    let ko = PROFANITY_KO
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{en})\b|{ko}")).expect("profanity regex")
});

// Everything that is not a word character, whitespace, or a Hangul syllable.
static STRIP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s\x{AC00}-\x{D7A3}]").expect("strip regex"));

static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

static POSITIVE_EMOTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:safe|safer|comfortable|relieved|reassur\w*|peaceful|calm|secure)\b|안심\w*|편안\w*",
    )
    .expect("positive emotion regex")
});

static NEGATIVE_EMOTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:unsafe|scary|scared|afraid|anxious|danger\w*|fear\w*|nervous|creepy|uneasy|threaten\w*)\b|무서\w*|불안\w*",
    )
    .expect("negative emotion regex")
});

// Administrative-unit suffixes: romanized (-dong, -gu, -ro, -gil, -si), Hangul
// (동/구/로/길), and English street words.
static PLACE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b[a-z0-9]+-(?:dong|gu|ro|gil|si)\b|[가-힣]{1,10}(?:동|구|로|길)|\b[a-z]+ (?:street|avenue|road|station)\b",
    )
    .expect("place regex")
});

static CLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{1,2}:\d{2}\b").expect("clock regex"));

const TIME_WORDS: &[&str] = &[
    "early morning",
    "late night",
    "dawn",
    "morning",
    "noon",
    "afternoon",
    "evening",
    "dusk",
    "sunset",
    "midnight",
    "night",
    "새벽",
    "아침",
    "오전",
    "점심",
    "오후",
    "저녁",
    "심야",
    "밤",
];

const STOP_WORDS: &[&str] = &[
    "the", "an", "and", "or", "but", "is", "are", "was", "were", "be", "been", "it", "its",
    "this", "that", "these", "those", "there", "here", "of", "in", "on", "at", "to", "for",
    "with", "by", "from", "as", "my", "our", "we", "you", "they", "he", "she", "me", "us",
    "very", "really", "so", "too", "just", "also", "then", "than", "have", "has", "had", "do",
    "does", "did", "if", "will", "would", "could", "can", "get", "got", "그리고", "그냥",
    "정말", "너무", "진짜", "좀",
];

static STOP_SET: Lazy<HashSet<&'static str>> = Lazy::new(|| STOP_WORDS.iter().copied().collect());

// Longest first so "afternoon" is taken whole rather than as "noon". English
// words are word-bounded; Hangul ones are not, since particles attach to them.
static TIME_RE: Lazy<Regex> = Lazy::new(|| {
    let mut words = TIME_WORDS.to_vec();
    words.sort_by_key(|w| std::cmp::Reverse(w.chars().count()));
    let (en, ko): (Vec<&str>, Vec<&str>) = words.into_iter().partition(|w| w.is_ascii());
    let alt = |ws: Vec<&str>| {
        ws.iter()
            .map(|w| regex::escape(w))
            .collect::<Vec<_>>()
            .join("|")
    };
    Regex::new(&format!(r"(?i)\b(?:{})\b|{}", alt(en), alt(ko))).expect("time regex")
});

pub fn is_stop_word(word: &str) -> bool {
    STOP_SET.contains(word)
}

/// Auxiliary signals pulled from the cleaned text, independent of tokenization.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Signals {
    pub positive_emotions: Vec<String>,
    pub negative_emotions: Vec<String>,
    pub places: Vec<String>,
    pub times: Vec<String>,
}

/// What the redaction pass replaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Redactions {
    pub emails: usize,
    pub phones: usize,
    pub profanity: usize,
}

impl Redactions {
    pub fn any(&self) -> bool {
        self.emails + self.phones + self.profanity > 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PreprocessedReview {
    pub original: String,
    pub cleaned: String,
    pub normalized: String,
    pub tokens: Vec<String>,
    pub valid: bool,
    pub issues: Vec<String>,
    pub oversized: bool,
    pub redactions: Redactions,
    pub signals: Signals,
    #[serde(skip)]
    blocking: Option<ValidationError>,
}

impl PreprocessedReview {
    fn rejected(original: String, err: ValidationError) -> Self {
        Self {
            original,
            cleaned: String::new(),
            normalized: String::new(),
            tokens: Vec::new(),
            valid: false,
            issues: vec![err.to_string()],
            oversized: false,
            redactions: Redactions::default(),
            signals: Signals::default(),
            blocking: Some(err),
        }
    }

    /// The problem that made this review invalid, if any.
    pub fn blocking_error(&self) -> Option<&ValidationError> {
        self.blocking.as_ref()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Self
    }

    /// Full pass over a raw review. Never panics; problems end up in `issues`
    /// and, when blocking, flip `valid` to false.
    pub fn process(&self, raw: Option<&str>) -> PreprocessedReview {
        let Some(raw) = raw else {
            return PreprocessedReview::rejected(String::new(), ValidationError::MissingText);
        };
        let original = raw.to_string();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return PreprocessedReview::rejected(original, ValidationError::EmptyText);
        }
        let len = trimmed.chars().count();
        if len < MIN_TEXT_CHARS {
            return PreprocessedReview::rejected(original, ValidationError::TooShort { len });
        }

        let mut issues = Vec::new();
        let oversized = len > MAX_TEXT_CHARS;
        if oversized {
            issues.push(ValidationError::TooLong { len }.to_string());
        }

        let decoded = html_escape::decode_html_entities(trimmed);
        let (cleaned, redactions) = redact(&decoded);
        if redactions.emails + redactions.phones > 0 {
            issues.push("personal contact information was redacted".to_string());
        }
        if redactions.profanity > 0 {
            issues.push("abusive language was redacted".to_string());
        }

        let normalized = normalize(&cleaned);
        let tokens = tokenize(&normalized);
        let signals = extract_signals(&cleaned);

        let blocking = if tokens.is_empty() {
            issues.push(ValidationError::NoTokens.to_string());
            Some(ValidationError::NoTokens)
        } else {
            None
        };

        PreprocessedReview {
            original,
            cleaned,
            normalized,
            tokens,
            valid: blocking.is_none(),
            issues,
            oversized,
            redactions,
            signals,
            blocking,
        }
    }
}

/// Accept only JSON strings as review text.
pub fn require_text(value: Option<&serde_json::Value>) -> Result<Option<&str>, ValidationError> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(ValidationError::NotText),
    }
}

/// Replace emails, phone numbers, and profanity with placeholders.
pub fn redact(text: &str) -> (String, Redactions) {
    let mut r = Redactions::default();

    r.emails = EMAIL_RE.find_iter(text).count();
    let out = EMAIL_RE.replace_all(text, EMAIL_PLACEHOLDER);

    r.phones = PHONE_RE.find_iter(&out).count();
    let out = PHONE_RE.replace_all(&out, PHONE_PLACEHOLDER);

    r.profanity = PROFANITY_RE.find_iter(&out).count();
    let out = PROFANITY_RE.replace_all(&out, PROFANITY_PLACEHOLDER);

    (out.into_owned(), r)
}

/// Case-fold, strip punctuation/symbols to spaces, collapse whitespace, trim.
/// Idempotent: `normalize(&normalize(s)) == normalize(s)`.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = STRIP_RE.replace_all(&lowered, " ");
    WS_RE.replace_all(&stripped, " ").trim().to_string()
}

/// Whitespace split, drop single-character tokens and stop words, dedup
/// keeping first occurrence order.
pub fn tokenize(normalized: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    normalized
        .split_whitespace()
        .filter(|t| t.chars().count() > 1)
        .filter(|t| !STOP_SET.contains(t))
        .filter(|t| seen.insert(*t))
        .map(str::to_string)
        .collect()
}

pub fn extract_signals(cleaned: &str) -> Signals {
    let lowered = cleaned.to_lowercase();

    let mut times = collect_unique(&TIME_RE, &lowered);
    for m in CLOCK_RE.find_iter(&lowered) {
        push_unique(&mut times, m.as_str());
    }

    Signals {
        positive_emotions: collect_unique(&POSITIVE_EMOTION_RE, &lowered),
        negative_emotions: collect_unique(&NEGATIVE_EMOTION_RE, &lowered),
        places: collect_unique(&PLACE_RE, cleaned),
        times,
    }
}

fn collect_unique(re: &Regex, text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for m in re.find_iter(text) {
        push_unique(&mut out, m.as_str());
    }
    out
}

fn push_unique(out: &mut Vec<String>, s: &str) {
    if !out.iter().any(|x| x == s) {
        out.push(s.to_string());
    }
}
