// src/error.rs
//! Error types for request validation and the external suggester.

/// Rejected-input errors. Returned to the caller as-is, never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("review text is missing")]
    MissingText,

    #[error("review text must be a string")]
    NotText,

    #[error("review text is empty")]
    EmptyText,

    #[error("review text is too short ({len} characters, minimum 5)")]
    TooShort { len: usize },

    #[error("review text is too long ({len} characters, maximum 1000)")]
    TooLong { len: usize },

    #[error("review text has no usable words")]
    NoTokens,

    #[error("explicit keyword selection is empty")]
    EmptyKeywordSelection,

    #[error("rating {0} is outside 1..=5")]
    RatingOutOfRange(i64),
}

impl ValidationError {
    /// Stable machine-readable code for API bodies and metrics labels.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::MissingText => "missing_text",
            ValidationError::NotText => "not_text",
            ValidationError::EmptyText => "empty_text",
            ValidationError::TooShort { .. } => "too_short",
            ValidationError::TooLong { .. } => "too_long",
            ValidationError::NoTokens => "no_tokens",
            ValidationError::EmptyKeywordSelection => "empty_keywords",
            ValidationError::RatingOutOfRange(_) => "rating_out_of_range",
        }
    }
}

/// Failures of the optional keyword suggester. Always recovered locally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SuggestError {
    #[error("suggester disabled")]
    Disabled,

    #[error("suggester timed out")]
    Timeout,

    #[error("suggester daily limit reached")]
    Limited,

    #[error("suggester request failed: {0}")]
    Http(String),

    #[error("suggester returned malformed output: {0}")]
    Malformed(String),
}

impl SuggestError {
    pub fn reason(&self) -> &'static str {
        match self {
            SuggestError::Disabled => "disabled",
            SuggestError::Timeout => "timeout",
            SuggestError::Limited => "limited",
            SuggestError::Http(_) => "http",
            SuggestError::Malformed(_) => "malformed",
        }
    }
}
