// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analyze;
pub mod api;
pub mod config;
pub mod error;
pub mod facility;
pub mod metrics;
pub mod preprocess;
pub mod taxonomy;

// ---- Re-exports for stable public API ----
pub use analyze::ai_adapter;
pub use analyze::{Analyzer, CandidateKeyword, CandidateSource, ReviewAnalysis, ReviewInput};
pub use crate::api::{router, AppState};
pub use error::{SuggestError, ValidationError};
pub use taxonomy::{KeywordRef, Taxonomy};

/// Short anonymous id for a review: first 6 bytes of SHA-256, hex.
/// Raw review text never goes to the logs; this does.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
