// src/analyze/matcher.rs
//! Rule-based keyword matcher over normalized review text.
//!
//! Confidence tiers per keyword (canonical form + synonyms):
//! - 1.0  a variant occurs contiguously in the text
//! - 0.8  every word of a variant is a substring of some token
//! - 0.7  a favorable variant sits right next to a negation word
//!
//! The negation tier wins over the other two and keeps the keyword as
//! declared (a negated "bright" still yields `well-lit`, not `unlit`).
//! Whether it should instead flip to the unfavorable counterpart is an open
//! product question; `negated_favorable_keeps_keyword_and_polarity` pins it.

use crate::analyze::merge::best_per_category;
use crate::analyze::{CandidateKeyword, CandidateSource};
use crate::preprocess::{is_stop_word, normalize};
use crate::taxonomy::{Polarity, Taxonomy};

pub const EXACT_CONFIDENCE: f64 = 1.0;
pub const PARTIAL_CONFIDENCE: f64 = 0.8;
pub const NEGATED_CONFIDENCE: f64 = 0.7;
pub const MIN_CONFIDENCE: f64 = 0.7;

/// Characters of context kept on each side of a match.
const EVIDENCE_RADIUS: usize = 10;

pub const NEGATIONS: &[&str] = &[
    "not", "no", "never", "lacking", "lacks", "lack", "without", "hardly", "barely", "isnt",
    "wasnt", "arent", "dont", "doesnt", "않은", "않아요", "않다", "없는", "없어요", "없다",
];

#[derive(Debug, Clone)]
struct CompiledKeyword {
    keyword: String,
    polarity: Polarity,
    weight: u8,
    variants: Vec<String>,
}

#[derive(Debug, Clone)]
struct CompiledCategory {
    name: String,
    keywords: Vec<CompiledKeyword>,
}

struct Hit {
    confidence: f64,
    evidence: String,
    rationale: String,
}

/// Holds normalized variants for every taxonomy keyword, built once.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    categories: Vec<CompiledCategory>,
}

impl KeywordMatcher {
    pub fn new(taxonomy: &Taxonomy) -> Self {
        let categories = taxonomy
            .categories()
            .iter()
            .map(|c| CompiledCategory {
                name: c.name.clone(),
                keywords: c
                    .keywords
                    .iter()
                    .map(|k| CompiledKeyword {
                        keyword: k.keyword.clone(),
                        polarity: k.polarity,
                        weight: k.weight,
                        variants: k
                            .variants()
                            .map(normalize)
                            .filter(|v| !v.is_empty())
                            .collect(),
                    })
                    .collect(),
            })
            .collect();
        Self { categories }
    }

    /// One best match per category, sorted by descending confidence
    /// (taxonomy order on ties).
    pub fn match_text(&self, normalized: &str, tokens: &[String]) -> Vec<CandidateKeyword> {
        let mut hits = Vec::new();
        for cat in &self.categories {
            for kw in &cat.keywords {
                let Some(hit) = score_keyword(kw, normalized, tokens) else {
                    continue;
                };
                if hit.confidence < MIN_CONFIDENCE {
                    continue;
                }
                hits.push(CandidateKeyword {
                    category: cat.name.clone(),
                    keyword: kw.keyword.clone(),
                    confidence: hit.confidence,
                    evidence: hit.evidence,
                    rationale: hit.rationale,
                    source: CandidateSource::Text,
                    weight: kw.weight,
                    polarity: kw.polarity,
                });
            }
        }
        best_per_category(hits)
    }
}

fn score_keyword(kw: &CompiledKeyword, text: &str, tokens: &[String]) -> Option<Hit> {
    if kw.polarity == Polarity::Favorable {
        for v in &kw.variants {
            for (start, m) in text.match_indices(v.as_str()) {
                let end = start + m.len();
                if negated_at(text, start, end) {
                    return Some(Hit {
                        confidence: NEGATED_CONFIDENCE,
                        evidence: excerpt(text, start, end),
                        rationale: format!("\"{v}\" appears next to a negation"),
                    });
                }
            }
        }
    }

    for v in &kw.variants {
        if let Some(start) = text.find(v.as_str()) {
            return Some(Hit {
                confidence: EXACT_CONFIDENCE,
                evidence: excerpt(text, start, start + v.len()),
                rationale: format!("\"{v}\" appears in the review"),
            });
        }
    }

    for v in &kw.variants {
        // Tokens carry no stop words, so those parts must appear as whole
        // words in the text instead.
        let all_present = v.split_whitespace().all(|p| {
            if is_stop_word(p) {
                text.split_whitespace().any(|w| w == p)
            } else {
                tokens.iter().any(|t| t.contains(p))
            }
        });
        if !all_present {
            continue;
        }
        let evidence = v
            .split_whitespace()
            .find(|p| !is_stop_word(p))
            .and_then(|first| text.find(first).map(|s| excerpt(text, s, s + first.len())))
            .unwrap_or_default();
        return Some(Hit {
            confidence: PARTIAL_CONFIDENCE,
            evidence,
            rationale: format!("all words of \"{v}\" appear in the review"),
        });
    }

    None
}

/// True if the word right before `start` or right after `end` is a negation.
fn negated_at(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].split_whitespace().next_back();
    let after = text[end..].split_whitespace().next();
    [before, after]
        .into_iter()
        .flatten()
        .any(|w| NEGATIONS.contains(&w))
}

/// `EVIDENCE_RADIUS` characters around `[start, end)`, on char boundaries.
fn excerpt(text: &str, start: usize, end: usize) -> String {
    let before: Vec<char> = text[..start].chars().rev().take(EVIDENCE_RADIUS).collect();
    let before: String = before.into_iter().rev().collect();
    let after: String = text[end..].chars().take(EVIDENCE_RADIUS).collect();
    format!("{before}{}{after}", &text[start..end])
        .trim()
        .to_string()
}
