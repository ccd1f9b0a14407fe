// src/analyze/scoring.rs
//! Rating baseline + keyword deltas → five principle scores → weighted total.
//!
//! Every principle starts at `rating × 20` (rating defaults to 3). Each
//! selected keyword occurrence applies its delta; principles are clamped to
//! [0, 100] before aggregation, and the total is rounded to two decimals.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

use crate::analyze::weights::{weight_of, Grade};
use crate::error::ValidationError;
use crate::taxonomy::{KeywordRef, Lookup, Principle, Taxonomy};

pub const DEFAULT_RATING: u8 = 3;
pub const BASELINE_PER_POINT: f64 = 20.0;
pub const MIN_RATING: i64 = 1;
pub const MAX_RATING: i64 = 5;

/// Absent rating is fine; anything outside 1..=5 is rejected.
pub fn validate_rating(rating: Option<i64>) -> Result<Option<u8>, ValidationError> {
    match rating {
        None => Ok(None),
        Some(r) if (MIN_RATING..=MAX_RATING).contains(&r) => Ok(Some(r as u8)),
        Some(r) => Err(ValidationError::RatingOutOfRange(r)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PrincipleScores {
    pub natural_surveillance: f64,
    pub access_control: f64,
    pub territoriality: f64,
    pub maintenance: f64,
    pub activity_support: f64,
}

impl PrincipleScores {
    pub fn baseline(rating: u8) -> Self {
        let b = f64::from(rating) * BASELINE_PER_POINT;
        Self {
            natural_surveillance: b,
            access_control: b,
            territoriality: b,
            maintenance: b,
            activity_support: b,
        }
    }

    pub fn get(&self, p: Principle) -> f64 {
        match p {
            Principle::NaturalSurveillance => self.natural_surveillance,
            Principle::AccessControl => self.access_control,
            Principle::Territoriality => self.territoriality,
            Principle::Maintenance => self.maintenance,
            Principle::ActivitySupport => self.activity_support,
        }
    }

    pub fn get_mut(&mut self, p: Principle) -> &mut f64 {
        match p {
            Principle::NaturalSurveillance => &mut self.natural_surveillance,
            Principle::AccessControl => &mut self.access_control,
            Principle::Territoriality => &mut self.territoriality,
            Principle::Maintenance => &mut self.maintenance,
            Principle::ActivitySupport => &mut self.activity_support,
        }
    }

    pub fn clamp(&mut self) {
        for p in Principle::ALL {
            let v = self.get_mut(p);
            *v = v.clamp(0.0, 100.0);
        }
    }

    pub fn weighted_total(&self) -> f64 {
        Principle::ALL
            .iter()
            .map(|p| self.get(*p) * weight_of(*p))
            .sum()
    }
}

/// Per-category explanation of what moved the score.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryBreakdown {
    /// Distinct keywords in first-seen order.
    pub keywords: Vec<String>,
    pub counts: BTreeMap<String, u32>,
    /// Net delta applied by this category (sum over occurrences and principles).
    pub delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreResult {
    pub total: f64,
    pub grade: Grade,
    pub principles: PrincipleScores,
    pub breakdown: BTreeMap<String, CategoryBreakdown>,
    /// Rating as given (absent when defaulted).
    pub rating: Option<u8>,
    pub effective_rating: u8,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Unknown references are skipped with a warning and never fail the call.
pub fn compute_score(
    taxonomy: &Taxonomy,
    rating: Option<u8>,
    selected: &[KeywordRef],
) -> ScoreResult {
    let effective_rating = rating.unwrap_or(DEFAULT_RATING);
    let mut principles = PrincipleScores::baseline(effective_rating);
    let mut breakdown: BTreeMap<String, CategoryBreakdown> = BTreeMap::new();
    let mut warnings = Vec::new();

    for r in selected {
        let kw = match taxonomy.lookup(r) {
            Lookup::Found(_, kw) => kw,
            Lookup::UnknownCategory => {
                warn!(category = %r.category, "unknown category skipped");
                warnings.push(format!("unknown category `{}`", r.category));
                continue;
            }
            Lookup::UnknownKeyword(_) => {
                warn!(category = %r.category, keyword = %r.keyword, "unknown keyword skipped");
                warnings.push(format!("unknown keyword `{}/{}`", r.category, r.keyword));
                continue;
            }
        };

        for (p, amount) in kw.delta.components() {
            *principles.get_mut(p) += amount;
        }

        let entry = breakdown.entry(r.category.clone()).or_default();
        let count = entry.counts.entry(r.keyword.clone()).or_insert(0);
        if *count == 0 {
            entry.keywords.push(r.keyword.clone());
        }
        *count += 1;
        entry.delta += kw.delta.net();
    }

    principles.clamp();
    let total = round2(principles.weighted_total());

    ScoreResult {
        total,
        grade: Grade::from_score(total),
        principles,
        breakdown,
        rating,
        effective_rating,
        warnings,
    }
}
