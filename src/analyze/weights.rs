// src/analyze/weights.rs
//! Fixed CPTED principle weights and grade thresholds.
//!
//! The weights sum to 1.0, so an untouched baseline of `rating × 20` on every
//! principle aggregates back to exactly that value.

use crate::taxonomy::Principle;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const PRINCIPLE_WEIGHTS: [(Principle, f64); 5] = [
    (Principle::NaturalSurveillance, 0.35),
    (Principle::AccessControl, 0.25),
    (Principle::Territoriality, 0.20),
    (Principle::Maintenance, 0.10),
    (Principle::ActivitySupport, 0.10),
];

pub fn weight_of(p: Principle) -> f64 {
    PRINCIPLE_WEIGHTS
        .iter()
        .find(|(q, _)| *q == p)
        .map(|(_, w)| *w)
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    E,
}

/// Descending, non-overlapping lower bounds; anything below the last is `E`.
pub const GRADE_THRESHOLDS: [(Grade, f64); 4] = [
    (Grade::A, 60.0),
    (Grade::B, 50.0),
    (Grade::C, 40.0),
    (Grade::D, 30.0),
];

impl Grade {
    pub fn from_score(total: f64) -> Self {
        GRADE_THRESHOLDS
            .iter()
            .find(|(_, min)| total >= *min)
            .map(|(g, _)| *g)
            .unwrap_or(Grade::E)
    }

    /// D and E count as a poor area grade for risk purposes.
    pub fn is_low(self) -> bool {
        matches!(self, Grade::D | Grade::E)
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::E => "E",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GradeThreshold {
    pub grade: Grade,
    pub min_score: f64,
}

/// Read-only view for auditing how totals and grades are computed.
#[derive(Debug, Clone, Serialize)]
pub struct WeightTable {
    pub weights: BTreeMap<Principle, f64>,
    pub grade_thresholds: Vec<GradeThreshold>,
    pub baseline_per_rating_point: f64,
}

pub fn weight_table() -> WeightTable {
    WeightTable {
        weights: PRINCIPLE_WEIGHTS.iter().copied().collect(),
        grade_thresholds: GRADE_THRESHOLDS
            .iter()
            .map(|(g, m)| GradeThreshold {
                grade: *g,
                min_score: *m,
            })
            .collect(),
        baseline_per_rating_point: crate::analyze::scoring::BASELINE_PER_POINT,
    }
}
