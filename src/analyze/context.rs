// src/analyze/context.rs
//! Location/time context: derived keyword candidates and an additive risk level.
//!
//! Derived candidates only fill categories the text did not already cover;
//! a text-derived match is never overridden here.

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::analyze::weights::Grade;
use crate::analyze::{CandidateKeyword, CandidateSource};
use crate::taxonomy::{Polarity, Taxonomy};

pub const PUBLIC_DATA_CONFIDENCE: f64 = 0.75;
pub const NIGHT_UNLIT_CONFIDENCE: f64 = 0.7;
pub const NIGHT_BOOST: f64 = 0.2;

// Facility thresholds.
const LOW_LIGHT_TOTAL: u32 = 20;
const HIGH_LIGHT_TOTAL: u32 = 100;
const HIGH_OFFENDERS: u32 = 10;
const LOW_OFFENDERS: u32 = 2;
const GUARDIAN_MIN: u32 = 3;
const FEW_CAMERAS: u32 = 5;
const SEVERE_WEIGHT: u8 = 3;

const LIGHTING: &str = "lighting";
const EMOTIONAL: &str = "emotional";
const TERRITORIALITY: &str = "territoriality";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimePeriod {
    Morning,
    Afternoon,
    Evening,
    Night,
    Dawn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl TimePeriod {
    pub fn risk(self) -> RiskTier {
        match self {
            TimePeriod::Morning | TimePeriod::Afternoon => RiskTier::Low,
            TimePeriod::Evening => RiskTier::Medium,
            TimePeriod::Night | TimePeriod::Dawn => RiskTier::High,
        }
    }

    pub fn is_dark(self) -> bool {
        matches!(self, TimePeriod::Night | TimePeriod::Dawn)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimePeriod::Morning => "morning",
            TimePeriod::Afternoon => "afternoon",
            TimePeriod::Evening => "evening",
            TimePeriod::Night => "night",
            TimePeriod::Dawn => "dawn",
        }
    }

    fn from_hour(h: u32) -> Self {
        match h {
            5..=6 => TimePeriod::Dawn,
            7..=11 => TimePeriod::Morning,
            12..=16 => TimePeriod::Afternoon,
            17..=20 => TimePeriod::Evening,
            _ => TimePeriod::Night,
        }
    }
}

/// Checked in this order; the first period with a matching word wins.
const TIME_VOCABULARY: &[(TimePeriod, &[&str])] = &[
    (
        TimePeriod::Dawn,
        &["dawn", "early morning", "before sunrise", "sunrise", "새벽"],
    ),
    (
        TimePeriod::Night,
        &["night", "midnight", "late night", "after dark", "심야", "밤"],
    ),
    (
        TimePeriod::Evening,
        &["evening", "dusk", "sunset", "after work", "저녁"],
    ),
    (TimePeriod::Morning, &["morning", "commute", "아침", "오전"]),
    (
        TimePeriod::Afternoon,
        &["afternoon", "noon", "lunch", "daytime", "오후", "낮", "점심"],
    ),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeContext {
    pub input: String,
    pub period: TimePeriod,
    pub risk: RiskTier,
    /// False when the input matched nothing and fell back to afternoon.
    pub recognized: bool,
}

/// `HH:MM` first, then the fixed vocabulary; anything else is afternoon/low.
pub fn classify_time(input: &str) -> TimeContext {
    let trimmed = input.trim();
    let found = NaiveTime::parse_from_str(trimmed, "%H:%M")
        .ok()
        .map(|t| TimePeriod::from_hour(t.hour()))
        .or_else(|| {
            let lower = trimmed.to_lowercase();
            TIME_VOCABULARY
                .iter()
                .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
                .map(|(p, _)| *p)
        });
    let period = found.unwrap_or(TimePeriod::Afternoon);
    TimeContext {
        input: trimmed.to_string(),
        period,
        risk: period.risk(),
        recognized: found.is_some(),
    }
}

/// Facility/risk snapshot for one named place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSnapshot {
    pub name: String,
    pub grade: Grade,
    pub score: f64,
    pub cctv_count: u32,
    pub streetlight_count: u32,
    pub police_station_count: u32,
    pub safety_house_count: u32,
    pub delivery_box_count: u32,
    pub offender_count: u32,
}

impl LocationSnapshot {
    pub fn light_total(&self) -> u32 {
        self.cctv_count + self.streetlight_count
    }

    pub fn guardian_total(&self) -> u32 {
        self.police_station_count + self.safety_house_count
    }
}

/// Resolves a free-text place name to a snapshot; `None` on no match.
pub trait LocationProvider: Send + Sync {
    fn lookup(&self, name: &str) -> Option<LocationSnapshot>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextAssessment {
    pub location: Option<LocationSnapshot>,
    pub time: Option<TimeContext>,
    pub risk_score: u32,
    pub risk_level: RiskTier,
    pub factors: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ContextBlend {
    /// Text matches, with the night boost applied to a lighting match.
    pub matches: Vec<CandidateKeyword>,
    /// Candidates for categories the text did not cover.
    pub derived: Vec<CandidateKeyword>,
    pub assessment: ContextAssessment,
}

pub struct ContextBlender {
    taxonomy: Arc<Taxonomy>,
    locations: Arc<dyn LocationProvider>,
}

impl ContextBlender {
    pub fn new(taxonomy: Arc<Taxonomy>, locations: Arc<dyn LocationProvider>) -> Self {
        Self {
            taxonomy,
            locations,
        }
    }

    pub fn blend(
        &self,
        text_matches: &[CandidateKeyword],
        location: Option<&str>,
        time: Option<&str>,
    ) -> ContextBlend {
        let snapshot = location
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .and_then(|l| {
                let found = self.locations.lookup(l);
                if found.is_none() {
                    debug!("location not found, ignoring");
                }
                found
            });
        let time_ctx = time
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(classify_time);

        let mut matches = text_matches.to_vec();
        let mut derived = Vec::new();
        let covered = |cat: &str, derived: &[CandidateKeyword]| {
            text_matches.iter().any(|c| c.category == cat)
                || derived.iter().any(|c| c.category == cat)
        };

        if let Some(s) = &snapshot {
            let lights = s.light_total();
            if lights < LOW_LIGHT_TOTAL && !covered(LIGHTING, &derived) {
                self.push_derived(
                    &mut derived,
                    LIGHTING,
                    "unlit",
                    PUBLIC_DATA_CONFIDENCE,
                    CandidateSource::PublicData,
                    format!("{} has only {lights} cameras and streetlights", s.name),
                );
            } else if lights >= HIGH_LIGHT_TOTAL && !covered(LIGHTING, &derived) {
                self.push_derived(
                    &mut derived,
                    LIGHTING,
                    "well-lit",
                    PUBLIC_DATA_CONFIDENCE,
                    CandidateSource::PublicData,
                    format!("{} has {lights} cameras and streetlights", s.name),
                );
            }

            if s.offender_count >= HIGH_OFFENDERS && !covered(EMOTIONAL, &derived) {
                self.push_derived(
                    &mut derived,
                    EMOTIONAL,
                    "unsafe",
                    PUBLIC_DATA_CONFIDENCE,
                    CandidateSource::PublicData,
                    format!("{} registered offenders near {}", s.offender_count, s.name),
                );
            } else if s.offender_count <= LOW_OFFENDERS && !covered(EMOTIONAL, &derived) {
                self.push_derived(
                    &mut derived,
                    EMOTIONAL,
                    "reassuring",
                    PUBLIC_DATA_CONFIDENCE,
                    CandidateSource::PublicData,
                    format!("few registered offenders near {}", s.name),
                );
            }

            if s.guardian_total() >= GUARDIAN_MIN && !covered(TERRITORIALITY, &derived) {
                self.push_derived(
                    &mut derived,
                    TERRITORIALITY,
                    "well-kept",
                    PUBLIC_DATA_CONFIDENCE,
                    CandidateSource::PublicData,
                    format!(
                        "{} police posts and safe houses near {}",
                        s.guardian_total(),
                        s.name
                    ),
                );
            }
        }

        if let Some(t) = time_ctx.as_ref().filter(|t| t.period.is_dark()) {
            if let Some(lit) = matches.iter_mut().find(|c| c.category == LIGHTING) {
                lit.confidence = (lit.confidence + NIGHT_BOOST).min(1.0);
                lit.rationale = format!("{} (weighted up at {})", lit.rationale, t.period.as_str());
            } else if !covered(LIGHTING, &derived) {
                let poorly_lit = snapshot
                    .as_ref()
                    .map_or(true, |s| s.light_total() < LOW_LIGHT_TOTAL);
                if poorly_lit {
                    self.push_derived(
                        &mut derived,
                        LIGHTING,
                        "unlit",
                        NIGHT_UNLIT_CONFIDENCE,
                        CandidateSource::Context,
                        format!("visited at {} without lighting data", t.period.as_str()),
                    );
                }
            }
        }

        let assessment = assess(snapshot, time_ctx, text_matches);
        ContextBlend {
            matches,
            derived,
            assessment,
        }
    }

    fn push_derived(
        &self,
        out: &mut Vec<CandidateKeyword>,
        category: &str,
        keyword: &str,
        confidence: f64,
        source: CandidateSource,
        rationale: String,
    ) {
        let Some(def) = self.taxonomy.keyword(category, keyword) else {
            warn!(category, keyword, "context keyword missing from taxonomy");
            return;
        };
        out.push(CandidateKeyword {
            category: category.to_string(),
            keyword: keyword.to_string(),
            confidence,
            evidence: String::new(),
            rationale,
            source,
            weight: def.weight,
            polarity: def.polarity,
        });
    }
}

fn assess(
    location: Option<LocationSnapshot>,
    time: Option<TimeContext>,
    text_matches: &[CandidateKeyword],
) -> ContextAssessment {
    let mut score = 0u32;
    let mut factors = Vec::new();
    let mut recommendations = Vec::new();

    if let Some(s) = &location {
        if s.grade.is_low() {
            score += 3;
            factors.push(format!("{} is graded {}", s.name, s.grade));
        }
        if s.offender_count >= HIGH_OFFENDERS {
            score += 2;
            factors.push(format!("{} registered offenders nearby", s.offender_count));
        }
        if s.cctv_count < FEW_CAMERAS {
            score += 1;
            factors.push(format!("only {} security cameras", s.cctv_count));
            recommendations.push("Stay on main streets covered by cameras".to_string());
        }
    }

    if let Some(t) = &time {
        match t.risk {
            RiskTier::High => {
                score += 2;
                factors.push(format!("{} is a high-risk time", t.period.as_str()));
                recommendations.push("Avoid walking alone; share your route".to_string());
            }
            RiskTier::Medium => {
                score += 1;
                factors.push(format!("{} is a moderate-risk time", t.period.as_str()));
            }
            RiskTier::Low => {}
        }
    }

    for c in text_matches {
        if c.polarity == Polarity::Unfavorable && c.weight >= SEVERE_WEIGHT {
            score += 1;
            factors.push(format!("review mentions {}", c.keyword));
        }
    }

    let level = match score {
        0..=2 => RiskTier::Low,
        3..=4 => RiskTier::Medium,
        _ => RiskTier::High,
    };
    recommendations.push(
        match level {
            RiskTier::Low => "Generally safe; keep usual precautions",
            RiskTier::Medium => "Take care; prefer well-lit, busy routes",
            RiskTier::High => "High risk; consider another route or travel with company",
        }
        .to_string(),
    );

    ContextAssessment {
        location,
        time,
        risk_score: score,
        risk_level: level,
        factors,
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Fixed(HashMap<String, LocationSnapshot>);

    impl LocationProvider for Fixed {
        fn lookup(&self, name: &str) -> Option<LocationSnapshot> {
            self.0.get(name).cloned()
        }
    }

    fn snap(name: &str, grade: Grade, cctv: u32, lights: u32, offenders: u32) -> LocationSnapshot {
        LocationSnapshot {
            name: name.into(),
            grade,
            score: 0.0,
            cctv_count: cctv,
            streetlight_count: lights,
            police_station_count: 0,
            safety_house_count: 0,
            delivery_box_count: 0,
            offender_count: offenders,
        }
    }

    fn blender(snaps: Vec<LocationSnapshot>) -> ContextBlender {
        let map = snaps.into_iter().map(|s| (s.name.clone(), s)).collect();
        ContextBlender::new(
            Arc::new(Taxonomy::builtin().unwrap()),
            Arc::new(Fixed(map)),
        )
    }

    fn text_match(category: &str, keyword: &str, confidence: f64, polarity: Polarity, weight: u8) -> CandidateKeyword {
        CandidateKeyword {
            category: category.into(),
            keyword: keyword.into(),
            confidence,
            evidence: String::new(),
            rationale: "matched".into(),
            source: CandidateSource::Text,
            weight,
            polarity,
        }
    }

    #[test]
    fn clock_times_by_hour() {
        assert_eq!(classify_time("23:30").period, TimePeriod::Night);
        assert_eq!(classify_time("04:59").period, TimePeriod::Night);
        assert_eq!(classify_time("05:00").period, TimePeriod::Dawn);
        assert_eq!(classify_time("07:00").period, TimePeriod::Morning);
        assert_eq!(classify_time("12:00").period, TimePeriod::Afternoon);
        assert_eq!(classify_time("20:59").period, TimePeriod::Evening);
        assert_eq!(classify_time("21:00").risk, RiskTier::High);
    }

    #[test]
    fn vocabulary_order_and_default() {
        assert_eq!(classify_time("early morning jog").period, TimePeriod::Dawn);
        assert_eq!(classify_time("late night").period, TimePeriod::Night);
        assert_eq!(classify_time("퇴근 후 저녁").period, TimePeriod::Evening);
        assert_eq!(classify_time("Morning").period, TimePeriod::Morning);
        let t = classify_time("whenever");
        assert_eq!(t.period, TimePeriod::Afternoon);
        assert_eq!(t.risk, RiskTier::Low);
        assert!(!t.recognized);
    }

    #[test]
    fn derived_only_for_uncovered_categories() {
        let b = blender(vec![snap("Yeoksam", Grade::E, 2, 3, 12)]);
        let text = vec![text_match("lighting", "well-lit", 1.0, Polarity::Favorable, 3)];
        let out = b.blend(&text, Some("Yeoksam"), None);
        assert!(out.derived.iter().all(|c| c.category != "lighting"));
        let emo = out.derived.iter().find(|c| c.category == "emotional").unwrap();
        assert_eq!(emo.keyword, "unsafe");
        assert_eq!(emo.source, CandidateSource::PublicData);
        assert_eq!(emo.confidence, PUBLIC_DATA_CONFIDENCE);
        assert_eq!(emo.weight, 5);
    }

    #[test]
    fn night_boosts_existing_lighting_match() {
        let b = blender(vec![]);
        let text = vec![text_match("lighting", "unlit", 0.9, Polarity::Unfavorable, 4)];
        let out = b.blend(&text, None, Some("midnight"));
        assert_eq!(out.matches[0].confidence, 1.0);
        assert!(out.derived.is_empty());
    }

    #[test]
    fn night_without_location_adds_unlit() {
        let b = blender(vec![]);
        let out = b.blend(&[], None, Some("02:00"));
        assert_eq!(out.derived.len(), 1);
        assert_eq!(out.derived[0].keyword, "unlit");
        assert_eq!(out.derived[0].source, CandidateSource::Context);
        assert_eq!(out.derived[0].confidence, NIGHT_UNLIT_CONFIDENCE);
    }

    #[test]
    fn night_with_bright_location_keeps_well_lit() {
        let b = blender(vec![snap("Gangnam", Grade::A, 80, 200, 1)]);
        let out = b.blend(&[], Some("Gangnam"), Some("night"));
        let lit: Vec<_> = out.derived.iter().filter(|c| c.category == "lighting").collect();
        assert_eq!(lit.len(), 1);
        assert_eq!(lit[0].keyword, "well-lit");
    }

    #[test]
    fn risk_score_accumulates() {
        let b = blender(vec![snap("Alley", Grade::D, 1, 5, 11)]);
        let text = vec![
            text_match("activity", "deserted", 1.0, Polarity::Unfavorable, 3),
            text_match("maintenance", "littered", 1.0, Polarity::Unfavorable, 2),
        ];
        let out = b.blend(&text, Some("Alley"), Some("night"));
        // grade 3 + offenders 2 + cameras 1 + night 2 + deserted 1
        assert_eq!(out.assessment.risk_score, 9);
        assert_eq!(out.assessment.risk_level, RiskTier::High);
        assert!(!out.assessment.recommendations.is_empty());
    }

    #[test]
    fn risk_level_bucket_boundaries() {
        // cctv 3 → +1, grade D → +3, evening → +1, night → +2
        let b = blender(vec![
            snap("Mangwon", Grade::A, 3, 50, 1),
            snap("Sillim", Grade::D, 3, 50, 1),
            snap("Hoegi", Grade::D, 10, 50, 1),
        ]);
        let cases = [
            ("Mangwon", Some("evening"), 2, RiskTier::Low),
            ("Mangwon", Some("23:00"), 3, RiskTier::Medium),
            ("Sillim", None, 4, RiskTier::Medium),
            ("Hoegi", Some("night"), 5, RiskTier::High),
        ];
        for (place, time, score, level) in cases {
            let a = b.blend(&[], Some(place), time).assessment;
            assert_eq!(a.risk_score, score, "{place} {time:?}");
            assert_eq!(a.risk_level, level, "{place} {time:?}");
        }
    }

    #[test]
    fn few_offenders_without_emotional_text_yields_reassuring() {
        let b = blender(vec![snap("Mangwon", Grade::A, 3, 50, 2)]);
        let out = b.blend(&[], Some("Mangwon"), Some("evening"));
        assert_eq!(out.derived.len(), 1);
        let emo = &out.derived[0];
        assert_eq!(emo.category, "emotional");
        assert_eq!(emo.keyword, "reassuring");
        assert_eq!(emo.source, CandidateSource::PublicData);
        assert_eq!(emo.confidence, PUBLIC_DATA_CONFIDENCE);
        assert_eq!(emo.polarity, Polarity::Favorable);

        let text = vec![text_match("emotional", "unsafe", 1.0, Polarity::Unfavorable, 5)];
        let out = b.blend(&text, Some("Mangwon"), None);
        assert!(out.derived.iter().all(|c| c.category != "emotional"));
    }

    #[test]
    fn unknown_location_degrades_to_no_context() {
        let b = blender(vec![]);
        let out = b.blend(&[], Some("Nowhere"), None);
        assert!(out.derived.is_empty());
        assert!(out.assessment.location.is_none());
        assert_eq!(out.assessment.risk_score, 0);
        assert_eq!(out.assessment.risk_level, RiskTier::Low);
    }
}
