// src/facility.rs
//! Public-facility records and the in-memory location provider.
//!
//! Each record carries raw counts for one area. Unless the record ships its
//! own score/grade, both are derived with the CPTED facility formula below.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::{env, fs};
use tracing::{info, warn};

use crate::analyze::context::{LocationProvider, LocationSnapshot};
use crate::analyze::weights::{weight_of, Grade};
use crate::taxonomy::Principle;

pub const ENV_LOCATIONS_PATH: &str = "LOCATIONS_PATH";
pub const DEFAULT_LOCATIONS_PATH: &str = "config/locations.json";

fn default_area() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityRecord {
    pub name: String,
    #[serde(default)]
    pub cctv: u32,
    #[serde(default)]
    pub streetlight: u32,
    #[serde(default)]
    pub police_station: u32,
    #[serde(default)]
    pub safety_house: u32,
    #[serde(default)]
    pub delivery_box: u32,
    #[serde(default)]
    pub offenders: u32,
    /// km²
    #[serde(default = "default_area")]
    pub area_km2: f64,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub grade: Option<Grade>,
}

impl FacilityRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cctv: 0,
            streetlight: 0,
            police_station: 0,
            safety_house: 0,
            delivery_box: 0,
            offenders: 0,
            area_km2: default_area(),
            score: None,
            grade: None,
        }
    }

    fn area(&self) -> f64 {
        if self.area_km2.is_finite() && self.area_km2 > 0.0 {
            self.area_km2
        } else {
            default_area()
        }
    }

    pub fn principle_score(&self, p: Principle) -> f64 {
        let area = self.area();
        let per = |n: u32| f64::from(n) / area;
        match p {
            Principle::NaturalSurveillance => {
                (per(self.cctv) * 10.0).min(100.0) * 0.5
                    + per(self.streetlight).min(100.0) * 0.3
                    + 20.0 * 0.2
            }
            Principle::AccessControl => {
                let density = per(self.offenders);
                if density == 0.0 {
                    100.0
                } else {
                    (100.0 * (-density / 10.0).exp()).max(0.0)
                }
            }
            Principle::Territoriality => {
                (per(self.police_station) * 100.0).min(100.0) * 0.4
                    + (per(self.safety_house) * 20.0).min(100.0) * 0.3
                    + 30.0 * 0.3
            }
            Principle::Maintenance => {
                let bonus = (f64::from(self.cctv + self.streetlight) * 0.1).min(20.0);
                (50.0 + bonus).min(100.0)
            }
            Principle::ActivitySupport => {
                let delivery = (per(self.delivery_box) * 10.0).min(100.0);
                let area_bonus = (20.0 - area * 5.0).max(0.0);
                (delivery * 0.3 + (50.0 + area_bonus) * 0.7).min(100.0)
            }
        }
    }

    /// Weighted principles plus facility-density bonus minus offender penalty,
    /// clamped to [0, 100] and rounded to two decimals.
    pub fn computed_score(&self) -> f64 {
        let weighted: f64 = Principle::ALL
            .iter()
            .map(|p| self.principle_score(*p) * weight_of(*p))
            .sum();
        let facilities = self.cctv
            + self.streetlight
            + self.police_station
            + self.safety_house
            + self.delivery_box;
        let bonus = (f64::from(facilities) / self.area() * 2.0).min(15.0);
        let penalty = (f64::from(self.offenders) * 2.0).min(10.0);
        let total = (weighted + bonus - penalty).clamp(0.0, 100.0);
        (total * 100.0).round() / 100.0
    }

    pub fn snapshot(&self) -> LocationSnapshot {
        let score = self.score.unwrap_or_else(|| self.computed_score());
        let grade = self.grade.unwrap_or_else(|| Grade::from_score(score));
        LocationSnapshot {
            name: self.name.clone(),
            grade,
            score,
            cctv_count: self.cctv,
            streetlight_count: self.streetlight,
            police_station_count: self.police_station,
            safety_house_count: self.safety_house,
            delivery_box_count: self.delivery_box,
            offender_count: self.offenders,
        }
    }
}

/// Records in file order; the first substring match wins.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLocationProvider {
    records: Vec<FacilityRecord>,
}

impl InMemoryLocationProvider {
    pub fn new(records: Vec<FacilityRecord>) -> Self {
        Self { records }
    }

    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let records: Vec<FacilityRecord> = serde_json::from_str(json)?;
        Ok(Self::new(records))
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading locations from {}", path.display()))?;
        Self::from_json_str(&data).with_context(|| format!("parsing {}", path.display()))
    }

    /// `LOCATIONS_PATH` or `config/locations.json`; missing file → empty provider.
    pub fn load_default() -> anyhow::Result<Self> {
        let path = env::var(ENV_LOCATIONS_PATH).unwrap_or_else(|_| DEFAULT_LOCATIONS_PATH.into());
        let path = Path::new(&path);
        if !path.exists() {
            warn!(path = %path.display(), "locations file missing; location context disabled");
            return Ok(Self::default());
        }
        let provider = Self::from_path(path)?;
        info!(records = provider.len(), "locations loaded");
        Ok(provider)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl LocationProvider for InMemoryLocationProvider {
    fn lookup(&self, name: &str) -> Option<LocationSnapshot> {
        if name.is_empty() {
            return None;
        }
        self.records
            .iter()
            .filter(|r| !r.name.is_empty())
            .find(|r| r.name.contains(name) || name.contains(r.name.as_str()))
            .map(FacilityRecord::snapshot)
    }
}
