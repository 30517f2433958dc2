//! Severity classification for raw incident reports.
//!
//! Classification never fails: unrecognisable input degrades to the LOW default.
//! Layers, in priority order:
//! 1. an explicit positive numeric score is trusted verbatim;
//! 2. keyword matching over the case-folded scalar values picks a base score;
//! 3. structured signals (severity category field, GPS fix) add fixed bonuses,
//!    capped at the HIGH base so heuristics never outrank the strongest keyword.

pub mod payload;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::SeverityLabel;

pub const HIGH_BASE_SCORE: i64 = 60;
pub const MEDIUM_BASE_SCORE: i64 = 40;
pub const DEFAULT_SCORE: i64 = 10;

pub const GPS_BONUS: i64 = 5;

const HIGH_KEYWORDS: &[&str] = &[
    "grave",
    "critic",
    "crític",
    "severe",
    "fatal",
    "muerte",
    "fallecid",
    "inconsciente",
    "amputa",
    "fractura",
    "hemorragia",
    "incendio",
    "explosi",
    "electrocu",
    "atrapad",
];

const MEDIUM_KEYWORDS: &[&str] = &[
    "medio",
    "moderad",
    "moderate",
    "medium",
    "quemadura",
    "contusi",
    "esguince",
    "derrame",
    "fuga",
];

/// Bonus table for the explicit severity category field
const CATEGORY_BONUSES: &[(&[&str], i64)] = &[
    (&["grave", "critico", "crítico", "critical", "high", "alta", "alto", "severe"], 10),
    (&["medio", "media", "moderado", "moderate", "medium"], 5),
    (&["leve", "low", "baja", "bajo", "minor"], 0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationBasis {
    ExplicitScore,
    HighKeyword,
    MediumKeyword,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub score: i64,
    pub label: SeverityLabel,
    pub basis: ClassificationBasis,
}

impl Classification {
    fn new(score: i64, basis: ClassificationBasis) -> Self {
        Self {
            score,
            label: SeverityLabel::from_score(score),
            basis,
        }
    }
}

/// Classify a raw report payload
pub fn classify(raw: &Value) -> Classification {
    let empty = Map::new();
    let fields = raw.as_object().unwrap_or(&empty);

    if let Some(score) = explicit_score(fields) {
        return Classification::new(score, ClassificationBasis::ExplicitScore);
    }

    let blob = payload::search_blob(raw);
    let (base, basis) = keyword_base(&blob);

    let mut bonus = category_bonus(fields).unwrap_or(0);
    if payload::location(fields).is_some() {
        bonus += GPS_BONUS;
    }

    Classification::new((base + bonus).min(HIGH_BASE_SCORE), basis)
}

fn explicit_score(fields: &Map<String, Value>) -> Option<i64> {
    let score = payload::first_number(fields, payload::SCORE_FIELDS)?;
    (score > 0.0).then(|| (score.round() as i64).max(0))
}

fn keyword_base(blob: &str) -> (i64, ClassificationBasis) {
    if HIGH_KEYWORDS.iter().any(|k| blob.contains(k)) {
        (HIGH_BASE_SCORE, ClassificationBasis::HighKeyword)
    } else if MEDIUM_KEYWORDS.iter().any(|k| blob.contains(k)) {
        (MEDIUM_BASE_SCORE, ClassificationBasis::MediumKeyword)
    } else {
        (DEFAULT_SCORE, ClassificationBasis::Default)
    }
}

/// Bonus for a recognised category value; `None` when the field is absent or unknown
fn category_bonus(fields: &Map<String, Value>) -> Option<i64> {
    let category = payload::first_text(fields, payload::CATEGORY_FIELDS)?.to_lowercase();
    CATEGORY_BONUSES
        .iter()
        .find(|(values, _)| values.contains(&category.as_str()))
        .map(|(_, bonus)| *bonus)
}
