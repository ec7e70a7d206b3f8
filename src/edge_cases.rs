//
// edge_cases.rs
// dicom-forge
//
// Optional mutations that give a share of patients awkward but legal metadata: accented names,
// maximum-length values, odd identifier formats, very old or partial dates and missing tags.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Local};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::{ForgeError, Result};
use crate::identity::dicom_date;
use crate::modality::pick;

/// Maximum length of LO and PN component groups.
pub const MAX_LO_LENGTH: usize = 64;

/// Tags that may be dropped from a patient's images.
pub const OPTIONAL_TAGS: [&str; 8] = [
    "BodyPartExamined",
    "StudyDescription",
    "SeriesDescription",
    "InstitutionName",
    "ReferringPhysicianName",
    "PerformingPhysicianName",
    "OperatorsName",
    "ProtocolName",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EdgeCaseKind {
    SpecialChars,
    LongNames,
    MissingTags,
    OldDates,
    VariedIds,
}

impl EdgeCaseKind {
    pub const ALL: [EdgeCaseKind; 5] = [
        EdgeCaseKind::SpecialChars,
        EdgeCaseKind::LongNames,
        EdgeCaseKind::MissingTags,
        EdgeCaseKind::OldDates,
        EdgeCaseKind::VariedIds,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeCaseKind::SpecialChars => "special-chars",
            EdgeCaseKind::LongNames => "long-names",
            EdgeCaseKind::MissingTags => "missing-tags",
            EdgeCaseKind::OldDates => "old-dates",
            EdgeCaseKind::VariedIds => "varied-ids",
        }
    }
}

impl fmt::Display for EdgeCaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeCaseKind {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        EdgeCaseKind::ALL
            .into_iter()
            .find(|k| k.as_str() == name)
            .ok_or_else(|| ForgeError::UnknownEdgeCase(name.to_string()))
    }
}

impl TryFrom<String> for EdgeCaseKind {
    type Error = ForgeError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<EdgeCaseKind> for String {
    fn from(kind: EdgeCaseKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Share of patients receiving edge cases, and which kinds are allowed. Every kind is
/// allowed unless a narrower list is given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeCasePolicy {
    pub percentage: u8,
    pub types: Vec<EdgeCaseKind>,
}

impl Default for EdgeCasePolicy {
    fn default() -> Self {
        Self {
            percentage: 0,
            types: EdgeCaseKind::ALL.to_vec(),
        }
    }
}

impl EdgeCasePolicy {
    /// Parse a comma-separated list such as `special-chars,old-dates`.
    pub fn parse_types(input: &str) -> Result<Vec<EdgeCaseKind>> {
        input
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.percentage > 100 {
            return Err(ForgeError::Config(format!(
                "edge-case percentage must be 0-100, got {}",
                self.percentage
            )));
        }
        if self.percentage > 0 && self.types.is_empty() {
            return Err(ForgeError::Config(
                "edge cases enabled but no types specified".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.percentage > 0 && !self.types.is_empty()
    }

    pub fn has(&self, kind: EdgeCaseKind) -> bool {
        self.types.contains(&kind)
    }

    /// Dice roll deciding whether one patient receives edge cases.
    pub fn should_apply(&self, rng: &mut dyn RngCore) -> bool {
        self.is_enabled() && rng.gen_range(0..100u8) < self.percentage
    }

    fn select(&self, rng: &mut dyn RngCore) -> EdgeCaseKind {
        *pick(&self.types, rng)
    }

    pub fn patient_name(&self, sex: &str, original: String, rng: &mut dyn RngCore) -> String {
        match self.select(rng) {
            EdgeCaseKind::SpecialChars => special_char_name(sex, rng),
            EdgeCaseKind::LongNames => long_patient_name(rng),
            _ => original,
        }
    }

    pub fn patient_id(&self, original: String, rng: &mut dyn RngCore) -> String {
        match self.select(rng) {
            EdgeCaseKind::VariedIds => varied_patient_id(rng),
            EdgeCaseKind::LongNames => long_identifier(rng),
            _ => original,
        }
    }

    pub fn birth_date(&self, original: String, rng: &mut dyn RngCore) -> String {
        match self.select(rng) {
            EdgeCaseKind::OldDates if rng.gen_bool(0.5) => old_birth_date(rng),
            EdgeCaseKind::OldDates => partial_date(rng),
            _ => original,
        }
    }

    /// Moves one study date in four into the future when old dates are enabled.
    pub fn study_date(&self, original: String, rng: &mut dyn RngCore) -> String {
        if self.has(EdgeCaseKind::OldDates) && rng.gen_range(0..4) == 0 {
            future_study_date(rng)
        } else {
            original
        }
    }

    /// One to three optional tags to drop, or none when missing tags are disabled.
    pub fn tags_to_omit(&self, rng: &mut dyn RngCore) -> Vec<&'static str> {
        if !self.has(EdgeCaseKind::MissingTags) {
            return Vec::new();
        }
        let count = rng.gen_range(1..=3);
        let mut tags = OPTIONAL_TAGS.to_vec();
        tags.shuffle(rng);
        tags.truncate(count);
        tags
    }
}

const SPECIAL_MALE: &[&str] = &[
    "Jean-Pierre", "François", "André", "José", "Ángel", "Søren", "Björn", "Łukasz",
    "Jürgen",
    "O'Brien",
];
const SPECIAL_FEMALE: &[&str] = &[
    "Marie-Claire", "Françoise", "Éléonore", "María", "Ángela", "Siân", "Zoë", "Renée",
    "Hélène", "O'Hara",
];
const SPECIAL_LAST: &[&str] = &[
    "Müller-Schmidt", "O'Connor", "D'Agostino", "García-López", "Björnsson", "Østergaard",
    "Çelik", "Škvorecký", "González", "Pérez-Rodríguez",
];

const LONG_LAST: &[&str] = &[
    "ALEXANDROPOULOSWILLIAMSONBERG",
    "VANDENBERGHEMONTGOMERYSMITH",
    "CHRISTODOULOPOULOSSMITHBAUER",
    "SCHWARZENEGGERBAUERWILLIAMS",
];
const LONG_FIRST: &[&str] = &[
    "ALEXANDERMAXIMILIANWILLIAM",
    "CHRISTOPHERJOHNATHANMICHAEL",
    "ELIZABETHCATHERINEANNAMARIE",
    "MARGARETISABELLAVICTORIAJANE",
];

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

pub fn special_char_name(sex: &str, rng: &mut dyn RngCore) -> String {
    let first = if sex == "F" {
        pick(SPECIAL_FEMALE, rng)
    } else {
        pick(SPECIAL_MALE, rng)
    };
    let last = pick(SPECIAL_LAST, rng);
    format!("{last}^{first}")
}

pub fn long_patient_name(rng: &mut dyn RngCore) -> String {
    let mut name = format!("{}^{}", pick(LONG_LAST, rng), pick(LONG_FIRST, rng));
    name.truncate(MAX_LO_LENGTH);
    name
}

/// Identifier filling the whole LO length.
pub fn long_identifier(rng: &mut dyn RngCore) -> String {
    (0..MAX_LO_LENGTH)
        .map(|_| char::from(*pick(ALPHANUMERIC, rng)))
        .collect()
}

/// Patient ID in one of five unusual formats.
pub fn varied_patient_id(rng: &mut dyn RngCore) -> String {
    match rng.gen_range(0..5) {
        0 => format!(
            "{:03}-{:03}-{:03}",
            rng.gen_range(0..1000),
            rng.gen_range(0..1000),
            rng.gen_range(0..1000)
        ),
        1 => (0..10)
            .map(|i| {
                if i % 2 == 0 {
                    char::from(*pick(LETTERS, rng))
                } else {
                    char::from(b'0' + rng.gen_range(0..10u8))
                }
            })
            .collect(),
        2 => format!(
            "PAT {:05} {:02}",
            rng.gen_range(0..100_000),
            rng.gen_range(0..100)
        ),
        3 => long_identifier(rng),
        _ => {
            let number = rng.gen_range(0..10_000);
            let code: String = (0..3).map(|_| char::from(*pick(LETTERS, rng))).collect();
            format!("PT-{number:04}-{code} {:03}", rng.gen_range(0..1000))
        }
    }
}

pub fn old_birth_date(rng: &mut dyn RngCore) -> String {
    let year = rng.gen_range(1900..=1950);
    let month = rng.gen_range(1..=12);
    let day = rng.gen_range(1..=28);
    dicom_date(year, month, day)
}

/// Year-only or year-month date.
pub fn partial_date(rng: &mut dyn RngCore) -> String {
    let year = rng.gen_range(1950..2000);
    if rng.gen_bool(0.5) {
        format!("{year:04}")
    } else {
        format!("{year:04}{:02}", rng.gen_range(1..=12))
    }
}

pub fn future_study_date(rng: &mut dyn RngCore) -> String {
    let year = Local::now().year() + rng.gen_range(1..=5);
    let month = rng.gen_range(1..=12);
    let day = rng.gen_range(1..=28);
    dicom_date(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn policy(percentage: u8, types: &[EdgeCaseKind]) -> EdgeCasePolicy {
        EdgeCasePolicy {
            percentage,
            types: types.to_vec(),
        }
    }

    #[test]
    fn parses_type_lists_and_rejects_unknown_names() {
        let types = EdgeCasePolicy::parse_types("special-chars, old-dates").unwrap();
        assert_eq!(types, vec![EdgeCaseKind::SpecialChars, EdgeCaseKind::OldDates]);
        assert!(EdgeCasePolicy::parse_types("").unwrap().is_empty());
        assert!(matches!(
            EdgeCasePolicy::parse_types("special-chars,weird"),
            Err(ForgeError::UnknownEdgeCase(name)) if name == "weird"
        ));
    }

    #[test]
    fn default_policy_allows_every_kind() {
        let mut p = EdgeCasePolicy::default();
        assert!(!p.is_enabled());
        assert_eq!(p.types, EdgeCaseKind::ALL.to_vec());
        p.percentage = 30;
        assert!(p.validate().is_ok());
        assert!(p.is_enabled());
        let parsed: EdgeCasePolicy = serde_json::from_str(r#"{"percentage": 30}"#).unwrap();
        assert_eq!(parsed.types.len(), 5);
    }

    #[test]
    fn validation_requires_types_when_enabled() {
        assert!(policy(0, &[]).validate().is_ok());
        assert!(policy(10, &[]).validate().is_err());
        assert!(policy(101, &[EdgeCaseKind::OldDates]).validate().is_err());
        assert!(policy(100, &[EdgeCaseKind::OldDates]).validate().is_ok());
    }

    #[test]
    fn full_percentage_always_applies() {
        let mut rng = StdRng::seed_from_u64(0);
        let always = policy(100, &[EdgeCaseKind::LongNames]);
        let never = policy(0, &[EdgeCaseKind::LongNames]);
        for _ in 0..50 {
            assert!(always.should_apply(&mut rng));
            assert!(!never.should_apply(&mut rng));
        }
    }

    #[test]
    fn long_values_fit_lo() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..20 {
            assert!(long_patient_name(&mut rng).len() <= MAX_LO_LENGTH);
            assert_eq!(long_identifier(&mut rng).len(), MAX_LO_LENGTH);
            assert!(varied_patient_id(&mut rng).len() <= MAX_LO_LENGTH);
        }
    }

    #[test]
    fn special_names_keep_person_name_form() {
        let mut rng = StdRng::seed_from_u64(6);
        let p = policy(100, &[EdgeCaseKind::SpecialChars]);
        let name = p.patient_name("F", "DOE^JANE".to_string(), &mut rng);
        assert_ne!(name, "DOE^JANE");
        assert!(name.contains('^'));
        assert!(name.chars().any(|c| !c.is_ascii()) || name.contains('\'') || name.contains('-'));
    }

    #[test]
    fn old_dates_produce_short_or_early_dates() {
        let mut rng = StdRng::seed_from_u64(8);
        let p = policy(100, &[EdgeCaseKind::OldDates]);
        for _ in 0..20 {
            let date = p.birth_date("19800101".to_string(), &mut rng);
            assert!(date.len() == 4 || date.len() == 6 || &date[..4] <= "1950");
        }
    }

    #[test]
    fn future_dates_are_after_this_year() {
        let mut rng = StdRng::seed_from_u64(12);
        let this_year = Local::now().year();
        let date = future_study_date(&mut rng);
        let year: i32 = date[..4].parse().unwrap();
        assert!(year > this_year && year <= this_year + 5);
    }

    #[test]
    fn omitted_tags_are_distinct_optional_tags() {
        let mut rng = StdRng::seed_from_u64(13);
        let p = policy(100, &[EdgeCaseKind::MissingTags]);
        for _ in 0..20 {
            let tags = p.tags_to_omit(&mut rng);
            assert!((1..=3).contains(&tags.len()));
            let mut unique = tags.clone();
            unique.sort();
            unique.dedup();
            assert_eq!(unique.len(), tags.len());
            assert!(tags.iter().all(|t| OPTIONAL_TAGS.contains(t)));
        }
        assert!(policy(100, &[EdgeCaseKind::OldDates])
            .tags_to_omit(&mut rng)
            .is_empty());
    }
}
