//
// config.rs
// dicom-forge
//
// Generation parameters, their validation, and the registry of overridable tags.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use dicom::core::dictionary::DataDictionary;
use dicom::core::Tag;
use dicom::dictionary_std::StandardDataDictionary;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::corruption::CorruptionPolicy;
use crate::edge_cases::EdgeCasePolicy;
use crate::error::{ForgeError, IoResultExt, Result};
use crate::modality::Modality;
use crate::sizing::{self, Dimensions};

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;
const GB: u64 = 1024 * MB;
const SIZE_PATTERN: &str = r"^(\d+(?:\.\d+)?)(KB|MB|GB)$";

/// Parse a human size such as `"500KB"`, `"100MB"` or `"4.5GB"` into bytes. Units are
/// upper-case and binary; no surrounding whitespace is accepted.
pub fn parse_size(input: &str) -> Result<u64> {
    let invalid = || ForgeError::InvalidSize(input.to_string());
    let pattern = Regex::new(SIZE_PATTERN).map_err(|e| ForgeError::InvalidInput(e.to_string()))?;
    let captures = pattern.captures(input).ok_or_else(invalid)?;

    let multiplier = match &captures[2] {
        "KB" => KB,
        "MB" => MB,
        _ => GB,
    };
    let value: f64 = captures[1].parse().map_err(|_| invalid())?;
    Ok((value * multiplier as f64).round() as u64)
}

/// Render a byte count with the largest unit that divides it exactly.
pub fn format_size(bytes: u64) -> String {
    for (unit, multiplier) in [("GB", GB), ("MB", MB), ("KB", KB)] {
        if bytes >= multiplier && bytes % multiplier == 0 {
            return format!("{}{}", bytes / multiplier, unit);
        }
    }
    // Any integer over 1024 has a finite decimal expansion.
    format!("{}KB", bytes as f64 / KB as f64)
}

mod size_format {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SizeRepr {
        Bytes(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(bytes: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_size(*bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        match SizeRepr::deserialize(deserializer)? {
            SizeRepr::Bytes(b) => Ok(b),
            SizeRepr::Text(s) => super::parse_size(&s).map_err(serde::de::Error::custom),
        }
    }
}

/// Series count per study: fixed (`"3"`) or drawn from a range (`"2-5"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SeriesRange {
    pub min: usize,
    pub max: usize,
}

impl SeriesRange {
    pub fn fixed(count: usize) -> Self {
        SeriesRange {
            min: count,
            max: count,
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.min == self.max
    }
}

impl Default for SeriesRange {
    fn default() -> Self {
        SeriesRange::fixed(1)
    }
}

impl FromStr for SeriesRange {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            ForgeError::Config(format!(
                "invalid series count '{s}': use a number like '3' or a range like '2-5'"
            ))
        };
        let parse = |part: &str| part.trim().parse::<usize>().map_err(|_| invalid());

        let range = match s.split_once('-') {
            Some((min, max)) => SeriesRange {
                min: parse(min)?,
                max: parse(max)?,
            },
            None => SeriesRange::fixed(parse(s)?),
        };
        if range.min == 0 || range.min > range.max {
            return Err(invalid());
        }
        Ok(range)
    }
}

impl TryFrom<String> for SeriesRange {
    type Error = ForgeError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<SeriesRange> for String {
    fn from(range: SeriesRange) -> Self {
        range.to_string()
    }
}

impl fmt::Display for SeriesRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_fixed() {
            write!(f, "{}", self.min)
        } else {
            write!(f, "{}-{}", self.min, self.max)
        }
    }
}

/// Requested procedure priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    #[default]
    Routine,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "HIGH",
            Priority::Routine => "ROUTINE",
            Priority::Low => "LOW",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HIGH" => Ok(Priority::High),
            "ROUTINE" => Ok(Priority::Routine),
            "LOW" => Ok(Priority::Low),
            _ => Err(ForgeError::Config(format!(
                "invalid priority '{s}' (valid: HIGH, ROUTINE, LOW)"
            ))),
        }
    }
}

/// Level of the hierarchy at which an overridable tag stays constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TagScope {
    Patient,
    Study,
    Series,
    Image,
}

#[derive(Debug, Clone, Copy)]
pub struct TagInfo {
    pub name: &'static str,
    pub tag: Tag,
    pub scope: TagScope,
}

const fn info(name: &'static str, group: u16, element: u16, scope: TagScope) -> TagInfo {
    TagInfo {
        name,
        tag: Tag(group, element),
        scope,
    }
}

/// Tags whose generated value can be replaced by a user-supplied one.
pub static TAG_REGISTRY: &[TagInfo] = &[
    info("PatientName", 0x0010, 0x0010, TagScope::Patient),
    info("PatientID", 0x0010, 0x0020, TagScope::Patient),
    info("PatientBirthDate", 0x0010, 0x0030, TagScope::Patient),
    info("PatientSex", 0x0010, 0x0040, TagScope::Patient),
    info("StudyDescription", 0x0008, 0x1030, TagScope::Study),
    info("InstitutionName", 0x0008, 0x0080, TagScope::Study),
    info("InstitutionalDepartmentName", 0x0008, 0x1040, TagScope::Study),
    info("ReferringPhysicianName", 0x0008, 0x0090, TagScope::Study),
    info("PerformingPhysicianName", 0x0008, 0x1050, TagScope::Study),
    info("OperatorsName", 0x0008, 0x1070, TagScope::Study),
    info("AccessionNumber", 0x0008, 0x0050, TagScope::Study),
    info("StationName", 0x0008, 0x1010, TagScope::Study),
    info("RequestedProcedurePriority", 0x0040, 0x1003, TagScope::Study),
    info("RequestedProcedureDescription", 0x0032, 0x1060, TagScope::Study),
    info("SeriesDescription", 0x0008, 0x103E, TagScope::Series),
    info("ProtocolName", 0x0018, 0x1030, TagScope::Series),
    info("BodyPartExamined", 0x0018, 0x0015, TagScope::Series),
    info("SequenceName", 0x0018, 0x0024, TagScope::Series),
    info("Manufacturer", 0x0008, 0x0070, TagScope::Series),
    info("ManufacturerModelName", 0x0008, 0x1090, TagScope::Series),
    info("WindowCenter", 0x0028, 0x1050, TagScope::Image),
    info("WindowWidth", 0x0028, 0x1051, TagScope::Image),
];

/// Case-insensitive lookup in the override registry.
pub fn lookup_tag(name: &str) -> Result<&'static TagInfo> {
    let normalized = name.trim().to_ascii_lowercase();
    if let Some(found) = TAG_REGISTRY
        .iter()
        .find(|t| t.name.to_ascii_lowercase() == normalized)
    {
        return Ok(found);
    }

    let hint = if StandardDataDictionary.by_name(name.trim()).is_some() {
        " (standard attribute, but not overridable)".to_string()
    } else {
        match closest_tag_name(&normalized) {
            Some(suggestion) => format!(", did you mean '{suggestion}'?"),
            None => String::new(),
        }
    };
    Err(ForgeError::UnknownTag {
        name: name.to_string(),
        hint,
    })
}

fn closest_tag_name(input: &str) -> Option<&'static str> {
    const MAX_DISTANCE: usize = 5;
    TAG_REGISTRY
        .iter()
        .map(|t| (levenshtein(input, &t.name.to_ascii_lowercase()), t.name))
        .filter(|(d, _)| *d <= MAX_DISTANCE)
        .min_by_key(|(d, _)| *d)
        .map(|(_, name)| name)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// User overrides keyed by canonical tag name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct CustomTags {
    values: BTreeMap<&'static str, String>,
}

impl CustomTags {
    pub fn insert(&mut self, name: &str, value: impl Into<String>) -> Result<()> {
        let info = lookup_tag(name)?;
        self.values.insert(info.name, value.into());
        Ok(())
    }

    /// Parse a `Name=Value` command-line assignment.
    pub fn insert_assignment(&mut self, assignment: &str) -> Result<()> {
        let (name, value) = assignment.split_once('=').ok_or_else(|| {
            ForgeError::Config(format!(
                "invalid tag override '{assignment}': expected Name=Value"
            ))
        })?;
        self.insert(name, value.trim())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// The override for `name`, or the generated value.
    pub fn resolve(&self, name: &str, generated: impl Into<String>) -> String {
        match self.get(name) {
            Some(value) => value.to_string(),
            None => generated.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.values.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

impl TryFrom<BTreeMap<String, String>> for CustomTags {
    type Error = ForgeError;

    fn try_from(map: BTreeMap<String, String>) -> Result<Self> {
        let mut tags = CustomTags::default();
        for (name, value) in map {
            tags.insert(&name, value)?;
        }
        Ok(tags)
    }
}

impl From<CustomTags> for BTreeMap<String, String> {
    fn from(tags: CustomTags) -> Self {
        tags.values
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }
}

/// Everything needed to generate one file set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub num_images: usize,
    #[serde(with = "size_format")]
    pub total_size: u64,
    pub output_dir: PathBuf,
    pub seed: Option<u64>,
    pub num_patients: usize,
    pub num_studies: usize,
    pub series_per_study: SeriesRange,
    pub modality: Modality,
    /// One entry per study when non-empty.
    pub study_descriptions: Vec<String>,
    pub institution: Option<String>,
    pub department: Option<String>,
    pub body_part: Option<String>,
    pub priority: Priority,
    pub varied_metadata: bool,
    /// Worker threads; host parallelism when unset.
    pub workers: Option<usize>,
    pub custom_tags: CustomTags,
    pub edge_cases: EdgeCasePolicy,
    pub corruption: CorruptionPolicy,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        GenerationConfig {
            num_images: 10,
            total_size: 100 * MB,
            output_dir: PathBuf::from("dicom_series"),
            seed: None,
            num_patients: 1,
            num_studies: 1,
            series_per_study: SeriesRange::default(),
            modality: Modality::Mr,
            study_descriptions: Vec::new(),
            institution: None,
            department: None,
            body_part: None,
            priority: Priority::Routine,
            varied_metadata: false,
            workers: None,
            custom_tags: CustomTags::default(),
            edge_cases: EdgeCasePolicy::default(),
            corruption: CorruptionPolicy::default(),
        }
    }
}

impl GenerationConfig {
    /// Load a configuration from a JSON file. Validation is left to the caller, so values
    /// can still be overridden first.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).at_path(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Check every constraint that can be checked without touching the filesystem and
    /// return the per-image geometry.
    pub fn validate(&self) -> Result<Dimensions> {
        if self.num_images == 0 {
            return Err(ForgeError::Config(
                "number of images must be > 0".to_string(),
            ));
        }
        if self.num_studies == 0 {
            return Err(ForgeError::Config(
                "number of studies must be > 0".to_string(),
            ));
        }
        if self.num_studies > self.num_images {
            return Err(ForgeError::Config(format!(
                "number of studies ({}) cannot exceed number of images ({})",
                self.num_studies, self.num_images
            )));
        }
        if self.num_patients == 0 {
            return Err(ForgeError::Config(
                "number of patients must be > 0".to_string(),
            ));
        }
        if self.num_patients > self.num_studies {
            return Err(ForgeError::Config(format!(
                "number of patients ({}) cannot exceed number of studies ({})",
                self.num_patients, self.num_studies
            )));
        }
        if self.series_per_study.min == 0 || self.series_per_study.min > self.series_per_study.max
        {
            return Err(ForgeError::Config(format!(
                "invalid series range {}",
                self.series_per_study
            )));
        }
        if !self.study_descriptions.is_empty() && self.study_descriptions.len() != self.num_studies
        {
            return Err(ForgeError::Config(format!(
                "{} study descriptions given for {} studies",
                self.study_descriptions.len(),
                self.num_studies
            )));
        }
        if self.workers == Some(0) {
            return Err(ForgeError::Config("workers must be > 0".to_string()));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(ForgeError::Config(
                "output directory must not be empty".to_string(),
            ));
        }
        self.edge_cases.validate()?;

        sizing::solve_dimensions(self.total_size, self.num_images)
    }

    /// Worker count actually used for `task_count` tasks.
    pub fn effective_workers(&self, task_count: usize) -> usize {
        let requested = self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        requested.min(task_count).max(1)
    }
}
