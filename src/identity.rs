//
// identity.rs
// dicom-forge
//
// Deterministic identities: seed resolution, hash-derived UIDs and the seeded stream that
// produces patients, studies and series in a fixed order.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::Path;

use chrono::{NaiveDate, NaiveTime};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::GenerationConfig;
use crate::modality::{pick, ModalityProfile, SeriesParameters};
use crate::names::{self, Institution};

/// Root for every UID this crate produces.
pub const UID_ROOT: &str = "1.2.826.0.1.3680043.8.498";

/// Last component of the output directory; falls back to the whole path.
pub fn directory_name(output_dir: &Path) -> String {
    output_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| output_dir.to_string_lossy().into_owned())
}

/// Explicit seed, or one derived from the output directory name.
pub fn resolve_seed(explicit: Option<u64>, output_dir: &Path) -> u64 {
    explicit.unwrap_or_else(|| {
        let name = directory_name(output_dir);
        let digest = Sha256::digest(name.as_bytes());
        debug!(
            dir = %name,
            digest = %hex::encode(&digest[..8]),
            "seed derived from output directory"
        );
        u64_prefix(&digest)
    })
}

fn u64_prefix(digest: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// Stable UID for a label: the root plus the decimal value of a 96-bit hash prefix.
pub fn deterministic_uid(label: &str) -> String {
    let digest = Sha256::digest(label.as_bytes());
    let mut bytes = [0u8; 16];
    bytes[4..].copy_from_slice(&digest[..12]);
    format!("{}.{}", UID_ROOT, u128::from_be_bytes(bytes))
}

pub fn study_uid(dir_name: &str, study: usize) -> String {
    deterministic_uid(&format!("{dir_name}_study_{study}"))
}

pub fn series_uid(dir_name: &str, study: usize, series: usize) -> String {
    deterministic_uid(&format!("{dir_name}_study_{study}_series_{series}"))
}

pub fn instance_uid(dir_name: &str, study: usize, series: usize, instance: usize) -> String {
    deterministic_uid(&format!(
        "{dir_name}_study_{study}_series_{series}_instance_{instance}"
    ))
}

/// Seed of the pixel generator for one image.
pub fn pixel_seed(seed: u64, global_index: usize) -> u64 {
    u64_prefix(&Sha256::digest(format!("{seed}_pixel_{global_index}").as_bytes()))
}

/// `YYYYMMDD`, validated through the calendar when possible.
pub fn dicom_date(year: i32, month: u32, day: u32) -> String {
    NaiveDate::from_ymd_opt(year, month, day)
        .map(|d| d.format("%Y%m%d").to_string())
        .unwrap_or_else(|| format!("{year:04}{month:02}{day:02}"))
}

pub fn dicom_time(hour: u32, minute: u32, second: u32) -> String {
    NaiveTime::from_hms_opt(hour, minute, second)
        .map(|t| t.format("%H%M%S").to_string())
        .unwrap_or_else(|| format!("{hour:02}{minute:02}{second:02}"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatientIdentity {
    pub index: usize,
    pub name: String,
    pub id: String,
    pub birth_date: String,
    pub sex: String,
    /// Whether this patient drew edge cases.
    pub edge_cased: bool,
    /// Optional tags left out of this patient's images.
    pub omitted_tags: Vec<&'static str>,
}

/// Study-level values shared by every study when metadata is not varied.
#[derive(Debug, Clone, PartialEq)]
pub struct StaffDefaults {
    pub institution: Institution,
    pub referring_physician: String,
    pub performing_physician: String,
    pub operator: String,
    pub station: String,
    pub accession: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SharedDefaults {
    pub body_part: String,
    /// `None` when every study draws its own staff.
    pub staff: Option<StaffDefaults>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudyContext {
    /// Zero-based position among all studies.
    pub index: usize,
    pub patient_index: usize,
    pub uid: String,
    pub study_id: String,
    pub description: String,
    pub date: String,
    pub time: String,
    pub accession: String,
    pub institution: String,
    pub department: String,
    pub referring_physician: String,
    pub performing_physician: String,
    pub operator: String,
    pub station: String,
    pub priority: String,
    pub series_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesContext {
    /// One-based number within the study.
    pub number: usize,
    pub uid: String,
    pub description: String,
    pub protocol: String,
    pub indication: String,
    pub body_part: String,
    pub params: SeriesParameters,
}

/// Single seeded generator feeding every entity in a fixed order.
pub struct IdentityStream {
    rng: StdRng,
    seed: u64,
    dir_name: String,
}

impl IdentityStream {
    pub fn new(seed: u64, dir_name: impl Into<String>) -> Self {
        IdentityStream {
            rng: StdRng::seed_from_u64(seed),
            seed,
            dir_name: dir_name.into(),
        }
    }

    pub fn for_config(config: &GenerationConfig) -> Self {
        let seed = resolve_seed(config.seed, &config.output_dir);
        Self::new(seed, directory_name(&config.output_dir))
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn dir_name(&self) -> &str {
        &self.dir_name
    }

    pub fn rng(&mut self) -> &mut dyn RngCore {
        &mut self.rng
    }

    /// Every patient, edge cases and overrides applied.
    pub fn patients(&mut self, config: &GenerationConfig) -> Vec<PatientIdentity> {
        let rng = &mut self.rng;
        let tags = &config.custom_tags;
        let policy = &config.edge_cases;

        (0..config.num_patients)
            .map(|index| {
                let sex = if rng.gen_bool(0.5) { "M" } else { "F" };
                let mut birth_date = dicom_date(
                    rng.gen_range(1950..=2000),
                    rng.gen_range(1..=12),
                    rng.gen_range(1..=28),
                );
                let mut id = format!("PID{:06}", rng.gen_range(100_000..1_000_000));
                let mut name = names::patient_name(sex, rng);

                let edge_cased = policy.should_apply(rng);
                let mut omitted_tags = Vec::new();
                if edge_cased {
                    name = policy.patient_name(sex, name, rng);
                    id = policy.patient_id(id, rng);
                    birth_date = policy.birth_date(birth_date, rng);
                    omitted_tags = policy.tags_to_omit(rng);
                }

                PatientIdentity {
                    index,
                    name: tags.resolve("PatientName", name),
                    id: tags.resolve("PatientID", id),
                    birth_date: tags.resolve("PatientBirthDate", birth_date),
                    sex: tags.resolve("PatientSex", sex),
                    edge_cased,
                    omitted_tags,
                }
            })
            .collect()
    }

    /// Body part and, unless metadata varies per study, the shared staff values.
    pub fn shared_defaults(&mut self, config: &GenerationConfig) -> SharedDefaults {
        let modality = config.modality;
        let rng = &mut self.rng;

        let institution = if config.varied_metadata {
            None
        } else {
            Some(self::institution(config, rng))
        };
        let body_part = match &config.body_part {
            Some(part) => part.clone(),
            None => names::body_part(modality, rng),
        };
        let staff = institution.map(|institution| StaffDefaults {
            institution,
            referring_physician: names::physician_name(rng),
            performing_physician: names::physician_name(rng),
            operator: names::physician_name(rng),
            station: names::station_name(modality, rng),
            accession: accession_number(rng),
        });

        SharedDefaults { body_part, staff }
    }

    /// Draw one study. `images` bounds the number of series it can hold.
    pub fn study(
        &mut self,
        config: &GenerationConfig,
        index: usize,
        patient: &PatientIdentity,
        defaults: &SharedDefaults,
        images: usize,
    ) -> StudyContext {
        let tags = &config.custom_tags;
        let rng = &mut self.rng;

        let range = config.series_per_study;
        let drawn = if range.is_fixed() {
            range.min
        } else {
            rng.gen_range(range.min..=range.max)
        };
        let series_count = drawn.min(images).max(1);

        let study_id = format!("STD{:04}", rng.gen_range(1000..10_000));
        let date = dicom_date(
            rng.gen_range(2020..=2024),
            rng.gen_range(1..=12),
            rng.gen_range(1..=28),
        );
        let time = dicom_time(
            rng.gen_range(0..24),
            rng.gen_range(0..60),
            rng.gen_range(0..60),
        );

        let staff = match &defaults.staff {
            Some(staff) => staff.clone(),
            None => StaffDefaults {
                institution: self::institution(config, rng),
                referring_physician: names::physician_name(rng),
                performing_physician: names::physician_name(rng),
                operator: names::physician_name(rng),
                station: names::station_name(config.modality, rng),
                accession: accession_number(rng),
            },
        };

        let date = if patient.edge_cased {
            config.edge_cases.study_date(date, rng)
        } else {
            date
        };

        let description = config
            .study_descriptions
            .get(index)
            .cloned()
            .unwrap_or_else(|| {
                names::study_description(
                    config.modality,
                    &defaults.body_part,
                    index + 1,
                    config.num_studies,
                )
            });

        StudyContext {
            index,
            patient_index: patient.index,
            uid: study_uid(&self.dir_name, index + 1),
            study_id,
            description: tags.resolve("StudyDescription", description),
            date,
            time,
            accession: tags.resolve("AccessionNumber", staff.accession),
            institution: tags.resolve("InstitutionName", staff.institution.name),
            department: tags.resolve("InstitutionalDepartmentName", staff.institution.department),
            referring_physician: tags.resolve("ReferringPhysicianName", staff.referring_physician),
            performing_physician: tags
                .resolve("PerformingPhysicianName", staff.performing_physician),
            operator: tags.resolve("OperatorsName", staff.operator),
            station: tags.resolve("StationName", staff.station),
            priority: tags.resolve("RequestedProcedurePriority", config.priority.as_str()),
            series_count,
        }
    }

    /// Draw one series of `study`; `number` is one-based.
    pub fn series(
        &mut self,
        config: &GenerationConfig,
        study: &StudyContext,
        defaults: &SharedDefaults,
        number: usize,
        profile: &dyn ModalityProfile,
    ) -> SeriesContext {
        let tags = &config.custom_tags;
        let rng = &mut self.rng;

        let scanner = *pick(profile.scanners(), rng);
        let params = profile.series_parameters(&scanner, rng);
        let protocol = names::protocol_name(config.modality, &defaults.body_part, rng);
        let indication = names::clinical_indication(&defaults.body_part, rng);
        let description = format!("Series {} - {}", number, params.label);

        SeriesContext {
            number,
            uid: series_uid(&self.dir_name, study.index + 1, number),
            description: tags.resolve("SeriesDescription", description),
            protocol: tags.resolve("ProtocolName", protocol),
            indication: tags.resolve("RequestedProcedureDescription", indication),
            body_part: tags.resolve("BodyPartExamined", defaults.body_part.as_str()),
            params,
        }
    }
}

fn institution(config: &GenerationConfig, rng: &mut dyn RngCore) -> Institution {
    match &config.institution {
        Some(name) => Institution {
            name: name.clone(),
            department: config
                .department
                .clone()
                .unwrap_or_else(|| pick(names::DEPARTMENTS, rng).to_string()),
        },
        None => {
            let mut generated = names::institution(rng);
            if let Some(department) = &config.department {
                generated.department = department.clone();
            }
            generated
        }
    }
}

fn accession_number(rng: &mut dyn RngCore) -> String {
    format!("ACC{:08}", rng.gen_range(10_000_000..100_000_000))
}
