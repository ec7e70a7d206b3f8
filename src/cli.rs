//
// cli.rs
// dicom-forge
//
// Defines the CLI surface with Clap and turns flags (or a JSON file) into a GenerationConfig.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use crate::config::{parse_size, GenerationConfig, Priority, SeriesRange};
use crate::corruption::CorruptionPolicy;
use crate::edge_cases::EdgeCasePolicy;
use crate::modality::Modality;
use crate::models::GenerationReport;
use crate::render::{self, TracingProgress};
use crate::sizing::Dimensions;
use crate::{dicomdir, identity};

#[derive(Parser)]
#[command(name = "dicom-forge")]
#[command(about = "Synthetic DICOM file-set generator", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a DICOM file set with a DICOMDIR
    Generate(GenerateArgs),
    /// Rebuild the DICOMDIR of an existing PT/ST/SE/IM tree
    Index { directory: PathBuf },
}

/// Every flag is optional so it can override a value loaded with `--config`.
#[derive(Args, Debug, Default)]
pub struct GenerateArgs {
    /// JSON configuration file used as the base
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(short = 'n', long)]
    pub num_images: Option<usize>,
    /// Total size, e.g. 500KB, 100MB, 4.5GB
    #[arg(short = 's', long)]
    pub total_size: Option<String>,
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    #[arg(long)]
    pub seed: Option<u64>,
    #[arg(long)]
    pub num_patients: Option<usize>,
    #[arg(long)]
    pub num_studies: Option<usize>,
    /// Fixed count (`3`) or range (`2-5`)
    #[arg(long)]
    pub series_per_study: Option<SeriesRange>,
    #[arg(short, long)]
    pub modality: Option<Modality>,
    /// One per study, in order
    #[arg(long = "study-description")]
    pub study_descriptions: Vec<String>,
    #[arg(long)]
    pub institution: Option<String>,
    #[arg(long)]
    pub department: Option<String>,
    #[arg(long)]
    pub body_part: Option<String>,
    #[arg(long)]
    pub priority: Option<Priority>,
    #[arg(long)]
    pub varied_metadata: bool,
    #[arg(short, long)]
    pub workers: Option<usize>,
    /// Tag override, e.g. `InstitutionName="City Hospital"`
    #[arg(long = "tag")]
    pub tags: Vec<String>,
    /// Percentage of patients receiving edge cases (0-100)
    #[arg(long)]
    pub edge_cases: Option<u8>,
    /// Comma-separated edge case types
    #[arg(long)]
    pub edge_case_types: Option<String>,
    /// Comma-separated defect kinds, or `all`
    #[arg(long)]
    pub corrupt: Option<CorruptionPolicy>,
    /// Write a JSON report of the generated files
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl GenerateArgs {
    /// Resolve flags over the base configuration (file or defaults), validate, and return the
    /// configuration with its solved image geometry.
    pub fn into_config(self) -> anyhow::Result<(GenerationConfig, Dimensions)> {
        let mut config = match &self.config {
            Some(path) => GenerationConfig::from_json_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => GenerationConfig::default(),
        };

        if let Some(n) = self.num_images {
            config.num_images = n;
        }
        if let Some(size) = &self.total_size {
            config.total_size = parse_size(size)?;
        }
        if let Some(output) = self.output {
            config.output_dir = output;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(n) = self.num_patients {
            config.num_patients = n;
        }
        if let Some(n) = self.num_studies {
            config.num_studies = n;
        }
        if let Some(range) = self.series_per_study {
            config.series_per_study = range;
        }
        if let Some(modality) = self.modality {
            config.modality = modality;
        }
        if !self.study_descriptions.is_empty() {
            config.study_descriptions = self.study_descriptions;
        }
        if self.institution.is_some() {
            config.institution = self.institution;
        }
        if self.department.is_some() {
            config.department = self.department;
        }
        if self.body_part.is_some() {
            config.body_part = self.body_part;
        }
        if let Some(priority) = self.priority {
            config.priority = priority;
        }
        config.varied_metadata |= self.varied_metadata;
        if self.workers.is_some() {
            config.workers = self.workers;
        }
        for assignment in &self.tags {
            config.custom_tags.insert_assignment(assignment)?;
        }
        if let Some(percentage) = self.edge_cases {
            config.edge_cases.percentage = percentage;
        }
        if let Some(types) = &self.edge_case_types {
            config.edge_cases.types = EdgeCasePolicy::parse_types(types)?;
        }
        if let Some(corruption) = self.corrupt {
            config.corruption = corruption;
        }

        let dims = config.validate().context("invalid generation settings")?;
        Ok((config, dims))
    }
}

pub fn run() -> anyhow::Result<()> {
    // Parse the raw CLI arguments once and dispatch to a subcommand handler.
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate(args) => {
            let report_path = args.report.clone();
            let (config, dims) = args.into_config()?;
            let files = render::generate(&config, &TracingProgress).with_context(|| {
                format!("generation into {} failed", config.output_dir.display())
            })?;

            let written: u64 = files
                .iter()
                .filter_map(|f| fs::metadata(&f.path).ok())
                .map(|m| m.len())
                .sum();
            println!(
                "Generated {} {} images ({}x{}) in {}",
                files.len(),
                config.modality,
                dims.width,
                dims.height,
                config.output_dir.display()
            );

            if let Some(path) = report_path {
                let report = GenerationReport::new(
                    config.output_dir.clone(),
                    identity::resolve_seed(config.seed, &config.output_dir),
                    config.modality,
                    dims,
                    config.total_size,
                    written,
                    files,
                );
                let json = serde_json::to_string_pretty(&report)?;
                fs::write(&path, json)
                    .with_context(|| format!("failed to write report {}", path.display()))?;
                println!("Report written to {}", path.display());
            }
        }
        Commands::Index { directory } => {
            let summary = dicomdir::build(&directory)
                .with_context(|| format!("failed to index {}", directory.display()))?;
            println!(
                "DICOMDIR: {} patients, {} studies, {} series, {} images",
                summary.patients, summary.studies, summary.series, summary.images
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge_cases::EdgeCaseKind;

    #[test]
    fn flags_parse_into_config() {
        let cli = Cli::try_parse_from([
            "dicom-forge",
            "generate",
            "-n",
            "12",
            "--total-size",
            "5MB",
            "--modality",
            "ct",
            "--num-studies",
            "2",
            "--series-per-study",
            "1-3",
            "--tag",
            "InstitutionName=Test Clinic",
            "--corrupt",
            "all",
            "--edge-cases",
            "50",
            "--edge-case-types",
            "special-chars,old-dates",
        ])
        .expect("parse");
        let Commands::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        let (config, dims) = args.into_config().expect("config");
        assert_eq!(config.num_images, 12);
        assert_eq!((dims.width, dims.height), (256, 256));
        assert_eq!(config.total_size, 5 * 1024 * 1024);
        assert_eq!(config.modality, Modality::Ct);
        assert_eq!(config.series_per_study, SeriesRange { min: 1, max: 3 });
        assert_eq!(config.custom_tags.get("InstitutionName"), Some("Test Clinic"));
        assert_eq!(config.corruption.types.len(), 4);
        assert_eq!(config.edge_cases.percentage, 50);
    }

    #[test]
    fn edge_case_percentage_alone_enables_every_kind() {
        let cli = Cli::try_parse_from([
            "dicom-forge",
            "generate",
            "-n",
            "4",
            "-s",
            "1MB",
            "--edge-cases",
            "30",
        ])
        .expect("parse");
        let Commands::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        let (config, _) = args.into_config().expect("config");
        assert_eq!(config.edge_cases.percentage, 30);
        assert_eq!(config.edge_cases.types, EdgeCaseKind::ALL.to_vec());
    }

    #[test]
    fn unknown_modality_is_rejected_by_the_parser() {
        assert!(Cli::try_parse_from(["dicom-forge", "generate", "--modality", "PET"]).is_err());
    }

    #[test]
    fn invalid_combinations_fail_validation() {
        let args = GenerateArgs {
            num_images: Some(2),
            num_studies: Some(3),
            ..GenerateArgs::default()
        };
        assert!(args.into_config().is_err());
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("forge.json");
        fs::write(&path, r#"{"num_images": 4, "total_size": "1MB", "modality": "US"}"#)
            .expect("write");
        let args = GenerateArgs {
            config: Some(path),
            num_images: Some(6),
            ..GenerateArgs::default()
        };
        let (config, _) = args.into_config().expect("config");
        assert_eq!(config.num_images, 6);
        assert_eq!(config.modality, Modality::Us);
        assert_eq!(config.total_size, 1024 * 1024);
    }
}
