//
// models.rs
// dicom-forge
//
// Serializable records describing what a generation run produced.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::format_size;
use crate::modality::Modality;
use crate::sizing::Dimensions;

/// One generated image, as written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub path: PathBuf,
    pub patient_index: usize,
    /// Position among all studies of the run.
    pub study_index: usize,
    pub series_number: usize,
    pub instance_number: usize,
    pub patient_id: String,
    pub study_uid: String,
    pub series_uid: String,
    pub sop_instance_uid: String,
    pub study_id: String,
    /// Absolute offset of the first pixel byte.
    pub pixel_data_offset: u64,
    /// Pixel data length as written, before any length patch.
    pub pixel_data_len: u32,
}

/// Summary written by `generate --report`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReport {
    pub output_dir: PathBuf,
    pub seed: u64,
    pub modality: Modality,
    pub width: u32,
    pub height: u32,
    pub requested_size: String,
    pub written_size: String,
    pub files: Vec<GeneratedFile>,
}

impl GenerationReport {
    pub fn new(
        output_dir: PathBuf,
        seed: u64,
        modality: Modality,
        dims: Dimensions,
        requested_bytes: u64,
        written_bytes: u64,
        files: Vec<GeneratedFile>,
    ) -> Self {
        GenerationReport {
            output_dir,
            seed,
            modality,
            width: dims.width,
            height: dims.height,
            requested_size: format_size(requested_bytes),
            written_size: format_size(written_bytes),
            files,
        }
    }
}
