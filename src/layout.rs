//
// layout.rs
// dicom-forge
//
// Moves flat IMGnnnn.dcm files into the PT/ST/SE/IM hierarchy expected by DICOMDIR readers.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{IoResultExt, Result};
use crate::models::GeneratedFile;

/// Relative location of one image: `PT{p:06}/ST{s:06}/SE{k:06}/IM{i:06}`.
pub fn tree_path(patient: usize, study: usize, series: usize, image: usize) -> PathBuf {
    PathBuf::from(format!("PT{patient:06}"))
        .join(format!("ST{study:06}"))
        .join(format!("SE{series:06}"))
        .join(format!("IM{image:06}"))
}

/// Directory numbers handed out in first-seen order.
#[derive(Default)]
struct Numbering {
    patients: HashMap<usize, usize>,
    studies: HashMap<(usize, usize), usize>,
    series: HashMap<(usize, usize), usize>,
    images: HashMap<(usize, usize), usize>,
    studies_per_patient: HashMap<usize, usize>,
    series_per_study: HashMap<usize, usize>,
}

impl Numbering {
    fn next(counter: &mut HashMap<usize, usize>, key: usize) -> usize {
        let slot = counter.entry(key).or_insert(0);
        *slot += 1;
        *slot - 1
    }

    /// Patient, study and series numbers from 0, image numbers from 1.
    fn assign(&mut self, file: &GeneratedFile) -> (usize, usize, usize, usize) {
        let next_patient = self.patients.len();
        let patient = *self
            .patients
            .entry(file.patient_index)
            .or_insert(next_patient);

        let study = match self.studies.get(&(patient, file.study_index)) {
            Some(s) => *s,
            None => {
                let s = Self::next(&mut self.studies_per_patient, patient);
                self.studies.insert((patient, file.study_index), s);
                s
            }
        };

        let series = match self.series.get(&(file.study_index, file.series_number)) {
            Some(k) => *k,
            None => {
                let k = Self::next(&mut self.series_per_study, file.study_index);
                self.series.insert((file.study_index, file.series_number), k);
                k
            }
        };

        let image = self
            .images
            .entry((file.study_index, file.series_number))
            .or_insert(0);
        *image += 1;

        (patient, study, series, *image)
    }
}

/// Move every rendered file into the hierarchy under `root` and return the updated records.
pub fn organize(root: &Path, files: Vec<GeneratedFile>) -> Result<Vec<GeneratedFile>> {
    let mut numbering = Numbering::default();
    let mut organized = Vec::with_capacity(files.len());

    for mut file in files {
        let (p, s, k, i) = numbering.assign(&file);
        let destination = root.join(tree_path(p, s, k, i));
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).at_path(parent)?;
        }
        fs::rename(&file.path, &destination).at_path(&file.path)?;
        file.path = destination;
        organized.push(file);
    }

    info!(
        files = organized.len(),
        patients = numbering.patients.len(),
        root = %root.display(),
        "organized files into DICOMDIR hierarchy"
    );
    Ok(organized)
}
