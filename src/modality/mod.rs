//
// mod.rs
// dicom-forge
//
// Modality capability layer: every supported modality describes its scanners, acquisition
// parameters, pixel encoding and modality-specific elements through one trait.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fmt;
use std::str::FromStr;

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::codec::Element;
use crate::error::{ForgeError, Result};

mod cr;
mod ct;
mod dx;
mod mg;
mod mr;
mod us;

pub use cr::CrProfile;
pub use ct::CtProfile;
pub use dx::DxProfile;
pub use mg::MgProfile;
pub use mr::MrProfile;
pub use us::UsProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Modality {
    Mr,
    Ct,
    Cr,
    Dx,
    Us,
    Mg,
}

impl Modality {
    pub const ALL: [Modality; 6] = [
        Modality::Mr,
        Modality::Ct,
        Modality::Cr,
        Modality::Dx,
        Modality::Us,
        Modality::Mg,
    ];

    /// DICOM modality code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Mr => "MR",
            Modality::Ct => "CT",
            Modality::Cr => "CR",
            Modality::Dx => "DX",
            Modality::Us => "US",
            Modality::Mg => "MG",
        }
    }

    pub fn profile(&self) -> &'static dyn ModalityProfile {
        match self {
            Modality::Mr => &MrProfile,
            Modality::Ct => &CtProfile,
            Modality::Cr => &CrProfile,
            Modality::Dx => &DxProfile,
            Modality::Us => &UsProfile,
            Modality::Mg => &MgProfile,
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Modality {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self> {
        let code = s.trim().to_ascii_uppercase();
        Modality::ALL
            .into_iter()
            .find(|m| m.as_str() == code)
            .ok_or_else(|| ForgeError::UnknownModality(s.to_string()))
    }
}

impl TryFrom<String> for Modality {
    type Error = ForgeError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Modality> for String {
    fn from(modality: Modality) -> Self {
        modality.as_str().to_string()
    }
}

/// What distinguishes one scanner model from another in the written metadata.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScannerCapability {
    /// Tesla.
    FieldStrength(f64),
    DetectorRows(u32),
    /// Detector technology, e.g. `SCINTILLATOR`.
    Detector(&'static str),
    /// Transducer model name.
    Transducer(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scanner {
    pub manufacturer: &'static str,
    pub model: &'static str,
    pub capability: ScannerCapability,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowPreset {
    pub name: &'static str,
    pub center: f64,
    pub width: f64,
}

/// Display window chosen for a series.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub center: f64,
    pub width: f64,
    pub explanation: String,
}

impl From<&WindowPreset> for Window {
    fn from(preset: &WindowPreset) -> Self {
        Window {
            center: preset.center,
            width: preset.width,
            explanation: preset.name.to_string(),
        }
    }
}

/// Stored pixel encoding and the value range used for synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelProfile {
    pub bits_allocated: u16,
    pub bits_stored: u16,
    pub high_bit: u16,
    pub signed: bool,
    pub min: i32,
    pub max: i32,
    /// Mid-tissue intensity around which the synthetic field is built.
    pub base: i32,
}

impl PixelProfile {
    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits_allocated / 8)
    }

    pub fn pixel_representation(&self) -> u16 {
        u16::from(self.signed)
    }
}

/// Modality-specific acquisition values shared by all images of a series.
#[derive(Debug, Clone, PartialEq)]
pub enum Acquisition {
    Mr {
        echo_time: f64,
        repetition_time: f64,
        flip_angle: f64,
        sequence_name: &'static str,
        field_strength: f64,
        imaging_frequency: f64,
    },
    Ct {
        kvp: f64,
        tube_current: u32,
        kernel: &'static str,
        rescale_intercept: f64,
        rescale_slope: f64,
        gantry_tilt: f64,
    },
    Cr {
        kvp: f64,
        exposure_mas: u32,
        plate_type: &'static str,
        view_position: &'static str,
    },
    Dx {
        kvp: f64,
        exposure_mas: u32,
        source_to_detector: f64,
        detector_type: &'static str,
        view_position: &'static str,
    },
    Us {
        transducer_type: &'static str,
        /// kHz.
        transducer_frequency: u32,
        /// mm.
        depth: u32,
    },
    Mg {
        kvp: f64,
        exposure_mas: u32,
        anode: &'static str,
        filter: &'static str,
        compression_force: f64,
        body_part_thickness: f64,
        laterality: &'static str,
        view_position: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesParameters {
    pub scanner: Scanner,
    pub pixel_spacing: f64,
    /// Cross-sectional modalities only.
    pub slice_thickness: Option<f64>,
    pub spacing_between_slices: Option<f64>,
    pub window: Window,
    /// Short text used in the series description.
    pub label: String,
    pub acquisition: Acquisition,
}

/// Capabilities every modality provides to the render pipeline.
pub trait ModalityProfile: Send + Sync {
    fn modality(&self) -> Modality;

    fn sop_class_uid(&self) -> &'static str;

    fn scanners(&self) -> &'static [Scanner];

    /// Draw the acquisition parameters of one series.
    fn series_parameters(&self, scanner: &Scanner, rng: &mut dyn RngCore) -> SeriesParameters;

    fn pixel_profile(&self) -> PixelProfile;

    /// Push the modality-specific elements of one image.
    fn append_elements(&self, elements: &mut Vec<Element>, params: &SeriesParameters);

    fn window_presets(&self) -> &'static [WindowPreset];
}

/// Uniform pick from a non-empty table.
pub(crate) fn pick<'a, T>(items: &'a [T], rng: &mut dyn RngCore) -> &'a T {
    &items[rng.gen_range(0..items.len())]
}

pub(crate) fn preset(
    presets: &'static [WindowPreset],
    name: &str,
) -> Option<&'static WindowPreset> {
    presets.iter().find(|p| p.name == name)
}

/// Decimal string value: six decimals at most, trailing zeros removed.
pub fn format_ds(value: f64) -> String {
    let text = format!("{value:.6}");
    let trimmed = text.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" | "" => "0".to_string(),
        other => other.to_string(),
    }
}
