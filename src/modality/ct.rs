//
// ct.rs
// dicom-forge
//
// Computed tomography profile: signed Hounsfield pixels with rescale -1024/1 and tube settings.
//
// Thales Matheus Mendonça Santos - November 2025

use dicom::core::{Tag, VR};
use rand::{Rng, RngCore};

use super::{
    format_ds, pick, preset, Acquisition, Modality, ModalityProfile, PixelProfile, Scanner,
    ScannerCapability, SeriesParameters, Window, WindowPreset,
};
use crate::codec::Element;

static SCANNERS: [Scanner; 8] = [
    ct("SIEMENS", "SOMATOM Definition AS+", 128),
    ct("SIEMENS", "SOMATOM Force", 192),
    ct("GE MEDICAL SYSTEMS", "Revolution CT", 256),
    ct("GE MEDICAL SYSTEMS", "LightSpeed VCT", 64),
    ct("PHILIPS", "Brilliance iCT", 256),
    ct("PHILIPS", "Ingenuity CT", 128),
    ct("CANON", "Aquilion ONE", 320),
    ct("CANON", "Aquilion Prime", 80),
];

const fn ct(manufacturer: &'static str, model: &'static str, rows: u32) -> Scanner {
    Scanner {
        manufacturer,
        model,
        capability: ScannerCapability::DetectorRows(rows),
    }
}

static PRESETS: [WindowPreset; 7] = [
    WindowPreset { name: "BRAIN", center: 40.0, width: 80.0 },
    WindowPreset { name: "SUBDURAL", center: 75.0, width: 215.0 },
    WindowPreset { name: "BONE", center: 400.0, width: 2000.0 },
    WindowPreset { name: "LUNG", center: -600.0, width: 1500.0 },
    WindowPreset { name: "MEDIASTINUM", center: 40.0, width: 400.0 },
    WindowPreset { name: "ABDOMEN", center: 40.0, width: 350.0 },
    WindowPreset { name: "LIVER", center: 60.0, width: 150.0 },
];

const KVP_OPTIONS: [f64; 4] = [80.0, 100.0, 120.0, 140.0];
const KERNELS: [&str; 4] = ["SOFT", "STANDARD", "BONE", "LUNG"];

/// Window matching a reconstruction kernel; soft-tissue kernels use the mediastinal window.
fn window_for_kernel(kernel: &str) -> Window {
    let name = match kernel {
        "BONE" => "BONE",
        "LUNG" => "LUNG",
        _ => "MEDIASTINUM",
    };
    preset(&PRESETS, name)
        .map(Window::from)
        .unwrap_or(Window {
            center: 40.0,
            width: 400.0,
            explanation: name.to_string(),
        })
}

pub struct CtProfile;

impl ModalityProfile for CtProfile {
    fn modality(&self) -> Modality {
        Modality::Ct
    }

    fn sop_class_uid(&self) -> &'static str {
        "1.2.840.10008.5.1.4.1.1.2"
    }

    fn scanners(&self) -> &'static [Scanner] {
        &SCANNERS
    }

    fn series_parameters(&self, scanner: &Scanner, rng: &mut dyn RngCore) -> SeriesParameters {
        let kvp = *pick(&KVP_OPTIONS, rng);
        let kernel = *pick(&KERNELS, rng);
        let pixel_spacing = rng.gen_range(0.5..1.0);
        let slice_thickness = rng.gen_range(0.5..3.0);
        let tube_current = rng.gen_range(100..=400);

        SeriesParameters {
            scanner: *scanner,
            pixel_spacing,
            slice_thickness: Some(slice_thickness),
            spacing_between_slices: Some(slice_thickness),
            window: window_for_kernel(kernel),
            label: format!("AXIAL {kernel}"),
            acquisition: Acquisition::Ct {
                kvp,
                tube_current,
                kernel,
                rescale_intercept: -1024.0,
                rescale_slope: 1.0,
                gantry_tilt: 0.0,
            },
        }
    }

    fn pixel_profile(&self) -> PixelProfile {
        PixelProfile {
            bits_allocated: 16,
            bits_stored: 16,
            high_bit: 15,
            signed: true,
            min: -1024,
            max: 3071,
            base: 1024,
        }
    }

    fn append_elements(&self, elements: &mut Vec<Element>, params: &SeriesParameters) {
        elements.push(Element::strings(
            Tag(0x0008, 0x0008), // ImageType
            VR::CS,
            &["ORIGINAL", "PRIMARY", "AXIAL"],
        ));
        let Acquisition::Ct {
            kvp,
            tube_current,
            kernel,
            rescale_intercept,
            rescale_slope,
            gantry_tilt,
        } = &params.acquisition
        else {
            return;
        };

        elements.extend([
            Element::text(Tag(0x0018, 0x0060), VR::DS, format_ds(*kvp)), // KVP
            Element::text(Tag(0x0018, 0x1120), VR::DS, format_ds(*gantry_tilt)), // GantryDetectorTilt
            Element::text(Tag(0x0018, 0x1151), VR::IS, tube_current.to_string()), // XRayTubeCurrent
            Element::text(Tag(0x0018, 0x1210), VR::SH, *kernel), // ConvolutionKernel
            Element::text(Tag(0x0028, 0x1052), VR::DS, format_ds(*rescale_intercept)), // RescaleIntercept
            Element::text(Tag(0x0028, 0x1053), VR::DS, format_ds(*rescale_slope)), // RescaleSlope
            Element::text(Tag(0x0028, 0x1054), VR::LO, "HU"), // RescaleType
        ]);
    }

    fn window_presets(&self) -> &'static [WindowPreset] {
        &PRESETS
    }
}
