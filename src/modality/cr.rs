//
// cr.rs
// dicom-forge
//
// Computed radiography profile: plate type and exposure for projection views.
//
// Thales Matheus Mendonça Santos - November 2025

use dicom::core::{Tag, VR};
use rand::{Rng, RngCore};

use super::{
    format_ds, pick, Acquisition, Modality, ModalityProfile, PixelProfile, Scanner,
    ScannerCapability, SeriesParameters, Window, WindowPreset,
};
use crate::codec::Element;

static SCANNERS: [Scanner; 4] = [
    Scanner {
        manufacturer: "AGFA",
        model: "CR 85-X",
        capability: ScannerCapability::Detector("STORAGE PHOSPHOR"),
    },
    Scanner {
        manufacturer: "FUJIFILM Corporation",
        model: "FCR PROFECT CS",
        capability: ScannerCapability::Detector("STORAGE PHOSPHOR"),
    },
    Scanner {
        manufacturer: "CARESTREAM HEALTH",
        model: "DirectView CR 975",
        capability: ScannerCapability::Detector("STORAGE PHOSPHOR"),
    },
    Scanner {
        manufacturer: "KONICA MINOLTA",
        model: "REGIUS 190",
        capability: ScannerCapability::Detector("STORAGE PHOSPHOR"),
    },
];

static PRESETS: [WindowPreset; 3] = [
    WindowPreset { name: "DEFAULT", center: 2048.0, width: 4096.0 },
    WindowPreset { name: "SOFT TISSUE", center: 1800.0, width: 2500.0 },
    WindowPreset { name: "BONE", center: 2600.0, width: 3000.0 },
];

const PLATE_TYPES: [&str; 3] = ["ST-VI", "HR-V", "CP-1M"];
const VIEWS: [&str; 4] = ["AP", "PA", "LAT", "LL"];

pub struct CrProfile;

impl ModalityProfile for CrProfile {
    fn modality(&self) -> Modality {
        Modality::Cr
    }

    fn sop_class_uid(&self) -> &'static str {
        "1.2.840.10008.5.1.4.1.1.1"
    }

    fn scanners(&self) -> &'static [Scanner] {
        &SCANNERS
    }

    fn series_parameters(&self, scanner: &Scanner, rng: &mut dyn RngCore) -> SeriesParameters {
        let kvp = f64::from(rng.gen_range(60u32..=120));
        let exposure_mas = rng.gen_range(2..=40);
        let plate_type = *pick(&PLATE_TYPES, rng);
        let view_position = *pick(&VIEWS, rng);
        let pixel_spacing = rng.gen_range(0.1..0.2);
        let window = Window::from(pick(&PRESETS, rng));

        SeriesParameters {
            scanner: *scanner,
            pixel_spacing,
            slice_thickness: None,
            spacing_between_slices: None,
            window,
            label: view_position.to_string(),
            acquisition: Acquisition::Cr {
                kvp,
                exposure_mas,
                plate_type,
                view_position,
            },
        }
    }

    fn pixel_profile(&self) -> PixelProfile {
        PixelProfile {
            bits_allocated: 16,
            bits_stored: 12,
            high_bit: 11,
            signed: false,
            min: 0,
            max: 4095,
            base: 2048,
        }
    }

    fn append_elements(&self, elements: &mut Vec<Element>, params: &SeriesParameters) {
        elements.push(Element::strings(
            Tag(0x0008, 0x0008), // ImageType
            VR::CS,
            &["ORIGINAL", "PRIMARY"],
        ));
        let Acquisition::Cr {
            kvp,
            exposure_mas,
            plate_type,
            view_position,
        } = &params.acquisition
        else {
            return;
        };
        let spacing = format_ds(params.pixel_spacing);

        elements.extend([
            Element::text(Tag(0x0018, 0x0060), VR::DS, format_ds(*kvp)), // KVP
            Element::text(Tag(0x0018, 0x1152), VR::IS, exposure_mas.to_string()), // Exposure
            Element::strings(
                Tag(0x0018, 0x1164), // ImagerPixelSpacing
                VR::DS,
                &[spacing.as_str(), spacing.as_str()],
            ),
            Element::text(Tag(0x0018, 0x1260), VR::SH, *plate_type), // PlateType
            Element::text(Tag(0x0018, 0x5101), VR::CS, *view_position), // ViewPosition
        ]);
    }

    fn window_presets(&self) -> &'static [WindowPreset] {
        &PRESETS
    }
}
