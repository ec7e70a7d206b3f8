//
// dx.rs
// dicom-forge
//
// Digital radiography profile: detector type and source distance for projection views.
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
        manufacturer: "SIEMENS",
        model: "Ysio Max",
        capability: ScannerCapability::Detector("SCINTILLATOR"),
    },
    Scanner {
        manufacturer: "GE HEALTHCARE",
        model: "Discovery XR656",
        capability: ScannerCapability::Detector("SCINTILLATOR"),
    },
    Scanner {
        manufacturer: "PHILIPS",
        model: "DigitalDiagnost C90",
        capability: ScannerCapability::Detector("SCINTILLATOR"),
    },
    Scanner {
        manufacturer: "Carestream Health",
        model: "DRX-Evolution Plus",
        capability: ScannerCapability::Detector("DIRECT"),
    },
];

static PRESETS: [WindowPreset; 3] = [
    WindowPreset { name: "DEFAULT", center: 8192.0, width: 16384.0 },
    WindowPreset { name: "CHEST", center: 7000.0, width: 12000.0 },
    WindowPreset { name: "BONE", center: 9500.0, width: 10000.0 },
];

const VIEWS: [&str; 4] = ["AP", "PA", "LAT", "OBL"];

pub struct DxProfile;

impl ModalityProfile for DxProfile {
    fn modality(&self) -> Modality {
        Modality::Dx
    }

    fn sop_class_uid(&self) -> &'static str {
        "1.2.840.10008.5.1.4.1.1.1.1"
    }

    fn scanners(&self) -> &'static [Scanner] {
        &SCANNERS
    }

    fn series_parameters(&self, scanner: &Scanner, rng: &mut dyn RngCore) -> SeriesParameters {
        let detector_type = match scanner.capability {
            ScannerCapability::Detector(kind) => kind,
            _ => "SCINTILLATOR",
        };
        let kvp = f64::from(rng.gen_range(60u32..=125));
        let exposure_mas = rng.gen_range(1..=32);
        let source_to_detector = f64::from(rng.gen_range(1000u32..=1800));
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
            acquisition: Acquisition::Dx {
                kvp,
                exposure_mas,
                source_to_detector,
                detector_type,
                view_position,
            },
        }
    }

    fn pixel_profile(&self) -> PixelProfile {
        PixelProfile {
            bits_allocated: 16,
            bits_stored: 14,
            high_bit: 13,
            signed: false,
            min: 0,
            max: 16383,
            base: 8192,
        }
    }

    fn append_elements(&self, elements: &mut Vec<Element>, params: &SeriesParameters) {
        elements.push(Element::strings(
            Tag(0x0008, 0x0008), // ImageType
            VR::CS,
            &["ORIGINAL", "PRIMARY"],
        ));
        elements.push(Element::text(
            Tag(0x0008, 0x0068), // PresentationIntentType
            VR::CS,
            "FOR PRESENTATION",
        ));
        let Acquisition::Dx {
            kvp,
            exposure_mas,
            source_to_detector,
            detector_type,
            view_position,
        } = &params.acquisition
        else {
            return;
        };
        let spacing = format_ds(params.pixel_spacing);

        elements.extend([
            Element::text(Tag(0x0018, 0x0060), VR::DS, format_ds(*kvp)), // KVP
            Element::text(Tag(0x0018, 0x1110), VR::DS, format_ds(*source_to_detector)), // DistanceSourceToDetector
            Element::text(Tag(0x0018, 0x1152), VR::IS, exposure_mas.to_string()), // Exposure
            Element::strings(Tag(0x0018, 0x1164), VR::DS, &[spacing.as_str(), spacing.as_str()]), // ImagerPixelSpacing
            Element::text(Tag(0x0018, 0x5101), VR::CS, *view_position), // ViewPosition
            Element::text(Tag(0x0018, 0x7004), VR::CS, *detector_type), // DetectorType
        ]);
    }

    fn window_presets(&self) -> &'static [WindowPreset] {
        &PRESETS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn detector_type_comes_from_scanner() {
        let mut rng = StdRng::seed_from_u64(9);
        let params = DxProfile.series_parameters(&SCANNERS[3], &mut rng);
        match params.acquisition {
            Acquisition::Dx {
                detector_type,
                source_to_detector,
                ..
            } => {
                assert_eq!(detector_type, "DIRECT");
                assert!((1000.0..=1800.0).contains(&source_to_detector));
            }
            other => panic!("unexpected acquisition {other:?}"),
        }
    }

    #[test]
    fn marks_images_for_presentation() {
        let mut rng = StdRng::seed_from_u64(9);
        let params = DxProfile.series_parameters(&SCANNERS[0], &mut rng);
        let mut elements = Vec::new();
        DxProfile.append_elements(&mut elements, &params);
        let intent = elements
            .iter()
            .find(|e| e.tag == Tag(0x0008, 0x0068))
            .and_then(|e| e.raw())
            .unwrap();
        assert_eq!(intent, b"FOR PRESENTATION");
    }
}
