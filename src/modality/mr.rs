//
// mr.rs
// dicom-forge
//
// Magnetic resonance profile: scanner catalogue and sequence timing (TR/TE/flip angle).
//
// Thales Matheus Mendonça Santos - November 2025

use dicom::core::{Tag, VR};
use rand::{Rng, RngCore};

use super::{
    format_ds, pick, Acquisition, Modality, ModalityProfile, PixelProfile, Scanner,
    ScannerCapability, SeriesParameters, Window, WindowPreset,
};
use crate::codec::Element;

/// Gyromagnetic ratio of hydrogen, MHz per tesla.
const GYROMAGNETIC_RATIO: f64 = 42.58;

static SCANNERS: [Scanner; 6] = [
    mr("SIEMENS", "Avanto", 1.5),
    mr("SIEMENS", "Skyra", 3.0),
    mr("GE MEDICAL SYSTEMS", "Signa HDxt", 1.5),
    mr("GE MEDICAL SYSTEMS", "Discovery MR750", 3.0),
    mr("PHILIPS", "Achieva", 1.5),
    mr("PHILIPS", "Ingenia", 3.0),
];

const fn mr(manufacturer: &'static str, model: &'static str, tesla: f64) -> Scanner {
    Scanner {
        manufacturer,
        model,
        capability: ScannerCapability::FieldStrength(tesla),
    }
}

static PRESETS: [WindowPreset; 3] = [
    WindowPreset { name: "DEFAULT", center: 500.0, width: 1000.0 },
    WindowPreset { name: "BRIGHT", center: 300.0, width: 600.0 },
    WindowPreset { name: "CONTRAST", center: 600.0, width: 1200.0 },
];

const SEQUENCES: [&str; 4] = ["T1_MPRAGE", "T1_SE", "T2_FSE", "T2_FLAIR"];

pub struct MrProfile;

impl ModalityProfile for MrProfile {
    fn modality(&self) -> Modality {
        Modality::Mr
    }

    fn sop_class_uid(&self) -> &'static str {
        "1.2.840.10008.5.1.4.1.1.4"
    }

    fn scanners(&self) -> &'static [Scanner] {
        &SCANNERS
    }

    fn series_parameters(&self, scanner: &Scanner, rng: &mut dyn RngCore) -> SeriesParameters {
        let field_strength = match scanner.capability {
            ScannerCapability::FieldStrength(t) => t,
            _ => 1.5,
        };
        let pixel_spacing = rng.gen_range(0.5..2.0);
        let slice_thickness = rng.gen_range(1.0..5.0);
        let spacing_between_slices = slice_thickness + rng.gen_range(0.0..0.5);
        let echo_time = rng.gen_range(10.0..30.0);
        let repetition_time = rng.gen_range(400.0..800.0);
        let flip_angle = rng.gen_range(60.0..90.0);
        let sequence_name = *pick(&SEQUENCES, rng);
        let window = Window {
            center: rng.gen_range(500.0..1500.0),
            width: rng.gen_range(1000.0..2000.0),
            explanation: "USER".to_string(),
        };

        SeriesParameters {
            scanner: *scanner,
            pixel_spacing,
            slice_thickness: Some(slice_thickness),
            spacing_between_slices: Some(spacing_between_slices),
            window,
            label: sequence_name.to_string(),
            acquisition: Acquisition::Mr {
                echo_time,
                repetition_time,
                flip_angle,
                sequence_name,
                field_strength,
                imaging_frequency: field_strength * GYROMAGNETIC_RATIO,
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
            &["ORIGINAL", "PRIMARY", "M", "ND"],
        ));
        let Acquisition::Mr {
            echo_time,
            repetition_time,
            flip_angle,
            sequence_name,
            field_strength,
            imaging_frequency,
        } = &params.acquisition
        else {
            return;
        };
        let scanning_sequence = if sequence_name.starts_with("T1_MPRAGE") {
            "GR"
        } else {
            "SE"
        };

        elements.extend([
            Element::text(Tag(0x0018, 0x0020), VR::CS, scanning_sequence), // ScanningSequence
            Element::text(Tag(0x0018, 0x0023), VR::CS, "3D"), // MRAcquisitionType
            Element::text(Tag(0x0018, 0x0024), VR::SH, *sequence_name), // SequenceName
            Element::text(Tag(0x0018, 0x0080), VR::DS, format_ds(*repetition_time)), // RepetitionTime
            Element::text(Tag(0x0018, 0x0081), VR::DS, format_ds(*echo_time)), // EchoTime
            Element::text(Tag(0x0018, 0x0084), VR::DS, format_ds(*imaging_frequency)), // ImagingFrequency
            Element::text(Tag(0x0018, 0x0085), VR::SH, "1H"), // ImagedNucleus
            Element::text(Tag(0x0018, 0x0087), VR::DS, format_ds(*field_strength)), // MagneticFieldStrength
            Element::text(Tag(0x0018, 0x1314), VR::DS, format_ds(*flip_angle)), // FlipAngle
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
    fn parameters_stay_in_clinical_ranges() {
        let mut rng = StdRng::seed_from_u64(42);
        for scanner in MrProfile.scanners() {
            let params = MrProfile.series_parameters(scanner, &mut rng);
            let thickness = params.slice_thickness.unwrap();
            assert!((1.0..5.0).contains(&thickness));
            assert!(params.spacing_between_slices.unwrap() >= thickness);
            match params.acquisition {
                Acquisition::Mr {
                    echo_time,
                    repetition_time,
                    flip_angle,
                    field_strength,
                    imaging_frequency,
                    ..
                } => {
                    assert!((10.0..30.0).contains(&echo_time));
                    assert!((400.0..800.0).contains(&repetition_time));
                    assert!((60.0..90.0).contains(&flip_angle));
                    assert!((imaging_frequency - field_strength * 42.58).abs() < 1e-9);
                }
                other => panic!("unexpected acquisition {other:?}"),
            }
        }
    }

    #[test]
    fn field_strength_follows_scanner() {
        let mut rng = StdRng::seed_from_u64(1);
        let skyra = SCANNERS[1];
        let params = MrProfile.series_parameters(&skyra, &mut rng);
        let mut elements = Vec::new();
        MrProfile.append_elements(&mut elements, &params);
        let strength = elements
            .iter()
            .find(|e| e.tag == Tag(0x0018, 0x0087))
            .and_then(|e| e.raw())
            .unwrap();
        assert_eq!(strength, b"3");
    }
}
