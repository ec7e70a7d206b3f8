//
// us.rs
// dicom-forge
//
// Ultrasound profile: 8-bit samples with transducer data and scan depth.
//
// Thales Matheus Mendonça Santos - November 2025

use dicom::core::{Tag, VR};
use rand::{Rng, RngCore};

use super::{
    pick, Acquisition, Modality, ModalityProfile, PixelProfile, Scanner, ScannerCapability,
    SeriesParameters, Window, WindowPreset,
};
use crate::codec::Element;

static SCANNERS: [Scanner; 4] = [
    Scanner {
        manufacturer: "GE HEALTHCARE",
        model: "LOGIQ E10",
        capability: ScannerCapability::Transducer("C1-6-D"),
    },
    Scanner {
        manufacturer: "PHILIPS",
        model: "EPIQ 7",
        capability: ScannerCapability::Transducer("C5-1"),
    },
    Scanner {
        manufacturer: "SIEMENS",
        model: "ACUSON Sequoia",
        capability: ScannerCapability::Transducer("5C1"),
    },
    Scanner {
        manufacturer: "CANON",
        model: "Aplio i800",
        capability: ScannerCapability::Transducer("i8CX1"),
    },
];

static PRESETS: [WindowPreset; 2] = [
    WindowPreset { name: "DEFAULT", center: 128.0, width: 256.0 },
    WindowPreset { name: "HIGH CONTRAST", center: 110.0, width: 180.0 },
];

const TRANSDUCER_TYPES: [&str; 3] = ["CURVED LINEAR", "LINEAR", "SECTOR_PHASED"];

pub struct UsProfile;

impl ModalityProfile for UsProfile {
    fn modality(&self) -> Modality {
        Modality::Us
    }

    fn sop_class_uid(&self) -> &'static str {
        "1.2.840.10008.5.1.4.1.1.6.1"
    }

    fn scanners(&self) -> &'static [Scanner] {
        &SCANNERS
    }

    fn series_parameters(&self, scanner: &Scanner, rng: &mut dyn RngCore) -> SeriesParameters {
        let transducer_type = *pick(&TRANSDUCER_TYPES, rng);
        let transducer_frequency = rng.gen_range(2_000..=15_000);
        let depth = rng.gen_range(40..=240);
        let pixel_spacing = rng.gen_range(0.1..0.5);
        let window = Window::from(pick(&PRESETS, rng));

        SeriesParameters {
            scanner: *scanner,
            pixel_spacing,
            slice_thickness: None,
            spacing_between_slices: None,
            window,
            label: "B-MODE".to_string(),
            acquisition: Acquisition::Us {
                transducer_type,
                transducer_frequency,
                depth,
            },
        }
    }

    fn pixel_profile(&self) -> PixelProfile {
        PixelProfile {
            bits_allocated: 8,
            bits_stored: 8,
            high_bit: 7,
            signed: false,
            min: 0,
            max: 255,
            base: 128,
        }
    }

    fn append_elements(&self, elements: &mut Vec<Element>, params: &SeriesParameters) {
        elements.push(Element::strings(
            Tag(0x0008, 0x0008), // ImageType
            VR::CS,
            &["ORIGINAL", "PRIMARY", "ABDOM", "0001"],
        ));
        let Acquisition::Us {
            transducer_type,
            transducer_frequency,
            depth,
        } = &params.acquisition
        else {
            return;
        };
        let transducer = match params.scanner.capability {
            ScannerCapability::Transducer(name) => name,
            _ => "UNKNOWN",
        };

        elements.extend([
            Element::text(Tag(0x0018, 0x5010), VR::LO, transducer), // TransducerData
            Element::text(Tag(0x0018, 0x5050), VR::IS, depth.to_string()), // DepthOfScanField
            Element::u32(Tag(0x0018, 0x6030), *transducer_frequency), // TransducerFrequency
            Element::text(Tag(0x0018, 0x6031), VR::CS, *transducer_type), // TransducerType
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
    fn eight_bit_profile() {
        let profile = UsProfile.pixel_profile();
        assert_eq!(profile.bytes_per_sample(), 1);
        assert_eq!((profile.min, profile.max), (0, 255));
    }

    #[test]
    fn transducer_frequency_is_binary_ul() {
        let mut rng = StdRng::seed_from_u64(2);
        let params = UsProfile.series_parameters(&SCANNERS[1], &mut rng);
        let mut elements = Vec::new();
        UsProfile.append_elements(&mut elements, &params);
        let frequency = elements
            .iter()
            .find(|e| e.tag == Tag(0x0018, 0x6030))
            .unwrap();
        assert_eq!(frequency.vr, VR::UL);
        let raw = frequency.raw().unwrap();
        let khz = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        assert!((2_000..=15_000).contains(&khz));
        assert!(elements
            .iter()
            .any(|e| e.tag == Tag(0x0018, 0x5010) && e.raw() == Some(b"C5-1".as_slice())));
    }
}
