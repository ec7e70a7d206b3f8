//
// mg.rs
// dicom-forge
//
// Mammography profile: anode/filter materials, compression force and laterality per view.
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
        manufacturer: "HOLOGIC, Inc.",
        model: "Selenia Dimensions",
        capability: ScannerCapability::Detector("DIRECT"),
    },
    Scanner {
        manufacturer: "GE HEALTHCARE",
        model: "Senographe Pristina",
        capability: ScannerCapability::Detector("SCINTILLATOR"),
    },
    Scanner {
        manufacturer: "SIEMENS",
        model: "MAMMOMAT Revelation",
        capability: ScannerCapability::Detector("DIRECT"),
    },
    Scanner {
        manufacturer: "FUJIFILM Corporation",
        model: "AMULET Innovality",
        capability: ScannerCapability::Detector("DIRECT"),
    },
];

static PRESETS: [WindowPreset; 2] = [
    WindowPreset { name: "DEFAULT", center: 8192.0, width: 16384.0 },
    WindowPreset { name: "DENSE", center: 9000.0, width: 6000.0 },
];

/// Anode target paired with its usual filter.
const TARGETS: [(&str, &str); 3] = [
    ("MOLYBDENUM", "MOLYBDENUM"),
    ("RHODIUM", "RHODIUM"),
    ("TUNGSTEN", "RHODIUM"),
];
const LATERALITIES: [&str; 2] = ["L", "R"];
const VIEWS: [&str; 2] = ["CC", "MLO"];

pub struct MgProfile;

impl ModalityProfile for MgProfile {
    fn modality(&self) -> Modality {
        Modality::Mg
    }

    fn sop_class_uid(&self) -> &'static str {
        "1.2.840.10008.5.1.4.1.1.1.2"
    }

    fn scanners(&self) -> &'static [Scanner] {
        &SCANNERS
    }

    fn series_parameters(&self, scanner: &Scanner, rng: &mut dyn RngCore) -> SeriesParameters {
        let kvp = f64::from(rng.gen_range(25u32..=35));
        let exposure_mas = rng.gen_range(40..=200);
        let (anode, filter) = *pick(&TARGETS, rng);
        let compression_force = rng.gen_range(50.0..200.0);
        let body_part_thickness = rng.gen_range(20.0..80.0);
        let laterality = *pick(&LATERALITIES, rng);
        let view_position = *pick(&VIEWS, rng);
        let pixel_spacing = rng.gen_range(0.05..0.1);
        let window = Window::from(pick(&PRESETS, rng));

        SeriesParameters {
            scanner: *scanner,
            pixel_spacing,
            slice_thickness: None,
            spacing_between_slices: None,
            window,
            label: format!("{laterality} {view_position}"),
            acquisition: Acquisition::Mg {
                kvp,
                exposure_mas,
                anode,
                filter,
                compression_force,
                body_part_thickness,
                laterality,
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
        let Acquisition::Mg {
            kvp,
            exposure_mas,
            anode,
            filter,
            compression_force,
            body_part_thickness,
            laterality,
            view_position,
        } = &params.acquisition
        else {
            return;
        };

        elements.extend([
            Element::text(Tag(0x0018, 0x0060), VR::DS, format_ds(*kvp)), // KVP
            Element::text(Tag(0x0018, 0x1152), VR::IS, exposure_mas.to_string()), // Exposure
            Element::text(Tag(0x0018, 0x1191), VR::CS, *anode), // AnodeTargetMaterial
            Element::text(Tag(0x0018, 0x11A0), VR::DS, format_ds(*body_part_thickness)), // BodyPartThickness
            Element::text(Tag(0x0018, 0x11A2), VR::DS, format_ds(*compression_force)), // CompressionForce
            Element::text(Tag(0x0018, 0x5101), VR::CS, *view_position), // ViewPosition
            Element::text(Tag(0x0018, 0x7050), VR::CS, *filter), // FilterMaterial
            Element::text(Tag(0x0020, 0x0062), VR::CS, *laterality), // ImageLaterality
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
    fn mammography_uses_low_kvp_and_records_laterality() {
        let mut rng = StdRng::seed_from_u64(21);
        let params = MgProfile.series_parameters(&SCANNERS[0], &mut rng);
        let Acquisition::Mg { kvp, laterality, view_position, .. } = &params.acquisition else {
            panic!("not a mammography acquisition");
        };
        assert!((25.0..=35.0).contains(kvp));
        assert_eq!(params.label, format!("{laterality} {view_position}"));

        let mut elements = Vec::new();
        MgProfile.append_elements(&mut elements, &params);
        assert!(elements
            .iter()
            .any(|e| e.tag == Tag(0x0020, 0x0062) && e.raw() == Some(laterality.as_bytes())));
    }
}
