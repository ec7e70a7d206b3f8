//
// generation_workflows.rs
// dicom-forge
//
// End-to-end tests: generate complete file sets on disk and check determinism, the DICOMDIR
// hierarchy, modality encoding, corruption signatures and readability with dicom-rs.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use dicom::core::Tag;
use dicom::object::open_file;
use dicom_forge::codec::{read_part10, ParsedItem, PIXEL_DATA};
use dicom_forge::corruption::{CorruptionPolicy, MALFORMED_TARGET};
use dicom_forge::dicomdir::DICOMDIR_FILE;
use dicom_forge::modality::Modality;
use dicom_forge::{generate, ForgeError, GenerationConfig, NoProgress};
use tempfile::tempdir;
use walkdir::WalkDir;

fn small_config(output_dir: PathBuf) -> GenerationConfig {
    GenerationConfig {
        num_images: 5,
        total_size: 500 * 1024,
        output_dir,
        workers: Some(2),
        ..GenerationConfig::default()
    }
}

/// Every file under `root`, keyed by its path relative to `root`.
fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let relative = e.path().strip_prefix(root).expect("under root").to_path_buf();
            (relative, fs::read(e.path()).expect("read"))
        })
        .collect()
}

fn element_text(path: &Path, tag: Tag) -> String {
    let obj = open_file(path).expect("dicom-rs opens generated file");
    obj.element(tag)
        .expect("element present")
        .to_str()
        .expect("text value")
        .trim_end_matches(['\0', ' '])
        .to_string()
}

fn record_items(root: &Path) -> Vec<ParsedItem> {
    let parsed = read_part10(&root.join(DICOMDIR_FILE)).expect("parse DICOMDIR");
    parsed
        .get(Tag(0x0004, 0x1220))
        .expect("record sequence")
        .items
        .clone()
}

fn record_type(item: &ParsedItem) -> String {
    item.get(Tag(0x0004, 0x1430))
        .map(|e| e.text())
        .unwrap_or_default()
}

#[test]
fn same_directory_name_gives_identical_bytes() {
    let first = tempdir().expect("tempdir");
    let second = tempdir().expect("tempdir");
    let a = first.path().join("forge_set");
    let b = second.path().join("forge_set");

    let files_a = generate(&small_config(a.clone()), &NoProgress).expect("generate a");
    let files_b = generate(&small_config(b.clone()), &NoProgress).expect("generate b");
    assert_eq!(files_a.len(), 5);

    let snap_a = snapshot(&a);
    assert_eq!(snap_a.len(), 6, "five images and the DICOMDIR");
    assert_eq!(snap_a, snapshot(&b));
    assert_eq!(files_a[0].sop_instance_uid, files_b[0].sop_instance_uid);
}

#[test]
fn small_set_indexes_one_patient_study_and_series() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path().join("scenario_a");
    let mut config = small_config(root.clone());
    config.seed = Some(42);
    let files = generate(&config, &NoProgress).expect("generate");

    let types: Vec<String> = record_items(&root).iter().map(record_type).collect();
    assert_eq!(
        types,
        ["PATIENT", "STUDY", "SERIES", "IMAGE", "IMAGE", "IMAGE", "IMAGE", "IMAGE"]
    );

    for (n, file) in files.iter().enumerate() {
        let expected = root
            .join("PT000000")
            .join("ST000000")
            .join("SE000000")
            .join(format!("IM{:06}", n + 1));
        assert_eq!(file.path, expected);
        assert_eq!(element_text(&file.path, Tag(0x0008, 0x0018)), file.sop_instance_uid);
        assert_eq!(element_text(&file.path, Tag(0x0028, 0x0010)), "128");
    }
}

#[test]
fn dicomdir_links_point_at_child_and_sibling_records() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path().join("linked");
    let config = GenerationConfig {
        num_images: 12,
        total_size: 2 * 1024 * 1024,
        output_dir: root.clone(),
        seed: Some(7),
        num_patients: 2,
        num_studies: 3,
        series_per_study: "2".parse().expect("range"),
        ..GenerationConfig::default()
    };
    let files = generate(&config, &NoProgress).expect("generate");
    let items = record_items(&root);
    let by_offset: BTreeMap<u64, &ParsedItem> = items.iter().map(|i| (i.offset, i)).collect();

    let child_type = |parent: &str| match parent {
        "PATIENT" => Some("STUDY"),
        "STUDY" => Some("SERIES"),
        "SERIES" => Some("IMAGE"),
        _ => None,
    };

    for item in &items {
        let kind = record_type(item);
        let lower = item
            .get(Tag(0x0004, 0x1420))
            .and_then(|e| e.u32())
            .expect("lower offset");
        match child_type(&kind) {
            Some(expected) => {
                let child = by_offset.get(&u64::from(lower)).expect("child record");
                assert_eq!(record_type(child), expected);
            }
            None => assert_eq!(lower, 0),
        }
        let next = item
            .get(Tag(0x0004, 0x1400))
            .and_then(|e| e.u32())
            .expect("next offset");
        if next != 0 {
            let sibling = by_offset.get(&u64::from(next)).expect("sibling record");
            assert_eq!(record_type(sibling), kind);
        }
    }

    let count = |kind: &str| items.iter().filter(|i| record_type(i) == kind).count();
    assert_eq!(count("PATIENT"), 2);
    assert_eq!(count("STUDY"), 3);
    assert_eq!(count("SERIES"), 6);
    assert_eq!(count("IMAGE"), files.len());

    // every image record references a file that carries the same instance UID
    for item in items.iter().filter(|i| record_type(i) == "IMAGE") {
        let file_id = item.get(Tag(0x0004, 0x1500)).expect("file id").text();
        let path = file_id.split('\\').fold(root.clone(), |p, c| p.join(c));
        let uid = item.get(Tag(0x0004, 0x1511)).expect("instance uid").text();
        assert_eq!(element_text(&path, Tag(0x0008, 0x0018)), uid);
    }
}

#[test]
fn ct_files_are_signed_with_hounsfield_rescale() {
    let dir = tempdir().expect("tempdir");
    let mut config = small_config(dir.path().join("ct_set"));
    config.modality = Modality::Ct;
    config.seed = Some(3);
    let files = generate(&config, &NoProgress).expect("generate");

    let path = &files[0].path;
    assert_eq!(element_text(path, Tag(0x0008, 0x0060)), "CT");
    assert_eq!(element_text(path, Tag(0x0028, 0x0103)), "1");
    assert_eq!(element_text(path, Tag(0x0028, 0x1052)), "-1024");
    assert_eq!(element_text(path, Tag(0x0028, 0x1053)), "1");
    assert_eq!(
        element_text(path, Tag(0x0008, 0x0016)),
        "1.2.840.10008.5.1.4.1.1.2"
    );
}

#[test]
fn malformed_lengths_leave_odd_pixel_length() {
    let dir = tempdir().expect("tempdir");
    let mut config = small_config(dir.path().join("broken_set"));
    config.seed = Some(9);
    config.corruption = "malformed-lengths".parse::<CorruptionPolicy>().expect("policy");
    let files = generate(&config, &NoProgress).expect("generate");

    for file in &files {
        let parsed = read_part10(&file.path).expect("parse");
        let pixel = parsed.get(PIXEL_DATA).expect("pixel header");
        assert_eq!(pixel.length % 2, 1);
        assert_eq!(pixel.length, file.pixel_data_len - 1);
        assert!(parsed.get(MALFORMED_TARGET).is_some());
    }
    // the index still finds every image
    let images = record_items(&config.output_dir)
        .iter()
        .filter(|i| record_type(i) == "IMAGE")
        .count();
    assert_eq!(images, 5);
}

#[test]
fn vendor_blocks_survive_into_readable_files() {
    let dir = tempdir().expect("tempdir");
    let mut config = small_config(dir.path().join("vendor_set"));
    config.corruption = "siemens-csa,ge-private,philips-private"
        .parse::<CorruptionPolicy>()
        .expect("policy");
    let files = generate(&config, &NoProgress).expect("generate");
    let path = &files[0].path;
    assert_eq!(element_text(path, Tag(0x0029, 0x0010)), "SIEMENS CSA HEADER");
    assert_eq!(element_text(path, Tag(0x0009, 0x0010)), "GEMS_IDEN_01");
    assert_eq!(element_text(path, Tag(0x2001, 0x0010)), "Philips Imaging DD 001");
}

#[test]
fn different_seeds_diverge() {
    let dir = tempdir().expect("tempdir");
    let mut one = small_config(dir.path().join("one"));
    one.seed = Some(1);
    let mut two = small_config(dir.path().join("two"));
    two.seed = Some(2);

    let a = generate(&one, &NoProgress).expect("generate");
    let b = generate(&two, &NoProgress).expect("generate");
    let pixels = |path: &Path, offset: u64| {
        fs::read(path).expect("read")[offset as usize..].to_vec()
    };
    assert_ne!(
        pixels(&a[0].path, a[0].pixel_data_offset),
        pixels(&b[0].path, b[0].pixel_data_offset)
    );
}

#[test]
fn overrides_and_edge_cases_reach_the_files() {
    let dir = tempdir().expect("tempdir");
    let mut config = small_config(dir.path().join("override_set"));
    config.seed = Some(5);
    config.num_patients = 5;
    config.num_studies = 5;
    config
        .custom_tags
        .insert_assignment("InstitutionName=Forge Test Clinic")
        .expect("known tag");
    config.custom_tags.insert("PatientID", "FIXED01").expect("known tag");
    config.edge_cases.percentage = 100;
    config.edge_cases.types = vec!["missing-tags".parse().expect("kind")];

    let files = generate(&config, &NoProgress).expect("generate");
    for file in &files {
        assert_eq!(file.patient_id, "FIXED01");
        assert_eq!(element_text(&file.path, Tag(0x0010, 0x0020)), "FIXED01");
        assert_eq!(
            element_text(&file.path, Tag(0x0008, 0x0080)),
            "Forge Test Clinic"
        );
    }

    // every patient is edge-cased, so optional tags other than the overridden one go missing
    let optional = [
        Tag(0x0018, 0x0015),
        Tag(0x0008, 0x1030),
        Tag(0x0008, 0x103E),
        Tag(0x0008, 0x0090),
        Tag(0x0008, 0x1050),
        Tag(0x0008, 0x1070),
        Tag(0x0018, 0x1030),
    ];
    let missing = files.iter().any(|file| {
        let obj = open_file(&file.path).expect("open");
        optional.iter().any(|tag| obj.element(*tag).is_err())
    });
    assert!(missing);
}

#[test]
fn invalid_configs_fail_before_touching_disk() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path().join("never_created");

    let too_many_studies = GenerationConfig {
        num_images: 2,
        num_studies: 3,
        ..small_config(root.clone())
    };
    assert!(matches!(
        generate(&too_many_studies, &NoProgress),
        Err(ForgeError::Config(_))
    ));

    let too_small = GenerationConfig {
        total_size: 50 * 1024,
        ..small_config(root.clone())
    };
    assert!(matches!(
        generate(&too_small, &NoProgress),
        Err(ForgeError::SizeTooSmall { .. })
    ));
    assert!(!root.exists());
}
