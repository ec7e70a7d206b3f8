//
// render.rs
// dicom-forge
//
// Generation pipeline: sequential task building from the identity stream, parallel rendering
// on a bounded rayon pool, then layout and DICOMDIR indexing.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use dicom::core::{Tag, VR};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::codec::{self, Element, FileMeta, PIXEL_DATA};
use crate::config::{lookup_tag, GenerationConfig};
use crate::corruption::{self, PatchDirective};
use crate::error::{ForgeError, IoResultExt, Result};
use crate::identity::{self, IdentityStream, PatientIdentity, SeriesContext, StudyContext};
use crate::modality::{format_ds, ModalityProfile, PixelProfile};
use crate::models::GeneratedFile;
use crate::pixels;
use crate::sizing::Dimensions;
use crate::{dicomdir, layout};

/// Everything a worker needs to produce one file.
#[derive(Debug, Clone)]
pub struct RenderTask {
    /// One-based position among all images.
    pub number: usize,
    pub path: PathBuf,
    pub dims: Dimensions,
    pub profile: PixelProfile,
    pub pixel_seed: u64,
    pub overlay: String,
    pub meta: FileMeta,
    /// Dataset without pixel data, sorted by tag.
    pub elements: Vec<Element>,
    pub patches: Vec<PatchDirective>,
    /// Result record; pixel offsets are filled in once written.
    pub record: GeneratedFile,
}

/// Receives pipeline events. Every method defaults to doing nothing.
pub trait ProgressSink: Sync {
    fn started(&self, _total: usize) {}

    fn image_written(&self, _done: usize, _total: usize, _path: &Path) {}

    fn image_failed(&self, _number: usize, _error: &ForgeError) {}

    fn finished(&self, _count: usize) {}
}

/// Sink that ignores every event.
pub struct NoProgress;

impl ProgressSink for NoProgress {}

/// Sink that reports through `tracing`.
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn started(&self, total: usize) {
        info!(total, "rendering images");
    }

    fn image_written(&self, done: usize, total: usize, path: &Path) {
        debug!(done, total, path = %path.display(), "image written");
        if done == total || done % 100 == 0 {
            info!("{done}/{total} images written");
        }
    }

    fn image_failed(&self, number: usize, error: &ForgeError) {
        warn!(number, %error, "image failed");
    }

    fn finished(&self, count: usize) {
        info!(count, "generation complete");
    }
}

/// Generate the whole file set: render, lay out into PT/ST/SE/IM and write the DICOMDIR.
pub fn generate(
    config: &GenerationConfig,
    progress: &dyn ProgressSink,
) -> Result<Vec<GeneratedFile>> {
    let dims = config.validate()?;
    fs::create_dir_all(&config.output_dir).at_path(&config.output_dir)?;

    let tasks = build_tasks(config, dims);
    let workers = config.effective_workers(tasks.len());
    info!(
        images = tasks.len(),
        width = dims.width,
        height = dims.height,
        workers,
        modality = %config.modality,
        "starting generation"
    );

    let files = render_all(&tasks, workers, progress)?;
    let files = layout::organize(&config.output_dir, files)?;
    dicomdir::build(&config.output_dir)?;

    progress.finished(files.len());
    Ok(files)
}

/// Even share of `total` for part `index` out of `parts`; earlier parts absorb the remainder.
fn share(total: usize, parts: usize, index: usize) -> usize {
    total / parts + usize::from(index < total % parts)
}

/// Walk patients, studies, series and images in order, consuming the identity stream.
pub fn build_tasks(config: &GenerationConfig, dims: Dimensions) -> Vec<RenderTask> {
    let mut stream = IdentityStream::for_config(config);
    let profile = config.modality.profile();
    let total = config.num_images;

    let patients = stream.patients(config);
    let defaults = stream.shared_defaults(config);

    let mut tasks = Vec::with_capacity(total);
    let mut study_index = 0;
    for patient in &patients {
        for _ in 0..share(config.num_studies, config.num_patients, patient.index) {
            let images = share(total, config.num_studies, study_index);
            let study = stream.study(config, study_index, patient, &defaults, images);

            for k in 0..study.series_count {
                let series = stream.series(config, &study, &defaults, k + 1, profile);
                for instance in 1..=share(images, study.series_count, k) {
                    let vendor = config.corruption.vendor_elements(stream.rng());
                    let number = tasks.len() + 1;
                    let sop_instance_uid = identity::instance_uid(
                        stream.dir_name(),
                        study.index + 1,
                        series.number,
                        instance,
                    );

                    let image = ImageContext {
                        patient,
                        study: &study,
                        series: &series,
                        instance,
                        sop_instance_uid: &sop_instance_uid,
                        dims,
                    };
                    let elements = image_elements(config, profile, &image, vendor);

                    tasks.push(RenderTask {
                        number,
                        path: config.output_dir.join(format!("IMG{number:04}.dcm")),
                        dims,
                        profile: profile.pixel_profile(),
                        pixel_seed: identity::pixel_seed(stream.seed(), number),
                        overlay: pixels::overlay_label(number, total),
                        meta: FileMeta {
                            sop_class_uid: profile.sop_class_uid().to_string(),
                            sop_instance_uid: sop_instance_uid.clone(),
                        },
                        elements,
                        patches: config.corruption.patch_directives(),
                        record: GeneratedFile {
                            path: PathBuf::new(),
                            patient_index: patient.index,
                            study_index: study.index,
                            series_number: series.number,
                            instance_number: instance,
                            patient_id: patient.id.clone(),
                            study_uid: study.uid.clone(),
                            series_uid: series.uid.clone(),
                            sop_instance_uid,
                            study_id: study.study_id.clone(),
                            pixel_data_offset: 0,
                            pixel_data_len: 0,
                        },
                    });
                }
            }
            study_index += 1;
        }
    }
    tasks
}

struct ImageContext<'a> {
    patient: &'a PatientIdentity,
    study: &'a StudyContext,
    series: &'a SeriesContext,
    instance: usize,
    sop_instance_uid: &'a str,
    dims: Dimensions,
}

/// Dataset of one image without pixel data: common attributes, modality attributes and vendor
/// blocks, with edge-case omissions and user overrides applied, sorted by tag.
fn image_elements(
    config: &GenerationConfig,
    profile: &dyn ModalityProfile,
    image: &ImageContext<'_>,
    vendor: Vec<Element>,
) -> Vec<Element> {
    let ImageContext {
        patient,
        study,
        series,
        instance,
        sop_instance_uid,
        dims,
    } = image;
    let params = &series.params;
    let pixel = profile.pixel_profile();

    let mut elements = Vec::with_capacity(64);
    profile.append_elements(&mut elements, params);
    elements.extend([
        Element::text(Tag(0x0008, 0x0005), VR::CS, "ISO_IR 192"), // SpecificCharacterSet
        Element::uid(Tag(0x0008, 0x0016), profile.sop_class_uid()), // SOPClassUID
        Element::uid(Tag(0x0008, 0x0018), *sop_instance_uid), // SOPInstanceUID
        Element::text(Tag(0x0008, 0x0020), VR::DA, study.date.as_str()), // StudyDate
        Element::text(Tag(0x0008, 0x0021), VR::DA, study.date.as_str()), // SeriesDate
        Element::text(Tag(0x0008, 0x0023), VR::DA, study.date.as_str()), // ContentDate
        Element::text(Tag(0x0008, 0x0030), VR::TM, study.time.as_str()), // StudyTime
        Element::text(Tag(0x0008, 0x0031), VR::TM, study.time.as_str()), // SeriesTime
        Element::text(Tag(0x0008, 0x0033), VR::TM, study.time.as_str()), // ContentTime
        Element::text(Tag(0x0008, 0x0050), VR::SH, study.accession.as_str()), // AccessionNumber
        Element::text(Tag(0x0008, 0x0060), VR::CS, config.modality.as_str()), // Modality
        Element::text(Tag(0x0008, 0x0070), VR::LO, params.scanner.manufacturer), // Manufacturer
        Element::text(Tag(0x0008, 0x0080), VR::LO, study.institution.as_str()), // InstitutionName
        Element::text(Tag(0x0008, 0x0090), VR::PN, study.referring_physician.as_str()), // ReferringPhysicianName
        Element::text(Tag(0x0008, 0x1010), VR::SH, study.station.as_str()), // StationName
        Element::text(Tag(0x0008, 0x1030), VR::LO, study.description.as_str()), // StudyDescription
        Element::text(Tag(0x0008, 0x103E), VR::LO, series.description.as_str()), // SeriesDescription
        Element::text(Tag(0x0008, 0x1040), VR::LO, study.department.as_str()), // InstitutionalDepartmentName
        Element::text(Tag(0x0008, 0x1050), VR::PN, study.performing_physician.as_str()), // PerformingPhysicianName
        Element::text(Tag(0x0008, 0x1070), VR::PN, study.operator.as_str()), // OperatorsName
        Element::text(Tag(0x0008, 0x1090), VR::LO, params.scanner.model), // ManufacturerModelName
        Element::text(Tag(0x0010, 0x0010), VR::PN, patient.name.as_str()), // PatientName
        Element::text(Tag(0x0010, 0x0020), VR::LO, patient.id.as_str()), // PatientID
        Element::text(Tag(0x0010, 0x0030), VR::DA, patient.birth_date.as_str()), // PatientBirthDate
        Element::text(Tag(0x0010, 0x0040), VR::CS, patient.sex.as_str()), // PatientSex
        Element::text(Tag(0x0018, 0x0015), VR::CS, series.body_part.as_str()), // BodyPartExamined
        Element::text(Tag(0x0018, 0x1030), VR::LO, series.protocol.as_str()), // ProtocolName
        Element::uid(Tag(0x0020, 0x000D), study.uid.as_str()), // StudyInstanceUID
        Element::uid(Tag(0x0020, 0x000E), series.uid.as_str()), // SeriesInstanceUID
        Element::text(Tag(0x0020, 0x0010), VR::SH, study.study_id.as_str()), // StudyID
        Element::text(Tag(0x0020, 0x0011), VR::IS, series.number.to_string()), // SeriesNumber
        Element::text(Tag(0x0020, 0x0013), VR::IS, instance.to_string()), // InstanceNumber
        Element::u16(Tag(0x0028, 0x0002), 1), // SamplesPerPixel
        Element::text(Tag(0x0028, 0x0004), VR::CS, "MONOCHROME2"), // PhotometricInterpretation
        Element::u16(Tag(0x0028, 0x0010), dims.height as u16), // Rows
        Element::u16(Tag(0x0028, 0x0011), dims.width as u16), // Columns
        Element::strings(
            Tag(0x0028, 0x0030), // PixelSpacing
            VR::DS,
            &[format_ds(params.pixel_spacing), format_ds(params.pixel_spacing)],
        ),
        Element::u16(Tag(0x0028, 0x0100), pixel.bits_allocated), // BitsAllocated
        Element::u16(Tag(0x0028, 0x0101), pixel.bits_stored), // BitsStored
        Element::u16(Tag(0x0028, 0x0102), pixel.high_bit), // HighBit
        Element::u16(Tag(0x0028, 0x0103), pixel.pixel_representation()), // PixelRepresentation
        Element::text(Tag(0x0028, 0x1050), VR::DS, format_ds(params.window.center)), // WindowCenter
        Element::text(Tag(0x0028, 0x1051), VR::DS, format_ds(params.window.width)), // WindowWidth
        Element::text(Tag(0x0028, 0x1055), VR::LO, params.window.explanation.as_str()), // WindowCenterWidthExplanation
        Element::text(Tag(0x0032, 0x1060), VR::LO, series.indication.as_str()), // RequestedProcedureDescription
        Element::text(Tag(0x0040, 0x1003), VR::SH, study.priority.as_str()), // RequestedProcedurePriority
    ]);

    // Cross-sectional geometry for modalities that acquire slices
    if let Some(thickness) = params.slice_thickness {
        let spacing = params.spacing_between_slices.unwrap_or(thickness);
        let z = (*instance as f64 - 1.0) * spacing;
        elements.extend([
            Element::text(Tag(0x0018, 0x0050), VR::DS, format_ds(thickness)), // SliceThickness
            Element::text(Tag(0x0018, 0x0088), VR::DS, format_ds(spacing)), // SpacingBetweenSlices
            Element::strings(Tag(0x0020, 0x0032), VR::DS, &["0", "0", format_ds(z).as_str()]), // ImagePositionPatient
            Element::strings(Tag(0x0020, 0x0037), VR::DS, &["1", "0", "0", "0", "1", "0"]), // ImageOrientationPatient
            Element::text(Tag(0x0020, 0x1041), VR::DS, format_ds(z)), // SliceLocation
        ]);
    }
    elements.extend(vendor);

    // Edge-case omissions never drop a tag the user explicitly set
    let omitted: Vec<Tag> = patient
        .omitted_tags
        .iter()
        .filter(|name| config.custom_tags.get(name).is_none())
        .filter_map(|name| lookup_tag(name).ok())
        .map(|info| info.tag)
        .collect();
    elements.retain(|e| !omitted.contains(&e.tag));

    for (name, value) in config.custom_tags.iter() {
        let Ok(info) = lookup_tag(name) else {
            continue;
        };
        for element in elements.iter_mut().filter(|e| e.tag == info.tag) {
            *element = Element::text(info.tag, element.vr, value);
        }
    }

    elements.sort_by_key(|e| (e.tag.group(), e.tag.element()));
    elements
}

/// Render every task on a pool of `workers` threads. All tasks run; the first failure in task
/// order is returned.
pub fn render_all(
    tasks: &[RenderTask],
    workers: usize,
    progress: &dyn ProgressSink,
) -> Result<Vec<GeneratedFile>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()?;
    let done = AtomicUsize::new(0);
    let total = tasks.len();
    progress.started(total);

    let results: Vec<Result<GeneratedFile>> = pool.install(|| {
        tasks
            .par_iter()
            .map(|task| {
                let result = render_one(task);
                match &result {
                    Ok(file) => {
                        let count = done.fetch_add(1, Ordering::Relaxed) + 1;
                        progress.image_written(count, total, &file.path);
                    }
                    Err(e) => progress.image_failed(task.number, e),
                }
                result
            })
            .collect()
    });

    results
        .into_iter()
        .zip(tasks)
        .map(|(result, task)| {
            result.map_err(|e| ForgeError::Render {
                index: task.number,
                source: Box::new(e),
            })
        })
        .collect()
}

/// Synthesize, encode, write and patch one image.
pub fn render_one(task: &RenderTask) -> Result<GeneratedFile> {
    let mut values = pixels::synthesize(task.dims, &task.profile, task.pixel_seed);
    pixels::overlay_text(&mut values, task.dims, &task.profile, &task.overlay);
    let (vr, bytes) = pixels::encode(&values, &task.profile);

    let mut dataset = task.elements.clone();
    dataset.push(Element::bytes(PIXEL_DATA, vr, bytes));
    let encoded = codec::write_part10(&task.meta, &dataset)?;
    fs::write(&task.path, &encoded.bytes).at_path(&task.path)?;
    corruption::apply_patches(&task.path, &encoded.offsets, &task.patches)?;

    let mut record = task.record.clone();
    record.path = task.path.clone();
    if let Some(pixel) = encoded.offsets.find(PIXEL_DATA) {
        record.pixel_data_offset = pixel.value;
        record.pixel_data_len = pixel.length;
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::read_part10;
    use crate::edge_cases::{EdgeCaseKind, EdgeCasePolicy};
    use tempfile::tempdir;

    fn config(dir: &Path) -> GenerationConfig {
        GenerationConfig {
            num_images: 7,
            total_size: 600 * 1024,
            output_dir: dir.join("set"),
            seed: Some(17),
            num_patients: 2,
            num_studies: 3,
            ..GenerationConfig::default()
        }
    }

    #[test]
    fn shares_spread_remainder_over_first_parts() {
        let parts: Vec<usize> = (0..3).map(|i| share(7, 3, i)).collect();
        assert_eq!(parts, vec![3, 2, 2]);
        assert_eq!(share(2, 2, 1), 1);
    }

    #[test]
    fn tasks_follow_distribution_and_numbering() {
        let dir = tempdir().expect("tempdir");
        let cfg = config(dir.path());
        let dims = cfg.validate().expect("valid");
        let tasks = build_tasks(&cfg, dims);

        assert_eq!(tasks.len(), 7);
        let patients: Vec<usize> = tasks.iter().map(|t| t.record.patient_index).collect();
        assert_eq!(patients, vec![0, 0, 0, 0, 0, 1, 1]);
        let studies: Vec<usize> = tasks.iter().map(|t| t.record.study_index).collect();
        assert_eq!(studies, vec![0, 0, 0, 1, 1, 2, 2]);
        assert_eq!(tasks[0].overlay, "FILE 1/7");
        assert!(tasks[6].path.ends_with("IMG0007.dcm"));
        assert_eq!(tasks[3].record.instance_number, 1);
    }

    #[test]
    fn elements_are_sorted_and_carry_identity() {
        let dir = tempdir().expect("tempdir");
        let cfg = config(dir.path());
        let tasks = build_tasks(&cfg, cfg.validate().expect("valid"));
        let task = &tasks[0];

        let keys: Vec<(u16, u16)> = task
            .elements
            .iter()
            .map(|e| (e.tag.group(), e.tag.element()))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert!(task.elements.iter().all(|e| e.tag != PIXEL_DATA));

        let uid = task
            .elements
            .iter()
            .find(|e| e.tag == Tag(0x0008, 0x0018))
            .and_then(|e| e.raw())
            .expect("sop instance uid");
        assert_eq!(uid, task.record.sop_instance_uid.as_bytes());
    }

    #[test]
    fn same_config_builds_identical_tasks() {
        let dir = tempdir().expect("tempdir");
        let cfg = config(dir.path());
        let dims = cfg.validate().expect("valid");
        let a = build_tasks(&cfg, dims);
        let b = build_tasks(&cfg, dims);
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.elements, y.elements);
            assert_eq!(x.pixel_seed, y.pixel_seed);
        }
    }

    #[test]
    fn overrides_win_over_omissions() {
        let dir = tempdir().expect("tempdir");
        let mut cfg = config(dir.path());
        cfg.edge_cases = EdgeCasePolicy {
            percentage: 100,
            types: vec![EdgeCaseKind::MissingTags],
        };
        for name in crate::edge_cases::OPTIONAL_TAGS {
            cfg.custom_tags.insert(name, "KEPT").expect("known tag");
        }
        let tasks = build_tasks(&cfg, cfg.validate().expect("valid"));
        let body = tasks[0]
            .elements
            .iter()
            .find(|e| e.tag == Tag(0x0018, 0x0015))
            .and_then(|e| e.raw());
        assert_eq!(body, Some(b"KEPT".as_slice()));
    }

    #[test]
    fn render_one_writes_readable_file() {
        let dir = tempdir().expect("tempdir");
        let cfg = config(dir.path());
        fs::create_dir_all(&cfg.output_dir).expect("mkdir");
        let tasks = build_tasks(&cfg, cfg.validate().expect("valid"));
        let record = render_one(&tasks[0]).expect("render");

        let parsed = read_part10(&record.path).expect("parse");
        assert_eq!(
            parsed.text(Tag(0x0008, 0x0018)),
            Some(record.sop_instance_uid.clone())
        );
        let expected = u32::from(tasks[0].dims.width) * u32::from(tasks[0].dims.height) * 2;
        assert_eq!(record.pixel_data_len, expected);
        assert_eq!(
            fs::metadata(&record.path).expect("stat").len(),
            record.pixel_data_offset + u64::from(expected)
        );
    }

    #[test]
    fn failures_surface_first_in_task_order() {
        let dir = tempdir().expect("tempdir");
        let cfg = config(dir.path());
        // output directory never created, so every write fails
        let tasks = build_tasks(&cfg, cfg.validate().expect("valid"));
        let err = render_all(&tasks, 3, &NoProgress).unwrap_err();
        assert!(matches!(err, ForgeError::Render { index: 1, .. }));
    }
}
