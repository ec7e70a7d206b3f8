//
// dicomdir.rs
// dicom-forge
//
// Builds the root DICOMDIR: discovers the PT/ST/SE/IM tree, assembles a typed record
// hierarchy, serializes it once and patches the sibling/child offsets in place.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fs;
use std::path::{Path, PathBuf};

use dicom::core::{Tag, VR};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::codec::{self, Element, FileMeta, OffsetTable, ParsedFile, EXPLICIT_VR_LITTLE_ENDIAN};
use crate::error::{ForgeError, IoResultExt, Result};
use crate::identity;

pub const DICOMDIR_FILE: &str = "DICOMDIR";
/// Media Storage Directory Storage.
pub const MEDIA_STORAGE_DIRECTORY: &str = "1.2.840.10008.1.3.10";
const MAX_FILE_SET_ID: usize = 16;
const RECORD_IN_USE: u16 = 0xFFFF;

const NEXT_RECORD: Tag = Tag(0x0004, 0x1400); // OffsetOfTheNextDirectoryRecord
const IN_USE_FLAG: Tag = Tag(0x0004, 0x1410); // RecordInUseFlag
const LOWER_RECORD: Tag = Tag(0x0004, 0x1420); // OffsetOfReferencedLowerLevelDirectoryEntity
const RECORD_TYPE: Tag = Tag(0x0004, 0x1430); // DirectoryRecordType
const FIRST_ROOT: Tag = Tag(0x0004, 0x1200); // OffsetOfTheFirstDirectoryRecordOfTheRootDirectoryEntity
const LAST_ROOT: Tag = Tag(0x0004, 0x1202); // OffsetOfTheLastDirectoryRecordOfTheRootDirectoryEntity

/// One directory record with the records below it.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectoryRecord {
    Patient {
        id: String,
        name: String,
        studies: Vec<DirectoryRecord>,
    },
    Study {
        uid: String,
        id: String,
        date: String,
        time: String,
        description: Option<String>,
        series: Vec<DirectoryRecord>,
    },
    Series {
        uid: String,
        number: String,
        modality: String,
        images: Vec<DirectoryRecord>,
    },
    Image {
        /// Path components relative to the DICOMDIR.
        file_id: Vec<String>,
        sop_class_uid: String,
        sop_instance_uid: String,
        transfer_syntax: String,
        instance_number: Option<String>,
    },
}

impl DirectoryRecord {
    pub fn record_type(&self) -> &'static str {
        match self {
            DirectoryRecord::Patient { .. } => "PATIENT",
            DirectoryRecord::Study { .. } => "STUDY",
            DirectoryRecord::Series { .. } => "SERIES",
            DirectoryRecord::Image { .. } => "IMAGE",
        }
    }

    pub fn children(&self) -> &[DirectoryRecord] {
        match self {
            DirectoryRecord::Patient { studies, .. } => studies,
            DirectoryRecord::Study { series, .. } => series,
            DirectoryRecord::Series { images, .. } => images,
            DirectoryRecord::Image { .. } => &[],
        }
    }

    fn children_mut(&mut self) -> Option<&mut Vec<DirectoryRecord>> {
        match self {
            DirectoryRecord::Patient { studies, .. } => Some(studies),
            DirectoryRecord::Study { series, .. } => Some(series),
            DirectoryRecord::Series { images, .. } => Some(images),
            DirectoryRecord::Image { .. } => None,
        }
    }

    /// Number of records in this subtree, itself included.
    pub fn count(&self) -> usize {
        1 + self.children().iter().map(DirectoryRecord::count).sum::<usize>()
    }

    /// Item of the record sequence, link fields zeroed.
    fn to_item(&self) -> Vec<Element> {
        let mut item = vec![
            Element::u32(NEXT_RECORD, 0),
            Element::u16(IN_USE_FLAG, RECORD_IN_USE),
            Element::u32(LOWER_RECORD, 0),
            Element::text(RECORD_TYPE, VR::CS, self.record_type()),
        ];
        match self {
            DirectoryRecord::Patient { id, name, .. } => item.extend([
                Element::text(Tag(0x0010, 0x0010), VR::PN, name.as_str()), // PatientName
                Element::text(Tag(0x0010, 0x0020), VR::LO, id.as_str()), // PatientID
            ]),
            DirectoryRecord::Study {
                uid,
                id,
                date,
                time,
                description,
                ..
            } => {
                item.extend([
                    Element::text(Tag(0x0008, 0x0020), VR::DA, date.as_str()), // StudyDate
                    Element::text(Tag(0x0008, 0x0030), VR::TM, time.as_str()), // StudyTime
                ]);
                if let Some(description) = description {
                    // StudyDescription
                    item.push(Element::text(Tag(0x0008, 0x1030), VR::LO, description.as_str()));
                }
                item.extend([
                    Element::uid(Tag(0x0020, 0x000D), uid.as_str()), // StudyInstanceUID
                    Element::text(Tag(0x0020, 0x0010), VR::SH, id.as_str()), // StudyID
                ]);
            }
            DirectoryRecord::Series {
                uid,
                number,
                modality,
                ..
            } => item.extend([
                Element::text(Tag(0x0008, 0x0060), VR::CS, modality.as_str()), // Modality
                Element::uid(Tag(0x0020, 0x000E), uid.as_str()), // SeriesInstanceUID
                Element::text(Tag(0x0020, 0x0011), VR::IS, number.as_str()), // SeriesNumber
            ]),
            DirectoryRecord::Image {
                file_id,
                sop_class_uid,
                sop_instance_uid,
                transfer_syntax,
                instance_number,
            } => {
                item.extend([
                    Element::strings(Tag(0x0004, 0x1500), VR::CS, file_id), // ReferencedFileID
                    Element::uid(Tag(0x0004, 0x1510), sop_class_uid.as_str()), // ReferencedSOPClassUIDInFile
                    Element::uid(Tag(0x0004, 0x1511), sop_instance_uid.as_str()), // ReferencedSOPInstanceUIDInFile
                    Element::uid(Tag(0x0004, 0x1512), transfer_syntax.as_str()), // ReferencedTransferSyntaxUIDInFile
                ]);
                if let Some(number) = instance_number {
                    item.push(Element::text(Tag(0x0020, 0x0013), VR::IS, number.as_str())); // InstanceNumber
                }
            }
        }
        item
    }
}

/// Record counts of a written index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexSummary {
    pub patients: usize,
    pub studies: usize,
    pub series: usize,
    pub images: usize,
}

impl IndexSummary {
    fn of(roots: &[DirectoryRecord]) -> Self {
        let mut summary = IndexSummary {
            patients: roots.len(),
            ..IndexSummary::default()
        };
        for study in roots.iter().flat_map(DirectoryRecord::children) {
            summary.studies += 1;
            for series in study.children() {
                summary.series += 1;
                summary.images += series.children().len();
            }
        }
        summary
    }
}

/// File-set ID from a directory name: upper case, CS-safe characters, at most 16 long.
pub fn file_set_id(name: &str) -> String {
    name.chars()
        .map(|c| c.to_ascii_uppercase())
        .map(|c| {
            if c.is_ascii_uppercase() || c.is_ascii_digit() || c == ' ' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILE_SET_ID)
        .collect()
}

/// Index every image under `root` and write `root/DICOMDIR`.
pub fn build(root: &Path) -> Result<IndexSummary> {
    let records = scan(root)?;
    if records.is_empty() {
        return Err(ForgeError::EmptyIndex(root.to_path_buf()));
    }
    let path = write(root, &records)?;
    let summary = IndexSummary::of(&records);
    info!(
        path = %path.display(),
        patients = summary.patients,
        studies = summary.studies,
        series = summary.series,
        images = summary.images,
        "DICOMDIR written"
    );
    Ok(summary)
}

fn tree_component(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix)
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

/// Discover `PT*/ST*/SE*/IM*` files in lexical order and group them by directory.
pub fn scan(root: &Path) -> Result<Vec<DirectoryRecord>> {
    let mut patients: Vec<DirectoryRecord> = Vec::new();
    // on-disk directory names of the group each open record belongs to
    let mut current: [Option<String>; 3] = [None, None, None];

    for entry in WalkDir::new(root)
        .min_depth(4)
        .max_depth(4)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            ForgeError::io(path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = match entry.path().strip_prefix(root) {
            Ok(r) => r,
            Err(_) => continue,
        };
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let [pt, st, se, im] = parts.as_slice() else {
            continue;
        };
        if !(tree_component(pt, "PT")
            && tree_component(st, "ST")
            && tree_component(se, "SE")
            && tree_component(im, "IM"))
        {
            debug!(path = %entry.path().display(), "ignoring file outside the tree layout");
            continue;
        }

        let parsed = match codec::read_part10(entry.path()) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "unreadable file skipped");
                continue;
            }
        };
        let Some(image) = image_record(&parsed, &parts) else {
            warn!(path = %entry.path().display(), "no SOP Instance UID, file skipped");
            continue;
        };

        if current[0].as_deref() != Some(pt.as_str()) {
            patients.push(patient_record(&parsed));
            current = [Some(pt.clone()), None, None];
        }
        let Some(studies) = patients.last_mut().and_then(DirectoryRecord::children_mut) else {
            continue;
        };
        if current[1].as_deref() != Some(st.as_str()) {
            studies.push(study_record(&parsed));
            current[1] = Some(st.clone());
            current[2] = None;
        }
        let Some(series) = studies.last_mut().and_then(DirectoryRecord::children_mut) else {
            continue;
        };
        if current[2].as_deref() != Some(se.as_str()) {
            series.push(series_record(&parsed));
            current[2] = Some(se.clone());
        }
        if let Some(images) = series.last_mut().and_then(DirectoryRecord::children_mut) {
            images.push(image);
        }
    }
    Ok(patients)
}

fn text_or_empty(parsed: &ParsedFile, tag: Tag) -> String {
    parsed.text(tag).unwrap_or_default()
}

fn patient_record(parsed: &ParsedFile) -> DirectoryRecord {
    DirectoryRecord::Patient {
        id: text_or_empty(parsed, Tag(0x0010, 0x0020)),
        name: text_or_empty(parsed, Tag(0x0010, 0x0010)),
        studies: Vec::new(),
    }
}

fn study_record(parsed: &ParsedFile) -> DirectoryRecord {
    DirectoryRecord::Study {
        uid: text_or_empty(parsed, Tag(0x0020, 0x000D)),
        id: text_or_empty(parsed, Tag(0x0020, 0x0010)),
        date: text_or_empty(parsed, Tag(0x0008, 0x0020)),
        time: text_or_empty(parsed, Tag(0x0008, 0x0030)),
        description: parsed.text(Tag(0x0008, 0x1030)),
        series: Vec::new(),
    }
}

fn series_record(parsed: &ParsedFile) -> DirectoryRecord {
    DirectoryRecord::Series {
        uid: text_or_empty(parsed, Tag(0x0020, 0x000E)),
        number: text_or_empty(parsed, Tag(0x0020, 0x0011)),
        modality: text_or_empty(parsed, Tag(0x0008, 0x0060)),
        images: Vec::new(),
    }
}

fn image_record(parsed: &ParsedFile, file_id: &[String]) -> Option<DirectoryRecord> {
    let sop_instance_uid = parsed
        .text(Tag(0x0008, 0x0018))
        .or_else(|| parsed.text(Tag(0x0002, 0x0003)))?;
    let sop_class_uid = parsed
        .text(Tag(0x0002, 0x0002))
        .or_else(|| parsed.text(Tag(0x0008, 0x0016)))
        .unwrap_or_default();
    Some(DirectoryRecord::Image {
        file_id: file_id.to_vec(),
        sop_class_uid,
        sop_instance_uid,
        transfer_syntax: parsed
            .text(Tag(0x0002, 0x0010))
            .unwrap_or_else(|| EXPLICIT_VR_LITTLE_ENDIAN.to_string()),
        instance_number: parsed.text(Tag(0x0020, 0x0013)),
    })
}

fn flatten(records: &[DirectoryRecord], items: &mut Vec<Vec<Element>>) {
    for record in records {
        items.push(record.to_item());
        flatten(record.children(), items);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Links {
    next: u64,
    lower: u64,
}

/// Assign next-sibling and first-child offsets depth-first. `cursor` tracks the emission
/// index, which equals the item index in the offset table. Returns the indices of `records`.
fn resolve(
    records: &[DirectoryRecord],
    cursor: &mut usize,
    items: &[u64],
    links: &mut [Links],
) -> Vec<usize> {
    let mut indices = Vec::with_capacity(records.len());
    for record in records {
        let index = *cursor;
        *cursor += 1;
        indices.push(index);
        let children = resolve(record.children(), cursor, items, links);
        links[index].lower = children.first().map_or(0, |first| items[*first]);
    }
    for pair in indices.windows(2) {
        links[pair[0]].next = items[pair[1]];
    }
    indices
}

fn offset_field(offset: u64) -> Result<Vec<u8>> {
    u32::try_from(offset)
        .map(|o| o.to_le_bytes().to_vec())
        .map_err(|_| ForgeError::InvalidInput(format!("record offset {offset} exceeds 4 GiB")))
}

fn link_patches(roots: &[DirectoryRecord], offsets: &OffsetTable) -> Result<Vec<(u64, Vec<u8>)>> {
    let mut links = vec![Links::default(); offsets.items.len()];
    let mut cursor = 0;
    let root_indices = resolve(roots, &mut cursor, &offsets.items, &mut links);

    let next_fields = offsets.values_by_item(NEXT_RECORD);
    let lower_fields = offsets.values_by_item(LOWER_RECORD);

    let mut patches = Vec::new();
    for (index, link) in links.iter().enumerate() {
        for (fields, value) in [(&next_fields, link.next), (&lower_fields, link.lower)] {
            if value == 0 {
                continue;
            }
            if let Some(field) = fields[index] {
                patches.push((field, offset_field(value)?));
            }
        }
    }

    let first = root_indices.first().map_or(0, |i| offsets.items[*i]);
    let last = root_indices.last().map_or(0, |i| offsets.items[*i]);
    for (tag, value) in [(FIRST_ROOT, first), (LAST_ROOT, last)] {
        if let Some(field) = offsets.find(tag) {
            patches.push((field.value, offset_field(value)?));
        }
    }
    Ok(patches)
}

/// Serialize the record tree to `root/DICOMDIR` and patch its offsets in place.
pub fn write(root: &Path, records: &[DirectoryRecord]) -> Result<PathBuf> {
    let dir_name = identity::directory_name(root);
    let mut items = Vec::with_capacity(records.iter().map(DirectoryRecord::count).sum());
    flatten(records, &mut items);

    let dataset = vec![
        Element::text(Tag(0x0004, 0x1130), VR::CS, file_set_id(&dir_name)), // FileSetID
        Element::u32(FIRST_ROOT, 0),
        Element::u32(LAST_ROOT, 0),
        Element::u16(Tag(0x0004, 0x1212), 0), // FileSetConsistencyFlag
        Element::sequence(Tag(0x0004, 0x1220), items), // DirectoryRecordSequence
    ];
    let meta = FileMeta {
        sop_class_uid: MEDIA_STORAGE_DIRECTORY.to_string(),
        sop_instance_uid: identity::deterministic_uid(&format!("{dir_name}_dicomdir")),
    };
    let encoded = codec::write_part10(&meta, &dataset)?;

    let path = root.join(DICOMDIR_FILE);
    fs::write(&path, &encoded.bytes).at_path(&path)?;
    let patches = link_patches(records, &encoded.offsets)?;
    debug!(patches = patches.len(), "resolving DICOMDIR offsets");
    codec::patch_all(&path, &patches)?;
    Ok(path)
}
