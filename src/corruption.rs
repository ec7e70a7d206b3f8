//
// corruption.rs
// dicom-forge
//
// Vendor private blocks and post-write length patches that mimic the quirks of real scanner
// output, for exercising the robustness of downstream readers.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use dicom::core::{Tag, VR};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::{self, Element, OffsetTable, PIXEL_DATA};
use crate::error::{ForgeError, Result};

/// Placeholder inserted at build time and rewritten after the file is on disk.
pub const MALFORMED_PLACEHOLDER: Tag = Tag(0x0071, 0x0253);
/// Tag the placeholder header becomes: LineThickness, an FL attribute.
pub const MALFORMED_TARGET: Tag = Tag(0x0070, 0x0253);
const PLACEHOLDER_VALUE: &[u8; 6] = b"0.0000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DefectKind {
    SiemensCsa,
    GePrivate,
    PhilipsPrivate,
    MalformedLengths,
}

impl DefectKind {
    pub const ALL: [DefectKind; 4] = [
        DefectKind::SiemensCsa,
        DefectKind::GePrivate,
        DefectKind::PhilipsPrivate,
        DefectKind::MalformedLengths,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DefectKind::SiemensCsa => "siemens-csa",
            DefectKind::GePrivate => "ge-private",
            DefectKind::PhilipsPrivate => "philips-private",
            DefectKind::MalformedLengths => "malformed-lengths",
        }
    }
}

impl fmt::Display for DefectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DefectKind {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        DefectKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| ForgeError::UnknownDefect(s.trim().to_string()))
    }
}

impl TryFrom<String> for DefectKind {
    type Error = ForgeError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DefectKind> for String {
    fn from(kind: DefectKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Patch applied to a file after it has been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchDirective {
    /// Rewrite the placeholder into an FL element of length 6 and make the pixel data length
    /// odd.
    MalformedLengths,
}

/// Defect kinds enabled for a run. Empty means clean output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorruptionPolicy {
    pub types: Vec<DefectKind>,
}

impl FromStr for CorruptionPolicy {
    type Err = ForgeError;

    /// Comma-separated kinds; `all` enables every kind.
    fn from_str(s: &str) -> Result<Self> {
        let mut types = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if part.eq_ignore_ascii_case("all") {
                return Ok(CorruptionPolicy {
                    types: DefectKind::ALL.to_vec(),
                });
            }
            let kind: DefectKind = part.parse()?;
            if !types.contains(&kind) {
                types.push(kind);
            }
        }
        Ok(CorruptionPolicy { types })
    }
}

impl CorruptionPolicy {
    pub fn is_enabled(&self) -> bool {
        !self.types.is_empty()
    }

    pub fn has(&self, kind: DefectKind) -> bool {
        self.types.contains(&kind)
    }

    /// Private elements for one image, consuming the identity stream.
    pub fn vendor_elements(&self, rng: &mut dyn RngCore) -> Vec<Element> {
        let mut elements = Vec::new();
        if self.has(DefectKind::SiemensCsa) {
            elements.extend(siemens_elements(rng));
        }
        if self.has(DefectKind::GePrivate) {
            elements.extend(ge_elements(rng));
        }
        if self.has(DefectKind::PhilipsPrivate) {
            elements.extend(philips_elements(rng));
        }
        if self.has(DefectKind::MalformedLengths) {
            elements.push(Element::bytes(
                MALFORMED_PLACEHOLDER,
                VR::SH,
                PLACEHOLDER_VALUE.to_vec(),
            ));
        }
        elements
    }

    pub fn patch_directives(&self) -> Vec<PatchDirective> {
        if self.has(DefectKind::MalformedLengths) {
            vec![PatchDirective::MalformedLengths]
        } else {
            Vec::new()
        }
    }
}

/// One entry of a Siemens CSA header.
struct CsaEntry {
    name: &'static str,
    vm: i32,
    vr: &'static str,
    syngo_dt: i32,
    values: &'static [&'static str],
}

const fn csa(
    name: &'static str,
    vm: i32,
    vr: &'static str,
    syngo_dt: i32,
    values: &'static [&'static str],
) -> CsaEntry {
    CsaEntry {
        name,
        vm,
        vr,
        syngo_dt,
        values,
    }
}

const CSA_IMAGE: [CsaEntry; 10] = [
    csa("NumberOfImagesInMosaic", 1, "IS", 6, &["1"]),
    csa("SliceNormalVector", 3, "FD", 3, &["0.0", "0.0", "1.0"]),
    csa("DiffusionGradientDirection", 3, "FD", 3, &["0.0", "0.0", "0.0"]),
    csa("B_value", 1, "IS", 6, &["0"]),
    csa("SliceMeasurementDuration", 1, "DS", 3, &["265000.0"]),
    csa("BandwidthPerPixelPhaseEncode", 1, "FD", 3, &["45.455"]),
    csa("MosaicRefAcqTimes", 1, "FD", 3, &["0.0"]),
    csa("ImaRelTablePosition", 3, "IS", 6, &["0", "0", "0"]),
    csa("RealDwellTime", 1, "IS", 6, &["5700"]),
    csa("ImaCoilString", 1, "LO", 19, &["HEA;HEP"]),
];

const CSA_SERIES: [CsaEntry; 8] = [
    csa("UsedPatientWeight", 1, "DS", 3, &["70.0"]),
    csa("MrProtocolVersion", 1, "IS", 6, &["1"]),
    csa("DataFileName", 1, "LO", 19, &["%ScanProtocol%_PROT"]),
    csa("MrProtocol", 1, "LO", 19, &["### ASCCONV BEGIN ###"]),
    csa("Isocentered", 1, "IS", 6, &["1"]),
    csa("CoilForGradient", 1, "LO", 19, &["AS"]),
    csa("CoilForGradient2", 1, "LO", 19, &[""]),
    csa("TablePositionOrigin", 3, "FD", 3, &["0.0", "0.0", "0.0"]),
];

const CSA_MAGIC: [u8; 8] = [b'S', b'V', b'1', b'0', 0x04, 0x03, 0x02, 0x01];
const CSA_DELIMITER: u32 = 0x4D;

/// Encode entries in the SV10 layout used by Siemens private headers.
fn encode_csa(entries: &[CsaEntry]) -> Vec<u8> {
    let mut buf = CSA_MAGIC.to_vec();
    buf.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    buf.extend_from_slice(&CSA_DELIMITER.to_le_bytes());

    for entry in entries {
        let mut name = [0u8; 64];
        let len = entry.name.len().min(64);
        name[..len].copy_from_slice(&entry.name.as_bytes()[..len]);
        buf.extend_from_slice(&name);
        buf.extend_from_slice(&entry.vm.to_le_bytes());
        let mut vr = [0u8; 4];
        vr[..entry.vr.len().min(4)].copy_from_slice(&entry.vr.as_bytes()[..entry.vr.len().min(4)]);
        buf.extend_from_slice(&vr);
        buf.extend_from_slice(&entry.syngo_dt.to_le_bytes());
        buf.extend_from_slice(&(entry.values.len() as i32).to_le_bytes());
        buf.extend_from_slice(&CSA_DELIMITER.to_le_bytes());

        for value in entry.values {
            let length = (value.len() as u32).to_le_bytes();
            for _ in 0..4 {
                buf.extend_from_slice(&length);
            }
            buf.extend_from_slice(value.as_bytes());
            buf.resize(buf.len() + (4 - value.len() % 4) % 4, 0);
        }
    }
    buf
}

fn random_bytes(len: usize, rng: &mut dyn RngCore) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rng.fill_bytes(&mut bytes);
    bytes
}

fn siemens_elements(rng: &mut dyn RngCore) -> Vec<Element> {
    let mut image_header = encode_csa(&CSA_IMAGE);
    let padding = rng.gen_range(1024..3072);
    image_header.extend(random_bytes(padding, rng));

    let mut series_header = encode_csa(&CSA_SERIES);
    let padding = rng.gen_range(512..1536);
    series_header.extend(random_bytes(padding, rng));

    let nested = random_bytes(rng.gen_range(5120..9216), rng);

    vec![
        Element::text(Tag(0x0029, 0x0010), VR::LO, "SIEMENS CSA HEADER"),
        Element::bytes(Tag(0x0029, 0x1010), VR::OB, image_header),
        Element::bytes(Tag(0x0029, 0x1020), VR::OB, series_header),
        // private sequence known to crash fragile readers
        Element::sequence(
            Tag(0x0029, 0x1102),
            vec![vec![
                Element::text(Tag(0x0029, 0x0011), VR::LO, "SIEMENS CSA NON-IMAGE"),
                Element::bytes(Tag(0x0029, 0x1100), VR::OB, nested),
            ]],
        ),
    ]
}

fn ge_elements(rng: &mut dyn RngCore) -> Vec<Element> {
    let version = format!(
        "DV{}.{}_{}_M5",
        rng.gen_range(20..30),
        rng.gen_range(0..10),
        rng.gen_range(0..100)
    );
    let diffusion: Vec<String> = (0..4).map(|_| rng.gen_range(0..1000).to_string()).collect();

    vec![
        Element::text(Tag(0x0009, 0x0010), VR::LO, "GEMS_IDEN_01"),
        Element::text(Tag(0x0043, 0x0010), VR::LO, "GEMS_PARM_01"),
        Element::text(Tag(0x0009, 0x10E3), VR::LO, version),
        Element::strings(Tag(0x0043, 0x1039), VR::IS, &diffusion),
    ]
}

fn philips_elements(rng: &mut dyn RngCore) -> Vec<Element> {
    let slope = format!("{:.10}", rng.gen::<f64>() * 100.0 + 1.0);
    let intercept = format!("{:.10}", rng.gen::<f64>() * 10.0 - 5.0);

    vec![
        Element::text(Tag(0x2001, 0x0010), VR::LO, "Philips Imaging DD 001"),
        Element::text(Tag(0x2005, 0x0010), VR::LO, "Philips MR Imaging DD 001"),
        Element::sequence(
            Tag(0x2005, 0x100E),
            vec![vec![
                Element::text(Tag(0x2005, 0x0011), VR::LO, "Philips MR Imaging DD 005"),
                Element::text(Tag(0x2005, 0x1100), VR::DS, slope),
                Element::text(Tag(0x2005, 0x1101), VR::DS, intercept),
            ]],
        ),
    ]
}

/// Apply patch directives to a written file using the writer's offsets.
pub fn apply_patches(
    path: &Path,
    offsets: &OffsetTable,
    directives: &[PatchDirective],
) -> Result<()> {
    for directive in directives {
        match directive {
            PatchDirective::MalformedLengths => patch_malformed_lengths(path, offsets)?,
        }
    }
    Ok(())
}

fn patch_malformed_lengths(path: &Path, offsets: &OffsetTable) -> Result<()> {
    // 1. Placeholder header becomes (0070,0253) FL with a length that is not a multiple of 4
    match offsets.find(MALFORMED_PLACEHOLDER) {
        Some(placeholder) => {
            let mut header = Vec::with_capacity(8);
            header.extend_from_slice(&MALFORMED_TARGET.group().to_le_bytes());
            header.extend_from_slice(&MALFORMED_TARGET.element().to_le_bytes());
            header.extend_from_slice(b"FL");
            header.extend_from_slice(&(placeholder.length as u16).to_le_bytes());
            codec::patch_at(path, placeholder.header, &header)?;
        }
        None => debug!(path = %path.display(), "no placeholder to patch"),
    }

    // 2. Pixel data length becomes odd; pixel bytes stay untouched
    match offsets.find(PIXEL_DATA) {
        Some(pixel) if pixel.length > 0 => {
            let odd = pixel.length - 1;
            codec::patch_at(path, pixel.length_field(), &odd.to_le_bytes())?;
        }
        _ => debug!(path = %path.display(), "no pixel data to patch"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{read_part10, write_part10, FileMeta, Value};
    use byteorder::{ByteOrder, LittleEndian};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::tempdir;

    #[test]
    fn parses_kinds_and_all() {
        let policy: CorruptionPolicy = "siemens-csa, ge-private,siemens-csa".parse().unwrap();
        assert_eq!(policy.types, vec![DefectKind::SiemensCsa, DefectKind::GePrivate]);

        let all: CorruptionPolicy = "all".parse().unwrap();
        assert_eq!(all.types, DefectKind::ALL.to_vec());

        assert!(matches!(
            "siemens-csa,bogus".parse::<CorruptionPolicy>(),
            Err(ForgeError::UnknownDefect(name)) if name == "bogus"
        ));
        assert!(!"".parse::<CorruptionPolicy>().unwrap().is_enabled());
    }

    #[test]
    fn csa_header_has_sv10_layout() {
        let encoded = encode_csa(&CSA_IMAGE);
        assert_eq!(&encoded[..8], &CSA_MAGIC);
        assert_eq!(LittleEndian::read_u32(&encoded[8..12]), CSA_IMAGE.len() as u32);
        assert_eq!(LittleEndian::read_u32(&encoded[12..16]), 0x4D);
        // first entry: 64-byte name, VM, VR, syngo DT, item count, delimiter
        assert_eq!(&encoded[16..38], b"NumberOfImagesInMosaic");
        assert_eq!(encoded[38], 0);
        assert_eq!(LittleEndian::read_i32(&encoded[80..84]), 1);
        assert_eq!(&encoded[84..86], b"IS");
        assert_eq!(LittleEndian::read_i32(&encoded[92..96]), 1);
        // item: four length words then "1" padded to 4 bytes
        assert_eq!(LittleEndian::read_u32(&encoded[100..104]), 1);
        assert_eq!(LittleEndian::read_u32(&encoded[112..116]), 1);
        assert_eq!(&encoded[116..120], &[b'1', 0, 0, 0]);
    }

    #[test]
    fn vendor_blocks_follow_policy() {
        let mut rng = StdRng::seed_from_u64(8);
        let policy = CorruptionPolicy {
            types: vec![DefectKind::GePrivate, DefectKind::PhilipsPrivate],
        };
        let elements = policy.vendor_elements(&mut rng);
        assert!(elements.iter().all(|e| e.tag.group() != 0x0029));

        let version = elements
            .iter()
            .find(|e| e.tag == Tag(0x0009, 0x10E3))
            .and_then(|e| e.raw())
            .map(|raw| String::from_utf8_lossy(raw).into_owned())
            .unwrap();
        assert!(version.starts_with("DV2") && version.ends_with("_M5"));

        let diffusion = elements.iter().find(|e| e.tag == Tag(0x0043, 0x1039)).unwrap();
        assert_eq!(String::from_utf8_lossy(diffusion.raw().unwrap()).split('\\').count(), 4);

        let sequence = elements.iter().find(|e| e.tag == Tag(0x2005, 0x100E)).unwrap();
        let Value::Items(items) = &sequence.value else {
            panic!("expected a sequence");
        };
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].len(), 3);
    }

    #[test]
    fn siemens_block_carries_crash_sequence() {
        let mut rng = StdRng::seed_from_u64(3);
        let policy: CorruptionPolicy = "siemens-csa".parse().unwrap();
        let elements = policy.vendor_elements(&mut rng);
        let tags: Vec<Tag> = elements.iter().map(|e| e.tag).collect();
        assert_eq!(
            tags,
            vec![
                Tag(0x0029, 0x0010),
                Tag(0x0029, 0x1010),
                Tag(0x0029, 0x1020),
                Tag(0x0029, 0x1102)
            ]
        );
        assert!(elements[1].raw().unwrap().starts_with(b"SV10"));
        assert!(policy.patch_directives().is_empty());
    }

    #[test]
    fn malformed_patch_rewrites_header_and_pixel_length() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("bad.dcm");
        let policy: CorruptionPolicy = "malformed-lengths".parse().unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        let mut dataset = vec![Element::text(Tag(0x0010, 0x0020), VR::LO, "PID1")];
        dataset.extend(policy.vendor_elements(&mut rng));
        dataset.push(Element::bytes(PIXEL_DATA, VR::OW, vec![7; 32]));
        let meta = FileMeta {
            sop_class_uid: "1.2.840.10008.5.1.4.1.1.4".to_string(),
            sop_instance_uid: "1.2.3".to_string(),
        };
        let encoded = write_part10(&meta, &dataset).expect("encode");
        std::fs::write(&path, &encoded.bytes).expect("write");
        apply_patches(&path, &encoded.offsets, &policy.patch_directives()).expect("patch");

        let bytes = std::fs::read(&path).expect("read");
        assert_eq!(bytes.len(), encoded.bytes.len());
        let placeholder = encoded.offsets.find(MALFORMED_PLACEHOLDER).unwrap();
        let h = placeholder.header as usize;
        assert_eq!(&bytes[h..h + 8], &[0x70, 0x00, 0x53, 0x02, b'F', b'L', 6, 0]);

        let pixel = encoded.offsets.find(PIXEL_DATA).unwrap();
        let at = pixel.length_field() as usize;
        assert_eq!(LittleEndian::read_u32(&bytes[at..at + 4]), 31);
        assert!(bytes[pixel.value as usize..].iter().all(|b| *b == 7));

        let parsed = read_part10(&path).expect("parse");
        assert_eq!(parsed.get(MALFORMED_TARGET).map(|e| e.vr), Some(VR::FL));
        assert_eq!(parsed.get(PIXEL_DATA).map(|e| e.length), Some(31));
    }

    #[test]
    fn missing_targets_are_ignored() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("clean.dcm");
        let meta = FileMeta {
            sop_class_uid: "1.2".to_string(),
            sop_instance_uid: "1.2.3".to_string(),
        };
        let encoded = write_part10(&meta, &[]).expect("encode");
        std::fs::write(&path, &encoded.bytes).expect("write");
        apply_patches(&path, &encoded.offsets, &[PatchDirective::MalformedLengths])
            .expect("no-op patch");
        assert_eq!(std::fs::read(&path).expect("read"), encoded.bytes);
    }
}
