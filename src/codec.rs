//
// codec.rs
// dicom-forge
//
// Explicit VR little endian Part 10 writer that records the byte offset of every element it
// emits, plus a tolerant reader used when indexing files that are already on disk.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fs::OpenOptions;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use dicom::core::{Tag, VR};

use crate::error::{ForgeError, IoResultExt, Result};

pub const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";
pub const IMPLEMENTATION_CLASS_UID: &str = "1.2.826.0.1.3680043.8.498";
pub const IMPLEMENTATION_VERSION: &str = "DICOMFORGE_1";

pub const PREAMBLE_LEN: usize = 128;
pub const MAGIC: &[u8; 4] = b"DICM";

pub const PIXEL_DATA: Tag = Tag(0x7FE0, 0x0010);
const ITEM: Tag = Tag(0xFFFE, 0xE000);
const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

/// Value carried by an element: raw bytes, or the items of a sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bytes(Vec<u8>),
    Items(Vec<Vec<Element>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: Tag,
    pub vr: VR,
    pub value: Value,
}

impl Element {
    pub fn bytes(tag: Tag, vr: VR, bytes: Vec<u8>) -> Self {
        Element {
            tag,
            vr,
            value: Value::Bytes(bytes),
        }
    }

    /// Text value; padding to even length happens at write time.
    pub fn text(tag: Tag, vr: VR, value: impl Into<String>) -> Self {
        Self::bytes(tag, vr, value.into().into_bytes())
    }

    /// Multi-valued text joined with the backslash separator.
    pub fn strings<S: AsRef<str>>(tag: Tag, vr: VR, values: &[S]) -> Self {
        let joined = values
            .iter()
            .map(|v| v.as_ref())
            .collect::<Vec<_>>()
            .join("\\");
        Self::text(tag, vr, joined)
    }

    pub fn uid(tag: Tag, value: impl Into<String>) -> Self {
        Self::text(tag, VR::UI, value)
    }

    pub fn u16(tag: Tag, value: u16) -> Self {
        Self::bytes(tag, VR::US, value.to_le_bytes().to_vec())
    }

    pub fn u32(tag: Tag, value: u32) -> Self {
        Self::bytes(tag, VR::UL, value.to_le_bytes().to_vec())
    }

    pub fn sequence(tag: Tag, items: Vec<Vec<Element>>) -> Self {
        Element {
            tag,
            vr: VR::SQ,
            value: Value::Items(items),
        }
    }

    /// Raw value bytes, or `None` for sequences.
    pub fn raw(&self) -> Option<&[u8]> {
        match &self.value {
            Value::Bytes(b) => Some(b),
            Value::Items(_) => None,
        }
    }
}

/// VRs encoded with two reserved bytes and a 32-bit length.
pub fn has_long_length(vr: VR) -> bool {
    matches!(
        vr,
        VR::OB
            | VR::OD
            | VR::OF
            | VR::OL
            | VR::OW
            | VR::SQ
            | VR::UC
            | VR::UN
            | VR::UR
            | VR::UT
    )
}

fn pad_byte(vr: VR) -> u8 {
    match vr {
        VR::AE
        | VR::AS
        | VR::CS
        | VR::DA
        | VR::DS
        | VR::DT
        | VR::IS
        | VR::LO
        | VR::LT
        | VR::PN
        | VR::SH
        | VR::ST
        | VR::TM
        | VR::UC
        | VR::UR
        | VR::UT => b' ',
        _ => 0,
    }
}

fn vr_code(vr: VR) -> [u8; 2] {
    let code = vr.to_string();
    let bytes = code.as_bytes();
    [bytes[0], bytes[1]]
}

/// Byte position of one element written to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementOffset {
    pub tag: Tag,
    pub vr: VR,
    /// Offset of the first tag byte.
    pub header: u64,
    /// Offset of the first value byte.
    pub value: u64,
    /// Encoded value length, padding included.
    pub length: u32,
    pub depth: usize,
    /// Index into `OffsetTable::items` of the enclosing sequence item.
    pub item: Option<usize>,
}

impl ElementOffset {
    /// Offset of the length field inside the header.
    pub fn length_field(&self) -> u64 {
        if has_long_length(self.vr) {
            self.header + 8
        } else {
            self.header + 6
        }
    }
}

/// Offsets recorded while serializing a dataset, in emission order.
#[derive(Debug, Clone, Default)]
pub struct OffsetTable {
    pub elements: Vec<ElementOffset>,
    /// Offset of each sequence item tag, in emission order.
    pub items: Vec<u64>,
}

impl OffsetTable {
    /// First top-level element with this tag.
    pub fn find(&self, tag: Tag) -> Option<&ElementOffset> {
        self.elements.iter().find(|e| e.depth == 0 && e.tag == tag)
    }

    /// Value offset of `tag` directly inside each item, indexed like `items`. One pass over
    /// the table.
    pub fn values_by_item(&self, tag: Tag) -> Vec<Option<u64>> {
        let mut slots = vec![None; self.items.len()];
        for element in self.elements.iter().filter(|e| e.tag == tag) {
            if let Some(slot) = element.item.and_then(|i| slots.get_mut(i)) {
                slot.get_or_insert(element.value);
            }
        }
        slots
    }
}

/// File meta information for one Part 10 file.
#[derive(Debug, Clone)]
pub struct FileMeta {
    pub sop_class_uid: String,
    pub sop_instance_uid: String,
}

#[derive(Debug, Clone)]
pub struct EncodedFile {
    pub bytes: Vec<u8>,
    pub offsets: OffsetTable,
}

/// Serialize a complete Part 10 file. Offsets are absolute, preamble included.
pub fn write_part10(meta: &FileMeta, dataset: &[Element]) -> Result<EncodedFile> {
    encode_part10(meta, dataset).map_err(|e| ForgeError::InvalidInput(e.to_string()))
}

fn encode_part10(meta: &FileMeta, dataset: &[Element]) -> io::Result<EncodedFile> {
    let mut buf = vec![0u8; PREAMBLE_LEN];
    buf.extend_from_slice(MAGIC);

    let meta_elements = [
        Element::bytes(Tag(0x0002, 0x0001), VR::OB, vec![0x00, 0x01]),
        Element::uid(Tag(0x0002, 0x0002), meta.sop_class_uid.as_str()),
        Element::uid(Tag(0x0002, 0x0003), meta.sop_instance_uid.as_str()),
        Element::uid(Tag(0x0002, 0x0010), EXPLICIT_VR_LITTLE_ENDIAN),
        Element::uid(Tag(0x0002, 0x0012), IMPLEMENTATION_CLASS_UID),
        Element::text(Tag(0x0002, 0x0013), VR::SH, IMPLEMENTATION_VERSION),
    ];
    let mut scratch = OffsetTable::default();
    let mut group = Vec::new();
    for element in &meta_elements {
        encode_element(&mut group, element, 0, None, &mut scratch)?;
    }
    let group_length = Element::u32(Tag(0x0002, 0x0000), group.len() as u32);
    encode_element(&mut buf, &group_length, 0, None, &mut scratch)?;
    buf.extend_from_slice(&group);

    let mut offsets = OffsetTable::default();
    for element in dataset {
        encode_element(&mut buf, element, 0, None, &mut offsets)?;
    }
    Ok(EncodedFile {
        bytes: buf,
        offsets,
    })
}

fn write_tag(buf: &mut Vec<u8>, tag: Tag) -> io::Result<()> {
    buf.write_u16::<LittleEndian>(tag.group())?;
    buf.write_u16::<LittleEndian>(tag.element())
}

fn encode_element(
    buf: &mut Vec<u8>,
    element: &Element,
    depth: usize,
    item: Option<usize>,
    table: &mut OffsetTable,
) -> io::Result<()> {
    let header = buf.len() as u64;
    write_tag(buf, element.tag)?;
    buf.extend_from_slice(&vr_code(element.vr));

    match &element.value {
        Value::Bytes(bytes) => {
            let padded = bytes.len() + bytes.len() % 2;
            if has_long_length(element.vr) {
                let length = u32::try_from(padded).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidData, "element value exceeds 4 GiB")
                })?;
                buf.write_u16::<LittleEndian>(0)?;
                buf.write_u32::<LittleEndian>(length)?;
            } else {
                let length = u16::try_from(padded).map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "value of ({:04X},{:04X}) too long for {}",
                            element.tag.group(),
                            element.tag.element(),
                            element.vr
                        ),
                    )
                })?;
                buf.write_u16::<LittleEndian>(length)?;
            }
            table.elements.push(ElementOffset {
                tag: element.tag,
                vr: element.vr,
                header,
                value: buf.len() as u64,
                length: padded as u32,
                depth,
                item,
            });
            buf.extend_from_slice(bytes);
            if bytes.len() % 2 == 1 {
                buf.push(pad_byte(element.vr));
            }
        }
        Value::Items(items) => {
            buf.write_u16::<LittleEndian>(0)?;
            let length_at = buf.len();
            buf.write_u32::<LittleEndian>(0)?;
            let entry = table.elements.len();
            let value_start = buf.len();
            table.elements.push(ElementOffset {
                tag: element.tag,
                vr: element.vr,
                header,
                value: value_start as u64,
                length: 0,
                depth,
                item,
            });

            for children in items {
                let item_start = buf.len();
                let item_index = table.items.len();
                table.items.push(item_start as u64);
                write_tag(buf, ITEM)?;
                buf.write_u32::<LittleEndian>(0)?;
                for child in children {
                    encode_element(buf, child, depth + 1, Some(item_index), table)?;
                }
                let item_length = (buf.len() - item_start - 8) as u32;
                LittleEndian::write_u32(&mut buf[item_start + 4..item_start + 8], item_length);
            }

            let length = (buf.len() - value_start) as u32;
            LittleEndian::write_u32(&mut buf[length_at..length_at + 4], length);
            table.elements[entry].length = length;
        }
    }
    Ok(())
}

/// Overwrite bytes at an absolute offset of an existing file.
pub fn patch_at(path: &Path, offset: u64, bytes: &[u8]) -> Result<()> {
    patch_all(path, &[(offset, bytes.to_vec())])
}

/// Apply several in-place overwrites through a single handle.
pub fn patch_all(path: &Path, patches: &[(u64, Vec<u8>)]) -> Result<()> {
    let mut file = OpenOptions::new().write(true).open(path).at_path(path)?;
    for (offset, bytes) in patches {
        file.seek(SeekFrom::Start(*offset)).at_path(path)?;
        file.write_all(bytes).at_path(path)?;
    }
    file.flush().at_path(path)?;
    Ok(())
}

/// Element recovered by the tolerant reader.
#[derive(Debug, Clone)]
pub struct ParsedElement {
    pub tag: Tag,
    pub vr: VR,
    /// Absolute offset of the tag bytes.
    pub offset: u64,
    pub length: u32,
    /// Empty for sequences and for pixel data, which is never loaded.
    pub value: Vec<u8>,
    pub items: Vec<ParsedItem>,
}

impl ParsedElement {
    /// Value decoded as text with trailing padding removed.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.value)
            .trim_end_matches(['\0', ' '])
            .trim_start()
            .to_string()
    }

    pub fn u16(&self) -> Option<u16> {
        (self.value.len() >= 2).then(|| LittleEndian::read_u16(&self.value))
    }

    pub fn u32(&self) -> Option<u32> {
        (self.value.len() >= 4).then(|| LittleEndian::read_u32(&self.value))
    }
}

#[derive(Debug, Clone)]
pub struct ParsedItem {
    /// Absolute offset of the item tag.
    pub offset: u64,
    pub elements: Vec<ParsedElement>,
}

impl ParsedItem {
    pub fn get(&self, tag: Tag) -> Option<&ParsedElement> {
        self.elements.iter().find(|e| e.tag == tag)
    }
}

/// Elements recovered from a file, meta group included.
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    pub elements: Vec<ParsedElement>,
}

impl ParsedFile {
    pub fn get(&self, tag: Tag) -> Option<&ParsedElement> {
        self.elements.iter().find(|e| e.tag == tag)
    }

    pub fn text(&self, tag: Tag) -> Option<String> {
        self.get(tag).map(ParsedElement::text).filter(|s| !s.is_empty())
    }
}

/// Read a Part 10 file element by element. Parsing stops silently at the first element that
/// cannot be decoded and at pixel data; whatever was recovered up to that point is returned.
pub fn read_part10(path: &Path) -> Result<ParsedFile> {
    let file = std::fs::File::open(path).at_path(path)?;
    let mut reader = io::BufReader::new(file);

    let mut preamble = [0u8; PREAMBLE_LEN + 4];
    if reader.read_exact(&mut preamble).is_err() || &preamble[PREAMBLE_LEN..] != MAGIC {
        return Ok(ParsedFile::default());
    }

    let mut elements = Vec::new();
    let mut position = (PREAMBLE_LEN + 4) as u64;
    while let Ok(Some(element)) = read_element(&mut reader, &mut position) {
        let stop = element.tag == PIXEL_DATA;
        elements.push(element);
        if stop {
            break;
        }
    }
    Ok(ParsedFile { elements })
}

fn read_element<R: Read>(reader: &mut R, position: &mut u64) -> io::Result<Option<ParsedElement>> {
    let offset = *position;
    let group = match reader.read_u16::<LittleEndian>() {
        Ok(g) => g,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    let element = reader.read_u16::<LittleEndian>()?;
    let tag = Tag(group, element);
    if group == 0xFFFE {
        return Err(invalid("unexpected delimiter"));
    }

    let mut code = [0u8; 2];
    reader.read_exact(&mut code)?;
    let vr = VR::from_binary(code).ok_or_else(|| invalid("unknown VR"))?;
    let (length, header_len) = if has_long_length(vr) {
        reader.read_u16::<LittleEndian>()?;
        (reader.read_u32::<LittleEndian>()?, 12)
    } else {
        (u32::from(reader.read_u16::<LittleEndian>()?), 8)
    };
    *position += header_len;

    if length == UNDEFINED_LENGTH {
        return Err(invalid("undefined length"));
    }

    let mut parsed = ParsedElement {
        tag,
        vr,
        offset,
        length,
        value: Vec::new(),
        items: Vec::new(),
    };
    if tag == PIXEL_DATA {
        return Ok(Some(parsed));
    }

    let mut value = Vec::new();
    reader.by_ref().take(u64::from(length)).read_to_end(&mut value)?;
    if value.len() != length as usize {
        return Err(invalid("truncated value"));
    }
    let value_start = *position;
    *position += u64::from(length);

    if vr == VR::SQ {
        parsed.items = read_items(&value, value_start)?;
    } else {
        parsed.value = value;
    }
    Ok(Some(parsed))
}

fn read_items(bytes: &[u8], base: u64) -> io::Result<Vec<ParsedItem>> {
    let mut cursor = Cursor::new(bytes);
    let mut items = Vec::new();
    while (cursor.position() as usize) < bytes.len() {
        let offset = base + cursor.position();
        let tag = Tag(
            cursor.read_u16::<LittleEndian>()?,
            cursor.read_u16::<LittleEndian>()?,
        );
        if tag != ITEM {
            return Err(invalid("expected item"));
        }
        let length = cursor.read_u32::<LittleEndian>()?;
        if length == UNDEFINED_LENGTH {
            return Err(invalid("undefined item length"));
        }
        let start = cursor.position() as usize;
        let end = start
            .checked_add(length as usize)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| invalid("item overruns sequence"))?;

        let mut inner = Cursor::new(&bytes[start..end]);
        let mut position = base + start as u64;
        let mut elements = Vec::new();
        while let Some(element) = read_element(&mut inner, &mut position)? {
            elements.push(element);
        }
        items.push(ParsedItem { offset, elements });
        cursor.set_position(end as u64);
    }
    Ok(items)
}

fn invalid(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_string())
}
