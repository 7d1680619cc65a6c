//! Minimal reader for Android binary XML (`AndroidManifest.xml` inside an apk).
//!
//! Only what manifest introspection needs is decoded: the string pool, the
//! resource id map, and start-element chunks with their typed attributes.

use anyhow::{bail, Context, Result};

const RES_XML_TYPE: u16 = 0x0003;
const RES_STRING_POOL_TYPE: u16 = 0x0001;
const RES_XML_RESOURCE_MAP_TYPE: u16 = 0x0180;
const RES_XML_START_ELEMENT_TYPE: u16 = 0x0102;

const UTF8_FLAG: u32 = 0x0100;
const NO_INDEX: u32 = 0xffff_ffff;

const TYPE_STRING: u8 = 0x03;
const TYPE_INT_DEC: u8 = 0x10;
const TYPE_INT_HEX: u8 = 0x11;
const TYPE_INT_BOOLEAN: u8 = 0x12;

/// Value of one attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    String(String),
    Int(u32),
    Bool(bool),
    /// Any other typed value: references, dimensions, colors.
    Other { data_type: u8, data: u32 },
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value, also accepting a decimal string.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            AttrValue::Int(v) => Some(*v),
            AttrValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    /// Framework resource id of the attribute name, when the map has one.
    pub resource_id: Option<u32>,
    pub value: AttrValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<Attribute>,
}

impl Element {
    /// Look an attribute up by name, or by resource id when names were stripped.
    pub fn attr(&self, name: &str, resource_id: Option<u32>) -> Option<&AttrValue> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .or_else(|| {
                resource_id.and_then(|id| self.attributes.iter().find(|a| a.resource_id == Some(id)))
            })
            .map(|a| &a.value)
    }
}

struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn u8(&self, at: usize) -> Result<u8> {
        self.data
            .get(at)
            .copied()
            .with_context(|| format!("binary xml truncated at offset {}", at))
    }

    fn u16(&self, at: usize) -> Result<u16> {
        let bytes = self
            .data
            .get(at..at + 2)
            .with_context(|| format!("binary xml truncated at offset {}", at))?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&self, at: usize) -> Result<u32> {
        let bytes = self
            .data
            .get(at..at + 4)
            .with_context(|| format!("binary xml truncated at offset {}", at))?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn bytes(&self, at: usize, len: usize) -> Result<&'a [u8]> {
        self.data
            .get(at..at + len)
            .with_context(|| format!("binary xml truncated at offset {}", at))
    }
}

/// Parse every start element in document order.
pub fn parse_elements(data: &[u8]) -> Result<Vec<Element>> {
    let reader = Reader { data };
    if reader.u16(0)? != RES_XML_TYPE {
        bail!("not an Android binary xml document");
    }
    let header_size = reader.u16(2)? as usize;
    let total = (reader.u32(4)? as usize).min(data.len());

    let mut strings = Vec::new();
    let mut resource_ids = Vec::new();
    let mut elements = Vec::new();

    let mut offset = header_size;
    while offset + 8 <= total {
        let chunk_type = reader.u16(offset)?;
        let chunk_header = reader.u16(offset + 2)? as usize;
        let chunk_size = reader.u32(offset + 4)? as usize;
        if chunk_size < 8 {
            bail!("malformed chunk at offset {}", offset);
        }

        match chunk_type {
            RES_STRING_POOL_TYPE => strings = parse_string_pool(&reader, offset)?,
            RES_XML_RESOURCE_MAP_TYPE => {
                let count = (chunk_size - chunk_header) / 4;
                resource_ids = (0..count)
                    .map(|i| reader.u32(offset + chunk_header + i * 4))
                    .collect::<Result<_>>()?;
            }
            RES_XML_START_ELEMENT_TYPE => {
                elements.push(parse_start_element(&reader, offset, chunk_header, &strings, &resource_ids)?);
            }
            _ => {}
        }
        offset += chunk_size;
    }

    Ok(elements)
}

fn parse_string_pool(reader: &Reader<'_>, chunk: usize) -> Result<Vec<String>> {
    let count = reader.u32(chunk + 8)? as usize;
    let flags = reader.u32(chunk + 16)?;
    let strings_start = reader.u32(chunk + 20)? as usize;
    let header_size = reader.u16(chunk + 2)? as usize;
    let utf8 = flags & UTF8_FLAG != 0;

    (0..count)
        .map(|i| {
            let rel = reader.u32(chunk + header_size + i * 4)? as usize;
            let at = chunk + strings_start + rel;
            if utf8 {
                read_utf8(reader, at)
            } else {
                read_utf16(reader, at)
            }
        })
        .collect()
}

fn read_utf8(reader: &Reader<'_>, at: usize) -> Result<String> {
    // Character count, then byte count; each one or two bytes.
    let (_, skip) = utf8_length(reader, at)?;
    let (len, skip2) = utf8_length(reader, at + skip)?;
    let bytes = reader.bytes(at + skip + skip2, len)?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

fn utf8_length(reader: &Reader<'_>, at: usize) -> Result<(usize, usize)> {
    let first = reader.u8(at)? as usize;
    if first & 0x80 != 0 {
        let second = reader.u8(at + 1)? as usize;
        Ok((((first & 0x7f) << 8) | second, 2))
    } else {
        Ok((first, 1))
    }
}

fn read_utf16(reader: &Reader<'_>, at: usize) -> Result<String> {
    let first = reader.u16(at)? as usize;
    let (len, skip) = if first & 0x8000 != 0 {
        let second = reader.u16(at + 2)? as usize;
        (((first & 0x7fff) << 16) | second, 4)
    } else {
        (first, 2)
    };
    let units = (0..len)
        .map(|i| reader.u16(at + skip + i * 2))
        .collect::<Result<Vec<u16>>>()?;
    Ok(String::from_utf16_lossy(&units))
}

fn parse_start_element(
    reader: &Reader<'_>,
    chunk: usize,
    header_size: usize,
    strings: &[String],
    resource_ids: &[u32],
) -> Result<Element> {
    let string = |index: u32| -> String {
        if index == NO_INDEX {
            return String::new();
        }
        strings.get(index as usize).cloned().unwrap_or_default()
    };

    let ext = chunk + header_size;
    let name = string(reader.u32(ext + 4)?);
    let attribute_start = reader.u16(ext + 8)? as usize;
    let attribute_size = reader.u16(ext + 10)? as usize;
    let attribute_count = reader.u16(ext + 12)? as usize;

    let mut attributes = Vec::with_capacity(attribute_count);
    for i in 0..attribute_count {
        let at = ext + attribute_start + i * attribute_size;
        let name_index = reader.u32(at + 4)?;
        let raw_value = reader.u32(at + 8)?;
        let data_type = reader.u8(at + 15)?;
        let data = reader.u32(at + 16)?;

        let value = match data_type {
            TYPE_STRING => AttrValue::String(string(data)),
            TYPE_INT_DEC | TYPE_INT_HEX => AttrValue::Int(data),
            TYPE_INT_BOOLEAN => AttrValue::Bool(data != 0),
            _ if raw_value != NO_INDEX => AttrValue::String(string(raw_value)),
            _ => AttrValue::Other { data_type, data },
        };

        attributes.push(Attribute {
            name: string(name_index),
            resource_id: resource_ids.get(name_index as usize).copied(),
            value,
        });
    }

    Ok(Element { name, attributes })
}
