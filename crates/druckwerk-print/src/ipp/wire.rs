// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// IPP binary encoding (RFC 8010 §3) to and from the core attribute model.
//
// ```text
// version-number:   2 bytes (major, minor)
// operation-id or
// status-code:      2 bytes (big-endian)
// request-id:       4 bytes (big-endian)
// attribute-groups: delimiter-tag, then attributes
//   value-tag:      1 byte
//   name-length:    2 bytes, 0 for additional values of the previous name
//   name
//   value-length:   2 bytes
//   value
// end-of-attributes-tag (0x03)
// document data:    remainder
// ```

use druckwerk_core::{AttrValue, Attribute, AttributeGroup};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Delimiter tags (RFC 8010 §3.5.1)
// ---------------------------------------------------------------------------

pub const TAG_OPERATION_ATTRIBUTES: u8 = 0x01;
pub const TAG_JOB_ATTRIBUTES: u8 = 0x02;
pub const TAG_END_OF_ATTRIBUTES: u8 = 0x03;
pub const TAG_PRINTER_ATTRIBUTES: u8 = 0x04;
pub const TAG_UNSUPPORTED_ATTRIBUTES: u8 = 0x05;
pub const TAG_DOCUMENT_ATTRIBUTES: u8 = 0x09;

// ---------------------------------------------------------------------------
// Value tags (RFC 8010 §3.5.2)
// ---------------------------------------------------------------------------

pub const VALUE_TAG_UNSUPPORTED: u8 = 0x10;
pub const VALUE_TAG_UNKNOWN: u8 = 0x12;
pub const VALUE_TAG_NO_VALUE: u8 = 0x13;
pub const VALUE_TAG_INTEGER: u8 = 0x21;
pub const VALUE_TAG_BOOLEAN: u8 = 0x22;
pub const VALUE_TAG_ENUM: u8 = 0x23;
pub const VALUE_TAG_OCTET_STRING: u8 = 0x30;
pub const VALUE_TAG_DATE_TIME: u8 = 0x31;
pub const VALUE_TAG_RESOLUTION: u8 = 0x32;
pub const VALUE_TAG_RANGE: u8 = 0x33;
pub const VALUE_TAG_BEGIN_COLLECTION: u8 = 0x34;
pub const VALUE_TAG_TEXT_WITH_LANGUAGE: u8 = 0x35;
pub const VALUE_TAG_NAME_WITH_LANGUAGE: u8 = 0x36;
pub const VALUE_TAG_END_COLLECTION: u8 = 0x37;
pub const VALUE_TAG_TEXT: u8 = 0x41;
pub const VALUE_TAG_NAME: u8 = 0x42;
pub const VALUE_TAG_KEYWORD: u8 = 0x44;
pub const VALUE_TAG_URI: u8 = 0x45;
pub const VALUE_TAG_URI_SCHEME: u8 = 0x46;
pub const VALUE_TAG_CHARSET: u8 = 0x47;
pub const VALUE_TAG_NATURAL_LANGUAGE: u8 = 0x48;
pub const VALUE_TAG_MIME_TYPE: u8 = 0x49;
pub const VALUE_TAG_MEMBER_NAME: u8 = 0x4A;

/// Collections nested deeper than this are rejected.
const MAX_COLLECTION_DEPTH: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("message too short: {0} bytes (minimum 8)")]
    TooShort(usize),

    #[error("truncated {0}")]
    Truncated(&'static str),

    #[error("value tag {tag:#04x} has a {len}-byte value")]
    BadLength { tag: u8, len: usize },

    #[error("additional value for '{0}' has no preceding attribute")]
    OrphanValue(String),

    #[error("attribute outside of any group")]
    NoGroup,

    #[error("malformed collection: {0}")]
    Collection(&'static str),
}

/// One attribute group together with its delimiter tag.
#[derive(Debug, Clone, PartialEq)]
pub struct IppGroup {
    pub tag: u8,
    pub attributes: AttributeGroup,
}

impl IppGroup {
    pub fn new(tag: u8) -> Self {
        Self {
            tag,
            attributes: AttributeGroup::new(),
        }
    }
}

/// A request or a response. `code` is the operation-id of a request and
/// the status-code of a response.
#[derive(Debug, Clone, PartialEq)]
pub struct IppMessage {
    pub version: (u8, u8),
    pub code: u16,
    pub request_id: u32,
    pub groups: Vec<IppGroup>,
}

impl IppMessage {
    pub fn new(version: (u8, u8), code: u16, request_id: u32) -> Self {
        Self {
            version,
            code,
            request_id,
            groups: Vec::new(),
        }
    }

    /// First group with `tag`.
    pub fn group(&self, tag: u8) -> Option<&AttributeGroup> {
        self.groups
            .iter()
            .find(|g| g.tag == tag)
            .map(|g| &g.attributes)
    }

    /// Every group with `tag`, in order.
    pub fn groups_of(&self, tag: u8) -> impl Iterator<Item = &AttributeGroup> {
        self.groups
            .iter()
            .filter(move |g| g.tag == tag)
            .map(|g| &g.attributes)
    }

    /// Start a new group and return it for filling.
    pub fn push_group(&mut self, tag: u8) -> &mut AttributeGroup {
        self.groups.push(IppGroup::new(tag));
        let last = self.groups.len() - 1;
        &mut self.groups[last].attributes
    }

    /// Serialize with an end-of-attributes tag and no document data.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(512);
        buf.push(self.version.0);
        buf.push(self.version.1);
        buf.extend_from_slice(&self.code.to_be_bytes());
        buf.extend_from_slice(&self.request_id.to_be_bytes());
        for group in &self.groups {
            buf.push(group.tag);
            for attr in group.attributes.iter() {
                write_attribute(&mut buf, attr);
            }
        }
        buf.push(TAG_END_OF_ATTRIBUTES);
        buf
    }

    /// Parse a message. Returns the message and the offset of the first
    /// document byte.
    pub fn parse(data: &[u8]) -> Result<(Self, usize), WireError> {
        if data.len() < 8 {
            return Err(WireError::TooShort(data.len()));
        }
        let mut r = WireReader { data, pos: 0 };
        let version = (r.u8("version")?, r.u8("version")?);
        let code = r.u16("operation-id")?;
        let request_id = r.u32("request-id")?;
        let mut message = Self::new(version, code, request_id);
        let mut current: Option<IppGroup> = None;

        while r.pos < data.len() {
            let tag = r.u8("tag")?;
            if tag < 0x10 {
                if let Some(group) = current.take() {
                    message.groups.push(group);
                }
                if tag == TAG_END_OF_ATTRIBUTES {
                    break;
                }
                current = Some(IppGroup::new(tag));
                continue;
            }

            let name = r.string("attribute name")?;
            let raw = r.bytes("attribute value")?;
            let value = if tag == VALUE_TAG_BEGIN_COLLECTION {
                AttrValue::Collection(read_collection(&mut r, 1)?)
            } else {
                decode_value(tag, raw)?
            };
            let group = current.as_mut().ok_or(WireError::NoGroup)?;
            append(&mut group.attributes, name, value)?;
        }
        if let Some(group) = current.take() {
            message.groups.push(group);
        }
        Ok((message, r.pos))
    }
}

/// Add `value` under `name`, or to the previous attribute when `name` is
/// empty.
fn append(group: &mut AttributeGroup, name: String, value: AttrValue) -> Result<(), WireError> {
    if name.is_empty() {
        let last = group
            .iter()
            .last()
            .map(|a| a.name.clone())
            .ok_or_else(|| WireError::OrphanValue(String::new()))?;
        let mut attr = group
            .remove(&last)
            .ok_or(WireError::OrphanValue(last))?;
        attr.values.push(value);
        group.insert(attr);
    } else {
        group.insert(Attribute::new(name, value));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], WireError> {
        let end = self.pos.checked_add(n).ok_or(WireError::Truncated(what))?;
        let slice = self.data.get(self.pos..end).ok_or(WireError::Truncated(what))?;
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self, what: &'static str) -> Result<u8, WireError> {
        Ok(self.take(1, what)?[0])
    }

    fn u16(&mut self, what: &'static str) -> Result<u16, WireError> {
        let b = self.take(2, what)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self, what: &'static str) -> Result<u32, WireError> {
        let b = self.take(4, what)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn bytes(&mut self, what: &'static str) -> Result<&'a [u8], WireError> {
        let len = usize::from(self.u16(what)?);
        self.take(len, what)
    }

    fn string(&mut self, what: &'static str) -> Result<String, WireError> {
        Ok(String::from_utf8_lossy(self.bytes(what)?).into_owned())
    }
}

/// Read collection members up to the matching end-collection tag.
fn read_collection(r: &mut WireReader<'_>, depth: usize) -> Result<AttributeGroup, WireError> {
    if depth > MAX_COLLECTION_DEPTH {
        return Err(WireError::Collection("nested too deeply"));
    }
    let mut group = AttributeGroup::new();
    let mut member: Option<Attribute> = None;
    loop {
        let tag = r.u8("collection member")?;
        let _name = r.bytes("collection member name")?;
        let raw = r.bytes("collection member value")?;
        match tag {
            VALUE_TAG_END_COLLECTION => break,
            VALUE_TAG_MEMBER_NAME => {
                if let Some(done) = member.take() {
                    group.insert(done);
                }
                let name = String::from_utf8_lossy(raw).into_owned();
                member = Some(Attribute::with_values(name, Vec::new()));
            }
            _ => {
                let value = if tag == VALUE_TAG_BEGIN_COLLECTION {
                    AttrValue::Collection(read_collection(r, depth + 1)?)
                } else {
                    decode_value(tag, raw)?
                };
                member
                    .as_mut()
                    .ok_or(WireError::Collection("value before member name"))?
                    .values
                    .push(value);
            }
        }
    }
    if let Some(done) = member {
        group.insert(done);
    }
    Ok(group)
}

fn fixed<const N: usize>(tag: u8, raw: &[u8]) -> Result<[u8; N], WireError> {
    raw.try_into()
        .map_err(|_| WireError::BadLength { tag, len: raw.len() })
}

fn decode_value(tag: u8, raw: &[u8]) -> Result<AttrValue, WireError> {
    let text = || String::from_utf8_lossy(raw).into_owned();
    Ok(match tag {
        VALUE_TAG_INTEGER => AttrValue::Integer(i32::from_be_bytes(fixed(tag, raw)?)),
        VALUE_TAG_ENUM => AttrValue::Enum(i32::from_be_bytes(fixed(tag, raw)?)),
        VALUE_TAG_BOOLEAN => AttrValue::Boolean(fixed::<1>(tag, raw)?[0] != 0),
        VALUE_TAG_RANGE => {
            let b: [u8; 8] = fixed(tag, raw)?;
            AttrValue::Range {
                lower: i32::from_be_bytes([b[0], b[1], b[2], b[3]]),
                upper: i32::from_be_bytes([b[4], b[5], b[6], b[7]]),
            }
        }
        VALUE_TAG_RESOLUTION => {
            let b: [u8; 9] = fixed(tag, raw)?;
            AttrValue::Resolution {
                x: i32::from_be_bytes([b[0], b[1], b[2], b[3]]),
                y: i32::from_be_bytes([b[4], b[5], b[6], b[7]]),
                units: b[8] as i8,
            }
        }
        VALUE_TAG_TEXT_WITH_LANGUAGE | VALUE_TAG_NAME_WITH_LANGUAGE => {
            let mut inner = WireReader { data: raw, pos: 0 };
            let _language = inner.bytes("language")?;
            let value = String::from_utf8_lossy(inner.bytes("text")?).into_owned();
            if tag == VALUE_TAG_TEXT_WITH_LANGUAGE {
                AttrValue::Text(value)
            } else {
                AttrValue::Name(value)
            }
        }
        VALUE_TAG_TEXT => AttrValue::Text(text()),
        VALUE_TAG_NAME => AttrValue::Name(text()),
        VALUE_TAG_KEYWORD | VALUE_TAG_URI_SCHEME => AttrValue::Keyword(text()),
        VALUE_TAG_URI => AttrValue::Uri(text()),
        VALUE_TAG_CHARSET => AttrValue::Charset(text()),
        VALUE_TAG_NATURAL_LANGUAGE => AttrValue::Language(text()),
        VALUE_TAG_MIME_TYPE => AttrValue::MimeType(text()),
        _ => AttrValue::Unknown {
            tag,
            data: raw.to_vec(),
        },
    })
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

fn write_field(buf: &mut Vec<u8>, bytes: &[u8]) {
    let len = bytes.len().min(usize::from(u16::MAX));
    buf.extend_from_slice(&(len as u16).to_be_bytes());
    buf.extend_from_slice(&bytes[..len]);
}

fn write_attribute(buf: &mut Vec<u8>, attr: &Attribute) {
    for (i, value) in attr.values.iter().enumerate() {
        let name = if i == 0 { attr.name.as_str() } else { "" };
        write_value(buf, name, value);
    }
}

fn write_value(buf: &mut Vec<u8>, name: &str, value: &AttrValue) {
    let (tag, bytes): (u8, Vec<u8>) = match value {
        AttrValue::Integer(v) => (VALUE_TAG_INTEGER, v.to_be_bytes().to_vec()),
        AttrValue::Enum(v) => (VALUE_TAG_ENUM, v.to_be_bytes().to_vec()),
        AttrValue::Boolean(v) => (VALUE_TAG_BOOLEAN, vec![u8::from(*v)]),
        AttrValue::Text(s) => (VALUE_TAG_TEXT, s.as_bytes().to_vec()),
        AttrValue::Name(s) => (VALUE_TAG_NAME, s.as_bytes().to_vec()),
        AttrValue::Keyword(s) => (VALUE_TAG_KEYWORD, s.as_bytes().to_vec()),
        AttrValue::Uri(s) => (VALUE_TAG_URI, s.as_bytes().to_vec()),
        AttrValue::Charset(s) => (VALUE_TAG_CHARSET, s.as_bytes().to_vec()),
        AttrValue::Language(s) => (VALUE_TAG_NATURAL_LANGUAGE, s.as_bytes().to_vec()),
        AttrValue::MimeType(s) => (VALUE_TAG_MIME_TYPE, s.as_bytes().to_vec()),
        AttrValue::Range { lower, upper } => {
            let mut b = lower.to_be_bytes().to_vec();
            b.extend_from_slice(&upper.to_be_bytes());
            (VALUE_TAG_RANGE, b)
        }
        AttrValue::Resolution { x, y, units } => {
            let mut b = x.to_be_bytes().to_vec();
            b.extend_from_slice(&y.to_be_bytes());
            b.push(*units as u8);
            (VALUE_TAG_RESOLUTION, b)
        }
        AttrValue::Unknown { tag, data } => (*tag, data.clone()),
        AttrValue::Collection(group) => {
            buf.push(VALUE_TAG_BEGIN_COLLECTION);
            write_field(buf, name.as_bytes());
            write_field(buf, &[]);
            for member in group.iter() {
                buf.push(VALUE_TAG_MEMBER_NAME);
                write_field(buf, &[]);
                write_field(buf, member.name.as_bytes());
                for value in &member.values {
                    write_value(buf, "", value);
                }
            }
            buf.push(VALUE_TAG_END_COLLECTION);
            write_field(buf, &[]);
            write_field(buf, &[]);
            return;
        }
    };
    buf.push(tag);
    write_field(buf, name.as_bytes());
    write_field(buf, &bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(code: u16) -> IppMessage {
        let mut message = IppMessage::new((2, 0), code, 7);
        let op = message.push_group(TAG_OPERATION_ATTRIBUTES);
        op.insert(Attribute::new("attributes-charset", AttrValue::Charset("utf-8".into())));
        op.insert(Attribute::new(
            "attributes-natural-language",
            AttrValue::Language("en".into()),
        ));
        message
    }

    #[test]
    fn document_data_follows_end_tag() {
        let mut bytes = request(0x0002).encode();
        let header_len = bytes.len();
        bytes.extend_from_slice(b"%!PS");
        let (message, offset) = IppMessage::parse(&bytes).expect("parse");
        assert_eq!(offset, header_len);
        assert_eq!(&bytes[offset..], b"%!PS");
        assert_eq!(message.version, (2, 0));
        assert_eq!(message.code, 0x0002);
        assert_eq!(message.request_id, 7);
    }

    #[test]
    fn additional_values_join_previous_attribute() {
        let mut message = request(0x000B);
        message.groups[0].attributes.insert(Attribute::with_values(
            "requested-attributes",
            vec![AttrValue::keyword("printer-name"), AttrValue::keyword("media-default")],
        ));
        let (parsed, _) = IppMessage::parse(&message.encode()).expect("parse");
        let op = parsed.group(TAG_OPERATION_ATTRIBUTES).expect("op group");
        assert_eq!(op.len(), 3);
        assert_eq!(
            op.strings("requested-attributes"),
            vec!["printer-name", "media-default"]
        );
    }

    #[test]
    fn nested_collections_survive() {
        let size = AttributeGroup::new()
            .with("x-dimension", AttrValue::Integer(21000))
            .with("y-dimension", AttrValue::Integer(29700));
        let col = AttributeGroup::new()
            .with("media-size", AttrValue::Collection(size))
            .with("media-source", AttrValue::keyword("main"));
        let mut message = request(0x0002);
        message
            .push_group(TAG_JOB_ATTRIBUTES)
            .insert(Attribute::new("media-col", AttrValue::Collection(col.clone())));

        let (parsed, _) = IppMessage::parse(&message.encode()).expect("parse");
        let job = parsed.group(TAG_JOB_ATTRIBUTES).expect("job group");
        assert_eq!(job.collection("media-col"), Some(&col));
    }

    #[test]
    fn language_tagged_strings_lose_their_language() {
        let mut bytes = vec![1, 1, 0, 2, 0, 0, 0, 1, TAG_OPERATION_ATTRIBUTES];
        bytes.push(VALUE_TAG_NAME_WITH_LANGUAGE);
        bytes.extend_from_slice(&8u16.to_be_bytes());
        bytes.extend_from_slice(b"job-name");
        let value: Vec<u8> = [
            &2u16.to_be_bytes()[..],
            &b"de"[..],
            &5u16.to_be_bytes()[..],
            &b"Brief"[..],
        ]
        .concat();
        bytes.extend_from_slice(&(value.len() as u16).to_be_bytes());
        bytes.extend_from_slice(&value);
        bytes.push(TAG_END_OF_ATTRIBUTES);

        let (parsed, _) = IppMessage::parse(&bytes).expect("parse");
        let op = parsed.group(TAG_OPERATION_ATTRIBUTES).expect("op group");
        assert_eq!(op.string("job-name"), Some("Brief"));
    }

    #[test]
    fn malformed_messages_are_rejected() {
        assert_eq!(IppMessage::parse(&[1, 1, 0]), Err(WireError::TooShort(3)));

        let mut truncated = request(0x0002).encode();
        truncated.truncate(truncated.len() - 4);
        assert!(matches!(
            IppMessage::parse(&truncated),
            Err(WireError::Truncated(_))
        ));

        let bad_integer = [
            1, 1, 0, 2, 0, 0, 0, 1, TAG_OPERATION_ATTRIBUTES, VALUE_TAG_INTEGER, 0, 1, b'n', 0, 2,
            0, 1, TAG_END_OF_ATTRIBUTES,
        ];
        assert_eq!(
            IppMessage::parse(&bad_integer),
            Err(WireError::BadLength {
                tag: VALUE_TAG_INTEGER,
                len: 2
            })
        );
    }

    #[test]
    fn out_of_band_values_are_carried() {
        let mut message = IppMessage::new((1, 1), 0x0400, 3);
        message.push_group(TAG_UNSUPPORTED_ATTRIBUTES).insert(Attribute::new(
            "finishings-col",
            AttrValue::Unknown {
                tag: VALUE_TAG_UNSUPPORTED,
                data: Vec::new(),
            },
        ));
        let (parsed, _) = IppMessage::parse(&message.encode()).expect("parse");
        let group = parsed.group(TAG_UNSUPPORTED_ATTRIBUTES).expect("group");
        assert_eq!(
            group.get("finishings-col").and_then(|a| a.first()),
            Some(&AttrValue::Unknown {
                tag: VALUE_TAG_UNSUPPORTED,
                data: Vec::new()
            })
        );
    }
}
