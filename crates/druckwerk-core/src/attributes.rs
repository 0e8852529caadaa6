// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Parsed IPP attributes: the input to option resolution and the output of
// the request parser.

use serde::{Deserialize, Serialize};

/// `units` value for dots per inch in an IPP resolution.
pub const RES_PER_INCH: i8 = 3;
/// `units` value for dots per centimetre.
pub const RES_PER_CM: i8 = 4;

/// One IPP attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Integer(i32),
    Boolean(bool),
    Enum(i32),
    Text(String),
    Name(String),
    Keyword(String),
    Uri(String),
    Charset(String),
    Language(String),
    MimeType(String),
    Range { lower: i32, upper: i32 },
    Resolution { x: i32, y: i32, units: i8 },
    Collection(AttributeGroup),
    /// A value whose syntax is carried but not interpreted.
    Unknown { tag: u8, data: Vec<u8> },
}

impl AttrValue {
    pub fn keyword(value: impl Into<String>) -> Self {
        Self::Keyword(value.into())
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn name(value: impl Into<String>) -> Self {
        Self::Name(value.into())
    }

    /// Integer content of integer and enum values.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Integer(v) | Self::Enum(v) => Some(*v),
            _ => None,
        }
    }

    /// String content of any string-syntax value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s)
            | Self::Name(s)
            | Self::Keyword(s)
            | Self::Uri(s)
            | Self::Charset(s)
            | Self::Language(s)
            | Self::MimeType(s) => Some(s),
            _ => None,
        }
    }

    /// Render for logs and vendor passthrough.
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Integer(v) | Self::Enum(v) => v.to_string(),
            Self::Boolean(v) => v.to_string(),
            Self::Range { lower, upper } => format!("{lower}-{upper}"),
            Self::Resolution { x, y, units } => {
                let unit = if *units == RES_PER_CM { "dpcm" } else { "dpi" };
                format!("{x}x{y}{unit}")
            }
            Self::Collection(group) => {
                let members: Vec<String> = group
                    .iter()
                    .map(|a| format!("{}={}", a.name, a.display_values()))
                    .collect();
                format!("{{{}}}", members.join(" "))
            }
            Self::Unknown { tag, .. } => format!("<tag {tag:#04x}>"),
            other => other.as_str().unwrap_or_default().to_string(),
        }
    }
}

/// A named attribute with one or more values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub values: Vec<AttrValue>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: AttrValue) -> Self {
        Self {
            name: name.into(),
            values: vec![value],
        }
    }

    pub fn with_values(name: impl Into<String>, values: Vec<AttrValue>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn first(&self) -> Option<&AttrValue> {
        self.values.first()
    }

    /// Comma-joined display form of all values.
    pub fn display_values(&self) -> String {
        self.values
            .iter()
            .map(AttrValue::to_display_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// An ordered attribute group with unique names.
///
/// Used for IPP operation/job/printer groups and for collection values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeGroup {
    attrs: Vec<Attribute>,
}

impl AttributeGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an attribute by name.
    pub fn insert(&mut self, attr: Attribute) {
        match self.attrs.iter_mut().find(|a| a.name == attr.name) {
            Some(existing) => *existing = attr,
            None => self.attrs.push(attr),
        }
    }

    /// Builder-style `insert`.
    pub fn with(mut self, name: &str, value: AttrValue) -> Self {
        self.insert(Attribute::new(name, value));
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<Attribute> {
        let pos = self.attrs.iter().position(|a| a.name == name)?;
        Some(self.attrs.remove(pos))
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attrs.iter().find(|a| a.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attrs.iter()
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// First value as an integer (integer or enum syntax).
    pub fn integer(&self, name: &str) -> Option<i32> {
        self.get(name)?.first()?.as_i32()
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        match self.get(name)?.first()? {
            AttrValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// First value as a string (any string syntax).
    pub fn string(&self, name: &str) -> Option<&str> {
        self.get(name)?.first()?.as_str()
    }

    /// All string values of a multi-valued attribute.
    pub fn strings(&self, name: &str) -> Vec<&str> {
        self.get(name)
            .map(|a| a.values.iter().filter_map(AttrValue::as_str).collect())
            .unwrap_or_default()
    }

    pub fn range(&self, name: &str) -> Option<(i32, i32)> {
        match self.get(name)?.first()? {
            AttrValue::Range { lower, upper } => Some((*lower, *upper)),
            _ => None,
        }
    }

    /// First resolution value converted to dots per inch.
    pub fn resolution_dpi(&self, name: &str) -> Option<(i32, i32)> {
        match self.get(name)?.first()? {
            AttrValue::Resolution { x, y, units } if *units == RES_PER_CM => {
                Some(((x * 254 + 50) / 100, (y * 254 + 50) / 100))
            }
            AttrValue::Resolution { x, y, .. } => Some((*x, *y)),
            _ => None,
        }
    }

    pub fn collection(&self, name: &str) -> Option<&AttributeGroup> {
        match self.get(name)?.first()? {
            AttrValue::Collection(group) => Some(group),
            _ => None,
        }
    }
}

impl FromIterator<Attribute> for AttributeGroup {
    fn from_iter<I: IntoIterator<Item = Attribute>>(iter: I) -> Self {
        let mut group = AttributeGroup::new();
        for attr in iter {
            group.insert(attr);
        }
        group
    }
}
