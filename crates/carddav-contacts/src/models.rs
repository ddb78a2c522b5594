//! Local addressbook record model
//!
//! The host application stores a contact as a flat map. Single-valued keys
//! (`name`, `birthday`, ...) hold one value; multi-valued fields use
//! composite keys of the form `<field>:<subtype>` (`email:home`) holding one
//! ordered list per subtype.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Local keys that are not plain wire property copies
pub mod keys {
    pub const NAME: &str = "name";
    pub const FIRSTNAME: &str = "firstname";
    pub const SURNAME: &str = "surname";
    pub const MIDDLENAME: &str = "middlename";
    pub const PREFIX: &str = "prefix";
    pub const SUFFIX: &str = "suffix";
    pub const ORGANIZATION: &str = "organization";
    pub const DEPARTMENT: &str = "department";
    pub const PHOTO: &str = "photo";
    pub const SHOWAS: &str = "showas";
    pub const KIND: &str = "kind";
}

pub const KIND_INDIVIDUAL: &str = "individual";
pub const KIND_GROUP: &str = "group";

pub const SHOW_AS_INDIVIDUAL: &str = "INDIVIDUAL";
pub const SHOW_AS_COMPANY: &str = "COMPANY";

/// Wire property → local key for every single-valued property
pub const SINGLE_VALUED: &[(&str, &str)] = &[
    ("BDAY", "birthday"),
    ("FN", keys::NAME),
    ("NICKNAME", "nickname"),
    ("NOTE", "notes"),
    ("PHOTO", keys::PHOTO),
    ("TITLE", "jobtitle"),
    ("UID", "cuid"),
    ("X-ABShowAs", keys::SHOWAS),
    ("X-ANNIVERSARY", "anniversary"),
    ("X-ASSISTANT", "assistant"),
    ("X-GENDER", "gender"),
    ("X-MANAGER", "manager"),
    ("X-SPOUSE", "spouse"),
    ("X-ADDRESSBOOKSERVER-KIND", keys::KIND),
];

/// Multi-valued fields and how they are represented on each side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MultiField {
    Email,
    Phone,
    Url,
    Address,
}

impl MultiField {
    pub const ALL: [MultiField; 4] = [Self::Email, Self::Phone, Self::Url, Self::Address];

    /// Field name used in local keys and in the stored subtype rows
    pub fn local_name(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Url => "url",
            Self::Address => "address",
        }
    }

    pub fn vcard_name(self) -> &'static str {
        match self {
            Self::Email => "EMAIL",
            Self::Phone => "TEL",
            Self::Url => "URL",
            Self::Address => "ADR",
        }
    }

    pub fn from_local_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.local_name() == name)
    }

    /// Whether values are decomposed into structured components
    pub fn is_structured(self) -> bool {
        matches!(self, Self::Address)
    }

    /// Local key for one subtype, e.g. `email:home`
    pub fn key(self, subtype: &str) -> String {
        format!("{}:{}", self.local_name(), subtype)
    }

    /// Split a composite key back into field and subtype
    pub fn parse_key(key: &str) -> Option<(Self, &str)> {
        let (field, subtype) = key.split_once(':')?;
        Some((Self::from_local_name(field)?, subtype))
    }
}

/// Postal address in the 7-part order of the `ADR` property
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
    #[serde(default)]
    pub po_box: String,
    #[serde(default)]
    pub extended: String,
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub locality: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub country: String,
}

impl PostalAddress {
    /// Create a new postal address
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `ADR` components; missing trailing parts stay empty
    pub fn from_components(parts: &[String]) -> Self {
        let part = |idx: usize| parts.get(idx).cloned().unwrap_or_default();
        Self {
            po_box: part(0),
            extended: part(1),
            street: part(2),
            locality: part(3),
            region: part(4),
            postal_code: part(5),
            country: part(6),
        }
    }

    pub fn to_components(&self) -> [&str; 7] {
        [
            &self.po_box,
            &self.extended,
            &self.street,
            &self.locality,
            &self.region,
            &self.postal_code,
            &self.country,
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.to_components().iter().all(|p| p.is_empty())
    }

    /// Set street address
    pub fn with_street(mut self, street: impl Into<String>) -> Self {
        self.street = street.into();
        self
    }

    /// Set city
    pub fn with_locality(mut self, locality: impl Into<String>) -> Self {
        self.locality = locality.into();
        self
    }

    /// Set country
    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }
}

/// Value stored under one local key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldValue {
    Text(String),
    Binary(#[serde(with = "base64_bytes")] Vec<u8>),
    Texts(Vec<String>),
    Addresses(Vec<PostalAddress>),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.is_empty(),
            Self::Binary(b) => b.is_empty(),
            Self::Texts(v) => v.iter().all(String::is_empty),
            Self::Addresses(v) => v.iter().all(PostalAddress::is_empty),
        }
    }

    /// Raw bytes of a text or binary value
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Text(s) => Some(s.as_bytes()),
            Self::Binary(b) => Some(b),
            _ => None,
        }
    }
}

/// A contact as the local addressbook sees it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl LocalRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Text value of a key, empty when absent or not text
    pub fn text(&self, key: &str) -> &str {
        match self.fields.get(key) {
            Some(FieldValue::Text(s)) => s,
            _ => "",
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: FieldValue) {
        self.fields.insert(key.into(), value);
    }

    pub fn set_text(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.set(key, FieldValue::Text(value.into()));
    }

    /// Builder-style [`set_text`](Self::set_text)
    pub fn with_text(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_text(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.fields.remove(key)
    }

    /// Append a text entry to a multi-valued key
    pub fn push_text(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        match self.fields.entry(key.into()).or_insert_with(|| FieldValue::Texts(Vec::new())) {
            FieldValue::Texts(list) => list.push(value),
            other => *other = FieldValue::Texts(vec![value]),
        }
    }

    /// Append an address entry to a multi-valued key
    pub fn push_address(&mut self, key: impl Into<String>, address: PostalAddress) {
        match self
            .fields
            .entry(key.into())
            .or_insert_with(|| FieldValue::Addresses(Vec::new()))
        {
            FieldValue::Addresses(list) => list.push(address),
            other => *other = FieldValue::Addresses(vec![address]),
        }
    }

    /// Text entries of a multi-valued key; a lone text value counts as one
    pub fn texts(&self, key: &str) -> Vec<&str> {
        match self.fields.get(key) {
            Some(FieldValue::Texts(list)) => list.iter().map(String::as_str).collect(),
            Some(FieldValue::Text(s)) => vec![s.as_str()],
            _ => Vec::new(),
        }
    }

    pub fn addresses(&self, key: &str) -> &[PostalAddress] {
        match self.fields.get(key) {
            Some(FieldValue::Addresses(list)) => list,
            _ => &[],
        }
    }

    /// Multi-valued keys in lexicographic key order
    pub fn multi_keys(&self) -> impl Iterator<Item = (MultiField, &str, &FieldValue)> {
        self.fields.iter().filter_map(|(key, value)| {
            MultiField::parse_key(key).map(|(field, subtype)| (field, subtype, value))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parse the JSON form written by [`to_json`](Self::to_json)
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
