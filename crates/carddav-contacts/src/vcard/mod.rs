//! vCard object model
//!
//! A card is kept as an ordered list of content lines so that properties the
//! converter does not understand survive an update untouched. Values are
//! stored exactly as they appear on the wire (escaped); the accessors on
//! [`Property`] unescape on the way out and escape on the way in.

mod parser;
mod writer;

pub use parser::{parse_vcard, parse_vcards};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Version marker written into newly created cards
pub const VCARD_VERSION: &str = "3.0";

/// A property parameter, e.g. `TYPE=home,work`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Upper-cased parameter name
    pub name: String,
    pub values: Vec<String>,
}

impl Param {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_uppercase(),
            values: vec![value.into()],
        }
    }

    fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// One content line of a card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    /// Grouping token (`item1` in `item1.EMAIL:...`)
    pub group: Option<String>,
    pub name: String,
    pub params: Vec<Param>,
    /// Value as it appears on the wire, escapes included
    pub value: String,
}

impl Property {
    /// Property with an already escaped wire value
    pub fn raw(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            group: None,
            name: name.into(),
            params: Vec::new(),
            value: value.into(),
        }
    }

    /// Text property; the value is escaped
    pub fn text(name: impl Into<String>, value: &str) -> Self {
        Self::raw(name, escape(value))
    }

    /// Structured property (`N`, `ORG`, `ADR`); each component is escaped
    pub fn structured<S: AsRef<str>>(name: impl Into<String>, parts: &[S]) -> Self {
        let mut prop = Self::raw(name, String::new());
        prop.set_components(parts);
        prop
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_param(name, value);
        self
    }

    /// Case-insensitive name comparison
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.group
            .as_deref()
            .is_some_and(|g| g.eq_ignore_ascii_case(group))
    }

    /// Unescaped text value
    pub fn text_value(&self) -> String {
        unescape(&self.value)
    }

    pub fn set_text(&mut self, value: &str) {
        self.value = escape(value);
    }

    /// Components of a structured value, split on unescaped semicolons
    pub fn components(&self) -> Vec<String> {
        split_unescaped(&self.value, ';')
            .into_iter()
            .map(|part| unescape(part))
            .collect()
    }

    pub fn set_components<S: AsRef<str>>(&mut self, parts: &[S]) {
        self.value = parts
            .iter()
            .map(|part| escape(part.as_ref()))
            .collect::<Vec<_>>()
            .join(";");
    }

    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.is(name))
    }

    /// First value of a parameter
    pub fn param_value(&self, name: &str) -> Option<&str> {
        self.param(name)
            .and_then(|p| p.values.first())
            .map(String::as_str)
    }

    /// Replace every occurrence of a parameter with a single value
    pub fn set_param(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.params.iter().position(|p| p.is(name)) {
            Some(idx) => {
                self.params[idx].values = vec![value];
                let mut seen = 0;
                self.params.retain(|p| {
                    if p.is(name) {
                        seen += 1;
                        seen == 1
                    } else {
                        true
                    }
                });
            }
            None => self.params.push(Param::new(name, value)),
        }
    }

    pub fn remove_param(&mut self, name: &str) {
        self.params.retain(|p| !p.is(name));
    }

    /// Every `TYPE` value, comma lists and repeated parameters flattened
    pub fn types(&self) -> Vec<String> {
        self.params
            .iter()
            .filter(|p| p.is("TYPE"))
            .flat_map(|p| p.values.iter())
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn add_type(&mut self, value: impl Into<String>) {
        let value = value.into();
        match self.params.iter_mut().find(|p| p.is("TYPE")) {
            Some(param) => param.values.push(value),
            None => self.params.push(Param::new("TYPE", value)),
        }
    }

    /// Decoded payload of an inline binary value
    ///
    /// Handles `ENCODING=b`/`ENCODING=BASE64` and `data:` URIs. Returns
    /// `None` for text or URI values and for undecodable payloads.
    pub fn binary(&self) -> Option<Vec<u8>> {
        let encoded = match self.param_value("ENCODING") {
            Some(enc) if enc.eq_ignore_ascii_case("b") || enc.eq_ignore_ascii_case("base64") => {
                self.value.as_str()
            }
            _ => {
                let rest = self.value.strip_prefix("data:")?;
                let (meta, data) = rest.split_once(',')?;
                if !meta.to_ascii_lowercase().ends_with(";base64") {
                    return None;
                }
                data
            }
        };

        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        STANDARD.decode(compact).ok()
    }

    /// Store a binary payload inline as base64
    pub fn set_binary(&mut self, data: &[u8]) {
        self.value = STANDARD.encode(data);
        self.set_param("ENCODING", "b");
    }
}

/// A parsed vCard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VCard {
    properties: Vec<Property>,
}

impl Default for VCard {
    fn default() -> Self {
        Self::new()
    }
}

impl VCard {
    /// Empty card carrying the version marker
    pub fn new() -> Self {
        Self {
            properties: vec![Property::raw("VERSION", VCARD_VERSION)],
        }
    }

    pub(crate) fn from_properties(properties: Vec<Property>) -> Self {
        Self { properties }
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn version(&self) -> Option<&str> {
        self.get("VERSION").map(|p| p.value.as_str())
    }

    /// First property with the given name
    pub fn get(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.is(name))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.properties.iter_mut().find(|p| p.is(name))
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Property> + 'a {
        self.properties.iter().filter(move |p| p.is(name))
    }

    pub fn add(&mut self, property: Property) {
        self.properties.push(property);
    }

    /// Replace the first property of the same name in place and drop any
    /// further instances; append if there is none
    pub fn set(&mut self, property: Property) {
        match self.properties.iter().position(|p| p.is(&property.name)) {
            Some(idx) => {
                let name = property.name.clone();
                self.properties[idx] = property;
                let mut i = 0;
                self.properties.retain(|p| {
                    let keep = i <= idx || !p.is(&name);
                    i += 1;
                    keep
                });
            }
            None => self.properties.push(property),
        }
    }

    /// [`set`](Self::set) a text property, escaping `value`
    pub fn set_text(&mut self, name: &str, value: &str) {
        self.set(Property::text(name, value));
    }

    /// Remove every property with the given name, returning how many went
    pub fn remove_all(&mut self, name: &str) -> usize {
        let before = self.properties.len();
        self.properties.retain(|p| !p.is(name));
        before - self.properties.len()
    }

    pub fn retain<F>(&mut self, f: F)
    where
        F: FnMut(&Property) -> bool,
    {
        self.properties.retain(f);
    }

    /// Grouping tokens in use, in card order (may repeat)
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().filter_map(|p| p.group.as_deref())
    }
}

/// Escape a text value for the wire
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push_str("\\n");
            }
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

/// Undo [`escape`]; unknown escapes keep the escaped character
pub fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn split_unescaped(value: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (idx, c) in value.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == sep {
            parts.push(&value[start..idx]);
            start = idx + c.len_utf8();
        }
    }
    parts.push(&value[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_roundtrip() {
        let text = "Line one\nsemi; comma, back\\slash";
        let escaped = escape(text);
        assert_eq!(escaped, "Line one\\nsemi\\; comma\\, back\\\\slash");
        assert_eq!(unescape(&escaped), text);
    }

    #[test]
    fn test_components_respect_escapes() {
        let prop = Property::raw("ORG", "Smith\\; Sons;R&D;Labs");
        assert_eq!(prop.components(), vec!["Smith; Sons", "R&D", "Labs"]);
    }

    #[test]
    fn test_structured_constructor() {
        let prop = Property::structured("N", &["Doe", "Jane", "", "", ""]);
        assert_eq!(prop.value, "Doe;Jane;;;");
        assert_eq!(prop.components().len(), 5);
    }

    #[test]
    fn test_types_flattened() {
        let mut prop = Property::raw("TEL", "123");
        prop.params.push(Param::new("TYPE", "work,voice"));
        prop.params.push(Param::new("type", "pref"));
        assert_eq!(prop.types(), vec!["work", "voice", "pref"]);
    }

    #[test]
    fn test_set_param_replaces_all() {
        let mut prop = Property::raw("PHOTO", "x");
        prop.params.push(Param::new("ENCODING", "QUOTED-PRINTABLE"));
        prop.params.push(Param::new("ENCODING", "8BIT"));
        prop.set_param("encoding", "b");
        assert_eq!(prop.params, vec![Param::new("ENCODING", "b")]);
    }

    #[test]
    fn test_binary_roundtrip() {
        let mut prop = Property::raw("PHOTO", "");
        prop.set_binary(b"\x89PNG data");
        assert_eq!(prop.param_value("ENCODING"), Some("b"));
        assert_eq!(prop.binary().unwrap(), b"\x89PNG data");
    }

    #[test]
    fn test_binary_data_uri() {
        let prop = Property::raw("PHOTO", "data:image/png;base64,aGVsbG8=");
        assert_eq!(prop.binary().unwrap(), b"hello");
    }

    #[test]
    fn test_binary_uri_value_is_none() {
        let prop = Property::raw("PHOTO", "http://example.com/a.jpg").with_param("VALUE", "uri");
        assert!(prop.binary().is_none());
    }

    #[test]
    fn test_card_set_replaces_in_place() {
        let mut card = VCard::new();
        card.add(Property::text("FN", "Old"));
        card.add(Property::text("NOTE", "n"));
        card.add(Property::text("fn", "Duplicate"));

        card.set(Property::text("FN", "New"));

        let names: Vec<_> = card.properties().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["VERSION", "FN", "NOTE"]);
        assert_eq!(card.get("fn").unwrap().text_value(), "New");
    }

    #[test]
    fn test_card_set_text_escapes() {
        let mut card = VCard::new();
        card.set_text("NOTE", "a;b");
        card.set_text("note", "c,d");
        assert_eq!(card.get_all("NOTE").count(), 1);
        assert_eq!(card.get("NOTE").unwrap().value, "c\\,d");
    }

    #[test]
    fn test_remove_all_counts() {
        let mut card = VCard::new();
        card.add(Property::text("EMAIL", "a@b.com"));
        card.add(Property::text("email", "c@d.com"));
        assert_eq!(card.remove_all("EMAIL"), 2);
        assert!(card.get("EMAIL").is_none());
    }

    #[test]
    fn test_new_card_has_version() {
        assert_eq!(VCard::new().version(), Some("3.0"));
    }
}
