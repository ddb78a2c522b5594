//! Conversion between vCards and local addressbook records
//!
//! One [`CardConverter`] serves one addressbook. It owns the subtype catalog
//! loaded for that addressbook and is meant to be used from a single task at
//! a time; the surrounding sync scheduler provides that guarantee.

use crate::client::ResourceDownloader;
use crate::display::{compose_display_name, determine_show_as};
use crate::labels::{LabelResolver, SubtypeCatalog, prune_orphan_labels};
use crate::models::{
    FieldValue, KIND_GROUP, KIND_INDIVIDUAL, LocalRecord, MultiField, PostalAddress, SINGLE_VALUED,
    keys,
};
use crate::photo::{PhotoCropper, PhotoHandler};
use crate::vcard::{Property, VCard};
use carddav_core::{Config, SubtypeStore};
use chrono::Utc;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::debug;

static DEPARTMENT_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*;\s*").expect("valid department separator"));

/// Local keys for the `N` components, in wire order
const NAME_PARTS: [&str; 5] = [
    keys::SURNAME,
    keys::FIRSTNAME,
    keys::MIDDLENAME,
    keys::PREFIX,
    keys::SUFFIX,
];

/// Result of a wire → local conversion
#[derive(Debug, Clone)]
pub struct Conversion {
    pub record: LocalRecord,
    /// The card was rewritten (photo embedded) and should be stored back
    pub needs_persist: bool,
}

/// Converts cards of one addressbook in both directions
pub struct CardConverter {
    labels: LabelResolver,
    photos: PhotoHandler,
}

impl CardConverter {
    /// Create a converter for `abook_id`, loading its stored vendor labels
    pub fn new(store: Arc<dyn SubtypeStore>, abook_id: impl Into<String>) -> carddav_core::Result<Self> {
        Ok(Self {
            labels: LabelResolver::new(store, abook_id)?,
            photos: PhotoHandler::default(),
        })
    }

    /// Converter configured from the `[addressbook]` and `[photo]` sections
    pub fn from_config(config: &Config, store: Arc<dyn SubtypeStore>) -> carddav_core::Result<Self> {
        let mut converter = Self::new(store, config.addressbook.id.clone())?;
        converter.photos = PhotoHandler::new(default_cropper(config.photo.crop))
            .with_max_size(config.photo.max_size);
        Ok(converter)
    }

    /// Install (or remove) the image processing capability
    pub fn with_cropper(mut self, cropper: Option<Box<dyn PhotoCropper>>) -> Self {
        self.photos.set_cropper(cropper);
        self
    }

    pub fn catalog(&self) -> &SubtypeCatalog {
        self.labels.catalog()
    }

    pub fn abook_id(&self) -> &str {
        self.labels.abook_id()
    }

    /// Wire → local
    ///
    /// The card may be modified in place when an external photo gets
    /// embedded; `needs_persist` tells the caller to write it back.
    pub async fn vcard_to_record(
        &mut self,
        card: &mut VCard,
        downloader: &dyn ResourceDownloader,
    ) -> Conversion {
        let mut record = LocalRecord::new();
        record.set_text(keys::KIND, KIND_INDIVIDUAL);

        for (wire, local) in SINGLE_VALUED {
            let Some(property) = card.get(wire) else {
                continue;
            };
            let value = if *local == keys::PHOTO {
                property
                    .binary()
                    .map(FieldValue::Binary)
                    .unwrap_or_else(|| FieldValue::Text(property.text_value()))
            } else {
                FieldValue::Text(property.text_value())
            };
            record.set(*local, value);
        }

        let mut needs_persist = false;
        if record.contains_key(keys::PHOTO) {
            needs_persist = self.photos.materialize(&mut record, card, downloader).await;
        }

        if let Some(n) = card.get("N") {
            for (key, value) in NAME_PARTS.iter().zip(n.components()) {
                if !value.is_empty() {
                    record.set_text(*key, value);
                }
            }
        }

        if let Some(org) = card.get("ORG") {
            let mut parts = org.components().into_iter();
            if let Some(organization) = parts.next().filter(|s| !s.is_empty()) {
                record.set_text(keys::ORGANIZATION, organization);
            }
            let department = parts.collect::<Vec<_>>().join("; ");
            if !department.is_empty() {
                record.set_text(keys::DEPARTMENT, department);
            }
        }

        for field in MultiField::ALL {
            for property in card.get_all(field.vcard_name()) {
                let subtype = self.labels.resolve_label(card, property, field);
                let key = field.key(&subtype);
                if field.is_structured() {
                    record.push_address(key, PostalAddress::from_components(&property.components()));
                } else {
                    record.push_text(key, property.text_value());
                }
            }
        }

        if record.text(keys::NAME).is_empty() {
            let name = compose_display_name(&record);
            record.set_text(keys::NAME, name);
        }

        Conversion {
            record,
            needs_persist,
        }
    }

    /// Local → wire, creating a new 3.0 card
    pub fn record_to_vcard(&self, record: &LocalRecord) -> VCard {
        let mut card = VCard::new();
        self.update_vcard(record, &mut card);
        card
    }

    /// Local → wire, updating `card` in place
    ///
    /// Properties the record does not map are left alone.
    pub fn update_vcard(&self, record: &LocalRecord, card: &mut VCard) {
        let mut record = record.clone();
        let is_group = record.text(keys::KIND) == KIND_GROUP;

        if record.text(keys::NAME).is_empty() {
            if !is_group {
                let show_as = determine_show_as(&record);
                record.set_text(keys::SHOWAS, show_as);
            }
            let name = compose_display_name(&record);
            record.set_text(keys::NAME, name);
        }

        card.set(Property::raw("REV", Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()));

        let n = if is_group {
            Property::structured("N", &[record.text(keys::NAME), "", "", "", ""])
        } else {
            Property::structured("N", &NAME_PARTS.map(|key| record.text(key)))
        };
        card.set(n);

        write_organization(&record, card);
        write_single_valued(&record, card);
        self.write_multi_valued(&record, card);
    }

    fn write_multi_valued(&self, record: &LocalRecord, card: &mut VCard) {
        for field in MultiField::ALL {
            card.remove_all(field.vcard_name());
        }
        prune_orphan_labels(card);

        for (field, subtype, value) in record.multi_keys() {
            let texts = match value {
                FieldValue::Texts(list) => list.as_slice(),
                FieldValue::Text(text) => std::slice::from_ref(text),
                _ => &[],
            };

            let properties: Vec<Property> = match (field.is_structured(), value) {
                (true, FieldValue::Addresses(list)) => list
                    .iter()
                    .filter(|addr| !addr.is_empty())
                    .map(|addr| Property::structured(field.vcard_name(), &addr.to_components()))
                    .collect(),
                (false, FieldValue::Texts(_) | FieldValue::Text(_)) => texts
                    .iter()
                    .filter(|v| !v.is_empty())
                    .map(|v| Property::text(field.vcard_name(), v))
                    .collect(),
                _ => {
                    debug!("Skipping {}:{} with mismatched value shape", field.local_name(), subtype);
                    Vec::new()
                }
            };

            for property in properties {
                self.labels.assign_label(card, property, field, subtype);
            }
        }
    }
}

#[cfg(feature = "image")]
fn default_cropper(enabled: bool) -> Option<Box<dyn PhotoCropper>> {
    enabled.then(|| Box::new(crate::photo::RasterCropper) as Box<dyn PhotoCropper>)
}

#[cfg(not(feature = "image"))]
fn default_cropper(_enabled: bool) -> Option<Box<dyn PhotoCropper>> {
    None
}

fn write_organization(record: &LocalRecord, card: &mut VCard) {
    let organization = record.text(keys::ORGANIZATION);
    let department = record.text(keys::DEPARTMENT);

    let mut parts: Vec<&str> = Vec::new();
    if !organization.is_empty() {
        parts.push(organization);
    }
    if !department.is_empty() {
        if parts.is_empty() {
            parts.push("");
        }
        parts.extend(DEPARTMENT_SEPARATOR.split(department));
    }

    if parts.is_empty() {
        card.remove_all("ORG");
    } else {
        card.set(Property::structured("ORG", &parts));
    }
}

fn write_single_valued(record: &LocalRecord, card: &mut VCard) {
    for (wire, local) in SINGLE_VALUED {
        if *local == keys::PHOTO {
            write_photo(record, card);
            continue;
        }

        let value = record.text(local);
        if value.is_empty() {
            card.remove_all(wire);
        } else {
            card.set_text(wire, value);
        }
    }
}

/// An absent photo key leaves the card alone; present-and-empty clears it
fn write_photo(record: &LocalRecord, card: &mut VCard) {
    let Some(value) = record.get(keys::PHOTO) else {
        return;
    };
    if value.is_empty() {
        card.remove_all("PHOTO");
        return;
    }

    // an undownloaded external reference comes back unchanged
    if let (FieldValue::Text(text), Some(existing)) = (value, card.get("PHOTO")) {
        let is_uri = existing
            .param_value("VALUE")
            .is_some_and(|v| v.eq_ignore_ascii_case("uri"));
        if is_uri && existing.text_value() == *text {
            return;
        }
    }

    let Some(bytes) = value.as_bytes() else {
        return;
    };
    let mut photo = Property::raw("PHOTO", String::new());
    photo.set_binary(bytes);
    photo.set_param("VALUE", "BINARY");
    card.set(photo);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Resource;
    use crate::error::{ContactsError, Result};
    use crate::labels::LABEL_PROPERTY;
    use crate::vcard::parse_vcard;
    use async_trait::async_trait;
    use carddav_core::SqliteSubtypeStore;

    struct NoDownload;

    #[async_trait]
    impl ResourceDownloader for NoDownload {
        async fn download_resource(&self, uri: &str) -> Result<Resource> {
            Err(ContactsError::Download(format!("unexpected download of {}", uri)))
        }
    }

    fn converter() -> CardConverter {
        let store = Arc::new(SqliteSubtypeStore::in_memory().unwrap());
        CardConverter::new(store, "1").unwrap()
    }

    #[tokio::test]
    async fn test_single_valued_and_defaults() {
        let mut conv = converter();
        let mut card = parse_vcard(
            "BEGIN:VCARD\nVERSION:3.0\nFN:Jane Doe\nBDAY:1980-01-02\nNOTE:a\\, b\nTITLE:CTO\n\
             UID:abc-123\nX-ABShowAs:COMPANY\nX-SPOUSE:John\nEND:VCARD",
        )
        .unwrap();

        let result = conv.vcard_to_record(&mut card, &NoDownload).await;
        let record = result.record;

        assert!(!result.needs_persist);
        assert_eq!(record.text("kind"), "individual");
        assert_eq!(record.text("name"), "Jane Doe");
        assert_eq!(record.text("birthday"), "1980-01-02");
        assert_eq!(record.text("notes"), "a, b");
        assert_eq!(record.text("jobtitle"), "CTO");
        assert_eq!(record.text("cuid"), "abc-123");
        assert_eq!(record.text("showas"), "COMPANY");
        assert_eq!(record.text("spouse"), "John");
    }

    #[tokio::test]
    async fn test_structured_name_and_org() {
        let mut conv = converter();
        let mut card = parse_vcard(
            "BEGIN:VCARD\nVERSION:3.0\nN:Doe;Jane;Q;Dr.;\nORG:Acme;R&D;;Labs\nEND:VCARD",
        )
        .unwrap();

        let record = conv.vcard_to_record(&mut card, &NoDownload).await.record;

        assert_eq!(record.text("surname"), "Doe");
        assert_eq!(record.text("firstname"), "Jane");
        assert_eq!(record.text("middlename"), "Q");
        assert_eq!(record.text("prefix"), "Dr.");
        assert!(!record.contains_key("suffix"));
        assert_eq!(record.text("organization"), "Acme");
        assert_eq!(record.text("department"), "R&D; ; Labs");
        assert_eq!(record.text("name"), "Jane Doe");
    }

    #[tokio::test]
    async fn test_group_kind_is_copied() {
        let mut conv = converter();
        let mut card = parse_vcard(
            "BEGIN:VCARD\nVERSION:3.0\nFN:Friends\nN:Friends;;;;\nX-ADDRESSBOOKSERVER-KIND:group\nEND:VCARD",
        )
        .unwrap();

        let record = conv.vcard_to_record(&mut card, &NoDownload).await.record;
        assert_eq!(record.text("kind"), "group");
    }

    #[tokio::test]
    async fn test_addresses_decomposed() {
        let mut conv = converter();
        let mut card = parse_vcard(
            "BEGIN:VCARD\nVERSION:3.0\nFN:x\nADR;TYPE=work:;Suite 5;1 Main St;Springfield;IL;62701;USA\nEND:VCARD",
        )
        .unwrap();

        let record = conv.vcard_to_record(&mut card, &NoDownload).await.record;
        let addr = &record.addresses("address:work")[0];
        assert_eq!(addr.extended, "Suite 5");
        assert_eq!(addr.street, "1 Main St");
        assert_eq!(addr.locality, "Springfield");
        assert_eq!(addr.region, "IL");
        assert_eq!(addr.postal_code, "62701");
        assert_eq!(addr.country, "USA");
    }

    #[tokio::test]
    async fn test_inline_photo_is_binary() {
        let mut conv = converter();
        let mut card = parse_vcard("BEGIN:VCARD\nVERSION:3.0\nFN:x\nPHOTO;ENCODING=b;TYPE=PNG:aGk=\nEND:VCARD").unwrap();

        let result = conv.vcard_to_record(&mut card, &NoDownload).await;
        assert_eq!(result.record.get("photo"), Some(&FieldValue::Binary(b"hi".to_vec())));
        assert!(!result.needs_persist);
    }

    #[test]
    fn test_new_card_has_version_and_rev() {
        let conv = converter();
        let record = LocalRecord::new()
            .with_text("firstname", "Jane")
            .with_text("surname", "Doe");

        let card = conv.record_to_vcard(&record);

        assert_eq!(card.version(), Some("3.0"));
        let rev = card.get("REV").unwrap().value.clone();
        let rev_format = Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}Z$").unwrap();
        assert!(rev_format.is_match(&rev), "bad REV {}", rev);
        assert_eq!(card.get("N").unwrap().components(), vec!["Doe", "Jane", "", "", ""]);
        assert_eq!(card.get("FN").unwrap().text_value(), "Jane Doe");
        assert_eq!(card.get("X-ABSHOWAS").unwrap().text_value(), "INDIVIDUAL");
    }

    #[test]
    fn test_group_name_property() {
        let conv = converter();
        let record = LocalRecord::new()
            .with_text("kind", "group")
            .with_text("name", "Friends");

        let card = conv.record_to_vcard(&record);

        assert_eq!(card.get("N").unwrap().components(), vec!["Friends", "", "", "", ""]);
        assert_eq!(card.get("X-ADDRESSBOOKSERVER-KIND").unwrap().text_value(), "group");
        assert!(card.get("X-ABShowAs").is_none());
    }

    #[tokio::test]
    async fn test_blank_org_parts_round_trip() {
        let mut conv = converter();
        let mut card = parse_vcard("BEGIN:VCARD\nVERSION:3.0\nFN:x\nORG:Acme;;Labs\nEND:VCARD").unwrap();

        let record = conv.vcard_to_record(&mut card, &NoDownload).await.record;
        assert_eq!(record.text("department"), "; Labs");

        conv.update_vcard(&record, &mut card);
        assert_eq!(card.get("ORG").unwrap().components(), vec!["Acme", "", "Labs"]);
    }

    #[test]
    fn test_organization_written() {
        let conv = converter();

        let card = conv.record_to_vcard(&LocalRecord::new().with_text("department", "R&D ;Labs"));
        assert_eq!(card.get("ORG").unwrap().components(), vec!["", "R&D", "Labs"]);

        let mut card = conv.record_to_vcard(&LocalRecord::new().with_text("organization", "Acme"));
        assert_eq!(card.get("ORG").unwrap().components(), vec!["Acme"]);

        conv.update_vcard(&LocalRecord::new().with_text("name", "x"), &mut card);
        assert!(card.get("ORG").is_none());
    }

    #[test]
    fn test_empty_values_remove_properties() {
        let conv = converter();
        let mut card = parse_vcard(
            "BEGIN:VCARD\nVERSION:3.0\nFN:Old\nNOTE:old note\nNICKNAME:nick\nX-UNKNOWN:kept\nEND:VCARD",
        )
        .unwrap();
        let record = LocalRecord::new()
            .with_text("name", "New")
            .with_text("notes", "");

        conv.update_vcard(&record, &mut card);

        assert_eq!(card.get("FN").unwrap().text_value(), "New");
        assert!(card.get("NOTE").is_none());
        assert!(card.get("NICKNAME").is_none());
        assert_eq!(card.get("X-UNKNOWN").unwrap().text_value(), "kept");
    }

    #[test]
    fn test_photo_untouched_vs_cleared() {
        let conv = converter();
        let mut card =
            parse_vcard("BEGIN:VCARD\nVERSION:3.0\nFN:x\nPHOTO;ENCODING=b;TYPE=PNG:aGk=\nEND:VCARD").unwrap();

        conv.update_vcard(&LocalRecord::new().with_text("name", "x"), &mut card);
        assert_eq!(card.get("PHOTO").unwrap().binary().unwrap(), b"hi");

        let mut cleared = LocalRecord::new().with_text("name", "x");
        cleared.set("photo", FieldValue::Binary(Vec::new()));
        conv.update_vcard(&cleared, &mut card);
        assert!(card.get("PHOTO").is_none());
    }

    #[test]
    fn test_photo_written_as_base64() {
        let conv = converter();
        let mut record = LocalRecord::new().with_text("name", "x");
        record.set("photo", FieldValue::Binary(b"\x89PNG".to_vec()));

        let card = conv.record_to_vcard(&record);
        let photo = card.get("PHOTO").unwrap();
        assert_eq!(photo.param_value("ENCODING"), Some("b"));
        assert_eq!(photo.param_value("VALUE"), Some("BINARY"));
        assert_eq!(photo.binary().unwrap(), b"\x89PNG");
    }

    #[test]
    fn test_external_photo_reference_kept() {
        let conv = converter();
        let mut card = parse_vcard(
            "BEGIN:VCARD\nVERSION:3.0\nFN:x\nPHOTO;VALUE=uri:https://example.com/p.jpg\nEND:VCARD",
        )
        .unwrap();
        let original = card.get("PHOTO").cloned();

        let record = LocalRecord::new()
            .with_text("name", "x")
            .with_text("photo", "https://example.com/p.jpg");
        conv.update_vcard(&record, &mut card);

        assert_eq!(card.get("PHOTO").cloned(), original);
    }

    #[test]
    fn test_multi_valued_rewrite() {
        let conv = converter();
        let mut card = parse_vcard(
            "BEGIN:VCARD\nVERSION:3.0\nFN:x\n\
             item1.EMAIL:old@example.com\nitem1.X-ABLabel:Old\n\
             item2.X-ABRELATEDNAMES:Bob\nitem2.X-ABLabel:_$!<Friend>!$_\n\
             TEL;TYPE=home:1\nEND:VCARD",
        )
        .unwrap();

        let mut record = LocalRecord::new().with_text("name", "x");
        record.push_text("email:work", "w@example.com");
        record.push_text("email:work", "");
        record.push_text("phone:mobile", "2");
        record.push_address("address:home", PostalAddress::new().with_locality("Springfield"));
        record.push_address("address:home", PostalAddress::new());

        conv.update_vcard(&record, &mut card);

        let emails: Vec<_> = card.get_all("EMAIL").collect();
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].text_value(), "w@example.com");
        assert_eq!(emails[0].types(), vec!["work"]);

        let tels: Vec<_> = card.get_all("TEL").collect();
        assert_eq!(tels.len(), 1);
        assert_eq!(tels[0].types(), vec!["mobile"]);

        let adrs: Vec<_> = card.get_all("ADR").collect();
        assert_eq!(adrs.len(), 1);
        assert_eq!(adrs[0].components()[3], "Springfield");

        let labels: Vec<_> = card.get_all(LABEL_PROPERTY).map(|p| p.text_value()).collect();
        assert_eq!(labels, vec!["_$!<Friend>!$_"]);
    }

    #[tokio::test]
    async fn test_vendor_label_written_back_with_group() {
        let mut conv = converter();
        let mut card = parse_vcard(
            "BEGIN:VCARD\nVERSION:3.0\nFN:x\nitem1.TEL:1\nitem1.X-ABLabel:_$!<Satellite>!$_\nEND:VCARD",
        )
        .unwrap();

        let record = conv.vcard_to_record(&mut card, &NoDownload).await.record;
        assert_eq!(record.texts("phone:Satellite"), vec!["1"]);

        let out = conv.record_to_vcard(&record);
        let tel = out.get("TEL").unwrap();
        assert_eq!(tel.group.as_deref(), Some("ITEM1"));
        let label = out.get(LABEL_PROPERTY).unwrap();
        assert!(label.in_group("ITEM1"));
        assert_eq!(label.text_value(), "Satellite");
    }

    #[test]
    fn test_from_config_uses_addressbook_id() {
        let mut config = Config::default();
        config.addressbook.id = "work-book".to_string();
        config.photo.crop = false;

        let store = Arc::new(SqliteSubtypeStore::in_memory().unwrap());
        let conv = CardConverter::from_config(&config, store).unwrap();
        assert_eq!(conv.abook_id(), "work-book");
        assert!(!conv.photos.can_crop());
    }
}
