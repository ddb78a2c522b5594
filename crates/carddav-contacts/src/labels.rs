//! Subtype resolution and the `X-ABLABEL` grouping extension
//!
//! A multi-valued property gets its local subtype either from a vendor label
//! bound to it through a grouping token (`item1.EMAIL` + `item1.X-ABLabel`)
//! or from its `TYPE` parameters. Vendor labels that are not in the known
//! catalog yet are registered and persisted the first time they are seen.

use crate::models::MultiField;
use crate::vcard::{Property, VCard};
use carddav_core::SubtypeStore;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

/// Auxiliary property carrying a vendor label
pub const LABEL_PROPERTY: &str = "X-ABLABEL";

/// Subtype returned when nothing else matches
pub const DEFAULT_SUBTYPE: &str = "other";

static VENDOR_WRAPPER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^_\$!<(.*)>!\$_$").expect("valid vendor label pattern"));

fn builtin_subtypes(field: MultiField) -> &'static [&'static str] {
    match field {
        MultiField::Email => &["home", "work", "other", "internet"],
        MultiField::Phone => &[
            "home", "home2", "work", "work2", "mobile", "cell", "main", "homefax", "workfax",
            "car", "pager", "video", "assistant", "other",
        ],
        MultiField::Address => &["home", "work", "other"],
        MultiField::Url => &["homepage", "work", "blog", "profile", "other"],
    }
}

/// `_$!<Mobile>!$_` → `Mobile`; anything else is returned unchanged
pub fn strip_vendor_wrapper(label: &str) -> &str {
    VENDOR_WRAPPER
        .captures(label)
        .and_then(|caps| caps.get(1))
        .map_or(label, |m| m.as_str())
}

/// Known subtypes per field plus the vendor labels owned by one addressbook
#[derive(Debug, Clone)]
pub struct SubtypeCatalog {
    known: HashMap<MultiField, Vec<String>>,
    vendor: HashMap<MultiField, HashSet<String>>,
}

impl Default for SubtypeCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SubtypeCatalog {
    /// Catalog seeded with the built-in lists only
    pub fn builtin() -> Self {
        let known = MultiField::ALL
            .into_iter()
            .map(|field| {
                let list = builtin_subtypes(field).iter().map(|s| s.to_string()).collect();
                (field, list)
            })
            .collect();

        Self {
            known,
            vendor: HashMap::new(),
        }
    }

    /// Built-in lists extended with the labels stored for `abook_id`
    pub fn load(store: &dyn SubtypeStore, abook_id: &str) -> carddav_core::Result<Self> {
        let mut catalog = Self::builtin();
        for row in store.load_subtypes(abook_id)? {
            match MultiField::from_local_name(&row.typename) {
                Some(field) => catalog.insert_vendor(field, &row.subtype),
                None => debug!("Ignoring stored subtype for unknown field {}", row.typename),
            }
        }
        Ok(catalog)
    }

    /// Ordered subtypes for a field
    pub fn subtypes(&self, field: MultiField) -> &[String] {
        self.known.get(&field).map_or(&[], Vec::as_slice)
    }

    pub fn contains(&self, field: MultiField, subtype: &str) -> bool {
        self.subtypes(field).iter().any(|s| s == subtype)
    }

    pub fn is_vendor_label(&self, field: MultiField, subtype: &str) -> bool {
        self.vendor.get(&field).is_some_and(|set| set.contains(subtype))
    }

    /// The tag that comes earliest in the field's list, compared case-insensitively
    pub fn preferred_type(&self, field: MultiField, tags: &[String]) -> Option<&str> {
        self.subtypes(field)
            .iter()
            .find(|known| tags.iter().any(|tag| tag.eq_ignore_ascii_case(known)))
            .map(String::as_str)
    }

    fn insert_vendor(&mut self, field: MultiField, label: &str) {
        let known = self.known.entry(field).or_default();
        if !known.iter().any(|s| s == label) {
            known.push(label.to_string());
        }
        self.vendor.entry(field).or_default().insert(label.to_string());
    }
}

/// Resolves and assigns subtypes for one addressbook
pub struct LabelResolver {
    catalog: SubtypeCatalog,
    store: Arc<dyn SubtypeStore>,
    abook_id: String,
}

impl LabelResolver {
    /// Load the catalog for `abook_id`; this is the only read of the store
    pub fn new(store: Arc<dyn SubtypeStore>, abook_id: impl Into<String>) -> carddav_core::Result<Self> {
        let abook_id = abook_id.into();
        let catalog = SubtypeCatalog::load(store.as_ref(), &abook_id)?;
        Ok(Self {
            catalog,
            store,
            abook_id,
        })
    }

    pub fn catalog(&self) -> &SubtypeCatalog {
        &self.catalog
    }

    pub fn abook_id(&self) -> &str {
        &self.abook_id
    }

    /// Local subtype for one instance of a multi-valued property
    pub fn resolve_label(&mut self, card: &VCard, property: &Property, field: MultiField) -> String {
        if let Some(label) = vendor_label(card, property) {
            if !self.catalog.contains(field, &label) {
                self.register(field, &label);
            }
            return label;
        }

        match self.catalog.preferred_type(field, &property.types()) {
            Some(subtype) => subtype.to_string(),
            None => DEFAULT_SUBTYPE.to_string(),
        }
    }

    /// Attach `subtype` to `property` and add it to the card
    ///
    /// Vendor labels go through a fresh grouping token and an `X-ABLABEL`
    /// property; everything else becomes a `TYPE` parameter.
    pub fn assign_label(&self, card: &mut VCard, mut property: Property, field: MultiField, subtype: &str) {
        if self.catalog.is_vendor_label(field, subtype) {
            let token = next_group_token(card);
            property.group = Some(token.clone());
            card.add(property);
            card.add(Property::text(LABEL_PROPERTY, subtype).with_group(token));
        } else {
            property.add_type(subtype);
            card.add(property);
        }
    }

    fn register(&mut self, field: MultiField, label: &str) {
        self.catalog.insert_vendor(field, label);
        info!(
            "Registered vendor label {}:{} for addressbook {}",
            field.local_name(),
            label,
            self.abook_id
        );

        if let Err(e) = self
            .store
            .insert_subtype(field.local_name(), label, &self.abook_id)
        {
            warn!("Failed to store vendor label {}:{}: {}", field.local_name(), label, e);
        }
    }
}

/// Label text bound to the property's group, vendor wrapper removed
fn vendor_label(card: &VCard, property: &Property) -> Option<String> {
    let group = property.group.as_deref()?;
    let label = card
        .get_all(LABEL_PROPERTY)
        .find(|p| p.in_group(group))?
        .text_value();
    let label = strip_vendor_wrapper(&label);
    if label.is_empty() {
        None
    } else {
        Some(label.to_string())
    }
}

/// Smallest `ITEM<n>` not used as a grouping token anywhere in the card
pub fn next_group_token(card: &VCard) -> String {
    let used: HashSet<String> = card.groups().map(str::to_ascii_uppercase).collect();
    (1..)
        .map(|n| format!("ITEM{}", n))
        .find(|token| !used.contains(token))
        .unwrap_or_default()
}

/// Drop `X-ABLABEL` properties whose grouping token no other property uses
///
/// Returns the number of labels removed.
pub fn prune_orphan_labels(card: &mut VCard) -> usize {
    let live: HashSet<String> = card
        .properties()
        .iter()
        .filter(|p| !p.is(LABEL_PROPERTY))
        .filter_map(|p| p.group.as_deref())
        .map(str::to_ascii_uppercase)
        .collect();

    let before = card.properties().len();
    card.retain(|p| match (&p.group, p.is(LABEL_PROPERTY)) {
        (Some(group), true) => live.contains(&group.to_ascii_uppercase()),
        _ => true,
    });
    let removed = before - card.properties().len();
    if removed > 0 {
        debug!("Removed {} orphaned label properties", removed);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcard::parse_vcard;
    use carddav_core::SqliteSubtypeStore;

    fn resolver() -> (Arc<SqliteSubtypeStore>, LabelResolver) {
        let store = Arc::new(SqliteSubtypeStore::in_memory().unwrap());
        let resolver = LabelResolver::new(store.clone(), "1").unwrap();
        (store, resolver)
    }

    #[test]
    fn test_strip_vendor_wrapper() {
        assert_eq!(strip_vendor_wrapper("_$!<Mobile>!$_"), "Mobile");
        assert_eq!(strip_vendor_wrapper("Private"), "Private");
        assert_eq!(strip_vendor_wrapper("_$!<Mobile"), "_$!<Mobile");
    }

    #[test]
    fn test_type_tie_break_prefers_catalog_order() {
        let (_, mut resolver) = resolver();
        let card = parse_vcard("BEGIN:VCARD\nVERSION:3.0\nEMAIL;TYPE=work,home:a@b.com\nEND:VCARD").unwrap();
        let email = card.get("EMAIL").unwrap();
        assert_eq!(resolver.resolve_label(&card, email, MultiField::Email), "home");
    }

    #[test]
    fn test_type_match_is_case_insensitive() {
        let (_, mut resolver) = resolver();
        let card = parse_vcard("BEGIN:VCARD\nVERSION:3.0\nTEL;TYPE=PREF;TYPE=CELL:1\nEND:VCARD").unwrap();
        let tel = card.get("TEL").unwrap();
        assert_eq!(resolver.resolve_label(&card, tel, MultiField::Phone), "cell");
    }

    #[test]
    fn test_unknown_types_fall_back_to_other() {
        let (_, mut resolver) = resolver();
        let card = parse_vcard("BEGIN:VCARD\nVERSION:3.0\nURL;TYPE=x-custom:http://a\nURL:http://b\nEND:VCARD").unwrap();
        for url in card.get_all("URL") {
            assert_eq!(resolver.resolve_label(&card, url, MultiField::Url), "other");
        }
    }

    #[test]
    fn test_vendor_label_registered_once() {
        let (store, mut resolver) = resolver();
        let card = parse_vcard(
            "BEGIN:VCARD\nVERSION:3.0\nitem1.EMAIL;TYPE=home:a@b.com\nitem1.X-ABLabel:_$!<Private>!$_\nEND:VCARD",
        )
        .unwrap();
        let email = card.get("EMAIL").unwrap();

        assert_eq!(resolver.resolve_label(&card, email, MultiField::Email), "Private");
        assert_eq!(resolver.resolve_label(&card, email, MultiField::Email), "Private");

        assert_eq!(store.count("1").unwrap(), 1);
        let privates = resolver
            .catalog()
            .subtypes(MultiField::Email)
            .iter()
            .filter(|s| s.as_str() == "Private")
            .count();
        assert_eq!(privates, 1);
        assert!(resolver.catalog().is_vendor_label(MultiField::Email, "Private"));
    }

    #[test]
    fn test_known_vendor_label_not_stored() {
        let (store, mut resolver) = resolver();
        let card = parse_vcard(
            "BEGIN:VCARD\nVERSION:3.0\nitem1.TEL:1\nitem1.X-ABLabel:_$!<other>!$_\nEND:VCARD",
        )
        .unwrap();
        let tel = card.get("TEL").unwrap();

        assert_eq!(resolver.resolve_label(&card, tel, MultiField::Phone), "other");
        assert_eq!(store.count("1").unwrap(), 0);
    }

    #[test]
    fn test_catalog_loads_stored_labels() {
        let store = Arc::new(SqliteSubtypeStore::in_memory().unwrap());
        store.insert_subtype("phone", "Satellite", "1").unwrap();
        store.insert_subtype("im", "Jabber", "1").unwrap();
        store.insert_subtype("phone", "Boat", "2").unwrap();

        let resolver = LabelResolver::new(store, "1").unwrap();
        let catalog = resolver.catalog();
        assert_eq!(catalog.subtypes(MultiField::Phone).last().unwrap(), "Satellite");
        assert!(catalog.is_vendor_label(MultiField::Phone, "Satellite"));
        assert!(!catalog.contains(MultiField::Phone, "Boat"));
    }

    #[test]
    fn test_next_group_token_skips_used() {
        let card = parse_vcard(
            "BEGIN:VCARD\nVERSION:3.0\nitem1.EMAIL:a@b.com\nITEM2.TEL:1\nEND:VCARD",
        )
        .unwrap();
        assert_eq!(next_group_token(&card), "ITEM3");
        assert_eq!(next_group_token(&VCard::new()), "ITEM1");
    }

    #[test]
    fn test_assign_label_vendor_and_standard() {
        let (_, mut resolver) = resolver();
        resolver.register(MultiField::Email, "Private");

        let mut card = VCard::new();
        card.add(Property::text("TEL", "1").with_group("item1"));
        resolver.assign_label(&mut card, Property::text("EMAIL", "a@b.com"), MultiField::Email, "Private");
        resolver.assign_label(&mut card, Property::text("EMAIL", "c@d.com"), MultiField::Email, "work");

        let emails: Vec<_> = card.get_all("EMAIL").collect();
        assert_eq!(emails[0].group.as_deref(), Some("ITEM2"));
        assert!(emails[0].types().is_empty());
        assert_eq!(emails[1].types(), vec!["work"]);
        assert!(emails[1].group.is_none());

        let label = card.get(LABEL_PROPERTY).unwrap();
        assert!(label.in_group("item2"));
        assert_eq!(label.text_value(), "Private");
    }

    #[test]
    fn test_prune_orphan_labels() {
        let mut card = parse_vcard(
            "BEGIN:VCARD\nVERSION:3.0\n\
             item1.X-ABLabel:Orphan\n\
             item2.X-ABRELATEDNAMES:Bob\n\
             ITEM2.X-ABLabel:_$!<Friend>!$_\n\
             END:VCARD",
        )
        .unwrap();

        assert_eq!(prune_orphan_labels(&mut card), 1);
        let labels: Vec<_> = card.get_all(LABEL_PROPERTY).map(|p| p.text_value()).collect();
        assert_eq!(labels, vec!["_$!<Friend>!$_"]);
    }
}
