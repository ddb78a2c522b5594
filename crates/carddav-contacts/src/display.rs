//! Display name heuristics

use crate::models::{FieldValue, LocalRecord, MultiField, SHOW_AS_COMPANY, SHOW_AS_INDIVIDUAL, keys};

/// Name used when a record has nothing presentable at all
pub const FALLBACK_DISPLAY_NAME: &str = "Unset Displayname";

/// Derive a presentable name from already populated fields
pub fn compose_display_name(record: &LocalRecord) -> String {
    let organization = record.text(keys::ORGANIZATION);
    if record.text(keys::SHOWAS) == SHOW_AS_COMPANY && !organization.is_empty() {
        return organization.to_string();
    }

    let parts: Vec<&str> = [record.text(keys::FIRSTNAME), record.text(keys::SURNAME)]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();
    if !parts.is_empty() {
        return parts.join(" ");
    }

    // keys iterate in lexicographic order
    for (field, _, value) in record.multi_keys() {
        if !matches!(field, MultiField::Email | MultiField::Phone) {
            continue;
        }
        let first = match value {
            FieldValue::Texts(list) => list.iter().find(|v| !v.is_empty()),
            FieldValue::Text(v) if !v.is_empty() => Some(v),
            _ => None,
        };
        if let Some(first) = first {
            return first.clone();
        }
    }

    FALLBACK_DISPLAY_NAME.to_string()
}

/// Show-as hint for a record being written without an explicit name
///
/// New records (no prior hint) show as a company only when they have an
/// organization and no personal name. An existing hint is kept unless the
/// organization was cleared.
pub fn determine_show_as(record: &LocalRecord) -> String {
    let has_organization = !record.text(keys::ORGANIZATION).is_empty();

    let show_as = match record.text(keys::SHOWAS) {
        "" => {
            let unnamed =
                record.text(keys::FIRSTNAME).is_empty() && record.text(keys::SURNAME).is_empty();
            if has_organization && unnamed {
                SHOW_AS_COMPANY
            } else {
                SHOW_AS_INDIVIDUAL
            }
        }
        _ if !has_organization => SHOW_AS_INDIVIDUAL,
        prior => prior,
    };
    show_as.to_string()
}
