//! import / export commands

use anyhow::Context;
use carddav_contacts::{CardConverter, LocalRecord, ResourceDownloader, VCard, parse_vcard, parse_vcards};
use serde_json::{Value, json};
use std::path::Path;

/// Convert every card in `path` and describe the results as JSON
///
/// Cards rewritten during conversion (embedded photos) are included in
/// serialized form so the caller can store them back.
pub async fn import(
    path: &Path,
    converter: &mut CardConverter,
    downloader: &dyn ResourceDownloader,
) -> anyhow::Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let cards = parse_vcards(&text).with_context(|| format!("Failed to parse {}", path.display()))?;

    tracing::info!("Converting {} cards from {}", cards.len(), path.display());

    let mut results = Vec::with_capacity(cards.len());
    for mut card in cards {
        let conversion = converter.vcard_to_record(&mut card, downloader).await;
        let updated = conversion.needs_persist.then(|| card.serialize());
        results.push(json!({
            "record": conversion.record,
            "needs_persist": conversion.needs_persist,
            "vcard": updated,
        }));
    }

    Ok(Value::Array(results))
}

/// Convert the JSON record in `record_path` into a serialized card
pub fn export(
    record_path: &Path,
    update: Option<&Path>,
    converter: &CardConverter,
) -> anyhow::Result<String> {
    let json = std::fs::read_to_string(record_path)
        .with_context(|| format!("Failed to read {}", record_path.display()))?;
    let record = LocalRecord::from_json(&json)
        .with_context(|| format!("Invalid record in {}", record_path.display()))?;

    let card: VCard = match update {
        Some(existing) => {
            let text = std::fs::read_to_string(existing)
                .with_context(|| format!("Failed to read {}", existing.display()))?;
            let mut card =
                parse_vcard(&text).with_context(|| format!("Failed to parse {}", existing.display()))?;
            converter.update_vcard(&record, &mut card);
            card
        }
        None => converter.record_to_vcard(&record),
    };

    Ok(card.serialize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use carddav_contacts::HttpDownloader;
    use carddav_core::{HttpConfig, SqliteSubtypeStore};
    use std::sync::Arc;

    fn converter() -> CardConverter {
        let store = Arc::new(SqliteSubtypeStore::in_memory().unwrap());
        CardConverter::new(store, "cli").unwrap()
    }

    #[tokio::test]
    async fn test_import_multiple_cards() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cards.vcf");
        std::fs::write(
            &path,
            "BEGIN:VCARD\r\nVERSION:3.0\r\nFN:Jane Doe\r\nEMAIL;TYPE=work:jane@acme.example\r\nEND:VCARD\r\n\
             BEGIN:VCARD\r\nVERSION:3.0\r\nN:Smith;John;;;\r\nEND:VCARD\r\n",
        )
        .unwrap();

        let downloader = HttpDownloader::new(&HttpConfig::default()).unwrap();
        let output = import(&path, &mut converter(), &downloader).await.unwrap();

        let items = output.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["record"]["email:work"], json!({ "texts": ["jane@acme.example"] }));
        assert_eq!(items[1]["record"]["name"], json!({ "text": "John Smith" }));
        assert_eq!(items[1]["needs_persist"], json!(false));
        assert!(items[1]["vcard"].is_null());
    }

    #[tokio::test]
    async fn test_import_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.vcf");
        std::fs::write(&path, "BEGIN:VCARD\r\nFN Jane\r\nEND:VCARD\r\n").unwrap();

        let downloader = HttpDownloader::new(&HttpConfig::default()).unwrap();
        assert!(import(&path, &mut converter(), &downloader).await.is_err());
    }

    #[test]
    fn test_export_new_and_update() {
        let dir = tempfile::tempdir().unwrap();
        let record_path = dir.path().join("jane.json");
        std::fs::write(
            &record_path,
            r#"{"firstname": {"text": "Jane"}, "surname": {"text": "Doe"}}"#,
        )
        .unwrap();

        let created = export(&record_path, None, &converter()).unwrap();
        assert!(created.starts_with("BEGIN:VCARD\r\nVERSION:3.0\r\n"));
        assert!(created.contains("FN:Jane Doe\r\n"));

        let card_path = dir.path().join("jane.vcf");
        std::fs::write(
            &card_path,
            "BEGIN:VCARD\r\nVERSION:3.0\r\nFN:Old\r\nX-CUSTOM:keep me\r\nEND:VCARD\r\n",
        )
        .unwrap();

        let updated = export(&record_path, Some(&card_path), &converter()).unwrap();
        assert!(updated.contains("FN:Jane Doe\r\n"));
        assert!(updated.contains("X-CUSTOM:keep me\r\n"));
        assert!(!updated.contains("FN:Old"));
    }

    #[test]
    fn test_export_rejects_malformed_record() {
        let dir = tempfile::tempdir().unwrap();
        let record_path = dir.path().join("bad.json");
        std::fs::write(&record_path, r#"{"firstname": "Jane"}"#).unwrap();

        let err = export(&record_path, None, &converter()).unwrap_err();
        assert!(err.to_string().contains("Invalid record"));
    }
}
