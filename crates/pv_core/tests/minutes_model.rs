use pv_core::{
    ContentEntry, Document, EditRecord, MinutesValidationError, Section, TimestampSource,
};
use uuid::Uuid;

#[test]
fn document_serialization_uses_expected_wire_fields() {
    let id = Uuid::parse_str("11111111-2222-4333-8444-555555555555").unwrap();
    let mut entry = ContentEntry::new("c1", "Alice", "Hello", 1_700_000_000_000);
    entry.edits.push(EditRecord {
        user: "bob".to_string(),
        timestamp: 1_700_000_000_500,
        change: "Hi".to_string(),
        timestamp_source: TimestampSource::Server,
    });
    let document = Document::with_id(id, "CSE")
        .with_section(Section::new("s1", "Discussions").with_entry(entry));

    let json = serde_json::to_value(&document).unwrap();
    assert_eq!(json["id"], id.to_string());
    assert_eq!(json["sections"][0]["content"][0]["created_at"], 1_700_000_000_000_i64);
    assert_eq!(json["sections"][0]["content"][0]["edits"][0]["timestamp_source"], "server");
    assert_eq!(json["sections"][0]["title_edits"], serde_json::json!([]));

    let decoded: Document = serde_json::from_value(json).unwrap();
    assert_eq!(decoded, document);
}

#[test]
fn missing_edits_field_decodes_as_empty_history() {
    let raw = r#"{ "id": "c1", "speaker": "Alice", "text": "Hello", "created_at": 0 }"#;
    let entry: ContentEntry = serde_json::from_str(raw).unwrap();
    assert!(entry.edits.is_empty());
}

#[test]
fn validate_rejects_duplicate_ids() {
    let duplicate_sections = Document::new("x")
        .with_section(Section::new("s1", "a"))
        .with_section(Section::new("s1", "b"));
    assert_eq!(
        duplicate_sections.validate().unwrap_err(),
        MinutesValidationError::DuplicateSectionId("s1".to_string())
    );

    let duplicate_entries = Document::new("x").with_section(
        Section::new("s1", "a")
            .with_entry(ContentEntry::new("c1", "A", "x", 0))
            .with_entry(ContentEntry::new("c1", "B", "y", 1)),
    );
    assert_eq!(
        duplicate_entries.validate().unwrap_err(),
        MinutesValidationError::DuplicateContentId {
            section_id: "s1".to_string(),
            content_id: "c1".to_string(),
        }
    );
}

#[test]
fn same_entry_id_in_different_sections_is_allowed() {
    let document = Document::new("x")
        .with_section(Section::new("s1", "a").with_entry(ContentEntry::new("c1", "A", "x", 0)))
        .with_section(Section::new("s2", "b").with_entry(ContentEntry::new("c1", "B", "y", 0)));
    document.validate().unwrap();
}

#[test]
fn nil_document_id_is_rejected() {
    let document = Document::with_id(Uuid::nil(), "x");
    assert_eq!(
        document.validate().unwrap_err(),
        MinutesValidationError::NilDocumentId
    );
}
