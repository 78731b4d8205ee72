//! Minutes ("PV") document model.
//!
//! # Responsibility
//! - Define documents, sections, spoken entries and their edit records.
//! - Validate structural identity rules before a document enters core.
//!
//! # Invariants
//! - `Document::id` is never nil.
//! - Ids match `[A-Za-z0-9_.:-]+`.
//! - `edits` is always present; an empty history means "pristine".

use crate::model::resolution::{sorted_history, winning_edit};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Non-blank, no control characters, no surrounding whitespace.
static ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s\p{Cc}](?:[^\p{Cc}]*[^\s\p{Cc}])?$").expect("valid id regex")
});

/// Opaque identifier of one minutes document.
pub type DocumentId = Uuid;

/// Unix epoch milliseconds.
pub type Timestamp = i64;

/// Where the timestamp of an edit came from.
///
/// `Server` marks an edit whose caller did not supply a logical time; those
/// records compete under the server clock instead of the caller's clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampSource {
    Client,
    Server,
}

impl TimestampSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Server => "server",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "client" => Some(Self::Client),
            "server" => Some(Self::Server),
            _ => None,
        }
    }
}

/// One immutable change to a text field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EditRecord {
    pub user: String,
    pub timestamp: Timestamp,
    /// Full replacement value of the field.
    pub change: String,
    pub timestamp_source: TimestampSource,
}

/// One spoken utterance inside a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentEntry {
    pub id: String,
    pub speaker: String,
    /// Text as authored, before any edit.
    pub text: String,
    pub created_at: Timestamp,
    #[serde(default)]
    pub edits: Vec<EditRecord>,
}

/// Whether an entry or title has been touched since authoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Pristine,
    Edited,
}

impl ContentEntry {
    pub fn new(
        id: impl Into<String>,
        speaker: impl Into<String>,
        text: impl Into<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            speaker: speaker.into(),
            text: text.into(),
            created_at,
            edits: Vec::new(),
        }
    }

    /// Returns the text a reader should see right now.
    pub fn current_text(&self) -> &str {
        winning_edit(&self.edits).map_or(self.text.as_str(), |record| record.change.as_str())
    }

    pub fn state(&self) -> EntryState {
        state_of(&self.edits)
    }
}

/// Ordered group of entries under one heading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: Vec<ContentEntry>,
    /// History of title changes, resolved with the same rule as entry text.
    #[serde(default)]
    pub title_edits: Vec<EditRecord>,
}

impl Section {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: Vec::new(),
            title_edits: Vec::new(),
        }
    }

    /// Appends one entry, keeping authoring order.
    pub fn with_entry(mut self, entry: ContentEntry) -> Self {
        self.content.push(entry);
        self
    }

    pub fn entry(&self, content_id: &str) -> Option<&ContentEntry> {
        self.content.iter().find(|entry| entry.id == content_id)
    }

    pub fn current_title(&self) -> &str {
        winning_edit(&self.title_edits).map_or(self.title.as_str(), |record| record.change.as_str())
    }

    pub fn title_state(&self) -> EntryState {
        state_of(&self.title_edits)
    }
}

/// Full minutes for one meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    /// Sorted, de-duplicated attendee names.
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl Document {
    /// Creates an empty document with a generated id.
    pub fn new(title: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), title)
    }

    /// Creates an empty document with a caller-provided id.
    ///
    /// Used by storage and import paths where identity already exists.
    pub fn with_id(id: DocumentId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            participants: Vec::new(),
            sections: Vec::new(),
        }
    }

    pub fn with_section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    pub fn section(&self, section_id: &str) -> Option<&Section> {
        self.sections.iter().find(|section| section.id == section_id)
    }

    /// Returns a copy where every text field shows its resolved value and
    /// every history is presented in resolution order.
    pub fn resolved(&self) -> Self {
        let sections = self
            .sections
            .iter()
            .map(|section| Section {
                id: section.id.clone(),
                title: section.current_title().to_string(),
                content: section
                    .content
                    .iter()
                    .map(|entry| ContentEntry {
                        id: entry.id.clone(),
                        speaker: entry.speaker.clone(),
                        text: entry.current_text().to_string(),
                        created_at: entry.created_at,
                        edits: sorted_history(&entry.edits),
                    })
                    .collect(),
                title_edits: sorted_history(&section.title_edits),
            })
            .collect();

        Self {
            id: self.id,
            title: self.title.clone(),
            participants: self.participants.clone(),
            sections,
        }
    }

    /// Checks identity rules that core relies on for lookups.
    ///
    /// # Errors
    /// - `NilDocumentId` when the document id is nil.
    /// - `InvalidId` when a section or entry id is blank, padded with
    ///   whitespace or contains control characters.
    /// - `DuplicateSectionId` / `DuplicateContentId` on id collisions.
    pub fn validate(&self) -> Result<(), MinutesValidationError> {
        if self.id.is_nil() {
            return Err(MinutesValidationError::NilDocumentId);
        }

        let mut section_ids = HashSet::new();
        for section in &self.sections {
            if !is_valid_id(&section.id) {
                return Err(MinutesValidationError::InvalidId {
                    kind: "section",
                    value: section.id.clone(),
                });
            }
            if !section_ids.insert(section.id.as_str()) {
                return Err(MinutesValidationError::DuplicateSectionId(
                    section.id.clone(),
                ));
            }

            let mut content_ids = HashSet::new();
            for entry in &section.content {
                if !is_valid_id(&entry.id) {
                    return Err(MinutesValidationError::InvalidId {
                        kind: "content",
                        value: entry.id.clone(),
                    });
                }
                if !content_ids.insert(entry.id.as_str()) {
                    return Err(MinutesValidationError::DuplicateContentId {
                        section_id: section.id.clone(),
                        content_id: entry.id.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Addressable text field inside a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EditTarget {
    Content {
        section_id: String,
        content_id: String,
    },
    SectionTitle {
        section_id: String,
    },
}

impl EditTarget {
    pub fn content(section_id: impl Into<String>, content_id: impl Into<String>) -> Self {
        Self::Content {
            section_id: section_id.into(),
            content_id: content_id.into(),
        }
    }

    pub fn section_title(section_id: impl Into<String>) -> Self {
        Self::SectionTitle {
            section_id: section_id.into(),
        }
    }

    pub fn section_id(&self) -> &str {
        match self {
            Self::Content { section_id, .. } | Self::SectionTitle { section_id } => section_id,
        }
    }

    /// `None` for section titles.
    pub fn content_id(&self) -> Option<&str> {
        match self {
            Self::Content { content_id, .. } => Some(content_id),
            Self::SectionTitle { .. } => None,
        }
    }
}

impl Display for EditTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Content {
                section_id,
                content_id,
            } => write!(f, "{section_id}/{content_id}"),
            Self::SectionTitle { section_id } => write!(f, "{section_id}#title"),
        }
    }
}

/// Structural validation failure for a minutes document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MinutesValidationError {
    NilDocumentId,
    InvalidId { kind: &'static str, value: String },
    DuplicateSectionId(String),
    DuplicateContentId {
        section_id: String,
        content_id: String,
    },
}

impl Display for MinutesValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NilDocumentId => write!(f, "document id must not be nil"),
            Self::InvalidId { kind, value } => write!(f, "invalid {kind} id `{value}`"),
            Self::DuplicateSectionId(id) => write!(f, "duplicate section id `{id}`"),
            Self::DuplicateContentId {
                section_id,
                content_id,
            } => write!(
                f,
                "duplicate content id `{content_id}` in section `{section_id}`"
            ),
        }
    }
}

impl Error for MinutesValidationError {}

fn is_valid_id(value: &str) -> bool {
    ID_RE.is_match(value)
}

fn state_of(edits: &[EditRecord]) -> EntryState {
    if edits.is_empty() {
        EntryState::Pristine
    } else {
        EntryState::Edited
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(user: &str, timestamp: Timestamp, change: &str) -> EditRecord {
        EditRecord {
            user: user.to_string(),
            timestamp,
            change: change.to_string(),
            timestamp_source: TimestampSource::Client,
        }
    }

    #[test]
    fn pristine_entry_shows_authored_text() {
        let entry = ContentEntry::new("c1", "Alice", "Hello", 0);
        assert_eq!(entry.current_text(), "Hello");
        assert_eq!(entry.state(), EntryState::Pristine);
    }

    #[test]
    fn resolved_rewrites_title_and_sorts_history() {
        let mut section = Section::new("s1", "Ordre du jour")
            .with_entry(ContentEntry::new("c1", "Alice", "Hello", 0));
        section.content[0].edits = vec![
            record("bob", 100, "Hi there"),
            record("ana", 100, "Hi all"),
        ];
        section.title_edits = vec![record("carl", 7, "Agenda")];
        let document = Document::new("CSE").with_section(section);

        let resolved = document.resolved();
        let entry = &resolved.sections[0].content[0];
        assert_eq!(resolved.sections[0].title, "Agenda");
        assert_eq!(entry.text, "Hi all");
        assert_eq!(entry.edits[0].user, "ana");
        assert_eq!(entry.edits[1].user, "bob");
    }

    #[test]
    fn validate_rejects_malformed_ids() {
        for bad in ["", "   ", " s1", "s1 ", "s\u{0}1", "line\nbreak"] {
            let document = Document::new("x").with_section(Section::new(bad, "t"));
            assert_eq!(
                document.validate().unwrap_err(),
                MinutesValidationError::InvalidId {
                    kind: "section",
                    value: bad.to_string(),
                }
            );
        }
    }

    #[test]
    fn validate_accepts_free_form_ids() {
        let document = Document::new("x").with_section(
            Section::new("séance-1", "t")
                .with_entry(ContentEntry::new("point 2/a", "Zoé", "texte", 0))
                .with_entry(ContentEntry::new("x", "Zoé", "texte", 0)),
        );
        document.validate().unwrap();
    }

    #[test]
    fn edit_target_display_is_stable() {
        assert_eq!(EditTarget::content("s1", "c1").to_string(), "s1/c1");
        assert_eq!(EditTarget::section_title("s1").to_string(), "s1#title");
    }
}
