//! Collaborative edit log for one minutes document.
//!
//! # Responsibility
//! - Own the authoritative state of one document and mediate every edit.
//! - Write each accepted edit through the store before it becomes visible.
//! - Serve resolved snapshots and sorted histories.
//!
//! # Invariants
//! - One successful `apply_*` call appends exactly one record; a failed call
//!   appends nothing, in memory or in the store.
//! - Each text field has its own history lock; edits to different fields
//!   never wait on each other.
//! - `materialize` observes every history at one instant: it holds the
//!   snapshot gate exclusively, appenders hold it shared for the push only.
//! - Concurrent edits never fail; they resolve by last-writer-wins.

use crate::clock::{Clock, SystemClock};
use crate::config::EditorConfig;
use crate::model::minutes::{
    ContentEntry, Document, DocumentId, EditRecord, EditTarget, EntryState,
    MinutesValidationError, Section, Timestamp, TimestampSource,
};
use crate::model::resolution::{sorted_history, winning_edit};
use crate::repo::memory_repo::InMemoryMinutesStore;
use crate::repo::minutes_repo::{MinutesStore, RepoError};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

pub type EditLogResult<T> = Result<T, EditError>;

/// Failure of an edit log operation.
#[derive(Debug)]
pub enum EditError {
    /// Section or entry id does not exist in the document.
    NotFound {
        section_id: String,
        content_id: Option<String>,
    },
    /// Edit rejected before it reached the history.
    InvalidInput(String),
    /// Reserved for merge policies that can refuse concurrent edits.
    /// Last-writer-wins never raises it.
    Conflict(String),
    /// Document handed to the log breaks identity rules.
    InvalidDocument(MinutesValidationError),
    /// Store has no document with this id.
    DocumentNotFound(DocumentId),
    /// Store failed; the edit was not applied.
    Store(RepoError),
}

impl Display for EditError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound {
                section_id,
                content_id: Some(content_id),
            } => write!(f, "content entry not found: {section_id}/{content_id}"),
            Self::NotFound {
                section_id,
                content_id: None,
            } => write!(f, "section not found: {section_id}"),
            Self::InvalidInput(reason) => write!(f, "invalid edit: {reason}"),
            Self::Conflict(reason) => write!(f, "edit conflict: {reason}"),
            Self::InvalidDocument(err) => write!(f, "invalid document: {err}"),
            Self::DocumentNotFound(id) => write!(f, "minutes document not found: {id}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for EditError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidDocument(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MinutesValidationError> for EditError {
    fn from(value: MinutesValidationError) -> Self {
        Self::InvalidDocument(value)
    }
}

impl From<RepoError> for EditError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::TargetNotFound { target, .. } => Self::NotFound {
                section_id: target.section_id().to_string(),
                content_id: target.content_id().map(str::to_string),
            },
            RepoError::DocumentNotFound(id) => Self::DocumentNotFound(id),
            RepoError::Validation(err) => Self::InvalidDocument(err),
            other => Self::Store(other),
        }
    }
}

/// Outcome of one accepted edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditResult {
    /// Resolved value of the field right after the append.
    pub current_text: String,
    /// Full history of the field in resolution order.
    pub history: Vec<EditRecord>,
    /// Record appended by this call, with its resolved timestamp.
    pub record: EditRecord,
    /// Whether this call's record is the current value.
    pub won: bool,
}

/// Append-only, mutex-guarded history of one text field.
#[derive(Debug, Default)]
struct HistoryCell {
    records: Mutex<Vec<EditRecord>>,
}

impl HistoryCell {
    fn new(records: Vec<EditRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<EditRecord>> {
        // a push either happened or not; poisoning cannot leave half a record
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> Vec<EditRecord> {
        self.lock().clone()
    }
}

#[derive(Debug)]
struct EntrySlot {
    id: String,
    speaker: String,
    authored_text: String,
    created_at: Timestamp,
    history: HistoryCell,
}

#[derive(Debug)]
struct SectionSlot {
    id: String,
    authored_title: String,
    title_history: HistoryCell,
    entries: Vec<EntrySlot>,
    entry_index: HashMap<String, usize>,
}

/// Authoritative, thread-safe state of one minutes document.
///
/// Document structure is fixed at construction; only histories grow. Share it
/// between sessions with `Arc<EditLog<S>>`.
pub struct EditLog<S: MinutesStore> {
    document_id: DocumentId,
    title: String,
    participants: Vec<String>,
    sections: Vec<SectionSlot>,
    section_index: HashMap<String, usize>,
    snapshot_gate: RwLock<()>,
    config: EditorConfig,
    clock: Box<dyn Clock>,
    store: S,
}

impl EditLog<InMemoryMinutesStore> {
    /// Starts a log over `document` backed by a private in-memory store.
    pub fn new(document: Document, config: EditorConfig) -> EditLogResult<Self> {
        Self::create(InMemoryMinutesStore::new(), document, config)
    }
}

impl<S: MinutesStore> EditLog<S> {
    /// Hands a freshly authored document to `store` and opens a log on it.
    ///
    /// # Errors
    /// - `InvalidDocument` when ids are malformed or collide.
    /// - `Store` when the store rejects the document (for example a duplicate id).
    pub fn create(store: S, document: Document, config: EditorConfig) -> EditLogResult<Self> {
        document.validate()?;
        store.save_document(&document)?;
        info!(
            "event=document_create module=edit_log status=ok document_id={} sections={}",
            document.id,
            document.sections.len()
        );
        Ok(Self::from_parts(store, document, config))
    }

    /// Loads an existing document and its full history from `store`.
    pub fn open(store: S, document_id: DocumentId, config: EditorConfig) -> EditLogResult<Self> {
        let document = store
            .load_document(document_id)?
            .ok_or(EditError::DocumentNotFound(document_id))?;
        document.validate()?;
        info!(
            "event=document_open module=edit_log status=ok document_id={} sections={}",
            document.id,
            document.sections.len()
        );
        Ok(Self::from_parts(store, document, config))
    }

    /// Replaces the server clock used when callers omit a timestamp.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Replaces the text of one content entry.
    ///
    /// `client_timestamp = None` stamps the edit with the server clock and
    /// marks the record `TimestampSource::Server`, unless
    /// `require_client_timestamp` is set, in which case the edit is rejected.
    ///
    /// # Errors
    /// - `NotFound` when the section or entry does not exist.
    /// - `InvalidInput` for a blank user or text, an over-long text, or a
    ///   missing timestamp under `require_client_timestamp`.
    /// - `Store` when the write-through fails.
    pub fn apply_edit(
        &self,
        section_id: &str,
        content_id: &str,
        editor_user: &str,
        text: &str,
        client_timestamp: Option<Timestamp>,
    ) -> EditLogResult<EditResult> {
        let target = EditTarget::content(section_id, content_id);
        let entry = self.entry_slot(section_id, content_id)?;
        self.append(
            &target,
            &entry.history,
            &entry.authored_text,
            editor_user,
            text,
            client_timestamp,
        )
    }

    /// Replaces the title of one section, with the same rules as `apply_edit`.
    pub fn apply_title_edit(
        &self,
        section_id: &str,
        editor_user: &str,
        text: &str,
        client_timestamp: Option<Timestamp>,
    ) -> EditLogResult<EditResult> {
        let target = EditTarget::section_title(section_id);
        let section = self.section_slot(section_id)?;
        self.append(
            &target,
            &section.title_history,
            &section.authored_title,
            editor_user,
            text,
            client_timestamp,
        )
    }

    /// Returns a resolved, point-in-time snapshot of the whole document.
    pub fn materialize(&self) -> Document {
        let captured: Vec<(Vec<EditRecord>, Vec<Vec<EditRecord>>)> = {
            let _gate = self
                .snapshot_gate
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            self.sections
                .iter()
                .map(|section| {
                    (
                        section.title_history.snapshot(),
                        section
                            .entries
                            .iter()
                            .map(|entry| entry.history.snapshot())
                            .collect(),
                    )
                })
                .collect()
        };

        let sections = self
            .sections
            .iter()
            .zip(captured)
            .map(|(section, (title_edits, entry_edits))| Section {
                id: section.id.clone(),
                title: section.authored_title.clone(),
                content: section
                    .entries
                    .iter()
                    .zip(entry_edits)
                    .map(|(entry, edits)| ContentEntry {
                        id: entry.id.clone(),
                        speaker: entry.speaker.clone(),
                        text: entry.authored_text.clone(),
                        created_at: entry.created_at,
                        edits,
                    })
                    .collect(),
                title_edits,
            })
            .collect();

        Document {
            id: self.document_id,
            title: self.title.clone(),
            participants: self.participants.clone(),
            sections,
        }
        .resolved()
    }

    /// Returns the full history of one entry in resolution order.
    pub fn history_of(&self, section_id: &str, content_id: &str) -> EditLogResult<Vec<EditRecord>> {
        let entry = self.entry_slot(section_id, content_id)?;
        Ok(sorted_history(&entry.history.snapshot()))
    }

    /// Returns the full title history of one section in resolution order.
    pub fn title_history_of(&self, section_id: &str) -> EditLogResult<Vec<EditRecord>> {
        let section = self.section_slot(section_id)?;
        Ok(sorted_history(&section.title_history.snapshot()))
    }

    pub fn entry_state(&self, section_id: &str, content_id: &str) -> EditLogResult<EntryState> {
        let entry = self.entry_slot(section_id, content_id)?;
        Ok(if entry.history.lock().is_empty() {
            EntryState::Pristine
        } else {
            EntryState::Edited
        })
    }

    fn from_parts(store: S, document: Document, config: EditorConfig) -> Self {
        let mut section_index = HashMap::with_capacity(document.sections.len());
        let mut sections = Vec::with_capacity(document.sections.len());
        for (section_pos, section) in document.sections.into_iter().enumerate() {
            section_index.insert(section.id.clone(), section_pos);

            let mut entry_index = HashMap::with_capacity(section.content.len());
            let mut entries = Vec::with_capacity(section.content.len());
            for (entry_pos, entry) in section.content.into_iter().enumerate() {
                entry_index.insert(entry.id.clone(), entry_pos);
                entries.push(EntrySlot {
                    id: entry.id,
                    speaker: entry.speaker,
                    authored_text: entry.text,
                    created_at: entry.created_at,
                    history: HistoryCell::new(entry.edits),
                });
            }

            sections.push(SectionSlot {
                id: section.id,
                authored_title: section.title,
                title_history: HistoryCell::new(section.title_edits),
                entries,
                entry_index,
            });
        }

        Self {
            document_id: document.id,
            title: document.title,
            participants: document.participants,
            sections,
            section_index,
            snapshot_gate: RwLock::new(()),
            config,
            clock: Box::new(SystemClock),
            store,
        }
    }

    fn section_slot(&self, section_id: &str) -> EditLogResult<&SectionSlot> {
        self.section_index
            .get(section_id)
            .map(|&pos| &self.sections[pos])
            .ok_or_else(|| EditError::NotFound {
                section_id: section_id.to_string(),
                content_id: None,
            })
    }

    fn entry_slot(&self, section_id: &str, content_id: &str) -> EditLogResult<&EntrySlot> {
        let missing = || EditError::NotFound {
            section_id: section_id.to_string(),
            content_id: Some(content_id.to_string()),
        };
        let section = self.section_slot(section_id).map_err(|_| missing())?;
        section
            .entry_index
            .get(content_id)
            .map(|&pos| &section.entries[pos])
            .ok_or_else(missing)
    }

    fn append(
        &self,
        target: &EditTarget,
        cell: &HistoryCell,
        authored_text: &str,
        editor_user: &str,
        text: &str,
        client_timestamp: Option<Timestamp>,
    ) -> EditLogResult<EditResult> {
        let record = match self.prepare_record(target, editor_user, text, client_timestamp) {
            Ok(record) => record,
            Err(err) => {
                warn!(
                    "event=edit_reject module=edit_log status=error document_id={} target={} error={}",
                    self.document_id, target, err
                );
                return Err(err);
            }
        };

        // durable first; nothing in memory changes if the store refuses
        if let Err(err) = self.store.append_edit(self.document_id, target, &record) {
            warn!(
                "event=store_append module=edit_log status=error document_id={} target={} error={}",
                self.document_id, target, err
            );
            return Err(err.into());
        }

        let history = {
            let _gate = self
                .snapshot_gate
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            let mut records = cell.lock();
            records.push(record.clone());
            records.clone()
        };

        let winner = winning_edit(&history);
        let current_text = winner.map_or(authored_text, |winner| winner.change.as_str());
        let won = winner == Some(&record);
        let result = EditResult {
            current_text: current_text.to_string(),
            history: sorted_history(&history),
            record,
            won,
        };

        info!(
            "event=edit_apply module=edit_log status=ok document_id={} target={} timestamp={} source={} text_chars={} history_len={} won={}",
            self.document_id,
            target,
            result.record.timestamp,
            result.record.timestamp_source.as_str(),
            text.chars().count(),
            result.history.len(),
            result.won
        );
        Ok(result)
    }

    fn prepare_record(
        &self,
        target: &EditTarget,
        editor_user: &str,
        text: &str,
        client_timestamp: Option<Timestamp>,
    ) -> EditLogResult<EditRecord> {
        if editor_user.trim().is_empty() {
            return Err(EditError::InvalidInput(
                "editor user must not be blank".to_string(),
            ));
        }
        if text.trim().is_empty() {
            return Err(EditError::InvalidInput("text must not be blank".to_string()));
        }
        let text_chars = text.chars().count();
        if text_chars > self.config.max_text_chars {
            return Err(EditError::InvalidInput(format!(
                "text has {text_chars} chars; limit is {}",
                self.config.max_text_chars
            )));
        }

        let (timestamp, timestamp_source) = match client_timestamp {
            Some(timestamp) => (timestamp, TimestampSource::Client),
            None if self.config.require_client_timestamp => {
                return Err(EditError::InvalidInput(
                    "client timestamp is required".to_string(),
                ));
            }
            None => {
                let now = self.clock.now_ms();
                warn!(
                    "event=timestamp_fallback module=edit_log status=ok document_id={} target={} server_timestamp={}",
                    self.document_id, target, now
                );
                (now, TimestampSource::Server)
            }
        };

        Ok(EditRecord {
            user: editor_user.to_string(),
            timestamp,
            change: text.to_string(),
            timestamp_source,
        })
    }
}
