//! In-process minutes store.
//!
//! Backs edit logs that have no durable storage and test fixtures that need a
//! store without SQLite.
//!
//! # Invariants
//! - The document map is write-locked only by `save_document`.
//! - Each text field has its own history lock; appends to different fields
//!   never wait on each other.

use crate::model::minutes::{Document, DocumentId, EditRecord, EditTarget};
use crate::repo::minutes_repo::{DocumentSummary, MinutesStore, RepoError, RepoResult};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Minutes store that keeps every document in memory.
#[derive(Debug, Default)]
pub struct InMemoryMinutesStore {
    documents: RwLock<BTreeMap<DocumentId, Arc<StoredDocument>>>,
}

/// Authored skeleton plus one history cell per text field.
#[derive(Debug)]
struct StoredDocument {
    authored: Document,
    histories: HashMap<EditTarget, Mutex<Vec<EditRecord>>>,
}

impl StoredDocument {
    fn new(document: &Document) -> Self {
        let mut authored = document.clone();
        let mut histories = HashMap::new();
        for section in &mut authored.sections {
            histories.insert(
                EditTarget::section_title(section.id.as_str()),
                Mutex::new(std::mem::take(&mut section.title_edits)),
            );
            for entry in &mut section.content {
                histories.insert(
                    EditTarget::content(section.id.as_str(), entry.id.as_str()),
                    Mutex::new(std::mem::take(&mut entry.edits)),
                );
            }
        }
        Self {
            authored,
            histories,
        }
    }

    fn history(&self, target: &EditTarget) -> Option<MutexGuard<'_, Vec<EditRecord>>> {
        self.histories
            .get(target)
            .map(|cell| cell.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn to_document(&self) -> Document {
        let mut document = self.authored.clone();
        for section in &mut document.sections {
            let title = EditTarget::section_title(section.id.as_str());
            if let Some(records) = self.history(&title) {
                section.title_edits = records.clone();
            }
            for entry in &mut section.content {
                let target = EditTarget::content(section.id.as_str(), entry.id.as_str());
                if let Some(records) = self.history(&target) {
                    entry.edits = records.clone();
                }
            }
        }
        document
    }
}

impl InMemoryMinutesStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn stored(&self, id: DocumentId) -> Option<Arc<StoredDocument>> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }
}

impl MinutesStore for InMemoryMinutesStore {
    fn save_document(&self, document: &Document) -> RepoResult<()> {
        document.validate()?;
        let mut documents = self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if documents.contains_key(&document.id) {
            return Err(RepoError::DuplicateDocument(document.id));
        }
        documents.insert(document.id, Arc::new(StoredDocument::new(document)));
        Ok(())
    }

    fn load_document(&self, id: DocumentId) -> RepoResult<Option<Document>> {
        Ok(self.stored(id).map(|stored| stored.to_document()))
    }

    fn append_edit(
        &self,
        document_id: DocumentId,
        target: &EditTarget,
        record: &EditRecord,
    ) -> RepoResult<()> {
        // the map lock is released before the field lock is taken
        let stored = self
            .stored(document_id)
            .ok_or(RepoError::DocumentNotFound(document_id))?;
        let mut history = stored
            .history(target)
            .ok_or_else(|| RepoError::TargetNotFound {
                document_id,
                target: target.clone(),
            })?;
        history.push(record.clone());
        Ok(())
    }

    fn list_documents(&self) -> RepoResult<Vec<DocumentSummary>> {
        let documents = self
            .documents
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut summaries: Vec<_> = documents
            .values()
            .map(|stored| DocumentSummary {
                id: stored.authored.id,
                title: stored.authored.title.clone(),
                section_count: stored.authored.sections.len(),
            })
            .collect();
        summaries.sort_by(|left, right| {
            left.title
                .cmp(&right.title)
                .then_with(|| left.id.cmp(&right.id))
        });
        Ok(summaries)
    }
}
