//! Minutes storage contract and SQLite implementation.
//!
//! # Responsibility
//! - Define the read/write-through store the edit log talks to.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - `save_document` validates before writing and writes in one transaction.
//! - `append_edit` inserts exactly one row or nothing.
//! - Loaded histories are in physical append order (`seq ASC`).

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::DbError;
use crate::model::minutes::{
    ContentEntry, Document, DocumentId, EditRecord, EditTarget, MinutesValidationError, Section,
    TimestampSource,
};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde::Serialize;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Storage error for minutes persistence and lookups.
#[derive(Debug)]
pub enum RepoError {
    Validation(MinutesValidationError),
    Db(DbError),
    DocumentNotFound(DocumentId),
    DuplicateDocument(DocumentId),
    TargetNotFound {
        document_id: DocumentId,
        target: EditTarget,
    },
    InvalidData(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::DocumentNotFound(id) => write!(f, "minutes document not found: {id}"),
            Self::DuplicateDocument(id) => write!(f, "minutes document already exists: {id}"),
            Self::TargetNotFound {
                document_id,
                target,
            } => write!(f, "edit target `{target}` not found in document {document_id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted minutes data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}; open it with db::open_db"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MinutesValidationError> for RepoError {
    fn from(value: MinutesValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Listing row for stored documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentSummary {
    pub id: DocumentId,
    pub title: String,
    pub section_count: usize,
}

/// Read/write-through store behind one or more edit logs.
///
/// Implementations must be safe to share between threads; the edit log
/// calls them without holding any of its own locks.
pub trait MinutesStore: Send + Sync {
    /// Persists a freshly authored document, including any history it carries.
    fn save_document(&self, document: &Document) -> RepoResult<()>;
    /// Loads one document with full history in append order.
    fn load_document(&self, id: DocumentId) -> RepoResult<Option<Document>>;
    /// Durably appends one record to the history of `target`.
    fn append_edit(
        &self,
        document_id: DocumentId,
        target: &EditTarget,
        record: &EditRecord,
    ) -> RepoResult<()>;
    /// Lists stored documents ordered by title, then id.
    fn list_documents(&self) -> RepoResult<Vec<DocumentSummary>>;
}

impl<S: MinutesStore + ?Sized> MinutesStore for Arc<S> {
    fn save_document(&self, document: &Document) -> RepoResult<()> {
        (**self).save_document(document)
    }

    fn load_document(&self, id: DocumentId) -> RepoResult<Option<Document>> {
        (**self).load_document(id)
    }

    fn append_edit(
        &self,
        document_id: DocumentId,
        target: &EditTarget,
        record: &EditRecord,
    ) -> RepoResult<()> {
        (**self).append_edit(document_id, target, record)
    }

    fn list_documents(&self) -> RepoResult<Vec<DocumentSummary>> {
        (**self).list_documents()
    }
}

/// SQLite-backed minutes store.
///
/// Owns its connection behind a mutex; SQLite serializes writers anyway and
/// each call holds the lock for one statement or one short transaction.
pub struct SqliteMinutesStore {
    conn: Mutex<Connection>,
}

impl SqliteMinutesStore {
    /// Wraps a connection opened through `db::open_db*`.
    ///
    /// # Errors
    /// - `UninitializedConnection` when migrations were not applied.
    pub fn try_new(conn: Connection) -> RepoResult<Self> {
        let expected_version = latest_version();
        let actual_version = current_user_version(&conn)?;
        if actual_version != expected_version {
            return Err(RepoError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // a panicked holder leaves no open transaction behind: rusqlite rolls
        // back on drop
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MinutesStore for SqliteMinutesStore {
    fn save_document(&self, document: &Document) -> RepoResult<()> {
        document.validate()?;

        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let id_text = document.id.to_string();
        if document_exists(&tx, &id_text)? {
            return Err(RepoError::DuplicateDocument(document.id));
        }

        let participants = serde_json::to_string(&document.participants)
            .map_err(|err| RepoError::InvalidData(format!("participants: {err}")))?;
        tx.execute(
            "INSERT INTO documents (uuid, title, participants) VALUES (?1, ?2, ?3);",
            params![id_text, document.title, participants],
        )?;

        for (section_pos, section) in document.sections.iter().enumerate() {
            tx.execute(
                "INSERT INTO sections (document_uuid, section_id, position, title)
                 VALUES (?1, ?2, ?3, ?4);",
                params![id_text, section.id, section_pos as i64, section.title],
            )?;
            for record in &section.title_edits {
                insert_edit_record(&tx, &id_text, &section.id, None, record)?;
            }

            for (entry_pos, entry) in section.content.iter().enumerate() {
                tx.execute(
                    "INSERT INTO content_entries (
                        document_uuid,
                        section_id,
                        content_id,
                        position,
                        speaker,
                        text,
                        created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
                    params![
                        id_text,
                        section.id,
                        entry.id,
                        entry_pos as i64,
                        entry.speaker,
                        entry.text,
                        entry.created_at,
                    ],
                )?;
                for record in &entry.edits {
                    insert_edit_record(&tx, &id_text, &section.id, Some(&entry.id), record)?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn load_document(&self, id: DocumentId) -> RepoResult<Option<Document>> {
        let conn = self.conn();
        let id_text = id.to_string();

        let header = conn
            .query_row(
                "SELECT title, participants FROM documents WHERE uuid = ?1;",
                [id_text.as_str()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        let Some((title, participants_json)) = header else {
            return Ok(None);
        };
        let participants: Vec<String> = serde_json::from_str(&participants_json).map_err(|err| {
            RepoError::InvalidData(format!("invalid documents.participants: {err}"))
        })?;

        let mut document = Document::with_id(id, title);
        document.participants = participants;
        document.sections = load_sections(&conn, &id_text)?;

        let mut histories = load_histories(&conn, &id_text)?;
        for section in &mut document.sections {
            if let Some(records) = histories.remove(&(section.id.clone(), None)) {
                section.title_edits = records;
            }
            for entry in &mut section.content {
                if let Some(records) =
                    histories.remove(&(section.id.clone(), Some(entry.id.clone())))
                {
                    entry.edits = records;
                }
            }
        }
        if let Some(((section_id, content_id), _)) = histories.into_iter().next() {
            return Err(RepoError::InvalidData(format!(
                "orphan edit records for section `{section_id}` content `{}`",
                content_id.as_deref().unwrap_or("<title>")
            )));
        }

        document.validate()?;
        Ok(Some(document))
    }

    fn append_edit(
        &self,
        document_id: DocumentId,
        target: &EditTarget,
        record: &EditRecord,
    ) -> RepoResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let id_text = document_id.to_string();
        if !target_exists(&tx, &id_text, target)? {
            return Err(RepoError::TargetNotFound {
                document_id,
                target: target.clone(),
            });
        }
        insert_edit_record(
            &tx,
            &id_text,
            target.section_id(),
            target.content_id(),
            record,
        )?;
        tx.commit()?;
        Ok(())
    }

    fn list_documents(&self) -> RepoResult<Vec<DocumentSummary>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT
                d.uuid,
                d.title,
                (SELECT COUNT(*) FROM sections s WHERE s.document_uuid = d.uuid) AS section_count
             FROM documents d
             ORDER BY d.title ASC, d.uuid ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut summaries = Vec::new();
        while let Some(row) = rows.next()? {
            let uuid_text: String = row.get("uuid")?;
            let section_count: i64 = row.get("section_count")?;
            summaries.push(DocumentSummary {
                id: parse_uuid(&uuid_text)?,
                title: row.get("title")?,
                section_count: usize::try_from(section_count).map_err(|_| {
                    RepoError::InvalidData(format!("negative section count for {uuid_text}"))
                })?,
            });
        }
        Ok(summaries)
    }
}

type HistoryKey = (String, Option<String>);

fn load_sections(conn: &Connection, document_uuid: &str) -> RepoResult<Vec<Section>> {
    let mut stmt = conn.prepare(
        "SELECT section_id, title
         FROM sections
         WHERE document_uuid = ?1
         ORDER BY position ASC;",
    )?;
    let mut rows = stmt.query([document_uuid])?;
    let mut sections = Vec::new();
    while let Some(row) = rows.next()? {
        sections.push(Section::new(
            row.get::<_, String>("section_id")?,
            row.get::<_, String>("title")?,
        ));
    }

    let mut stmt = conn.prepare(
        "SELECT section_id, content_id, speaker, text, created_at
         FROM content_entries
         WHERE document_uuid = ?1
         ORDER BY position ASC;",
    )?;
    let mut rows = stmt.query([document_uuid])?;
    while let Some(row) = rows.next()? {
        let section_id: String = row.get("section_id")?;
        let section = sections
            .iter_mut()
            .find(|section| section.id == section_id)
            .ok_or_else(|| {
                RepoError::InvalidData(format!("content entry in unknown section `{section_id}`"))
            })?;
        section.content.push(ContentEntry::new(
            row.get::<_, String>("content_id")?,
            row.get::<_, String>("speaker")?,
            row.get::<_, String>("text")?,
            row.get("created_at")?,
        ));
    }

    Ok(sections)
}

fn load_histories(
    conn: &Connection,
    document_uuid: &str,
) -> RepoResult<HashMap<HistoryKey, Vec<EditRecord>>> {
    let mut stmt = conn.prepare(
        "SELECT section_id, content_id, editor_user, edited_at, change_text, timestamp_source
         FROM edit_records
         WHERE document_uuid = ?1
         ORDER BY seq ASC;",
    )?;
    let mut rows = stmt.query([document_uuid])?;
    let mut histories: HashMap<HistoryKey, Vec<EditRecord>> = HashMap::new();
    while let Some(row) = rows.next()? {
        let key = (row.get("section_id")?, row.get("content_id")?);
        histories.entry(key).or_default().push(parse_edit_row(row)?);
    }
    Ok(histories)
}

fn parse_edit_row(row: &Row<'_>) -> RepoResult<EditRecord> {
    let source_text: String = row.get("timestamp_source")?;
    let timestamp_source = TimestampSource::parse(&source_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid timestamp source `{source_text}` in edit_records.timestamp_source"
        ))
    })?;
    Ok(EditRecord {
        user: row.get("editor_user")?,
        timestamp: row.get("edited_at")?,
        change: row.get("change_text")?,
        timestamp_source,
    })
}

fn insert_edit_record(
    tx: &Transaction<'_>,
    document_uuid: &str,
    section_id: &str,
    content_id: Option<&str>,
    record: &EditRecord,
) -> RepoResult<()> {
    tx.execute(
        "INSERT INTO edit_records (
            document_uuid,
            section_id,
            content_id,
            editor_user,
            edited_at,
            change_text,
            timestamp_source
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
        params![
            document_uuid,
            section_id,
            content_id,
            record.user,
            record.timestamp,
            record.change,
            record.timestamp_source.as_str(),
        ],
    )?;
    Ok(())
}

fn document_exists(tx: &Transaction<'_>, document_uuid: &str) -> RepoResult<bool> {
    let exists: i64 = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM documents WHERE uuid = ?1);",
        [document_uuid],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn target_exists(
    tx: &Transaction<'_>,
    document_uuid: &str,
    target: &EditTarget,
) -> RepoResult<bool> {
    let exists: i64 = match target {
        EditTarget::Content {
            section_id,
            content_id,
        } => tx.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM content_entries
                WHERE document_uuid = ?1 AND section_id = ?2 AND content_id = ?3
            );",
            params![document_uuid, section_id, content_id],
            |row| row.get(0),
        )?,
        EditTarget::SectionTitle { section_id } => tx.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sections
                WHERE document_uuid = ?1 AND section_id = ?2
            );",
            params![document_uuid, section_id],
            |row| row.get(0),
        )?,
    };
    Ok(exists == 1)
}

fn parse_uuid(value: &str) -> RepoResult<DocumentId> {
    Uuid::parse_str(value).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{value}` in documents.uuid"))
    })
}
