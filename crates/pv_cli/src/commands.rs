//! Subcommand handlers. Each opens the database, runs one core operation and
//! prints its outcome.

use anyhow::{Context, Result};
use log::info;
use pv_core::db::open_db;
use pv_core::{
    build_minutes, DocumentId, EditLog, EditorConfig, MinutesStore, SpeakerMapping,
    SqliteMinutesStore, Timestamp, Transcript,
};
use serde::Serialize;
use std::path::Path;

pub fn cmd_import(
    db: &Path,
    transcript: &Path,
    title: &str,
    speakers: &[String],
    participants: &[String],
    config: EditorConfig,
) -> Result<()> {
    let transcript = Transcript::from_path(transcript)?;
    let mapping = speakers
        .iter()
        .map(|raw| SpeakerMapping::parse_assignment(raw))
        .collect::<Result<SpeakerMapping, _>>()?;

    let document = build_minutes(title, &transcript, &mapping, participants);
    let log = EditLog::create(open_store(db)?, document, config)?;
    info!(
        "event=cli_import module=cli status=ok document_id={}",
        log.document_id()
    );
    println!("{}", log.document_id());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_edit(
    db: &Path,
    doc: DocumentId,
    section: &str,
    entry: &str,
    user: &str,
    text: &str,
    at: Option<Timestamp>,
    config: EditorConfig,
) -> Result<()> {
    let log = open_log(db, doc, config)?;
    print_json(&log.apply_edit(section, entry, user, text, at)?)
}

pub fn cmd_title(
    db: &Path,
    doc: DocumentId,
    section: &str,
    user: &str,
    text: &str,
    at: Option<Timestamp>,
    config: EditorConfig,
) -> Result<()> {
    let log = open_log(db, doc, config)?;
    print_json(&log.apply_title_edit(section, user, text, at)?)
}

pub fn cmd_show(db: &Path, doc: DocumentId, config: EditorConfig) -> Result<()> {
    print_json(&open_log(db, doc, config)?.materialize())
}

pub fn cmd_history(
    db: &Path,
    doc: DocumentId,
    section: &str,
    entry: Option<&str>,
    config: EditorConfig,
) -> Result<()> {
    let log = open_log(db, doc, config)?;
    let history = match entry {
        Some(entry) => log.history_of(section, entry)?,
        None => log.title_history_of(section)?,
    };
    print_json(&history)
}

pub fn cmd_list(db: &Path) -> Result<()> {
    print_json(&open_store(db)?.list_documents()?)
}

fn open_store(db: &Path) -> Result<SqliteMinutesStore> {
    let conn =
        open_db(db).with_context(|| format!("failed to open database `{}`", db.display()))?;
    Ok(SqliteMinutesStore::try_new(conn)?)
}

fn open_log(
    db: &Path,
    doc: DocumentId,
    config: EditorConfig,
) -> Result<EditLog<SqliteMinutesStore>> {
    Ok(EditLog::open(open_store(db)?, doc, config)?)
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
