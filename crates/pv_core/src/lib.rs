//! Core domain logic for collaborative meeting minutes ("PV").
//! This crate is the single source of truth for edit ordering and history.

pub mod authoring;
pub mod clock;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use authoring::transcript::{build_minutes, ImportError, SpeakerMapping, Transcript, Utterance};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, EditorConfig};
pub use logging::{default_log_level, init_logging, LoggingError};
pub use model::minutes::{
    ContentEntry, Document, DocumentId, EditRecord, EditTarget, EntryState,
    MinutesValidationError, Section, Timestamp, TimestampSource,
};
pub use repo::memory_repo::InMemoryMinutesStore;
pub use repo::minutes_repo::{
    DocumentSummary, MinutesStore, RepoError, RepoResult, SqliteMinutesStore,
};
pub use service::edit_log::{EditError, EditLog, EditLogResult, EditResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
