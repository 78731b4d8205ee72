//! Authoring step that turns raw meeting transcripts into minutes documents.
//!
//! # Responsibility
//! - Parse diarized transcripts produced by the transcription service.
//! - Apply speaker naming and attendee lists before the edit log takes over.
//!
//! # Invariants
//! - Output documents always pass `Document::validate()`.
//! - Authoring never produces edit records; histories start empty.

pub mod transcript;
