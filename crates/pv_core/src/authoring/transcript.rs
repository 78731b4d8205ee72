//! Transcript import and minutes drafting.
//!
//! # Responsibility
//! - Decode the `{ "utterances": [...] }` transcript JSON.
//! - Map diarization labels to attendee names.
//! - Draft a document with one `discussions` section in utterance order.
//!
//! # Invariants
//! - Unmapped or blank-mapped speakers keep their diarization label.
//! - `participants` is sorted and de-duplicated; blank names are dropped.
//! - Entry ids are `u0001`, `u0002`, ... in transcript order.

use crate::model::minutes::{ContentEntry, Document, Section, Timestamp};
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const DISCUSSIONS_SECTION_ID: &str = "discussions";
pub const DISCUSSIONS_SECTION_TITLE: &str = "Discussions";

static ASSIGNMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([^=]+?)\s*=\s*(.*?)\s*$").expect("valid assignment regex"));

/// One diarized utterance. Times are milliseconds from meeting start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub speaker: String,
    pub text: String,
    pub start: Timestamp,
    pub end: Timestamp,
}

/// Diarized transcript of one meeting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    #[serde(default)]
    pub utterances: Vec<Utterance>,
}

impl Transcript {
    pub fn from_json_str(raw: &str) -> Result<Self, ImportError> {
        let transcript: Self = serde_json::from_str(raw).map_err(ImportError::Parse)?;
        transcript.validate()?;
        Ok(transcript)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ImportError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ImportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Distinct diarization labels in first-appearance order.
    pub fn speakers(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.utterances
            .iter()
            .filter(|utterance| seen.insert(utterance.speaker.as_str()))
            .map(|utterance| utterance.speaker.clone())
            .collect()
    }

    fn validate(&self) -> Result<(), ImportError> {
        for (index, utterance) in self.utterances.iter().enumerate() {
            if utterance.speaker.trim().is_empty() {
                return Err(ImportError::InvalidUtterance {
                    index,
                    reason: "speaker label is blank".to_string(),
                });
            }
            if utterance.end < utterance.start {
                return Err(ImportError::InvalidUtterance {
                    index,
                    reason: format!("end {} is before start {}", utterance.end, utterance.start),
                });
            }
        }
        Ok(())
    }
}

/// Diarization label to real name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpeakerMapping {
    names: BTreeMap<String, String>,
}

impl SpeakerMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one mapping. A blank name clears the label's mapping.
    pub fn assign(&mut self, label: impl Into<String>, name: impl AsRef<str>) {
        let label = label.into();
        let name = name.as_ref().trim();
        if name.is_empty() {
            self.names.remove(&label);
        } else {
            self.names.insert(label, name.to_string());
        }
    }

    /// Parses a `LABEL=Name` assignment as typed on the command line.
    pub fn parse_assignment(raw: &str) -> Result<(String, String), ImportError> {
        ASSIGNMENT_RE
            .captures(raw)
            .map(|caps| (caps[1].to_string(), caps[2].to_string()))
            .ok_or_else(|| ImportError::InvalidMapping(raw.to_string()))
    }

    /// Name shown for `label`.
    pub fn resolve<'a>(&'a self, label: &'a str) -> &'a str {
        self.names.get(label).map_or(label, String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.values().map(String::as_str)
    }
}

impl<L: Into<String>, N: AsRef<str>> FromIterator<(L, N)> for SpeakerMapping {
    fn from_iter<T: IntoIterator<Item = (L, N)>>(iter: T) -> Self {
        let mut mapping = Self::new();
        for (label, name) in iter {
            mapping.assign(label, name);
        }
        mapping
    }
}

/// Drafts a minutes document from a transcript.
///
/// Attendees are the mapped speaker names plus `additional_participants`.
pub fn build_minutes(
    title: impl Into<String>,
    transcript: &Transcript,
    mapping: &SpeakerMapping,
    additional_participants: &[String],
) -> Document {
    let participants: BTreeSet<String> = mapping
        .names()
        .chain(additional_participants.iter().map(String::as_str))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();

    let discussions = transcript.utterances.iter().enumerate().fold(
        Section::new(DISCUSSIONS_SECTION_ID, DISCUSSIONS_SECTION_TITLE),
        |section, (index, utterance)| {
            section.with_entry(ContentEntry::new(
                format!("u{:04}", index + 1),
                mapping.resolve(&utterance.speaker),
                utterance.text.clone(),
                utterance.start,
            ))
        },
    );

    let mut document = Document::new(title).with_section(discussions);
    document.participants = participants.into_iter().collect();

    info!(
        "event=document_import module=authoring status=ok document_id={} utterances={} participants={}",
        document.id,
        transcript.utterances.len(),
        document.participants.len()
    );
    document
}

#[derive(Debug)]
pub enum ImportError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    InvalidUtterance {
        index: usize,
        reason: String,
    },
    InvalidMapping(String),
}

impl Display for ImportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read transcript `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid transcript json: {err}"),
            Self::InvalidUtterance { index, reason } => {
                write!(f, "invalid utterance #{index}: {reason}")
            }
            Self::InvalidMapping(raw) => {
                write!(f, "invalid speaker mapping `{raw}`; expected LABEL=Name")
            }
        }
    }
}

impl Error for ImportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            _ => None,
        }
    }
}
