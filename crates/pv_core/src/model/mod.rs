//! Minutes domain model and edit resolution.
//!
//! # Responsibility
//! - Define the canonical document shape shared by edit log, storage and CLI.
//! - Keep last-writer-wins resolution a pure function over edit history.
//!
//! # Invariants
//! - Section ids are unique per document; entry ids are unique per section.
//! - Edit history is append-only; nothing here mutates or removes records.

pub mod minutes;
pub mod resolution;
