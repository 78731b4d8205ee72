//! Storage collaborators for the edit log.
//!
//! # Responsibility
//! - Define the minutes store contract the edit log writes through.
//! - Provide SQLite and in-process implementations.
//!
//! # Invariants
//! - Stores never rewrite or drop edit records once appended.
//! - Store APIs report semantic misses (`DocumentNotFound`, `TargetNotFound`)
//!   separately from DB transport errors.

pub mod memory_repo;
pub mod minutes_repo;
