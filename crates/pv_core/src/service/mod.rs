//! Core use-case services.
//!
//! # Responsibility
//! - Mediate every mutation of a minutes document.
//! - Keep transport and CLI layers decoupled from storage details.

pub mod edit_log;
