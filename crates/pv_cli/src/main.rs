//! `pv` command-line front end for collaborative meeting minutes.
//!
//! # Responsibility
//! - Parse arguments and load the editor config.
//! - Delegate every operation to `pv_core`; print results as JSON.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use pv_core::{DocumentId, EditorConfig, Timestamp};
use std::path::{Path, PathBuf};

mod commands;

#[derive(Parser)]
#[command(name = "pv")]
#[command(about = "Collaborative meeting minutes with per-field edit history")]
#[command(after_help = "\
QUICK START:
  pv import --db pv.sqlite --transcript meeting.json --title \"CSE\" --speaker A=Alice
  pv edit --db pv.sqlite --doc <id> --section discussions --entry u0001 --user bob --text \"...\"
  pv show --db pv.sqlite --doc <id>")]
struct Cli {
    /// Editor config (TOML)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Directory for rotating log files; logging is off when omitted
    #[arg(long, global = true, value_name = "DIR")]
    log_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Draft minutes from a diarized transcript and store them
    Import {
        #[arg(long, value_name = "FILE")]
        db: PathBuf,
        /// Transcript JSON (`{ "utterances": [...] }`)
        #[arg(long, value_name = "FILE")]
        transcript: PathBuf,
        #[arg(long)]
        title: String,
        /// Speaker mapping, e.g. `A=Alice Martin` (repeatable)
        #[arg(long = "speaker", value_name = "LABEL=NAME")]
        speakers: Vec<String>,
        /// Extra attendee not heard in the transcript (repeatable)
        #[arg(long = "participant", value_name = "NAME")]
        participants: Vec<String>,
    },
    /// Replace the text of one content entry
    Edit {
        #[arg(long, value_name = "FILE")]
        db: PathBuf,
        #[arg(long)]
        doc: DocumentId,
        #[arg(long)]
        section: String,
        #[arg(long)]
        entry: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        text: String,
        /// Client timestamp in epoch milliseconds; server time when omitted
        #[arg(long, value_name = "MS")]
        at: Option<Timestamp>,
    },
    /// Replace the title of one section
    Title {
        #[arg(long, value_name = "FILE")]
        db: PathBuf,
        #[arg(long)]
        doc: DocumentId,
        #[arg(long)]
        section: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        text: String,
        #[arg(long, value_name = "MS")]
        at: Option<Timestamp>,
    },
    /// Print the resolved document
    Show {
        #[arg(long, value_name = "FILE")]
        db: PathBuf,
        #[arg(long)]
        doc: DocumentId,
    },
    /// Print the sorted edit history of one entry, or of a section title
    History {
        #[arg(long, value_name = "FILE")]
        db: PathBuf,
        #[arg(long)]
        doc: DocumentId,
        #[arg(long)]
        section: String,
        /// Content entry id; the section title history when omitted
        #[arg(long)]
        entry: Option<String>,
    },
    /// List stored documents
    List {
        #[arg(long, value_name = "FILE")]
        db: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    if let Some(log_dir) = &cli.log_dir {
        pv_core::init_logging(&config, log_dir)
            .map_err(|err| anyhow!("failed to start logging: {err}"))?;
    }

    match cli.command {
        Commands::Import {
            db,
            transcript,
            title,
            speakers,
            participants,
        } => commands::cmd_import(&db, &transcript, &title, &speakers, &participants, config),
        Commands::Edit {
            db,
            doc,
            section,
            entry,
            user,
            text,
            at,
        } => commands::cmd_edit(&db, doc, &section, &entry, &user, &text, at, config),
        Commands::Title {
            db,
            doc,
            section,
            user,
            text,
            at,
        } => commands::cmd_title(&db, doc, &section, &user, &text, at, config),
        Commands::Show { db, doc } => commands::cmd_show(&db, doc, config),
        Commands::History {
            db,
            doc,
            section,
            entry,
        } => commands::cmd_history(&db, doc, &section, entry.as_deref(), config),
        Commands::List { db } => commands::cmd_list(&db),
    }
}

fn load_config(path: Option<&Path>) -> Result<EditorConfig> {
    match path {
        Some(path) => Ok(EditorConfig::load(path)?),
        None => Ok(EditorConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, Commands};
    use clap::{CommandFactory, Parser};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn edit_accepts_optional_timestamp() {
        let cli = Cli::try_parse_from([
            "pv",
            "edit",
            "--db",
            "pv.sqlite",
            "--doc",
            "11111111-2222-4333-8444-555555555555",
            "--section",
            "discussions",
            "--entry",
            "u0001",
            "--user",
            "bob",
            "--text",
            "Hi",
        ])
        .unwrap();
        match cli.command {
            Commands::Edit { at, entry, .. } => {
                assert_eq!(at, None);
                assert_eq!(entry, "u0001");
            }
            _ => panic!("expected edit"),
        }
    }

    #[test]
    fn malformed_document_id_is_rejected() {
        let parsed = Cli::try_parse_from(["pv", "show", "--db", "pv.sqlite", "--doc", "nope"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from([
            "pv",
            "list",
            "--db",
            "pv.sqlite",
            "--config",
            "pv.toml",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("pv.toml")));
    }
}
