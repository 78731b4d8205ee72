use pv_core::{
    ContentEntry, Document, EditError, EditLog, EditRecord, EditTarget, EditorConfig, EntryState,
    InMemoryMinutesStore, MinutesStore, RepoError, RepoResult, Section, TimestampSource,
};
use pv_core::{DocumentId, DocumentSummary};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[test]
fn scenario_equal_timestamp_goes_to_lexically_smaller_user() {
    let log = alice_log();

    let first = log.apply_edit("s1", "c1", "bob", "Hi there", Some(100)).unwrap();
    assert_eq!(first.current_text, "Hi there");
    assert_eq!(log.history_of("s1", "c1").unwrap().len(), 1);

    let second = log.apply_edit("s1", "c1", "ana", "Hi all", Some(100)).unwrap();
    assert_eq!(second.current_text, "Hi all");
    assert!(second.won);

    let users: Vec<_> = log
        .history_of("s1", "c1")
        .unwrap()
        .into_iter()
        .map(|record| (record.user, record.timestamp))
        .collect();
    assert_eq!(
        users,
        vec![("ana".to_string(), 100), ("bob".to_string(), 100)]
    );
}

#[test]
fn tie_break_is_independent_of_call_order() {
    for order in [["bob", "ana"], ["ana", "bob"]] {
        let log = alice_log();
        for user in order {
            let text = if user == "ana" { "A" } else { "B" };
            log.apply_edit("s1", "c1", user, text, Some(5)).unwrap();
        }
        assert_eq!(current_text(&log), "A");
    }
}

#[test]
fn same_user_and_timestamp_resolves_by_text_not_arrival() {
    let log = alice_log();
    log.apply_edit("s1", "c1", "ana", "y", Some(5)).unwrap();
    let later = log.apply_edit("s1", "c1", "ana", "x", Some(5)).unwrap();
    assert_eq!(later.current_text, "y");
    assert!(!later.won);

    let reversed = alice_log();
    reversed.apply_edit("s1", "c1", "ana", "x", Some(5)).unwrap();
    let later = reversed.apply_edit("s1", "c1", "ana", "y", Some(5)).unwrap();
    assert_eq!(later.current_text, "y");
    assert!(later.won);

    let changes: Vec<_> = log
        .history_of("s1", "c1")
        .unwrap()
        .into_iter()
        .map(|record| record.change)
        .collect();
    assert_eq!(changes, vec!["y", "x"]);
}

#[test]
fn any_interleaving_converges_on_same_snapshot() {
    let edits = [
        ("bob", "draft one", 10),
        ("ana", "draft two", 30),
        ("carl", "draft three", 30),
        ("dana", "draft four", 20),
        ("ana", "draft five", 5),
    ];
    let permutations = [
        [0, 1, 2, 3, 4],
        [4, 3, 2, 1, 0],
        [2, 0, 4, 1, 3],
        [1, 4, 0, 3, 2],
    ];

    let snapshots: Vec<Document> = permutations
        .iter()
        .map(|order| {
            let log = alice_log();
            for &index in order {
                let (user, text, ts) = edits[index];
                log.apply_edit("s1", "c1", user, text, Some(ts)).unwrap();
            }
            log.materialize()
        })
        .collect();

    assert_eq!(snapshots[0].sections[0].content[0].text, "draft two");
    for snapshot in &snapshots[1..] {
        assert_eq!(snapshot.sections, snapshots[0].sections);
    }
}

#[test]
fn materialize_is_idempotent() {
    let log = alice_log();
    log.apply_edit("s1", "c1", "bob", "Hi", Some(1)).unwrap();

    assert_eq!(log.materialize(), log.materialize());
}

#[test]
fn history_has_one_record_per_successful_edit_in_sorted_order() {
    let log = alice_log();
    let stamps = [50, 10, 40, 10, 30];
    for (index, ts) in stamps.iter().enumerate() {
        log.apply_edit("s1", "c1", &format!("user{index}"), "text", Some(*ts))
            .unwrap();
    }
    log.apply_edit("s1", "c1", "", "rejected", Some(99))
        .unwrap_err();

    let history = log.history_of("s1", "c1").unwrap();
    assert_eq!(history.len(), stamps.len());
    assert!(history.windows(2).all(|pair| {
        (pair[0].timestamp, &pair[0].user) <= (pair[1].timestamp, &pair[1].user)
    }));
}

#[test]
fn blank_user_or_text_is_rejected_without_side_effects() {
    let log = alice_log();
    log.apply_edit("s1", "c1", "bob", "kept", Some(1)).unwrap();

    let blank_user = log.apply_edit("s1", "c1", "", "x", Some(2)).unwrap_err();
    assert!(matches!(blank_user, EditError::InvalidInput(_)));
    let blank_text = log.apply_edit("s1", "c1", "bob", "   \n", Some(2)).unwrap_err();
    assert!(matches!(blank_text, EditError::InvalidInput(_)));

    assert_eq!(log.history_of("s1", "c1").unwrap().len(), 1);
    assert_eq!(current_text(&log), "kept");
}

#[test]
fn unknown_section_or_entry_is_not_found() {
    let log = alice_log();

    let err = log
        .apply_edit("no-such-section", "c1", "user", "text", Some(1))
        .unwrap_err();
    assert!(matches!(
        err,
        EditError::NotFound { ref section_id, .. } if section_id == "no-such-section"
    ));
    assert!(matches!(
        log.apply_edit("s1", "missing", "user", "text", Some(1)),
        Err(EditError::NotFound { .. })
    ));
    assert!(matches!(
        log.history_of("s1", "missing"),
        Err(EditError::NotFound { .. })
    ));
    assert!(matches!(
        log.apply_title_edit("nope", "user", "text", Some(1)),
        Err(EditError::NotFound {
            content_id: None,
            ..
        })
    ));
}

#[test]
fn pristine_entry_materializes_authored_text() {
    let log = alice_log();

    assert_eq!(log.entry_state("s1", "c1").unwrap(), EntryState::Pristine);
    assert_eq!(current_text(&log), "Hello");

    log.apply_edit("s1", "c1", "bob", "Hi", Some(1)).unwrap();
    assert_eq!(log.entry_state("s1", "c1").unwrap(), EntryState::Edited);
}

#[test]
fn section_title_uses_same_resolution_rule() {
    let log = alice_log();
    log.apply_title_edit("s1", "zoe", "Ordre du jour", Some(7))
        .unwrap();
    log.apply_title_edit("s1", "ana", "Agenda", Some(7)).unwrap();

    let snapshot = log.materialize();
    assert_eq!(snapshot.sections[0].title, "Agenda");
    assert_eq!(snapshot.sections[0].title_edits.len(), 2);
    assert_eq!(log.title_history_of("s1").unwrap()[0].user, "ana");
    assert_eq!(snapshot.sections[0].content[0].text, "Hello");
}

#[test]
fn concurrent_editors_on_many_entries_all_land() {
    let mut section = Section::new("s1", "Discussions");
    for index in 0..8 {
        section = section.with_entry(ContentEntry::new(
            format!("c{index}"),
            "Alice",
            "draft",
            0,
        ));
    }
    let log = Arc::new(
        EditLog::new(
            Document::new("CSE").with_section(section),
            EditorConfig::default(),
        )
        .unwrap(),
    );

    std::thread::scope(|scope| {
        for worker in 0..8 {
            let log = Arc::clone(&log);
            scope.spawn(move || {
                for round in 0..25 {
                    let entry = format!("c{}", (worker + round) % 8);
                    log.apply_edit(
                        "s1",
                        &entry,
                        &format!("user{worker}"),
                        &format!("w{worker} r{round}"),
                        Some(round),
                    )
                    .unwrap();
                }
            });
        }
        scope.spawn(|| {
            for _ in 0..20 {
                let snapshot = log.materialize();
                for entry in &snapshot.sections[0].content {
                    assert_eq!(entry.text, resolve_by_hand(&entry.edits, "draft"));
                }
            }
        });
    });

    let snapshot = log.materialize();
    let total: usize = snapshot.sections[0]
        .content
        .iter()
        .map(|entry| entry.edits.len())
        .sum();
    assert_eq!(total, 8 * 25);
    for entry in &snapshot.sections[0].content {
        // every entry receives exactly one round-24 write
        let winner = entry.edits.last().unwrap();
        assert_eq!(winner.timestamp, 24);
        assert_eq!(entry.text, resolve_by_hand(&entry.edits, "draft"));
    }
}

#[test]
fn append_to_other_entry_completes_while_first_is_in_flight() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let store = PausingStore {
        inner: InMemoryMinutesStore::new(),
        paused_entry: "c1",
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
    };
    let document = Document::new("CSE").with_section(
        Section::new("s1", "Discussions")
            .with_entry(ContentEntry::new("c1", "Alice", "one", 0))
            .with_entry(ContentEntry::new("c2", "Bruno", "two", 0)),
    );
    let log = EditLog::create(store, document, EditorConfig::default()).unwrap();

    let (c2_done_tx, c2_done_rx) = mpsc::channel();
    std::thread::scope(|scope| {
        scope.spawn(|| {
            log.apply_edit("s1", "c1", "ana", "un", Some(1)).unwrap();
        });
        entered_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("c1 append reached the store");

        scope.spawn(|| {
            let result = log.apply_edit("s1", "c2", "bob", "deux", Some(1));
            c2_done_tx.send(result.is_ok()).unwrap();
        });
        let c2_outcome = c2_done_rx.recv_timeout(Duration::from_secs(5));
        release_tx.send(()).unwrap();
        assert_eq!(c2_outcome, Ok(true));
    });

    let snapshot = log.materialize();
    assert_eq!(snapshot.sections[0].content[0].text, "un");
    assert_eq!(snapshot.sections[0].content[1].text, "deux");
}

#[test]
fn failing_store_leaves_history_untouched() {
    let store = Arc::new(RefusingStore::default());
    let log = EditLog::create(Arc::clone(&store), alice_document(), EditorConfig::default())
        .unwrap();

    let err = log.apply_edit("s1", "c1", "bob", "Hi", Some(1)).unwrap_err();
    assert!(matches!(err, EditError::Store(_)));
    assert!(log.history_of("s1", "c1").unwrap().is_empty());
    assert_eq!(current_text(&log), "Hello");
}

#[test]
fn edits_write_through_to_store() {
    let store = Arc::new(InMemoryMinutesStore::new());
    let document = alice_document();
    let id = document.id;
    let log = EditLog::create(Arc::clone(&store), document, EditorConfig::default()).unwrap();

    log.apply_edit("s1", "c1", "bob", "Hi", None).unwrap();

    let stored = store.load_document(id).unwrap().unwrap();
    let record = &stored.sections[0].content[0].edits[0];
    assert_eq!(record.change, "Hi");
    assert_eq!(record.timestamp_source, TimestampSource::Server);

    let reopened = EditLog::open(Arc::clone(&store), id, EditorConfig::default()).unwrap();
    assert_eq!(reopened.materialize(), log.materialize());
}

#[test]
fn invalid_document_is_refused() {
    let document = Document::new("CSE")
        .with_section(Section::new("s1", "a"))
        .with_section(Section::new("s1", "b"));

    assert!(matches!(
        EditLog::new(document, EditorConfig::default()),
        Err(EditError::InvalidDocument(_))
    ));
}

fn alice_document() -> Document {
    Document::new("CSE du 12 mars").with_section(
        Section::new("s1", "Discussions")
            .with_entry(ContentEntry::new("c1", "Alice", "Hello", 1_000)),
    )
}

fn alice_log() -> EditLog<InMemoryMinutesStore> {
    EditLog::new(alice_document(), EditorConfig::default()).unwrap()
}

fn current_text<S: MinutesStore>(log: &EditLog<S>) -> String {
    log.materialize().sections[0].content[0].text.clone()
}

fn resolve_by_hand(sorted: &[EditRecord], authored: &str) -> String {
    let Some(latest) = sorted.last() else {
        return authored.to_string();
    };
    sorted
        .iter()
        .filter(|record| record.timestamp == latest.timestamp)
        .min_by(|left, right| {
            left.user
                .cmp(&right.user)
                .then_with(|| right.change.cmp(&left.change))
        })
        .map(|record| record.change.clone())
        .unwrap_or_else(|| authored.to_string())
}

#[derive(Default)]
struct RefusingStore {
    inner: InMemoryMinutesStore,
}

impl MinutesStore for RefusingStore {
    fn save_document(&self, document: &Document) -> RepoResult<()> {
        self.inner.save_document(document)
    }

    fn load_document(&self, id: DocumentId) -> RepoResult<Option<Document>> {
        self.inner.load_document(id)
    }

    fn append_edit(
        &self,
        _document_id: DocumentId,
        _target: &EditTarget,
        _record: &EditRecord,
    ) -> RepoResult<()> {
        Err(RepoError::InvalidData("store is read-only".to_string()))
    }

    fn list_documents(&self) -> RepoResult<Vec<DocumentSummary>> {
        self.inner.list_documents()
    }
}

/// Holds appends to one entry inside the store until released.
struct PausingStore {
    inner: InMemoryMinutesStore,
    paused_entry: &'static str,
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl MinutesStore for PausingStore {
    fn save_document(&self, document: &Document) -> RepoResult<()> {
        self.inner.save_document(document)
    }

    fn load_document(&self, id: DocumentId) -> RepoResult<Option<Document>> {
        self.inner.load_document(id)
    }

    fn append_edit(
        &self,
        document_id: DocumentId,
        target: &EditTarget,
        record: &EditRecord,
    ) -> RepoResult<()> {
        if target.content_id() == Some(self.paused_entry) {
            self.entered.lock().unwrap().send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
        }
        self.inner.append_edit(document_id, target, record)
    }

    fn list_documents(&self) -> RepoResult<Vec<DocumentSummary>> {
        self.inner.list_documents()
    }
}
