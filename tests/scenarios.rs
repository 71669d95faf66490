//! End-to-end scenarios driving the public [`TreeEditor`] API the way
//! a real update/switch driver would: `open_root`, then one
//! add/open/delete per entry, closing directories only after every
//! entry inside them has closed, finishing with `close_edit`.

use std::fs;
use std::rc::Rc;
use std::sync::Once;

use pretty_assertions::assert_eq;
use wc_update_editor::access::AdminAccess;
use wc_update_editor::checksum::Checksum;
use wc_update_editor::context::UpdateOptions;
use wc_update_editor::entries::{Entries, EntryKind, EntryRecord, JsonEntriesStore, THIS_DIR};
use wc_update_editor::log::{Log, LogOp, ModifyEntryFields};
use wc_update_editor::merge::Diff3Merge;
use wc_update_editor::notify::{Action, ContentState, NodeKind, Notification, TraversalInfo};
use wc_update_editor::paths;
use wc_update_editor::{EditContext, ErrorCode, TreeEditor, UpdateEditor};

static TRACING_INIT: Once = Once::new();

/// Every scenario runs with logging wired up, the same way a real
/// caller would see the `tracing` spans this engine emits while it
/// works — handy for reading a failing scenario's replay trace.
fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_env_filter("wc_update_editor=debug").try_init();
    });
}

fn seed_root(dir: &std::path::Path, url: &str) {
    let store = JsonEntriesStore;
    let mut table = Entries::default();
    table
        .records
        .insert(THIS_DIR.to_string(), EntryRecord::new_dir(1, Some(url.to_string())));
    store.save(dir, &table).unwrap();
}

#[derive(Default)]
struct NewEditorArgs {
    switch_url: Option<String>,
    target: Option<String>,
}

fn new_editor<'a>(
    dir: &std::path::Path,
    args: NewEditorArgs,
    notifications: &'a mut Vec<Notification>,
) -> UpdateEditor<'a> {
    let ctx = EditContext {
        anchor: dir.to_path_buf(),
        target: args.target,
        target_revision: 0,
        options: UpdateOptions {
            switch_url: args.switch_url,
            ..Default::default()
        },
        cancel: None,
        notify: Box::new(move |n| notifications.push(n)),
        traversal_info: TraversalInfo::default(),
        root_opened: false,
        target_deleted: false,
        access: Some(AdminAccess::open(dir).unwrap()),
        entries: Rc::new(JsonEntriesStore),
        merge_tool: Rc::new(Diff3Merge),
    };
    UpdateEditor::new(ctx)
}

#[test]
fn clean_add_of_file_foo() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    seed_root(dir.path(), "http://example/repo");
    let mut notifications = Vec::new();
    let mut editor = new_editor(dir.path(), NewEditorArgs::default(), &mut notifications);

    editor.set_target_revision(5).unwrap();
    let mut root = editor.open_root(1).unwrap();

    let mut file = editor.add_file("foo", &mut root, None).unwrap();
    let mut handler = editor.apply_textdelta(&mut file, None).unwrap();
    handler.write_window(b"hello world\n").unwrap();
    let checksum = handler.close().unwrap();
    assert_eq!(checksum, Checksum::of_bytes(b"hello world\n"));
    editor.close_file(file, Some(checksum)).unwrap();

    editor.close_directory(root).unwrap();
    editor.close_edit().unwrap();

    assert_eq!(fs::read_to_string(dir.path().join("foo")).unwrap(), "hello world\n");

    let store = JsonEntriesStore;
    let table = store.load(dir.path()).unwrap();
    let record = table.get("foo").unwrap();
    assert_eq!(record.revision, 5);
    assert!(!record.scheduled_for_addition);

    assert!(notifications
        .iter()
        .any(|n| n.action == Action::Add && n.node_kind == Some(NodeKind::File)));
    assert!(notifications.iter().any(|n| n.action == Action::Completed));
}

#[test]
fn update_with_conflicting_local_edit() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    seed_root(dir.path(), "http://example/repo");
    paths::ensure_admin_dirs(dir.path()).unwrap();

    let store = JsonEntriesStore;
    let mut table = store.load(dir.path()).unwrap();
    table
        .records
        .insert("foo".to_string(), EntryRecord::new_file(1, Some("http://example/repo/foo".into())));
    store.save(dir.path(), &table).unwrap();

    // Both the pending update and the working copy touch the same
    // line, forcing a real conflict rather than a clean merge.
    fs::write(paths::pristine_path(dir.path(), "foo"), b"line one\nline two\nline three\n").unwrap();
    fs::write(dir.path().join("foo"), b"line one\nline two MINE\nline three\n").unwrap();

    let mut notifications = Vec::new();
    let mut editor = new_editor(dir.path(), NewEditorArgs::default(), &mut notifications);
    editor.set_target_revision(2).unwrap();
    let mut root = editor.open_root(1).unwrap();

    let mut file = editor.open_file("foo", &mut root, 1).unwrap();
    let mut handler = editor.apply_textdelta(&mut file, None).unwrap();
    handler.write_window(b"line one\nline two THEIRS\nline three\n").unwrap();
    let checksum = handler.close().unwrap();
    editor.close_file(file, Some(checksum)).unwrap();

    editor.close_directory(root).unwrap();
    editor.close_edit().unwrap();

    let report_notification = notifications
        .iter()
        .find(|n| n.node_kind == Some(NodeKind::File))
        .unwrap();
    assert_eq!(report_notification.content_state, ContentState::Conflicted);

    let working = fs::read_to_string(dir.path().join("foo")).unwrap();
    assert!(working.contains("MINE"));
    assert!(working.contains("THEIRS"));

    // The conflict sides are preserved alongside the merged result.
    assert!(dir.path().join("foo.mine").exists());
    assert!(dir.path().join("foo.old").exists());
    assert!(dir.path().join("foo.r2").exists());
}

#[test]
fn switch_records_an_externals_property_change() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    seed_root(dir.path(), "http://example/repo/trunk");

    let mut notifications = Vec::new();
    let args = NewEditorArgs {
        switch_url: Some("http://example/repo/branches/b1".into()),
        target: None,
    };
    let mut editor = new_editor(dir.path(), args, &mut notifications);
    editor.set_target_revision(3).unwrap();
    let mut root = editor.open_root(1).unwrap();

    editor
        .change_dir_prop(&mut root, "svn:externals", Some("vendor http://example/vendor".into()))
        .unwrap();

    editor.close_directory(root).unwrap();
    editor.close_edit().unwrap();

    // No prior value existed, so only the "new" side is recorded.
    let ctx = editor.into_context();
    assert!(ctx.traversal_info.externals_old.is_empty());
    assert_eq!(
        ctx.traversal_info.externals_new.get(dir.path()).map(String::as_str),
        Some("vendor http://example/vendor")
    );
}

#[test]
fn obstructed_add_is_refused() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    seed_root(dir.path(), "http://example/repo");
    fs::write(dir.path().join("foo"), b"not under version control\n").unwrap();

    let mut notifications = Vec::new();
    let mut editor = new_editor(dir.path(), NewEditorArgs::default(), &mut notifications);
    editor.set_target_revision(2).unwrap();
    let mut root = editor.open_root(1).unwrap();

    let err = editor.add_file("foo", &mut root, None).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ObstructedUpdate);
}

#[test]
fn target_deletion_leaves_a_ghost_entry() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    seed_root(dir.path(), "http://example/repo");

    let store = JsonEntriesStore;
    let mut table = store.load(dir.path()).unwrap();
    table
        .records
        .insert("doomed".to_string(), EntryRecord::new_file(1, Some("http://example/repo/doomed".into())));
    store.save(dir.path(), &table).unwrap();
    fs::write(dir.path().join("doomed"), b"unchanged\n").unwrap();

    let mut notifications = Vec::new();
    let args = NewEditorArgs {
        switch_url: None,
        target: Some("doomed".to_string()),
    };
    let mut editor = new_editor(dir.path(), args, &mut notifications);
    editor.set_target_revision(7).unwrap();
    let mut root = editor.open_root(1).unwrap();

    editor.delete_entry("doomed", Some(7), &mut root).unwrap();
    editor.close_directory(root).unwrap();
    editor.close_edit().unwrap();

    assert!(!dir.path().join("doomed").exists());

    let table = store.load(dir.path()).unwrap();
    let ghost = table.get("doomed").unwrap();
    assert!(ghost.deleted);
    assert_eq!(ghost.revision, 7);

    assert!(notifications.iter().any(|n| n.action == Action::Delete));
}

#[test]
fn pending_log_from_a_previous_crash_is_replayed_on_open() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    seed_root(dir.path(), "http://example/repo");
    paths::ensure_admin_dirs(dir.path()).unwrap();

    // A previous process got as far as fsyncing its log to disk before
    // being killed, so the replay never ran. Write that same log by
    // hand, in the on-disk line format, the way recovery would find it.
    let op = LogOp::ModifyEntry {
        name: "foo".to_string(),
        fields: ModifyEntryFields {
            kind: Some(EntryKind::File),
            revision: Some(9),
            scheduled_for_addition: Some(false),
            ..Default::default()
        },
    };
    let line = serde_json::to_string(&op).unwrap();
    fs::write(paths::log_path(dir.path()), format!("{line}\n")).unwrap();
    assert!(paths::log_path(dir.path()).exists());

    let mut notifications = Vec::new();
    let mut editor = new_editor(dir.path(), NewEditorArgs::default(), &mut notifications);

    // `open_root` replays any pending log for the anchor before doing
    // anything else, the same recovery path every directory open uses.
    editor.set_target_revision(9).unwrap();
    let root = editor.open_root(1).unwrap();
    editor.close_directory(root).unwrap();
    editor.close_edit().unwrap();

    assert!(!paths::log_path(dir.path()).exists());

    let store = JsonEntriesStore;
    let table = store.load(dir.path()).unwrap();
    assert_eq!(table.get("foo").unwrap().revision, 9);
}

#[test]
fn log_replay_is_idempotent_if_run_twice() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    seed_root(dir.path(), "http://example/repo");
    paths::ensure_admin_dirs(dir.path()).unwrap();

    let store = JsonEntriesStore;
    let merge = Diff3Merge;

    let mut log = Log::new(dir.path());
    log.push(LogOp::ModifyEntry {
        name: "foo".to_string(),
        fields: ModifyEntryFields {
            kind: Some(EntryKind::File),
            revision: Some(4),
            ..Default::default()
        },
    });
    log.close_and_run(&store, &merge).unwrap();

    // Nothing is left to replay; running again must be a harmless no-op.
    let report = Log::run(dir.path(), &store, &merge).unwrap();
    assert!(report.conflicted.is_empty());

    let table = store.load(dir.path()).unwrap();
    assert_eq!(table.get("foo").unwrap().revision, 4);
}
