//! Durability tests for the journal on the local filesystem.
//!
//! Covers writing, rotation, crash truncation, restart with a backup marker,
//! and pruning against real files in an isolated temporary directory.

use std::collections::BTreeMap;
use std::fs::OpenOptions as FileOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use metalog_core::{JournalConfig, WalSyncMode};
use metalog_journal::{
    replay, Applier, DependencyRecord, DependencyType, Journal, JournalError, LocalSegmentStore,
    OpenOptions, SegmentLifecycle, SegmentStore,
};
use tempfile::TempDir;

/// Isolated journal directory plus configuration.
struct JournalTestHarness {
    _temp_dir: TempDir,
    config: JournalConfig,
    store: Arc<dyn SegmentStore>,
}

impl JournalTestHarness {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config = JournalConfig::at(temp_dir.path().join("journal").join("log.data"))
            .with_sync_mode(WalSyncMode::None);
        let store = Arc::new(LocalSegmentStore::without_directory_sync());
        Self { _temp_dir: temp_dir, config, store }
    }

    fn active_path(&self) -> &Path {
        &self.config.path
    }

    fn completed_path(&self, sequence: u64) -> PathBuf {
        self.active_path().parent().unwrap().join("completed").join(format!("{sequence}.segment"))
    }

    fn open(&self, options: OpenOptions) -> Journal {
        Journal::open(self.config.clone(), Arc::clone(&self.store), options).unwrap()
    }

    fn replay(&self, start: u64) -> (Namespace, metalog_journal::ReplayReport) {
        let mut namespace = Namespace::default();
        let report =
            replay(self.store.as_ref(), self.active_path(), start, &mut namespace).unwrap();
        (namespace, report)
    }

    /// Append raw bytes to the active segment, as a torn write would.
    fn append_raw(&self, bytes: &[u8]) {
        let mut file = FileOptions::new().append(true).open(self.active_path()).unwrap();
        file.write_all(bytes).unwrap();
    }
}

#[derive(Debug, thiserror::Error)]
#[error("file {0} does not exist")]
struct NoSuchFile(i32);

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct FileEntry {
    path: String,
    complete: bool,
    pinned: bool,
    blocks: Vec<i64>,
}

/// Minimal namespace used to observe replay.
#[derive(Debug, Default)]
struct Namespace {
    next_file_id: i32,
    files: BTreeMap<i32, FileEntry>,
    tables: BTreeMap<i32, Vec<u8>>,
    dependencies: Vec<i32>,
    applied: Vec<&'static str>,
}

impl Namespace {
    fn file(&mut self, file_id: i32) -> Result<&mut FileEntry, NoSuchFile> {
        self.files.get_mut(&file_id).ok_or(NoSuchFile(file_id))
    }
}

type Applied = Result<(), NoSuchFile>;

impl Applier for Namespace {
    type Error = NoSuchFile;

    fn add_block(&mut self, file_id: i32, _: i32, block_length: i64, _: i64) -> Applied {
        self.applied.push("add_block");
        self.file(file_id)?.blocks.push(block_length);
        Ok(())
    }

    fn add_checkpoint(&mut self, file_id: i32, _: i64, _: &str, _: i64) -> Applied {
        self.applied.push("add_checkpoint");
        self.file(file_id).map(|_| ())
    }

    fn create_file(&mut self, _: bool, path: &str, _: bool, _: i64, _: i64) -> Applied {
        self.applied.push("create_file");
        self.next_file_id += 1;
        let entry = FileEntry { path: path.to_string(), ..Default::default() };
        self.files.insert(self.next_file_id, entry);
        Ok(())
    }

    fn complete_file(&mut self, file_id: i32, _: i64) -> Applied {
        self.applied.push("complete_file");
        self.file(file_id)?.complete = true;
        Ok(())
    }

    fn set_pinned(&mut self, file_id: i32, pinned: bool, _: i64) -> Applied {
        self.applied.push("set_pinned");
        self.file(file_id)?.pinned = pinned;
        Ok(())
    }

    fn rename(&mut self, file_id: i32, dst_path: &str, _: i64) -> Applied {
        self.applied.push("rename");
        self.file(file_id)?.path = dst_path.to_string();
        Ok(())
    }

    fn delete(&mut self, file_id: i32, _: bool, _: i64) -> Applied {
        self.applied.push("delete");
        self.files.remove(&file_id).map(|_| ()).ok_or(NoSuchFile(file_id))
    }

    fn create_raw_table(&mut self, table_id: i32, _: i32, metadata: &[u8]) -> Applied {
        self.applied.push("create_raw_table");
        self.tables.insert(table_id, metadata.to_vec());
        Ok(())
    }

    fn update_raw_table_metadata(&mut self, table_id: i32, metadata: &[u8]) -> Applied {
        self.applied.push("update_raw_table_metadata");
        self.tables.insert(table_id, metadata.to_vec());
        Ok(())
    }

    fn create_dependency(&mut self, dependency: &DependencyRecord) -> Applied {
        self.applied.push("create_dependency");
        self.dependencies.push(dependency.dependency_id);
        Ok(())
    }
}

#[test]
fn test_create_then_complete_round_trip() {
    let harness = JournalTestHarness::new();
    let journal = harness.open(OpenOptions::default());

    assert_eq!(journal.create_file(false, "/a", false, 512, 1000).unwrap(), Some(1));
    assert_eq!(journal.complete_file(1, 1001).unwrap(), Some(2));
    journal.flush().unwrap();
    journal.close().unwrap();

    let (namespace, report) = harness.replay(0);
    assert_eq!(namespace.applied, vec!["create_file", "complete_file"]);
    assert_eq!(report.last_transaction_id, 2);
    assert!(namespace.files[&1].complete);
}

#[test]
fn test_every_operation_replays_in_order() {
    let harness = JournalTestHarness::new();
    let journal = harness.open(OpenOptions::default());

    journal.create_file(true, "/dir/f", false, 64, 0).unwrap();
    journal.add_block(1, 0, 64, 0).unwrap();
    journal.add_checkpoint(1, 64, "ufs://f", 0).unwrap();
    journal.complete_file(1, 0).unwrap();
    journal.set_pinned(1, true, 0).unwrap();
    journal.rename(1, "/dir/g", 0).unwrap();
    journal.create_raw_table(5, 3, &[0, 1, 2]).unwrap();
    journal.update_raw_table_metadata(5, b"v2").unwrap();
    journal
        .create_dependency(DependencyRecord {
            parents: vec![1],
            children: vec![],
            command_prefix: "recompute".to_string(),
            data: vec![vec![0xff]],
            comment: String::new(),
            framework: "spark".to_string(),
            framework_version: "0.9".to_string(),
            dependency_type: DependencyType::Wide,
            dependency_id: 77,
            creation_time_ms: 0,
        })
        .unwrap();
    journal.delete(1, false, 0).unwrap();
    journal.close().unwrap();

    let (namespace, report) = harness.replay(0);
    assert_eq!(report.last_transaction_id, 10);
    assert_eq!(
        namespace.applied,
        vec![
            "create_file",
            "add_block",
            "add_checkpoint",
            "complete_file",
            "set_pinned",
            "rename",
            "create_raw_table",
            "update_raw_table_metadata",
            "create_dependency",
            "delete",
        ]
    );
    assert!(namespace.files.is_empty());
    assert_eq!(namespace.tables[&5], b"v2".to_vec());
    assert_eq!(namespace.dependencies, vec![77]);
}

#[test]
fn test_rotation_replays_every_operation_once() {
    let harness = JournalTestHarness::new();
    let journal = harness.open(OpenOptions::default());
    journal.set_max_segment_size(100);

    journal.create_file(false, "/a", false, 64, 0).unwrap();
    for i in 0..3 {
        journal.add_block(1, i, 64, 0).unwrap();
    }
    journal.flush().unwrap();
    for i in 3..6 {
        journal.add_block(1, i, 64, 0).unwrap();
    }
    journal.flush().unwrap();
    journal.set_pinned(1, true, 0).unwrap();
    journal.close().unwrap();

    assert!(harness.completed_path(0).exists());
    assert!(harness.completed_path(1).exists());
    assert!(!harness.completed_path(2).exists());
    assert!(std::fs::metadata(harness.active_path()).unwrap().len() > 0);

    let (namespace, report) = harness.replay(0);
    assert_eq!(report.segments_replayed, 3);
    assert_eq!(report.operations_applied, 8);
    assert_eq!(namespace.files[&1].blocks.len(), 6);
    assert!(namespace.files[&1].pinned);
}

#[test]
fn test_torn_write_is_ignored_on_replay() {
    let harness = JournalTestHarness::new();
    let journal = harness.open(OpenOptions::default());
    journal.create_file(false, "/a", false, 64, 0).unwrap();
    journal.add_block(1, 0, 64, 0).unwrap();
    journal.flush().unwrap();
    drop(journal);

    harness.append_raw(br#"{"transId":3,"type":"ADD_BLOCK","parameters":{"fileId":1,"blo"#);

    let (namespace, report) = harness.replay(0);
    assert_eq!(report.last_transaction_id, 2);
    assert_eq!(report.truncated_tails, 1);
    assert_eq!(namespace.files[&1].blocks, vec![64]);
}

#[test]
fn test_corrupt_line_fails_replay() {
    let harness = JournalTestHarness::new();
    let journal = harness.open(OpenOptions::default());
    journal.create_file(false, "/a", false, 64, 0).unwrap();
    journal.close().unwrap();

    harness.append_raw(b"garbage\n");

    let mut namespace = Namespace::default();
    let err = replay(harness.store.as_ref(), harness.active_path(), 0, &mut namespace).unwrap_err();
    assert!(matches!(err, JournalError::MalformedRecord { line: 2, .. }));
}

#[test]
fn test_applier_error_carries_original() {
    let harness = JournalTestHarness::new();
    let journal = harness.open(OpenOptions::default());
    journal.complete_file(9, 0).unwrap();
    journal.close().unwrap();

    let mut namespace = Namespace::default();
    let err = replay(harness.store.as_ref(), harness.active_path(), 0, &mut namespace).unwrap_err();
    match err {
        JournalError::Apply { transaction_id, source, .. } => {
            assert_eq!(transaction_id, 1);
            assert_eq!(source.to_string(), "file 9 does not exist");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_restart_resumes_ids_and_keeps_history() {
    let harness = JournalTestHarness::new();
    let journal = harness.open(OpenOptions::default());
    journal.create_file(false, "/a", false, 64, 0).unwrap();
    journal.add_block(1, 0, 64, 0).unwrap();
    journal.close().unwrap();

    // Restart: replay, then reopen with the replay's marker.
    let (_, report) = harness.replay(0);
    let journal = harness.open(report.open_options());
    assert_eq!(journal.complete_file(1, 0).unwrap(), Some(3));
    journal.close().unwrap();

    assert!(harness.completed_path(0).exists());
    let (namespace, report) = harness.replay(0);
    assert_eq!(report.last_transaction_id, 3);
    assert!(namespace.files[&1].complete);
}

#[test]
fn test_backup_merge_after_image() {
    let harness = JournalTestHarness::new();
    let journal = harness.open(OpenOptions::default());
    journal.set_max_segment_size(1);

    // Segments 0, 1 and 2 each hold one record.
    journal.create_file(false, "/a", false, 64, 0).unwrap();
    journal.flush().unwrap();
    journal.add_block(1, 0, 64, 0).unwrap();
    journal.flush().unwrap();
    journal.add_block(1, 1, 64, 0).unwrap();
    journal.flush().unwrap();
    journal.set_pinned(1, true, 0).unwrap();
    journal.close().unwrap();

    // An image covers segment 0; replay the rest on top of it.
    let mut namespace = Namespace::default();
    namespace.create_file(false, "/a", false, 64, 0).unwrap();
    let report = replay(harness.store.as_ref(), harness.active_path(), 1, &mut namespace).unwrap();
    assert_eq!(report.last_transaction_id, 4);
    assert_eq!(report.backup_start, Some(1));

    let journal = harness.open(report.open_options());
    assert_eq!(journal.transaction_ids().current, 4);
    journal.close().unwrap();

    // Old 1 and 2 became 0 and 1; the old active segment became 2.
    assert!(harness.completed_path(2).exists());
    assert!(!harness.completed_path(3).exists());
    let mut namespace = Namespace::default();
    namespace.create_file(false, "/a", false, 64, 0).unwrap();
    let report = replay(harness.store.as_ref(), harness.active_path(), 0, &mut namespace).unwrap();
    assert_eq!(report.operations_applied, 3);
    assert_eq!(report.segments_replayed, 4);
    assert_eq!(namespace.applied, vec!["create_file", "add_block", "add_block", "set_pinned"]);
}

#[test]
fn test_mark_up_to_date_then_prune() {
    let harness = JournalTestHarness::new();
    let journal = harness.open(OpenOptions::default());
    journal.set_max_segment_size(1);
    for i in 0..4 {
        journal.create_file(false, &format!("/f{i}"), false, 64, 0).unwrap();
        journal.flush().unwrap();
    }
    journal.close().unwrap();

    // A newer image covers segment 3 onward; discard them before reopening.
    let lifecycle = SegmentLifecycle::new(Arc::clone(&harness.store), harness.active_path());
    assert_eq!(lifecycle.mark_up_to_date(3).unwrap(), 1);

    let journal = harness.open(OpenOptions::resume_from(4));
    let report = journal.delete_completed(2).unwrap();
    assert_eq!(report.deleted, vec![0, 1]);
    assert!(report.is_clean());
    assert_eq!(journal.delete_completed(2).unwrap().deleted, Vec::<u64>::new());

    let lifecycle = journal.lifecycle().unwrap();
    assert_eq!(lifecycle.completed_sequences().unwrap(), vec![2]);
    journal.close().unwrap();
}

#[test]
fn test_inactive_journal_creates_no_files() {
    let harness = JournalTestHarness::new();
    let journal = Journal::inactive();

    assert_eq!(journal.create_file(false, "/a", false, 64, 0).unwrap(), None);
    journal.flush().unwrap();
    journal.close().unwrap();

    assert!(!harness.active_path().exists());
    assert!(!harness.active_path().parent().unwrap().exists());
}
