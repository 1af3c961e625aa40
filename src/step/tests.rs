//! Tests for step module

use super::*;
use crate::config::StepSettings;
use crate::error::{Error, Result};
use crate::output::{ParquetWriterFactory, RecordWriter, RecordWriterFactory, WriterOptions};
use crate::pipeline::{CollectingSink, JsonLinesSource, MemorySource, RowSink};
use crate::storage::{Location, Storage, StorageAdapter};
use crate::types::{CompressionKind, Row};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use test_case::test_case;

// ============================================================================
// Test doubles
// ============================================================================

/// Ordered record of storage and writer calls
type Journal = Arc<Mutex<Vec<&'static str>>>;

fn entries(journal: &Journal) -> Vec<&'static str> {
    journal.lock().unwrap().clone()
}

/// Storage adapter that records each call before delegating
struct RecordingStorage {
    inner: Storage,
    journal: Journal,
    fail_on: Option<&'static str>,
}

impl RecordingStorage {
    fn record(&self, op: &'static str) -> Result<()> {
        self.journal.lock().unwrap().push(op);
        if self.fail_on == Some(op) {
            return Err(Error::storage(format!("{op} failed")));
        }
        Ok(())
    }
}

impl StorageAdapter for RecordingStorage {
    fn resolve(&self, logical: &str) -> Result<Location> {
        self.record("resolve")?;
        self.inner.resolve(logical)
    }

    fn exists(&self, location: &Location) -> Result<bool> {
        self.record("exists")?;
        self.inner.exists(location)
    }

    fn delete(&self, location: &Location) -> Result<()> {
        self.record("delete")?;
        self.inner.delete(location)
    }

    fn delete_recursive(&self, location: &Location) -> Result<()> {
        self.record("delete_recursive")?;
        self.inner.delete_recursive(location)
    }

    fn parent(&self, location: &Location) -> Option<Location> {
        self.inner.parent(location)
    }

    fn open_read(&self, location: &Location) -> Result<Box<dyn Read>> {
        self.record("open_read")?;
        self.inner.open_read(location)
    }

    fn open_write(&self, location: &Location, truncate: bool) -> Result<Box<dyn Write>> {
        self.record("open_write")?;
        self.inner.open_write(location, truncate)
    }

    fn maybe_stage(&self, location: &Location) -> Result<Option<Location>> {
        self.record("maybe_stage")?;
        self.inner.maybe_stage(location)
    }
}

/// Writer factory producing JSON-lines files and recording what it wrote
#[derive(Default)]
struct RecordingFactory {
    journal: Journal,
    options: Arc<Mutex<Vec<WriterOptions>>>,
    written: Arc<Mutex<Vec<u8>>>,
    fail_write_at: Option<u64>,
}

impl RecordWriterFactory for RecordingFactory {
    fn create(&self, options: &WriterOptions) -> Result<Box<dyn RecordWriter>> {
        self.journal.lock().unwrap().push("create");
        self.options.lock().unwrap().push(options.clone());
        let path = options
            .location
            .as_local()
            .ok_or_else(|| Error::writer("remote target"))?
            .to_path_buf();
        Ok(Box::new(RecordingWriter {
            path,
            journal: Arc::clone(&self.journal),
            written: Arc::clone(&self.written),
            buffer: Vec::new(),
            rows: 0,
            fail_write_at: self.fail_write_at,
        }))
    }
}

struct RecordingWriter {
    path: PathBuf,
    journal: Journal,
    written: Arc<Mutex<Vec<u8>>>,
    buffer: Vec<u8>,
    rows: u64,
    fail_write_at: Option<u64>,
}

impl RecordWriter for RecordingWriter {
    fn write(&mut self, row: &Row) -> Result<()> {
        if self.fail_write_at == Some(self.rows) {
            return Err(Error::writer("disk full"));
        }
        serde_json::to_writer(&mut self.buffer, &row.to_json())?;
        self.buffer.push(b'\n');
        self.rows += 1;
        Ok(())
    }

    fn rows_written(&self) -> u64 {
        self.rows
    }

    fn close(self: Box<Self>) -> Result<u64> {
        self.journal.lock().unwrap().push("close");
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, &self.buffer)?;
        *self.written.lock().unwrap() = self.buffer.clone();
        Ok(self.rows)
    }
}

// ============================================================================
// Fixtures
// ============================================================================

struct Harness {
    _dir: TempDir,
    staging: PathBuf,
    journal: Journal,
    storage: Arc<RecordingStorage>,
    factory: Arc<RecordingFactory>,
}

impl Harness {
    fn new() -> Self {
        Self::build(None, None)
    }

    fn build(fail_on: Option<&'static str>, fail_write_at: Option<u64>) -> Self {
        let dir = TempDir::new().unwrap();
        let staging = dir.path().join("staging");
        std::fs::create_dir_all(&staging).unwrap();
        let journal: Journal = Arc::default();
        let storage = Arc::new(RecordingStorage {
            inner: Storage::new(&staging).unwrap(),
            journal: Arc::clone(&journal),
            fail_on,
        });
        let factory = Arc::new(RecordingFactory {
            journal: Arc::clone(&journal),
            fail_write_at,
            ..Default::default()
        });
        Self {
            _dir: dir,
            staging,
            journal,
            storage,
            factory,
        }
    }

    fn step(&self, settings: StepSettings) -> OutputStep {
        OutputStep::new(settings, self.storage.clone(), self.factory.clone())
    }

    fn settings(&self, destination: &str, fields: &[&str], overwrite: bool) -> StepSettings {
        StepSettings {
            destination: destination.to_string(),
            overwrite,
            fields: fields.iter().map(ToString::to_string).collect(),
            compression: CompressionKind::None,
            compression_block_size: 256 * 1024,
            row_index_stride: 10_000,
            stripe_size: 1024 * 1024,
            staging_dir: self.staging.clone(),
        }
    }

    fn local_dest(&self, name: &str) -> String {
        self.staging
            .parent()
            .unwrap()
            .join("out")
            .join(name)
            .to_string_lossy()
            .into_owned()
    }

    /// Pre-populate a destination through the real storage adapter
    fn seed(&self, destination: &str, content: &[u8]) {
        let location = self.storage.inner.resolve(destination).unwrap();
        let mut writer = self.storage.inner.open_write(&location, true).unwrap();
        writer.write_all(content).unwrap();
        writer.flush().unwrap();
    }

    fn read(&self, destination: &str) -> Vec<u8> {
        let location = self.storage.inner.resolve(destination).unwrap();
        let mut buf = Vec::new();
        self.storage
            .inner
            .open_read(&location)
            .unwrap()
            .read_to_end(&mut buf)
            .unwrap();
        buf
    }

    fn staged_path(&self) -> PathBuf {
        let options = self.factory.options.lock().unwrap();
        options[0].location.as_local().unwrap().to_path_buf()
    }

    fn written(&self) -> Vec<u8> {
        self.factory.written.lock().unwrap().clone()
    }

    fn creates(&self) -> usize {
        self.factory.options.lock().unwrap().len()
    }
}

fn input_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, true),
        Field::new("name", DataType::Utf8, true),
        Field::new("score", DataType::Float64, true),
    ]))
}

fn input() -> MemorySource {
    let schema = input_schema();
    MemorySource::new(vec![
        Row::try_new(Arc::clone(&schema), vec![json!(1), json!("a"), json!(1.5)]).unwrap(),
        Row::try_new(schema, vec![json!(2), json!("b"), json!(2.5)]).unwrap(),
    ])
}

fn staging_entries(root: &Path) -> usize {
    std::fs::read_dir(root).unwrap().count()
}

// ============================================================================
// Direct writes
// ============================================================================

#[test]
fn test_local_destination_writes_projection_without_staging() {
    let h = Harness::new();
    let dest = h.local_dest("data.jsonl");
    let mut step = h.step(h.settings(&dest, &["name"], true));
    let mut sink = CollectingSink::new();

    let report = step.run(&mut input(), &mut sink).unwrap();

    assert_eq!(report.rows_written, 2);
    assert_eq!(report.errors, 0);
    assert_eq!(report.state, StepStateKind::Committed);
    assert_eq!(report.destination.as_deref(), Some(dest.as_str()));
    assert_eq!(report.staged, None);

    // Only resolution; no copy or delete
    assert_eq!(
        entries(&h.journal),
        vec!["resolve", "maybe_stage", "create", "close"]
    );

    let options = h.factory.options.lock().unwrap()[0].clone();
    assert_eq!(options.location, Location::Local(PathBuf::from(&dest)));
    assert_eq!(options.schema.fields().len(), 1);
    assert_eq!(options.schema.field(0).name(), "name");

    assert!(sink.is_finished());
    let emitted: Vec<_> = sink.rows().iter().map(Row::to_json).collect();
    assert_eq!(emitted, vec![json!({"name": "a"}), json!({"name": "b"})]);

    assert_eq!(h.read(&dest), b"{\"name\":\"a\"}\n{\"name\":\"b\"}\n".to_vec());
}

#[test]
fn test_emitted_rows_share_output_schema() {
    let h = Harness::new();
    let dest = h.local_dest("data.jsonl");
    let mut step = h.step(h.settings(&dest, &["score", "id"], true));
    let mut sink = CollectingSink::new();

    step.run(&mut input(), &mut sink).unwrap();

    let rows = sink.rows();
    assert_eq!(rows[0].values(), &[json!(1.5), json!(1)]);
    assert!(Arc::ptr_eq(rows[0].schema(), rows[1].schema()));
}

#[test]
fn test_empty_input_writes_empty_file_from_input_schema() {
    let h = Harness::new();
    let dest = h.local_dest("data.jsonl");
    let mut step = h.step(h.settings(&dest, &["name", "id"], true));
    let mut sink = CollectingSink::new();

    let mut source = MemorySource::default().with_schema(input_schema());
    let report = step.run(&mut source, &mut sink).unwrap();

    assert_eq!(report.rows_written, 0);
    assert_eq!(report.state, StepStateKind::Committed);
    assert_eq!(
        entries(&h.journal),
        vec!["resolve", "maybe_stage", "create", "close"]
    );

    let options = h.factory.options.lock().unwrap()[0].clone();
    let names: Vec<_> = options.schema.fields().iter().map(|f| f.name().as_str()).collect();
    assert_eq!(names, vec!["name", "id"]);

    assert!(Path::new(&dest).exists());
    assert!(sink.is_finished());
    assert!(sink.rows().is_empty());
}

#[test]
fn test_empty_input_still_refuses_existing_destination() {
    let h = Harness::new();
    let dest = "memory://bucket/data.jsonl";
    h.seed(dest, b"old");
    let mut step = h.step(h.settings(dest, &["name"], false));

    let mut source = MemorySource::default().with_schema(input_schema());
    let err = step.run(&mut source, &mut CollectingSink::new()).unwrap_err();

    assert!(matches!(err, Error::DestinationExists { .. }));
    assert_eq!(h.creates(), 0);
    assert_eq!(h.read(dest), b"old".to_vec());
}

#[test]
fn test_empty_input_still_checks_fields() {
    let h = Harness::new();
    let dest = h.local_dest("data.jsonl");
    let mut step = h.step(h.settings(&dest, &["missing"], true));

    let mut source = MemorySource::default().with_schema(input_schema());
    let err = step.run(&mut source, &mut CollectingSink::new()).unwrap_err();

    assert!(matches!(err, Error::FieldNotFound { .. }));
    assert!(entries(&h.journal).is_empty());
}

#[test]
fn test_empty_input_without_schema_writes_nothing() {
    let h = Harness::new();
    let dest = h.local_dest("data.jsonl");
    let mut step = h.step(h.settings(&dest, &["name"], true));
    let mut sink = CollectingSink::new();

    let report = step.run(&mut MemorySource::default(), &mut sink).unwrap();

    assert_eq!(report.rows_written, 0);
    assert_eq!(report.state, StepStateKind::Committed);
    assert!(entries(&h.journal).is_empty());
    assert!(sink.is_finished());
    assert!(!Path::new(&dest).exists());
}

// ============================================================================
// Staged writes
// ============================================================================

#[test]
fn test_staged_file_is_copied_then_removed() {
    let h = Harness::new();
    let dest = "memory://bucket/out/data.jsonl";
    let mut step = h.step(h.settings(dest, &["id", "name"], false));
    let mut sink = CollectingSink::new();

    let report = step.run(&mut input(), &mut sink).unwrap();

    assert_eq!(report.state, StepStateKind::Committed);
    assert_eq!(report.destination.as_deref(), Some(dest));
    assert!(report.staged.is_some());
    assert_eq!(
        entries(&h.journal),
        vec![
            "resolve",
            "maybe_stage",
            "exists",
            "create",
            "close",
            "open_read",
            "open_write",
            "delete",
            "delete_recursive",
        ]
    );

    let written = h.written();
    assert!(!written.is_empty());
    assert_eq!(h.read(dest), written);

    let staged = h.staged_path();
    assert!(staged.starts_with(&h.staging));
    assert!(!staged.exists());
    assert!(!staged.parent().unwrap().exists());
    assert!(h.staging.exists());
    assert_eq!(staging_entries(&h.staging), 0);
}

#[test]
fn test_existing_destination_without_overwrite_fails_before_writing() {
    let h = Harness::new();
    let dest = "memory://bucket/data.jsonl";
    h.seed(dest, b"old");
    let mut step = h.step(h.settings(dest, &["name"], false));
    let mut sink = CollectingSink::new();

    let err = step.run(&mut input(), &mut sink).unwrap_err();

    assert!(matches!(err, Error::DestinationExists { ref path } if path == dest));
    assert_eq!(h.creates(), 0);
    assert_eq!(entries(&h.journal), vec!["resolve", "maybe_stage", "exists"]);
    assert_eq!(h.read(dest), b"old".to_vec());
    assert_eq!(staging_entries(&h.staging), 0);
    assert_eq!(step.state(), StepStateKind::Failed);
    assert!(sink.rows().is_empty());
}

#[test]
fn test_existing_destination_with_overwrite_is_deleted_first() {
    let h = Harness::new();
    let dest = "memory://bucket/data.jsonl";
    h.seed(dest, b"old");
    let mut step = h.step(h.settings(dest, &["name"], true));

    step.run(&mut input(), &mut CollectingSink::new()).unwrap();

    assert_eq!(
        entries(&h.journal),
        vec![
            "resolve",
            "maybe_stage",
            "exists",
            "delete",
            "create",
            "close",
            "open_read",
            "open_write",
            "delete",
            "delete_recursive",
        ]
    );
    assert_eq!(h.read(dest), h.written());
}

#[test]
fn test_existing_local_destination_is_left_to_the_writer() {
    let h = Harness::new();
    let dest = h.local_dest("data.jsonl");
    std::fs::create_dir_all(Path::new(&dest).parent().unwrap()).unwrap();
    std::fs::write(&dest, b"old").unwrap();
    let mut step = h.step(h.settings(&dest, &["name"], false));

    step.run(&mut input(), &mut CollectingSink::new()).unwrap();

    assert_eq!(
        entries(&h.journal),
        vec!["resolve", "maybe_stage", "create", "close"]
    );
    assert!(!h.factory.options.lock().unwrap()[0].overwrite);
}

// ============================================================================
// Writer options
// ============================================================================

#[test_case("zstd", Some(256 * 1024) ; "compressed")]
#[test_case("none", None ; "uncompressed")]
#[test_case("lzo", None ; "unsupported falls back to none")]
fn test_block_size_only_when_compressed(name: &str, expected: Option<usize>) {
    let h = Harness::new();
    let dest = h.local_dest("data.jsonl");
    let mut settings = h.settings(&dest, &["name"], true);
    settings.compression = CompressionKind::from_name(name);
    settings.stripe_size = 7;
    settings.row_index_stride = 3;
    let mut step = h.step(settings);

    step.run(&mut input(), &mut CollectingSink::new()).unwrap();

    let options = h.factory.options.lock().unwrap()[0].clone();
    assert_eq!(options.compression_block_size, expected);
    assert_eq!(options.compression, CompressionKind::from_name(name));
    assert_eq!(options.stripe_size, 7);
    assert_eq!(options.row_index_stride, 3);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_missing_field_fails_before_opening_writer() {
    let h = Harness::new();
    let dest = "memory://bucket/data.jsonl";
    let mut step = h.step(h.settings(dest, &["name", "missing"], true));
    let mut sink = CollectingSink::new();

    let err = step.process_row(&mut input(), &mut sink).unwrap_err();

    assert!(matches!(err, Error::FieldNotFound { ref field } if field == "missing"));
    assert!(entries(&h.journal).is_empty());
    assert_eq!(step.state(), StepStateKind::Failed);
    assert!(sink.rows().is_empty());
    assert!(!sink.is_finished());
}

#[test]
fn test_writer_failure_is_wrapped_and_keeps_staged_state() {
    let h = Harness::build(None, Some(1));
    let dest = "memory://bucket/data.jsonl";
    let mut step = h.step(h.settings(dest, &["name"], true));
    let mut sink = CollectingSink::new();

    let err = step.run(&mut input(), &mut sink).unwrap_err();

    match err {
        Error::StepFailed { source } => {
            assert!(matches!(*source, Error::Writer { .. }));
        }
        other => panic!("expected StepFailed, got {other:?}"),
    }
    assert_eq!(step.state(), StepStateKind::Failed);
    assert_eq!(step.errors(), 1);
    assert_eq!(
        entries(&h.journal),
        vec!["resolve", "maybe_stage", "exists", "create"]
    );
    assert_eq!(sink.rows().len(), 1);
}

#[test]
fn test_copy_failure_passes_storage_error_through() {
    let h = Harness::build(Some("open_write"), None);
    let dest = "memory://bucket/data.jsonl";
    let mut step = h.step(h.settings(dest, &["name"], true));
    let mut sink = CollectingSink::new();

    let err = step.run(&mut input(), &mut sink).unwrap_err();

    assert!(matches!(err, Error::Storage { .. }));
    assert_eq!(step.state(), StepStateKind::Failed);
    assert!(!entries(&h.journal).contains(&"delete"));
    assert!(h.staged_path().exists());
    assert!(!sink.is_finished());
}

#[test]
fn test_schema_change_after_first_row_fails() {
    let h = Harness::new();
    let dest = h.local_dest("data.jsonl");
    let mut step = h.step(h.settings(&dest, &["name"], true));

    let retyped = Arc::new(Schema::new(vec![Field::new("name", DataType::Int64, true)]));
    let mut source = MemorySource::new(vec![
        Row::try_new(input_schema(), vec![json!(1), json!("a"), json!(1.5)]).unwrap(),
        Row::try_new(retyped, vec![json!(7)]).unwrap(),
    ]);

    let err = step.run(&mut source, &mut CollectingSink::new()).unwrap_err();

    match err {
        Error::StepFailed { source } => {
            assert!(matches!(*source, Error::SchemaMismatch { .. }));
        }
        other => panic!("expected StepFailed, got {other:?}"),
    }
    assert_eq!(step.rows_written(), 1);
}

#[test]
fn test_row_after_completion_is_recoverable() {
    let h = Harness::new();
    let dest = h.local_dest("data.jsonl");
    let mut step = h.step(h.settings(&dest, &["name"], true));
    let mut sink = CollectingSink::new();
    step.run(&mut input(), &mut sink).unwrap();

    let status = step.process_row(&mut input(), &mut sink).unwrap();

    assert_eq!(status, StepStatus::Finished);
    assert_eq!(step.errors(), 1);
    assert_eq!(step.state(), StepStateKind::Committed);
    assert!(sink.is_finished());
    assert_eq!(sink.rows().len(), 2);
}

#[test]
fn test_row_after_failure_is_recoverable() {
    let h = Harness::new();
    let dest = h.local_dest("data.jsonl");
    let mut step = h.step(h.settings(&dest, &["missing"], true));
    let mut sink = CollectingSink::new();
    step.process_row(&mut input(), &mut sink).unwrap_err();

    let status = step.process_row(&mut input(), &mut sink).unwrap();

    assert_eq!(status, StepStatus::Finished);
    assert_eq!(step.errors(), 2);
    assert_eq!(step.state(), StepStateKind::Failed);
    assert!(sink.is_finished());
}

#[test]
fn test_report_serializes_state_name() {
    let h = Harness::new();
    let step = h.step(h.settings(&h.local_dest("x.jsonl"), &["name"], true));

    let value = serde_json::to_value(step.report()).unwrap();

    assert_eq!(value["state"], json!("uninitialized"));
    assert_eq!(value["rows_written"], json!(0));
}

/// Sink counting `finish` calls
#[derive(Default)]
struct FinishCounter {
    finished: usize,
}

impl RowSink for FinishCounter {
    fn emit(&mut self, _row: Row) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished += 1;
        Ok(())
    }
}

#[test]
fn test_sink_is_finished_once() {
    let h = Harness::new();
    let dest = h.local_dest("data.jsonl");
    let mut step = h.step(h.settings(&dest, &["name"], true));
    let mut sink = FinishCounter::default();

    step.run(&mut input(), &mut sink).unwrap();
    step.process_row(&mut input(), &mut sink).unwrap();
    step.process_row(&mut input(), &mut sink).unwrap();

    assert_eq!(sink.finished, 1);
    assert_eq!(step.errors(), 2);
}

// ============================================================================
// Parquet output
// ============================================================================

#[test]
fn test_value_not_matching_column_type_fails_the_run() {
    let h = Harness::new();
    let dest = h.local_dest("ids.parquet");
    let step_settings = h.settings(&dest, &["id"], true);
    let mut step = OutputStep::new(
        step_settings,
        h.storage.clone(),
        Arc::new(ParquetWriterFactory),
    );
    let mut source = JsonLinesSource::new(std::io::Cursor::new(
        "{\"id\": 1}\n{\"id\": 2.5}\n{\"id\": \"x\"}\n",
    ));
    let mut sink = CollectingSink::new();

    let err = step.run(&mut source, &mut sink).unwrap_err();

    match err {
        Error::StepFailed { source } => {
            assert!(source.to_string().contains("value 2.5 is not a valid Int64"));
        }
        other => panic!("expected StepFailed, got {other:?}"),
    }
    assert_eq!(step.state(), StepStateKind::Failed);
    assert_eq!(step.errors(), 1);
    assert_eq!(step.rows_written(), 1);
    let emitted: Vec<_> = sink.rows().iter().map(Row::to_json).collect();
    assert_eq!(emitted, vec![json!({"id": 1})]);
}
