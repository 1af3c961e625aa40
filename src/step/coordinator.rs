//! Output step commit coordinator

use super::session::{PendingCommit, StepState, StepStateKind, WriteSession};
use crate::config::StepSettings;
use crate::error::{Error, Result};
use crate::output::{RecordWriterFactory, WriterOptions};
use crate::pipeline::{RowSink, RowSource};
use crate::projection::FieldProjector;
use crate::storage::{Location, StorageAdapter};
use arrow::datatypes::SchemaRef;
use serde::Serialize;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Result of one `process_row` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// More rows may follow
    Continue,
    /// The step is done
    Finished,
}

/// Summary of a step run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    /// Rows handed to the record writer
    pub rows_written: u64,
    /// Errors counted by the step
    pub errors: u64,
    /// Final destination, once resolved
    pub destination: Option<String>,
    /// Staged location, when staging was used
    pub staged: Option<String>,
    /// Lifecycle state at the time of the report
    #[serde(serialize_with = "serialize_state")]
    pub state: StepStateKind,
}

fn serialize_state<S: serde::Serializer>(
    state: &StepStateKind,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(state)
}

/// Projects incoming rows, writes them to a columnar file and publishes the
/// file when the input is exhausted.
///
/// The writer is opened lazily on the first row, so the output schema is the
/// projection of the first row's schema (or of the source's input schema when
/// the input is empty). When the storage adapter asks for
/// staging, the file is written to the staged location and copied to the
/// destination after the writer closes. Exclusive access to the step
/// (`&mut self`) serializes every transition.
pub struct OutputStep {
    settings: StepSettings,
    storage: Arc<dyn StorageAdapter>,
    writers: Arc<dyn RecordWriterFactory>,
    projector: FieldProjector,
    state: StepState,
    rows_written: u64,
    errors: u64,
    destination: Option<Location>,
    staged: Option<Location>,
    sink_finished: bool,
}

impl OutputStep {
    /// Create a step for resolved settings
    pub fn new(
        settings: StepSettings,
        storage: Arc<dyn StorageAdapter>,
        writers: Arc<dyn RecordWriterFactory>,
    ) -> Self {
        let projector = FieldProjector::new(settings.fields.clone());
        Self {
            settings,
            storage,
            writers,
            projector,
            state: StepState::Uninitialized,
            rows_written: 0,
            errors: 0,
            destination: None,
            staged: None,
            sink_finished: false,
        }
    }

    /// Settings the step runs with
    pub fn settings(&self) -> &StepSettings {
        &self.settings
    }

    /// Current lifecycle state
    pub fn state(&self) -> StepStateKind {
        self.state.kind()
    }

    /// Errors counted so far
    pub fn errors(&self) -> u64 {
        self.errors
    }

    /// Rows written so far
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Snapshot of the run so far
    pub fn report(&self) -> StepReport {
        StepReport {
            rows_written: self.rows_written,
            errors: self.errors,
            destination: self.destination.as_ref().map(ToString::to_string),
            staged: self.staged.as_ref().map(ToString::to_string),
            state: self.state(),
        }
    }

    /// Process one upstream row.
    ///
    /// Pulls a row from `source`, writes its projection and forwards the
    /// projection to `sink`. When the source is exhausted the writer is
    /// closed, the staged file (if any) is published and `sink` is finished.
    ///
    /// Declared errors reach the caller unchanged; anything else is wrapped in
    /// [`Error::StepFailed`]. A failed step leaves staged files in place.
    pub fn process_row(
        &mut self,
        source: &mut dyn RowSource,
        sink: &mut dyn RowSink,
    ) -> Result<StepStatus> {
        match self.advance(source, sink) {
            Ok(status) => Ok(status),
            Err(e) if e.is_recoverable() => {
                error!("{e}");
                self.errors += 1;
                if !self.state().is_terminal() {
                    self.state = StepState::Failed;
                }
                self.finish_sink(sink).map_err(Error::into_step_error)?;
                Ok(StepStatus::Finished)
            }
            Err(e) => {
                self.errors += 1;
                self.state = StepState::Failed;
                if let Some(staged) = &self.staged {
                    warn!("Leaving staged file {} in place", staged);
                }
                Err(e.into_step_error())
            }
        }
    }

    /// Call [`OutputStep::process_row`] until the step finishes
    pub fn run(
        &mut self,
        source: &mut dyn RowSource,
        sink: &mut dyn RowSink,
    ) -> Result<StepReport> {
        while self.process_row(source, sink)? == StepStatus::Continue {}
        Ok(self.report())
    }

    fn advance(&mut self, source: &mut dyn RowSource, sink: &mut dyn RowSink) -> Result<StepStatus> {
        match self.state() {
            StepStateKind::Uninitialized | StepStateKind::Open => {}
            other => {
                return Err(Error::state(format!(
                    "cannot process rows once the step is {other}"
                )))
            }
        }

        let Some(row) = source.next_row()? else {
            self.finish(&*source, sink)?;
            return Ok(StepStatus::Finished);
        };

        let projected = self.projector.project(&row)?;

        if matches!(self.state, StepState::Uninitialized) {
            let session = self.open(projected.schema())?;
            self.state = StepState::Open(session);
        }

        let StepState::Open(session) = &mut self.state else {
            return Err(Error::state("writer is not open"));
        };

        if projected.schema().fields() != session.schema.fields() {
            return Err(Error::schema_mismatch(format!(
                "output schema changed after the first row: expected {:?}, got {:?}",
                session.schema.fields(),
                projected.schema().fields()
            )));
        }

        session.writer.write(&projected)?;
        self.rows_written += 1;
        sink.emit(projected)?;

        Ok(StepStatus::Continue)
    }

    /// Resolve the destination and open the record writer
    fn open(&mut self, schema: &SchemaRef) -> Result<WriteSession> {
        let final_location = self.storage.resolve(&self.settings.destination)?;
        let staged_location = self.storage.maybe_stage(&final_location)?;
        self.destination = Some(final_location.clone());
        self.staged = staged_location.clone();

        if staged_location.is_some() && self.storage.exists(&final_location)? {
            if !self.settings.overwrite {
                return Err(Error::destination_exists(final_location.to_string()));
            }
            info!("Deleting existing destination {}", final_location);
            self.storage.delete(&final_location)?;
        }

        let compression = self.settings.compression;
        let options = WriterOptions {
            location: staged_location
                .clone()
                .unwrap_or_else(|| final_location.clone()),
            overwrite: self.settings.overwrite,
            schema: Arc::clone(schema),
            compression,
            compression_block_size: compression
                .is_compressed()
                .then_some(self.settings.compression_block_size),
            row_index_stride: self.settings.row_index_stride,
            stripe_size: self.settings.stripe_size,
        };
        let writer = self.writers.create(&options)?;

        match &staged_location {
            Some(staged) => info!(
                "Writing {} field(s) to {} (staged at {})",
                options.schema.fields().len(),
                final_location,
                staged
            ),
            None => info!(
                "Writing {} field(s) to {}",
                options.schema.fields().len(),
                final_location
            ),
        }
        debug!(
            compression = %compression,
            stripe_size = options.stripe_size,
            row_index_stride = options.row_index_stride,
            "Record writer options"
        );

        Ok(WriteSession {
            writer,
            schema: options.schema,
            final_location,
            staged_location,
        })
    }

    /// Close the writer, publish the file and finish the sink
    ///
    /// Without any rows the file is still produced, empty, from the source's
    /// input schema. Only when no schema is known is nothing written.
    fn finish(&mut self, source: &dyn RowSource, sink: &mut dyn RowSink) -> Result<()> {
        let session = match std::mem::replace(&mut self.state, StepState::Failed) {
            StepState::Open(session) => Some(session),
            StepState::Uninitialized => match source.input_schema() {
                Some(input) => {
                    let schema = self.projector.project_schema(&input)?;
                    info!("No rows received; writing an empty file");
                    Some(self.open(&schema)?)
                }
                None => {
                    info!("No rows and no input schema received; no output written");
                    None
                }
            },
            other => {
                let kind = other.kind();
                self.state = other;
                return Err(Error::state(format!("cannot finish a step that is {kind}")));
            }
        };

        if let Some(session) = session {
            let pending = session.close()?;
            debug!("Closed record writer after {} rows", pending.rows);
            self.state = StepState::ClosedPendingCommit(pending);
            self.commit()?;
        }

        self.state = StepState::Committed;
        self.finish_sink(sink)
    }

    /// Signal the sink once; later calls are no-ops
    fn finish_sink(&mut self, sink: &mut dyn RowSink) -> Result<()> {
        if !self.sink_finished {
            self.sink_finished = true;
            sink.finish()?;
        }
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let StepState::ClosedPendingCommit(pending) = &self.state else {
            return Err(Error::state("nothing to commit"));
        };

        match &pending.staged_location {
            Some(staged) => self.relocate(staged, pending),
            None => {
                info!(
                    "Wrote {} rows to {}",
                    pending.rows, pending.final_location
                );
                Ok(())
            }
        }
    }

    /// Copy the staged file to its destination, then remove the staged copy
    /// and its directory.
    ///
    /// Not atomic: a failure part way leaves the staged file and possibly a
    /// partial destination behind.
    fn relocate(&self, staged: &Location, pending: &PendingCommit) -> Result<()> {
        let destination = &pending.final_location;
        debug!("Copying {} to {}", staged, destination);

        let copy_err =
            |e: io::Error| Error::storage(format!("Failed to copy {staged} to {destination}: {e}"));

        let mut reader = self.storage.open_read(staged)?;
        let mut writer = self.storage.open_write(destination, true)?;
        let bytes = io::copy(&mut reader, &mut writer).map_err(copy_err)?;
        writer.flush().map_err(copy_err)?;
        drop(writer);

        debug!("Removing staged file {}", staged);
        self.storage.delete(staged)?;
        if let Some(dir) = self.storage.parent(staged) {
            debug!("Removing staging directory {}", dir);
            self.storage.delete_recursive(&dir)?;
        }

        info!(
            "Wrote {} rows ({} bytes) to {}",
            pending.rows, bytes, destination
        );
        Ok(())
    }
}

impl std::fmt::Debug for OutputStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputStep")
            .field("settings", &self.settings)
            .field("state", &self.state())
            .field("rows_written", &self.rows_written)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}
