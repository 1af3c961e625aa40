//! Write session state

use crate::error::Result;
use crate::output::RecordWriter;
use crate::storage::Location;
use arrow::datatypes::SchemaRef;

/// Externally visible lifecycle state of an output step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStateKind {
    /// No row seen yet
    Uninitialized,
    /// Writer open, rows being written
    Open,
    /// Writer closed, staged file not yet published
    ClosedPendingCommit,
    /// Output complete
    Committed,
    /// Aborted; staged files are left for inspection
    Failed,
}

impl StepStateKind {
    /// Whether no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Failed)
    }
}

impl std::fmt::Display for StepStateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Open => "open",
            Self::ClosedPendingCommit => "closed pending commit",
            Self::Committed => "committed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Open writer plus the locations it is producing
pub(crate) struct WriteSession {
    pub(crate) writer: Box<dyn RecordWriter>,
    pub(crate) schema: SchemaRef,
    pub(crate) final_location: Location,
    pub(crate) staged_location: Option<Location>,
}

impl WriteSession {
    /// Close the writer, leaving the locations to publish
    pub(crate) fn close(self) -> Result<PendingCommit> {
        let rows = self.writer.close()?;
        Ok(PendingCommit {
            final_location: self.final_location,
            staged_location: self.staged_location,
            rows,
        })
    }
}

/// A closed file waiting to be published
#[derive(Debug, Clone)]
pub(crate) struct PendingCommit {
    pub(crate) final_location: Location,
    pub(crate) staged_location: Option<Location>,
    pub(crate) rows: u64,
}

/// Internal lifecycle state
pub(crate) enum StepState {
    Uninitialized,
    Open(WriteSession),
    ClosedPendingCommit(PendingCommit),
    Committed,
    Failed,
}

impl StepState {
    pub(crate) fn kind(&self) -> StepStateKind {
        match self {
            Self::Uninitialized => StepStateKind::Uninitialized,
            Self::Open(_) => StepStateKind::Open,
            Self::ClosedPendingCommit(_) => StepStateKind::ClosedPendingCommit,
            Self::Committed => StepStateKind::Committed,
            Self::Failed => StepStateKind::Failed,
        }
    }
}
