//! Output step module
//!
//! [`OutputStep`] drives the write lifecycle of one columnar file:
//!
//! ```text
//! Uninitialized --first row--> Open --end of input--> ClosedPendingCommit --> Committed
//!        \                      |                              |
//!         +-------- error ------+------------------------------+--> Failed
//! ```
//!
//! Staged files are relocated only from `ClosedPendingCommit`. A failed step
//! never deletes anything, so staged output survives for inspection and can be
//! cleaned up later with [`crate::storage::sweep_staging`].

mod coordinator;
mod session;

pub use coordinator::{OutputStep, StepReport, StepStatus};
pub use session::StepStateKind;

#[cfg(test)]
mod tests;
