//! Projection module
//!
//! Selects and reorders the fields of incoming rows according to the
//! configured output field list.

mod projector;

pub use projector::{project, FieldProjector};
