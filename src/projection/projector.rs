//! Field projection
//!
//! Derives an output schema and row from an input row and an ordered list
//! of output field names.

use crate::error::{Error, Result};
use crate::types::{JsonValue, Row};
use arrow::datatypes::{Field, Schema, SchemaRef};
use std::sync::Arc;

/// Project `values` (aligned with `input_schema`) onto `output_fields`.
///
/// The output schema lists the named fields in `output_fields` order, with
/// each field's metadata cloned from the input schema.
pub fn project(
    values: &[JsonValue],
    input_schema: &Schema,
    output_fields: &[String],
) -> Result<(SchemaRef, Vec<JsonValue>)> {
    let indices = resolve_indices(input_schema, output_fields)?;
    let schema = build_schema(input_schema, &indices);
    let values = pick(values, &indices)?;
    Ok((schema, values))
}

/// Positions of `output_fields` within `input_schema`
fn resolve_indices(input_schema: &Schema, output_fields: &[String]) -> Result<Vec<usize>> {
    output_fields
        .iter()
        .map(|name| {
            input_schema
                .index_of(name)
                .map_err(|_| Error::field_not_found(name))
        })
        .collect()
}

fn build_schema(input_schema: &Schema, indices: &[usize]) -> SchemaRef {
    let fields: Vec<Field> = indices
        .iter()
        .map(|&idx| input_schema.field(idx).clone())
        .collect();
    Arc::new(Schema::new(fields))
}

fn pick(values: &[JsonValue], indices: &[usize]) -> Result<Vec<JsonValue>> {
    indices
        .iter()
        .map(|&idx| {
            values.get(idx).cloned().ok_or_else(|| {
                Error::schema_mismatch(format!(
                    "row has {} values, field position {idx} is out of range",
                    values.len()
                ))
            })
        })
        .collect()
}

/// Cached positions for one input schema
#[derive(Debug, Clone)]
struct Resolved {
    input: SchemaRef,
    indices: Vec<usize>,
    output: SchemaRef,
}

/// Projector bound to a fixed output field list for a whole run.
///
/// Positions are resolved once per distinct input schema, so every row with
/// the same input schema produces the same output `SchemaRef`.
#[derive(Debug, Clone)]
pub struct FieldProjector {
    output_fields: Vec<String>,
    resolved: Option<Resolved>,
}

impl FieldProjector {
    /// Create a projector for the given output fields
    pub fn new(output_fields: Vec<String>) -> Self {
        Self {
            output_fields,
            resolved: None,
        }
    }

    /// The configured output field names
    pub fn output_fields(&self) -> &[String] {
        &self.output_fields
    }

    /// Project a row onto the output fields
    pub fn project(&mut self, row: &Row) -> Result<Row> {
        let resolved = self.resolve(row.schema())?;
        let values = pick(row.values(), &resolved.indices)?;
        Row::try_new(Arc::clone(&resolved.output), values)
    }

    /// Output schema for an input schema, without a row
    pub fn project_schema(&mut self, input: &SchemaRef) -> Result<SchemaRef> {
        Ok(Arc::clone(&self.resolve(input)?.output))
    }

    fn resolve(&mut self, input: &SchemaRef) -> Result<&Resolved> {
        let stale = match &self.resolved {
            Some(cached) => !Arc::ptr_eq(&cached.input, input) && cached.input != *input,
            None => true,
        };

        if stale {
            let indices = resolve_indices(input, &self.output_fields)?;
            let output = match &self.resolved {
                // Keep the previous output schema when the projection is unchanged
                Some(cached) if *cached.output == *build_schema(input, &indices) => {
                    Arc::clone(&cached.output)
                }
                _ => build_schema(input, &indices),
            };
            self.resolved = Some(Resolved {
                input: Arc::clone(input),
                indices,
                output,
            });
        }

        self.resolved
            .as_ref()
            .ok_or_else(|| Error::schema_mismatch("projection not resolved"))
    }
}
