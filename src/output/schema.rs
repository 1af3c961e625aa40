//! Row to Arrow conversion
//!
//! Provides utilities for inferring Arrow schemas from JSON rows,
//! building RecordBatches from buffered row values, and rendering
//! batches back to JSON.

use crate::error::{Error, Result};
use crate::types::{JsonObject, JsonValue};
use arrow::array::{
    ArrayRef, BooleanArray, Float64Array, Int64Array, ListArray, NullArray, StringArray,
    StructArray,
};
use arrow::buffer::{NullBuffer, OffsetBuffer};
use arrow::compute::{cast_with_options, CastOptions};
use arrow::datatypes::{DataType, Field, Fields, Schema, SchemaRef};
use arrow::json::writer::JsonArray;
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

/// Infer an Arrow schema from a single JSON object
///
/// Fields follow the object's key order and are all nullable.
pub fn infer_row_schema(record: &JsonObject) -> Schema {
    let fields: Vec<Field> = record
        .iter()
        .map(|(name, value)| Field::new(name, infer_type(value), true))
        .collect();
    Schema::new(fields)
}

/// Infer Arrow DataType from a JSON value
pub fn infer_type(value: &JsonValue) -> DataType {
    match value {
        // Untyped until a value shows up; strings accept anything
        JsonValue::Null => DataType::Utf8,
        JsonValue::Bool(_) => DataType::Boolean,
        JsonValue::Number(n) => {
            if n.is_i64() {
                DataType::Int64
            } else {
                DataType::Float64
            }
        }
        JsonValue::String(_) => DataType::Utf8,
        JsonValue::Array(arr) => {
            // Infer from first non-null element
            let element_type = arr
                .iter()
                .find(|v| !v.is_null())
                .map_or(DataType::Utf8, infer_type);
            DataType::List(Arc::new(Field::new("item", element_type, true)))
        }
        JsonValue::Object(obj) => {
            let fields: Vec<Field> = obj
                .iter()
                .map(|(k, v)| Field::new(k, infer_type(v), true))
                .collect();
            DataType::Struct(Fields::from(fields))
        }
    }
}

/// Build a RecordBatch from rows of values aligned with `schema`
///
/// A non-null value that cannot be stored in its column is an error; it is
/// never written as null.
pub fn rows_to_batch(schema: &SchemaRef, rows: &[Vec<JsonValue>]) -> Result<RecordBatch> {
    if rows.is_empty() {
        return Ok(RecordBatch::new_empty(Arc::clone(schema)));
    }

    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());

    for (col_idx, field) in schema.fields().iter().enumerate() {
        let values: Vec<Option<&JsonValue>> = rows
            .iter()
            .map(|row| row.get(col_idx).filter(|v| !v.is_null()))
            .collect();

        columns.push(build_array(field.name(), &values, field.data_type())?);
    }

    RecordBatch::try_new(Arc::clone(schema), columns).map_err(|e| {
        Error::writer(format!("Failed to create RecordBatch: {e}"))
    })
}

/// Check that `value` fits a column of `data_type`.
///
/// Types outside the natively built set are checked when the batch is cast.
pub fn check_value(column: &str, value: &JsonValue, data_type: &DataType) -> Result<()> {
    let fits = match (value, data_type) {
        (JsonValue::Null, _) | (_, DataType::Utf8) => true,
        (_, DataType::Null) => false,
        (v, DataType::Boolean) => v.is_boolean(),
        (v, DataType::Int64) => v.is_i64(),
        (v, DataType::Float64) => v.is_number(),
        (JsonValue::Array(items), DataType::List(field)) => {
            for item in items {
                check_value(column, item, field.data_type())?;
            }
            true
        }
        (JsonValue::Object(obj), DataType::Struct(fields)) => {
            for field in fields {
                if let Some(child) = obj.get(field.name()) {
                    check_value(column, child, field.data_type())?;
                }
            }
            true
        }
        (_, DataType::List(_) | DataType::Struct(_)) => false,
        _ => true,
    };

    if fits {
        Ok(())
    } else {
        Err(invalid_value(column, value, data_type))
    }
}

fn invalid_value(column: &str, value: &JsonValue, data_type: &DataType) -> Error {
    Error::writer(format!(
        "value {value} is not a valid {data_type} for column '{column}'"
    ))
}

/// Convert each present value, failing on the first one that does not fit
fn convert<T>(
    column: &str,
    values: &[Option<&JsonValue>],
    data_type: &DataType,
    f: impl Fn(&JsonValue) -> Option<T>,
) -> Result<Vec<Option<T>>> {
    values
        .iter()
        .map(|v| {
            v.map(|v| f(v).ok_or_else(|| invalid_value(column, v, data_type)))
                .transpose()
        })
        .collect()
}

/// Build an Arrow array from JSON values
fn build_array(
    column: &str,
    values: &[Option<&JsonValue>],
    data_type: &DataType,
) -> Result<ArrayRef> {
    match data_type {
        DataType::Null => {
            if let Some(v) = values.iter().flatten().next() {
                return Err(invalid_value(column, v, data_type));
            }
            Ok(Arc::new(NullArray::new(values.len())))
        }

        DataType::Boolean => Ok(Arc::new(BooleanArray::from(convert(
            column,
            values,
            data_type,
            JsonValue::as_bool,
        )?))),

        DataType::Int64 => Ok(Arc::new(Int64Array::from(convert(
            column,
            values,
            data_type,
            JsonValue::as_i64,
        )?))),

        DataType::Float64 => Ok(Arc::new(Float64Array::from(convert(
            column,
            values,
            data_type,
            JsonValue::as_f64,
        )?))),

        DataType::Utf8 => Ok(Arc::new(build_string_array(values))),

        DataType::List(field) => build_list_array(column, values, field),

        DataType::Struct(fields) => build_struct_array(column, values, fields),

        // Everything else goes through Arrow's string casts
        other => {
            let strings: ArrayRef = Arc::new(build_string_array(values));
            let options = CastOptions {
                safe: false,
                ..Default::default()
            };
            cast_with_options(&strings, other, &options).map_err(|e| {
                Error::writer(format!(
                    "Cannot convert values to {other} for column '{column}': {e}"
                ))
            })
        }
    }
}

fn build_string_array(values: &[Option<&JsonValue>]) -> StringArray {
    values
        .iter()
        .map(|v| {
            v.map(|v| match v {
                JsonValue::String(s) => s.clone(),
                _ => v.to_string(),
            })
        })
        .collect()
}

/// Build a list array from JSON arrays
fn build_list_array(
    column: &str,
    values: &[Option<&JsonValue>],
    field: &Arc<Field>,
) -> Result<ArrayRef> {
    let mut all_items: Vec<Option<&JsonValue>> = Vec::new();
    let mut offsets: Vec<i32> = vec![0];
    let mut validity: Vec<bool> = Vec::with_capacity(values.len());

    for value in values {
        match value {
            Some(JsonValue::Array(arr)) => {
                all_items.extend(arr.iter().map(|item| Some(item).filter(|v| !v.is_null())));
                validity.push(true);
            }
            Some(other) => {
                return Err(invalid_value(
                    column,
                    other,
                    &DataType::List(Arc::clone(field)),
                ))
            }
            None => validity.push(false),
        }
        let offset = i32::try_from(all_items.len())
            .map_err(|_| Error::writer("Array too large for i32 offset"))?;
        offsets.push(offset);
    }

    let items_array = build_array(column, &all_items, field.data_type())?;
    let offset_buffer = OffsetBuffer::new(offsets.into());
    let nulls = NullBuffer::from(validity);

    let list_array =
        ListArray::try_new(Arc::clone(field), offset_buffer, items_array, Some(nulls))?;
    Ok(Arc::new(list_array))
}

/// Build a struct array from JSON objects
fn build_struct_array(
    column: &str,
    values: &[Option<&JsonValue>],
    fields: &Fields,
) -> Result<ArrayRef> {
    let mut validity: Vec<bool> = Vec::with_capacity(values.len());
    for value in values {
        match value {
            Some(JsonValue::Object(_)) => validity.push(true),
            Some(other) => {
                return Err(invalid_value(
                    column,
                    other,
                    &DataType::Struct(fields.clone()),
                ))
            }
            None => validity.push(false),
        }
    }

    let mut child_arrays: Vec<ArrayRef> = Vec::new();

    for field in fields {
        let child_values: Vec<Option<&JsonValue>> = values
            .iter()
            .map(|v| {
                v.and_then(|v| v.get(field.name()))
                    .filter(|v| !v.is_null())
            })
            .collect();

        child_arrays.push(build_array(column, &child_values, field.data_type())?);
    }

    let struct_array =
        StructArray::try_new(fields.clone(), child_arrays, Some(NullBuffer::from(validity)))?;
    Ok(Arc::new(struct_array))
}

/// Convert an Arrow RecordBatch to JSON records
///
/// Returns one JSON object per row; nulls are kept as explicit `null`s.
pub fn arrow_to_json(batch: &RecordBatch) -> Result<Vec<JsonValue>> {
    let mut writer = arrow::json::WriterBuilder::new()
        .with_explicit_nulls(true)
        .build::<_, JsonArray>(Vec::new());
    writer.write(batch)?;
    writer.finish()?;

    let buf = writer.into_inner();
    if buf.is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_slice(&buf)?)
}
