//! Conversion between [`Table`] and Arrow record batches.
//!
//! Used by the Parquet loader and exporter, and for the pretty-printed table
//! previews the batch driver logs.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{
    DataType, Field, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, Schema,
    UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use arrow::util::display::array_value_to_string;
use arrow::util::pretty::pretty_format_batches;

use super::model::{CellValue, Column, ColumnKind, Table};
use crate::error::{LensError, Result};

/// Build a single record batch holding the whole table.
pub fn to_record_batch(table: &Table) -> Result<RecordBatch> {
    let fields: Vec<Field> = table
        .columns()
        .iter()
        .map(|c| Field::new(c.name(), arrow_type(c.kind()), true))
        .collect();
    let arrays: Vec<ArrayRef> = table.columns().iter().map(to_array).collect();

    let options = RecordBatchOptions::new().with_row_count(Some(table.num_rows()));
    RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), arrays, &options)
        .map_err(|e| LensError::Serialization(format!("building record batch: {e}")))
}

/// Collect record batches sharing `schema` into a table.
pub fn from_record_batches(schema: &Schema, batches: &[RecordBatch]) -> Result<Table> {
    let mut cells: Vec<Vec<CellValue>> = vec![Vec::new(); schema.fields().len()];

    for batch in batches {
        for (col_idx, array) in batch.columns().iter().enumerate() {
            let Some(target) = cells.get_mut(col_idx) else {
                return Err(LensError::Schema(format!(
                    "record batch has {} columns, schema has {}",
                    batch.num_columns(),
                    schema.fields().len()
                )));
            };
            for row in 0..batch.num_rows() {
                target.push(cell_at(array, row)?);
            }
        }
    }

    let columns = schema
        .fields()
        .iter()
        .zip(cells)
        .map(|(field, values)| match column_kind(field.data_type()) {
            Some(kind) => Column::new(field.name().clone(), kind, values),
            None => Ok(Column::from_cells(field.name().clone(), values)),
        })
        .collect::<Result<Vec<_>>>()?;
    Table::new(columns)
}

/// Render a table as an ASCII grid.
pub fn pretty(table: &Table) -> Result<String> {
    let batch = to_record_batch(table)?;
    pretty_format_batches(&[batch])
        .map(|d| d.to_string())
        .map_err(|e| LensError::Serialization(format!("formatting table: {e}")))
}

fn arrow_type(kind: ColumnKind) -> DataType {
    match kind {
        ColumnKind::Integer => DataType::Int64,
        ColumnKind::Float => DataType::Float64,
        ColumnKind::Bool => DataType::Boolean,
        ColumnKind::Text => DataType::Utf8,
    }
}

/// Arrow types that map onto one column kind without loss.
fn column_kind(data_type: &DataType) -> Option<ColumnKind> {
    match data_type {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32 => Some(ColumnKind::Integer),
        DataType::Float32 | DataType::Float64 => Some(ColumnKind::Float),
        DataType::Boolean => Some(ColumnKind::Bool),
        DataType::Utf8 | DataType::LargeUtf8 => Some(ColumnKind::Text),
        _ => None,
    }
}

fn to_array(column: &Column) -> ArrayRef {
    let values = column.values();
    match column.kind() {
        ColumnKind::Integer => Arc::new(Int64Array::from(
            values
                .iter()
                .map(|v| match v {
                    CellValue::Integer(i) => Some(*i),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        ColumnKind::Float => Arc::new(Float64Array::from(
            values.iter().map(CellValue::as_f64).collect::<Vec<_>>(),
        )),
        ColumnKind::Bool => Arc::new(BooleanArray::from(
            values
                .iter()
                .map(|v| match v {
                    CellValue::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        ColumnKind::Text => Arc::new(StringArray::from(
            values
                .iter()
                .map(|v| match v {
                    CellValue::Text(s) => Some(s.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
    }
}

/// Extract a single cell from an Arrow column at a given row.
fn cell_at(col: &ArrayRef, row: usize) -> Result<CellValue> {
    if col.is_null(row) {
        return Ok(CellValue::Null);
    }
    let cell = match col.data_type() {
        DataType::Utf8 => CellValue::Text(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => CellValue::Text(col.as_string::<i64>().value(row).to_string()),
        DataType::Int8 => CellValue::Integer(col.as_primitive::<Int8Type>().value(row).into()),
        DataType::Int16 => CellValue::Integer(col.as_primitive::<Int16Type>().value(row).into()),
        DataType::Int32 => CellValue::Integer(col.as_primitive::<Int32Type>().value(row).into()),
        DataType::Int64 => CellValue::Integer(col.as_primitive::<Int64Type>().value(row)),
        DataType::UInt8 => CellValue::Integer(col.as_primitive::<UInt8Type>().value(row).into()),
        DataType::UInt16 => CellValue::Integer(col.as_primitive::<UInt16Type>().value(row).into()),
        DataType::UInt32 => CellValue::Integer(col.as_primitive::<UInt32Type>().value(row).into()),
        DataType::UInt64 => {
            let v = col.as_primitive::<UInt64Type>().value(row);
            i64::try_from(v).map_or(CellValue::Text(v.to_string()), CellValue::Integer)
        }
        DataType::Float32 => CellValue::Float(col.as_primitive::<Float32Type>().value(row).into()),
        DataType::Float64 => CellValue::Float(col.as_primitive::<Float64Type>().value(row)),
        DataType::Boolean => CellValue::Bool(col.as_boolean().value(row)),
        _ => CellValue::Text(
            array_value_to_string(col.as_ref(), row)
                .map_err(|e| LensError::parse("arrow column", e))?,
        ),
    };
    Ok(cell)
}
