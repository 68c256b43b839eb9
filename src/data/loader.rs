use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;

use calamine::{Data, Reader, Xlsx};
use log::{debug, info};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::columnar::from_record_batches;
use super::model::{CellValue, Column, Table};
use crate::error::{LensError, Result};

/// Largest magnitude below which every integral `f64` is an exact `i64`.
const MAX_EXACT_FLOAT_INT: f64 = 9_007_199_254_740_992.0;

/// Input encodings understood by [`load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    /// Delimited text with a header row.
    Csv { delimiter: u8 },
    /// Records-oriented JSON: `[{ "age": 30, "job": "admin." }, ...]`.
    Json,
    Parquet,
    /// First worksheet of an Office Open XML workbook, header in row one.
    Xlsx,
}

impl DataFormat {
    /// Pick a format from a file extension. `delimiter` applies to CSV.
    pub fn from_extension(ext: &str, delimiter: u8) -> Result<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" | "txt" => Ok(DataFormat::Csv { delimiter }),
            "json" => Ok(DataFormat::Json),
            "parquet" | "pq" => Ok(DataFormat::Parquet),
            "xlsx" | "xlsm" => Ok(DataFormat::Xlsx),
            other => Err(LensError::parse(
                "file extension",
                format!("unsupported file extension: .{other}"),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Parse an uploaded byte buffer into a table.
///
/// Fails with [`LensError::Parse`] when the bytes cannot be decoded and with
/// [`LensError::Schema`] when no (or unusable) columns are found. A partially
/// decoded table is never returned.
pub fn load(bytes: &[u8], format: DataFormat) -> Result<Table> {
    let table = match format {
        DataFormat::Csv { delimiter } => load_csv(bytes, delimiter),
        DataFormat::Json => load_json(bytes),
        DataFormat::Parquet => load_parquet(bytes),
        DataFormat::Xlsx => load_xlsx(bytes),
    }?;

    if table.num_columns() == 0 {
        return Err(LensError::Schema("no columns detected".into()));
    }
    info!(
        "Loaded {:?} table: {} rows x {} columns",
        format,
        table.num_rows(),
        table.num_columns()
    );
    Ok(table)
}

/// Load a table from a file.  Dispatch by extension.
pub fn load_file(path: &Path, delimiter: u8) -> Result<Table> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let format = DataFormat::from_extension(ext, delimiter)?;
    let bytes = std::fs::read(path)?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());
    load(&bytes, format)
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

fn load_csv(bytes: &[u8], delimiter: u8) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(bytes);

    let names: Vec<String> = reader
        .headers()
        .map_err(|e| LensError::parse("CSV header", e))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();
    check_names(&names)?;

    let mut tokens: Vec<Vec<String>> = vec![Vec::new(); names.len()];
    for (row_no, result) in reader.records().enumerate() {
        let record = result.map_err(|e| LensError::parse(format!("CSV record {}", row_no + 1), e))?;
        for (col_idx, value) in record.iter().enumerate() {
            tokens[col_idx].push(value.to_string());
        }
    }

    Table::new(
        names
            .into_iter()
            .zip(tokens)
            .map(|(name, values)| Column::infer(name, &values))
            .collect(),
    )
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Records-oriented JSON, the default `df.to_json(orient='records')`.
/// Keys missing from a record are null.
fn load_json(bytes: &[u8]) -> Result<Table> {
    let root: JsonValue = serde_json::from_slice(bytes).map_err(|e| LensError::parse("JSON", e))?;
    let records = root
        .as_array()
        .ok_or_else(|| LensError::parse("JSON", "expected top-level JSON array"))?;

    let mut names: Vec<String> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut cells: Vec<Vec<CellValue>> = Vec::new();

    for (row, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .ok_or_else(|| LensError::parse(format!("JSON record {row}"), "not a JSON object"))?;

        for (key, val) in obj {
            let col_idx = *index.entry(key.clone()).or_insert_with(|| {
                names.push(key.clone());
                cells.push(vec![CellValue::Null; row]);
                cells.len() - 1
            });
            cells[col_idx].push(json_to_cell(val));
        }
        for col in &mut cells {
            col.resize(row + 1, CellValue::Null);
        }
    }

    check_names(&names)?;
    Table::new(
        names
            .into_iter()
            .zip(cells)
            .map(|(name, values)| Column::from_cells(name, values))
            .collect(),
    )
}

fn json_to_cell(val: &JsonValue) -> CellValue {
    match val {
        JsonValue::String(s) => CellValue::Text(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                CellValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                CellValue::Float(f)
            } else {
                CellValue::Text(n.to_string())
            }
        }
        JsonValue::Bool(b) => CellValue::Bool(*b),
        JsonValue::Null => CellValue::Null,
        other => CellValue::Text(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

fn load_parquet(bytes: &[u8]) -> Result<Table> {
    let buf = bytes::Bytes::copy_from_slice(bytes);
    let builder = ParquetRecordBatchReaderBuilder::try_new(buf)
        .map_err(|e| LensError::parse("parquet metadata", e))?;
    let schema = builder.schema().clone();
    let reader = builder
        .build()
        .map_err(|e| LensError::parse("parquet reader", e))?;

    let batches = reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| LensError::parse("parquet record batch", e))?;

    let names: Vec<String> = schema.fields().iter().map(|f| f.name().clone()).collect();
    check_names(&names)?;
    from_record_batches(&schema, &batches)
}

// ---------------------------------------------------------------------------
// XLSX loader
// ---------------------------------------------------------------------------

fn load_xlsx(bytes: &[u8]) -> Result<Table> {
    let mut workbook: Xlsx<_> =
        Xlsx::new(Cursor::new(bytes)).map_err(|e| LensError::parse("XLSX workbook", e))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| LensError::Schema("workbook has no worksheets".into()))?
        .map_err(|e| LensError::parse("XLSX worksheet", e))?;

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Err(LensError::Schema("no columns detected".into()));
    };
    let names: Vec<String> = header.iter().map(cell_token).collect();
    check_names(&names)?;

    let mut tokens: Vec<Vec<String>> = vec![Vec::new(); names.len()];
    for row in rows {
        for (col_idx, cell) in row.iter().enumerate().take(names.len()) {
            tokens[col_idx].push(cell_token(cell));
        }
    }

    Table::new(
        names
            .into_iter()
            .zip(tokens)
            .map(|(name, values)| Column::infer(name, &values))
            .collect(),
    )
}

/// Undo the `_xHHHH_` escapes spreadsheet writers use for control characters
/// and for a literal `_x` prefix (`_x005F_` is `_`).
fn decode_ooxml_escapes(s: &str) -> String {
    if !s.contains("_x") {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find("_x") {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        let decoded = tail
            .get(2..6)
            .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
            .filter(|_| tail.as_bytes().get(6) == Some(&b'_'))
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .and_then(char::from_u32);
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &tail[7..];
            }
            None => {
                out.push_str("_x");
                rest = &tail[2..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Spreadsheet cells become text tokens so they share CSV type inference.
/// Integral floats are written without a fraction and read back as integers.
fn cell_token(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => decode_ooxml_escapes(s),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < MAX_EXACT_FLOAT_INT => {
            (*f as i64).to_string()
        }
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn check_names(names: &[String]) -> Result<()> {
    if let Some(pos) = names.iter().position(|n| n.is_empty()) {
        return Err(LensError::Schema(format!("column {pos} has an empty header")));
    }
    Ok(())
}
