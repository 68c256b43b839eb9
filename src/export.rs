use std::fmt;

use log::debug;
use parquet::arrow::ArrowWriter;
use rust_xlsxwriter::{DocProperties, ExcelDateTime, Workbook, XlsxError};
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::data::columnar::to_record_batch;
use crate::data::model::{CellValue, Table};
use crate::error::{LensError, Result};

/// Integers beyond this magnitude lose precision as spreadsheet numbers.
const MAX_SPREADSHEET_INT: i64 = 1 << 53;
const MAX_SPREADSHEET_ROWS: usize = 1_048_576;
const MAX_SPREADSHEET_COLUMNS: usize = 16_384;
const MAX_CELL_CHARS: usize = 32_767;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Xlsx,
    Parquet,
    Csv,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Parquet => "parquet",
            ExportFormat::Csv => "csv",
        }
    }
}

/// The three downloadable tables, each with a fixed file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    FilteredTable,
    RawProportions,
    FilteredProportions,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [
        ArtifactKind::FilteredTable,
        ArtifactKind::RawProportions,
        ArtifactKind::FilteredProportions,
    ];

    pub fn stem(self) -> &'static str {
        match self {
            ArtifactKind::FilteredTable => "bank_filtered",
            ArtifactKind::RawProportions => "bank_raw_y",
            ArtifactKind::FilteredProportions => "bank_y",
        }
    }

    pub fn file_name(self, format: ExportFormat) -> String {
        format!("{}.{}", self.stem(), format.extension())
    }
}

/// Serialized bytes of a table, ready to hand to the caller.
#[derive(Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub format: ExportFormat,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for ExportArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportArtifact")
            .field("file_name", &self.file_name)
            .field("format", &self.format)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Serialize `table` with default settings.
pub fn export(table: &Table, format: ExportFormat) -> Result<ExportArtifact> {
    Exporter::new(format).export(table)
}

#[derive(Debug, Clone)]
pub struct Exporter {
    format: ExportFormat,
    sheet_name: String,
    delimiter: u8,
}

impl Exporter {
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            sheet_name: "Data".into(),
            delimiter: b';',
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            format: config.export_format,
            sheet_name: config.sheet_name.clone(),
            delimiter: config.delimiter_byte()?,
        })
    }

    pub fn with_sheet_name(mut self, name: impl Into<String>) -> Self {
        self.sheet_name = name.into();
        self
    }

    pub fn format(&self) -> ExportFormat {
        self.format
    }

    /// Serialize `table`. Only unrepresentable cell content fails, with
    /// [`LensError::Serialization`].
    pub fn export(&self, table: &Table) -> Result<ExportArtifact> {
        let file_name = format!("table.{}", self.format.extension());
        self.export_as(table, file_name)
    }

    /// Serialize `table` under the fixed file name of `kind`.
    pub fn export_named(&self, table: &Table, kind: ArtifactKind) -> Result<ExportArtifact> {
        self.export_as(table, kind.file_name(self.format))
    }

    fn export_as(&self, table: &Table, file_name: String) -> Result<ExportArtifact> {
        let bytes = match self.format {
            ExportFormat::Xlsx => self.to_xlsx(table)?,
            ExportFormat::Parquet => to_parquet(table)?,
            ExportFormat::Csv => self.to_csv(table)?,
        };
        debug!("Exported {file_name}: {} rows, {} bytes", table.num_rows(), bytes.len());
        Ok(ExportArtifact {
            file_name,
            format: self.format,
            bytes,
        })
    }

    fn to_xlsx(&self, table: &Table) -> Result<Vec<u8>> {
        if table.num_rows() + 1 > MAX_SPREADSHEET_ROWS {
            return Err(LensError::Serialization(format!(
                "{} rows exceed the worksheet limit",
                table.num_rows()
            )));
        }
        if table.num_columns() > MAX_SPREADSHEET_COLUMNS {
            return Err(LensError::Serialization(format!(
                "{} columns exceed the worksheet limit",
                table.num_columns()
            )));
        }

        let mut workbook = Workbook::new();
        // A fixed creation time keeps the bytes a function of the table alone.
        let created = ExcelDateTime::from_ymd(2000, 1, 1).map_err(xlsx_err)?;
        workbook.set_properties(&DocProperties::new().set_creation_datetime(&created));

        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&self.sheet_name).map_err(xlsx_err)?;

        for (c, column) in table.columns().iter().enumerate() {
            let col = c as u16;
            worksheet
                .write_string(0, col, column.name())
                .map_err(xlsx_err)?;

            for (r, cell) in column.values().iter().enumerate() {
                let row = (r + 1) as u32;
                let written = match cell {
                    CellValue::Null => continue,
                    CellValue::Integer(i) => {
                        if i.unsigned_abs() > MAX_SPREADSHEET_INT as u64 {
                            return Err(unrepresentable(column.name(), r, cell));
                        }
                        worksheet.write_number(row, col, *i as f64)
                    }
                    CellValue::Float(f) => {
                        if !f.is_finite() {
                            return Err(unrepresentable(column.name(), r, cell));
                        }
                        worksheet.write_number(row, col, *f)
                    }
                    CellValue::Bool(b) => worksheet.write_boolean(row, col, *b),
                    CellValue::Text(s) => {
                        if s.chars().count() > MAX_CELL_CHARS {
                            return Err(unrepresentable(column.name(), r, cell));
                        }
                        worksheet.write_string(row, col, s)
                    }
                };
                written.map_err(xlsx_err)?;
            }
        }

        workbook.save_to_buffer().map_err(xlsx_err)
    }

    fn to_csv(&self, table: &Table) -> Result<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_writer(Vec::new());
        writer
            .write_record(table.column_names())
            .map_err(|e| LensError::Serialization(format!("writing CSV header: {e}")))?;
        for i in 0..table.num_rows() {
            let row = table.row(i).unwrap_or_default();
            writer
                .write_record(row.iter().map(|cell| cell.to_string()))
                .map_err(|e| LensError::Serialization(format!("writing CSV row {i}: {e}")))?;
        }
        writer
            .into_inner()
            .map_err(|e| LensError::Serialization(format!("flushing CSV: {e}")))
    }
}

fn to_parquet(table: &Table) -> Result<Vec<u8>> {
    let batch = to_record_batch(table)?;
    let mut writer = ArrowWriter::try_new(Vec::new(), batch.schema(), None)
        .map_err(|e| LensError::Serialization(format!("creating parquet writer: {e}")))?;
    writer
        .write(&batch)
        .map_err(|e| LensError::Serialization(format!("writing parquet batch: {e}")))?;
    writer
        .into_inner()
        .map_err(|e| LensError::Serialization(format!("closing parquet writer: {e}")))
}

fn xlsx_err(e: XlsxError) -> LensError {
    LensError::Serialization(format!("xlsx: {e}"))
}

fn unrepresentable(column: &str, row: usize, cell: &CellValue) -> LensError {
    let shown: String = cell.to_string().chars().take(40).collect();
    LensError::Serialization(format!(
        "column '{column}' row {row}: value {shown} cannot be stored in a spreadsheet"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::{load, DataFormat};
    use crate::data::model::Column;

    fn table() -> Table {
        Table::new(vec![
            Column::from_cells("age", vec![30i64.into(), 41i64.into(), 57i64.into()]),
            Column::from_cells("balance", vec![1.5.into(), CellValue::Null, (-20.25).into()]),
            Column::from_cells("job", vec!["admin.".into(), "blue-collar".into(), "a;b".into()]),
            Column::from_cells("y", vec!["no".into(), "yes".into(), "no".into()]),
        ])
        .unwrap()
    }

    #[test]
    fn test_xlsx_round_trip() {
        let artifact = export(&table(), ExportFormat::Xlsx).unwrap();
        assert_eq!(artifact.file_name, "table.xlsx");
        // zip magic
        assert_eq!(&artifact.bytes[..2], b"PK");

        let back = load(&artifact.bytes, DataFormat::Xlsx).unwrap();
        assert_eq!(back, table());
    }

    #[test]
    fn test_xlsx_is_deterministic() {
        let a = export(&table(), ExportFormat::Xlsx).unwrap();
        let b = export(&table(), ExportFormat::Xlsx).unwrap();
        assert_eq!(a.bytes, b.bytes);
    }

    #[test]
    fn test_parquet_round_trip() {
        let artifact = export(&table(), ExportFormat::Parquet).unwrap();
        let back = load(&artifact.bytes, DataFormat::Parquet).unwrap();
        assert_eq!(back, table());
    }

    #[test]
    fn test_csv_round_trip_quotes_delimiter() {
        let artifact = export(&table(), ExportFormat::Csv).unwrap();
        let text = String::from_utf8(artifact.bytes.clone()).unwrap();
        assert!(text.starts_with("age;balance;job;y\n"));
        assert!(text.contains("\"a;b\""));

        let back = load(&artifact.bytes, DataFormat::Csv { delimiter: b';' }).unwrap();
        assert_eq!(back, table());
    }

    #[test]
    fn test_named_artifacts() {
        let exporter = Exporter::new(ExportFormat::Xlsx);
        let artifact = exporter
            .export_named(&table(), ArtifactKind::RawProportions)
            .unwrap();
        assert_eq!(artifact.file_name, "bank_raw_y.xlsx");
        assert_eq!(ArtifactKind::FilteredTable.file_name(ExportFormat::Csv), "bank_filtered.csv");
        assert_eq!(ArtifactKind::FilteredProportions.stem(), "bank_y");
    }

    #[test]
    fn test_unrepresentable_values() {
        let huge = Table::new(vec![Column::from_cells("n", vec![i64::MAX.into()])]).unwrap();
        assert!(matches!(
            export(&huge, ExportFormat::Xlsx),
            Err(LensError::Serialization(_))
        ));

        let inf = Table::new(vec![Column::from_cells("f", vec![f64::INFINITY.into()])]).unwrap();
        assert!(matches!(
            export(&inf, ExportFormat::Xlsx),
            Err(LensError::Serialization(_))
        ));

        let long = "x".repeat(MAX_CELL_CHARS + 1);
        let text = Table::new(vec![Column::from_cells("t", vec![long.into()])]).unwrap();
        assert!(matches!(
            export(&text, ExportFormat::Xlsx),
            Err(LensError::Serialization(_))
        ));
    }

    #[test]
    fn test_export_does_not_touch_table() {
        let source = table();
        let before = source.fingerprint();
        export(&source, ExportFormat::Xlsx).unwrap();
        assert_eq!(source, table());
        assert_eq!(source.fingerprint(), before);
    }
}
