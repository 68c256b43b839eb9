use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::filter::WILDCARD;
use crate::error::{LensError, Result};
use crate::export::ExportFormat;

/// Column roles and output settings for one dataset layout.
///
/// Every field has a default matching the bank-marketing export, so a config
/// file only needs the fields it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Column filtered by the numeric range.
    pub numeric_column: String,
    /// Columns offered as categorical filters, in display order.
    pub categorical_columns: Vec<String>,
    /// Outcome column summarised into proportions.
    pub target_column: String,
    /// Category value that disables a categorical filter.
    pub wildcard: String,
    /// Single-byte field delimiter for delimited-text input.
    pub csv_delimiter: char,
    /// Worksheet name used for spreadsheet exports.
    pub sheet_name: String,
    pub export_format: ExportFormat,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            numeric_column: "age".into(),
            categorical_columns: [
                "job",
                "marital",
                "default",
                "housing",
                "loan",
                "contact",
                "month",
                "day_of_week",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            target_column: "y".into(),
            wildcard: WILDCARD.into(),
            csv_delimiter: ';',
            sheet_name: "Data".into(),
            export_format: ExportFormat::Xlsx,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: PipelineConfig =
            serde_json::from_str(text).map_err(|e| LensError::Config(format!("parsing config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// The delimiter as the byte the CSV reader expects.
    pub fn delimiter_byte(&self) -> Result<u8> {
        u8::try_from(self.csv_delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| {
                LensError::Config(format!(
                    "csv_delimiter '{}' is not a single ASCII character",
                    self.csv_delimiter
                ))
            })
    }

    fn validate(&self) -> Result<()> {
        self.delimiter_byte()?;
        if self.wildcard.is_empty() {
            return Err(LensError::Config("wildcard must not be empty".into()));
        }
        if self.sheet_name.is_empty() || self.sheet_name.chars().count() > 31 {
            return Err(LensError::Config(format!(
                "sheet_name '{}' must have 1 to 31 characters",
                self.sheet_name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_bank_layout() {
        let config = PipelineConfig::default();
        assert_eq!(config.numeric_column, "age");
        assert_eq!(config.target_column, "y");
        assert_eq!(config.categorical_columns.len(), 8);
        assert_eq!(config.delimiter_byte().unwrap(), b';');
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = PipelineConfig::from_json_str(
            r#"{"target_column": "outcome", "csv_delimiter": ",", "export_format": "parquet"}"#,
        )
        .unwrap();
        assert_eq!(config.target_column, "outcome");
        assert_eq!(config.delimiter_byte().unwrap(), b',');
        assert_eq!(config.export_format, ExportFormat::Parquet);
        assert_eq!(config.wildcard, WILDCARD);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            PipelineConfig::from_json_str(r#"{"csv_delimiter": "é"}"#),
            Err(LensError::Config(_))
        ));
        assert!(matches!(
            PipelineConfig::from_json_str(r#"{"wildcard": ""}"#),
            Err(LensError::Config(_))
        ));
        assert!(matches!(PipelineConfig::from_json_str("{"), Err(LensError::Config(_))));
    }
}
