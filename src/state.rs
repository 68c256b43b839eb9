use std::sync::Arc;

use log::info;

use crate::cache::{CachedFilterEngine, FilterCache, MemoCache};
use crate::config::PipelineConfig;
use crate::data::filter::FilterSpec;
use crate::data::model::{Column, Table};
use crate::data::summary::{summarize, ProportionSummary};
use crate::error::{LensError, Result};
use crate::export::{ArtifactKind, ExportArtifact, Exporter};

// ---------------------------------------------------------------------------
// Filter options offered to the presentation layer
// ---------------------------------------------------------------------------

/// Choices for one categorical filter widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryOptions {
    pub column: String,
    /// Distinct values in first-appearance order, followed by the wildcard.
    pub values: Vec<String>,
}

/// Everything needed to draw the filter form for a loaded table.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOptions {
    pub numeric_column: String,
    /// Whole-number slider bounds covering every value, `None` when the
    /// column holds no numbers.
    pub numeric_bounds: Option<(i64, i64)>,
    pub categories: Vec<CategoryOptions>,
    pub wildcard: String,
}

impl FilterOptions {
    /// Fails with [`LensError::Schema`] when a configured filter column is
    /// absent from `table`.
    pub fn from_table(table: &Table, config: &PipelineConfig) -> Result<Self> {
        expect_column(table, &config.numeric_column)?;
        let numeric_bounds = table
            .numeric_bounds(&config.numeric_column)?
            .map(|(lo, hi)| (lo.floor() as i64, hi.ceil() as i64));

        let categories = config
            .categorical_columns
            .iter()
            .map(|name| {
                let column = expect_column(table, name)?;
                let mut values = column.distinct_labels();
                values.push(config.wildcard.clone());
                Ok(CategoryOptions {
                    column: name.clone(),
                    values,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(FilterOptions {
            numeric_column: config.numeric_column.clone(),
            numeric_bounds,
            categories,
            wildcard: config.wildcard.clone(),
        })
    }

    /// The initial form state: full numeric range, wildcard everywhere.
    pub fn default_spec(&self) -> Result<FilterSpec> {
        let mut builder = FilterSpec::builder().wildcard(self.wildcard.clone());
        if let Some((lo, hi)) = self.numeric_bounds {
            builder = builder.numeric_range(self.numeric_column.clone(), lo as f64, hi as f64);
        }
        for category in &self.categories {
            builder = builder.allow_all(category.column.clone());
        }
        builder.build()
    }
}

fn expect_column<'a>(table: &'a Table, name: &str) -> Result<&'a Column> {
    table
        .column(name)
        .ok_or_else(|| LensError::Schema(format!("expected filter column '{name}' is missing")))
}

// ---------------------------------------------------------------------------
// Raw vs. filtered comparison
// ---------------------------------------------------------------------------

/// Result of one pipeline run.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub filtered: Arc<Table>,
    pub raw_summary: ProportionSummary,
    pub filtered_summary: ProportionSummary,
}

impl Comparison {
    /// The filtered summary listed in the raw summary's category order.
    pub fn aligned_filtered_summary(&self) -> ProportionSummary {
        self.filtered_summary.aligned_to(&self.raw_summary)
    }

    /// Export the filtered table and both summaries under their fixed names.
    pub fn export_all(&self, exporter: &Exporter) -> Result<Vec<ExportArtifact>> {
        ArtifactKind::ALL
            .iter()
            .map(|&kind| {
                let table = match kind {
                    ArtifactKind::FilteredTable => return exporter.export_named(&self.filtered, kind),
                    ArtifactKind::RawProportions => self.raw_summary.to_table()?,
                    ArtifactKind::FilteredProportions => self.filtered_summary.to_table()?,
                };
                exporter.export_named(&table, kind)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A loaded dataset and the derived values that never change for it.
///
/// The raw table is shared read-only; every call to [`SessionState::compare`]
/// returns fresh values and leaves the session untouched apart from the
/// filter cache.
pub struct SessionState<C: FilterCache = MemoCache> {
    raw: Arc<Table>,
    config: PipelineConfig,
    options: FilterOptions,
    raw_summary: ProportionSummary,
    engine: CachedFilterEngine<C>,
}

impl SessionState<MemoCache> {
    pub fn new(raw: Table, config: PipelineConfig) -> Result<Self> {
        Self::with_cache(raw, config, MemoCache::new())
    }
}

impl<C: FilterCache> SessionState<C> {
    /// Ingest a newly loaded table. A missing filter column is a
    /// [`LensError::Schema`] error, a missing target column
    /// [`LensError::MissingColumn`].
    pub fn with_cache(raw: Table, config: PipelineConfig, cache: C) -> Result<Self> {
        let options = FilterOptions::from_table(&raw, &config)?;
        let raw_summary = summarize(&raw, &config.target_column)?;
        info!(
            "Session ready: {} rows, {} filterable columns",
            raw.num_rows(),
            options.categories.len()
        );
        Ok(SessionState {
            raw: Arc::new(raw),
            config,
            options,
            raw_summary,
            engine: CachedFilterEngine::new(cache),
        })
    }

    pub fn raw(&self) -> &Arc<Table> {
        &self.raw
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    pub fn raw_summary(&self) -> &ProportionSummary {
        &self.raw_summary
    }

    pub fn engine(&self) -> &CachedFilterEngine<C> {
        &self.engine
    }

    /// Filter the raw table and summarise both views.
    pub fn compare(&self, spec: &FilterSpec) -> Result<Comparison> {
        let filtered = self.engine.apply(&self.raw, spec)?;
        let filtered_summary = summarize(&filtered, &self.config.target_column)?;
        info!(
            "Filter kept {} of {} rows",
            filtered.num_rows(),
            self.raw.num_rows()
        );
        Ok(Comparison {
            filtered,
            raw_summary: self.raw_summary.clone(),
            filtered_summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::CellValue;
    use crate::export::ExportFormat;

    fn config() -> PipelineConfig {
        PipelineConfig {
            categorical_columns: vec!["job".into(), "loan".into()],
            ..PipelineConfig::default()
        }
    }

    fn raw() -> Table {
        Table::new(vec![
            Column::from_cells("age", vec![25.5.into(), 35.0.into(), 61.2.into(), 30.0.into()]),
            Column::from_cells(
                "job",
                vec!["services".into(), "admin.".into(), "services".into(), CellValue::Null],
            ),
            Column::from_cells("loan", vec!["no".into(), "no".into(), "yes".into(), "no".into()]),
            Column::from_cells("y", vec!["no".into(), "yes".into(), "no".into(), "yes".into()]),
        ])
        .unwrap()
    }

    #[test]
    fn test_options_from_table() {
        let options = FilterOptions::from_table(&raw(), &config()).unwrap();
        assert_eq!(options.numeric_bounds, Some((25, 62)));
        assert_eq!(options.categories[0].values, vec!["services", "admin.", "all"]);
        assert_eq!(options.categories[1].values, vec!["no", "yes", "all"]);
    }

    #[test]
    fn test_options_missing_column() {
        let config = PipelineConfig {
            categorical_columns: vec!["education".into()],
            ..PipelineConfig::default()
        };
        assert!(matches!(
            FilterOptions::from_table(&raw(), &config),
            Err(LensError::Schema(msg)) if msg.contains("education")
        ));

        let config = PipelineConfig {
            numeric_column: "balance".into(),
            ..self::config()
        };
        assert!(matches!(
            SessionState::new(raw(), config),
            Err(LensError::Schema(msg)) if msg.contains("balance")
        ));
    }

    #[test]
    fn test_missing_target_column() {
        let config = PipelineConfig {
            target_column: "outcome".into(),
            ..self::config()
        };
        assert!(matches!(
            SessionState::new(raw(), config),
            Err(LensError::MissingColumn { column }) if column == "outcome"
        ));
    }

    #[test]
    fn test_default_spec_keeps_everything() {
        let session = SessionState::new(raw(), config()).unwrap();
        let spec = session.options().default_spec().unwrap();
        let comparison = session.compare(&spec).unwrap();

        assert_eq!(*comparison.filtered, raw());
        assert_eq!(comparison.raw_summary, comparison.filtered_summary);
    }

    #[test]
    fn test_compare_filters_and_summarises() {
        let session = SessionState::new(raw(), config()).unwrap();
        let spec = FilterSpec::builder()
            .age_range(30.0, 70.0)
            .allow("loan", ["no"])
            .build()
            .unwrap();
        let comparison = session.compare(&spec).unwrap();

        assert_eq!(comparison.filtered.num_rows(), 2);
        assert_eq!(comparison.raw_summary.pairs(), vec![("no", 50.0), ("yes", 50.0)]);
        assert_eq!(comparison.filtered_summary.pairs(), vec![("yes", 100.0)]);
        assert_eq!(session.raw().num_rows(), 4);

        session.compare(&spec).unwrap();
        assert_eq!(session.engine().cache().hits(), 1);
    }

    #[test]
    fn test_stale_spec_is_rejected() {
        let session = SessionState::new(raw(), config()).unwrap();
        let stale = FilterSpec::builder().allow("contact", ["cellular"]).build().unwrap();
        assert!(matches!(
            session.compare(&stale),
            Err(LensError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_export_all_names() {
        let session = SessionState::new(raw(), config()).unwrap();
        let comparison = session
            .compare(&session.options().default_spec().unwrap())
            .unwrap();
        let artifacts = comparison
            .export_all(&Exporter::new(ExportFormat::Csv))
            .unwrap();
        let names: Vec<&str> = artifacts.iter().map(|a| a.file_name.as_str()).collect();
        assert_eq!(names, vec!["bank_filtered.csv", "bank_raw_y.csv", "bank_y.csv"]);
        assert!(String::from_utf8_lossy(&artifacts[1].bytes).starts_with("category;percentage"));
    }
}
