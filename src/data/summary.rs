use std::collections::HashMap;

use super::model::{CellValue, Column, ColumnKind, Table};
use crate::error::{LensError, Result};

/// Column names of the table produced by [`ProportionSummary::to_table`].
pub const CATEGORY_COLUMN: &str = "category";
pub const PERCENTAGE_COLUMN: &str = "percentage";

/// Share of one category among the non-null values of a column.
#[derive(Debug, Clone, PartialEq)]
pub struct Proportion {
    pub category: String,
    pub count: usize,
    /// Full precision, in `[0, 100]`.
    pub percentage: f64,
}

/// Percentage breakdown of one column, in first-appearance order.
#[derive(Debug, Clone, PartialEq)]
pub struct ProportionSummary {
    column: String,
    total: usize,
    entries: Vec<Proportion>,
}

/// Count the non-null values of `target` per category and turn the counts
/// into percentages of the non-null total.
///
/// Categories come out in the order they first appear in the table, so raw and
/// filtered views of the same data list them alike. An empty (or all-null)
/// column gives an empty summary.
pub fn summarize(table: &Table, target: &str) -> Result<ProportionSummary> {
    let column = table.column(target).ok_or_else(|| LensError::MissingColumn {
        column: target.to_string(),
    })?;

    let mut order: Vec<(String, usize)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for cell in column.values().iter().filter(|c| !c.is_null()) {
        let label = cell.to_string();
        match index.get(&label) {
            Some(&i) => order[i].1 += 1,
            None => {
                index.insert(label.clone(), order.len());
                order.push((label, 1));
            }
        }
    }

    let total: usize = order.iter().map(|(_, n)| n).sum();
    let entries = order
        .into_iter()
        .map(|(category, count)| Proportion {
            category,
            count,
            percentage: count as f64 * 100.0 / total as f64,
        })
        .collect();

    Ok(ProportionSummary {
        column: target.to_string(),
        total,
        entries,
    })
}

impl ProportionSummary {
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Number of non-null values counted.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn entries(&self) -> &[Proportion] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(category, percentage)` pairs.
    pub fn pairs(&self) -> Vec<(&str, f64)> {
        self.entries
            .iter()
            .map(|p| (p.category.as_str(), p.percentage))
            .collect()
    }

    pub fn percentage_of(&self, category: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|p| p.category == category)
            .map(|p| p.percentage)
    }

    /// Rounded label for charts, e.g. `60.0%`.
    pub fn display_label(percentage: f64) -> String {
        format!("{percentage:.1}%")
    }

    /// Reorder so categories shared with `reference` follow its order; the
    /// rest keep their own order after them.
    pub fn aligned_to(&self, reference: &ProportionSummary) -> ProportionSummary {
        let mut entries: Vec<Proportion> = reference
            .entries
            .iter()
            .filter_map(|r| self.entries.iter().find(|p| p.category == r.category))
            .cloned()
            .collect();
        entries.extend(
            self.entries
                .iter()
                .filter(|p| reference.percentage_of(&p.category).is_none())
                .cloned(),
        );
        ProportionSummary {
            column: self.column.clone(),
            total: self.total,
            entries,
        }
    }

    /// Two-column table (`category`, `percentage`) for export.
    pub fn to_table(&self) -> Result<Table> {
        let categories = self
            .entries
            .iter()
            .map(|p| CellValue::Text(p.category.clone()))
            .collect();
        let percentages = self
            .entries
            .iter()
            .map(|p| CellValue::Float(p.percentage))
            .collect();

        Table::new(vec![
            Column::new(CATEGORY_COLUMN, ColumnKind::Text, categories)?,
            Column::new(PERCENTAGE_COLUMN, ColumnKind::Float, percentages)?,
        ])
    }
}
