use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::model::{CellValue, Column, Table};
use crate::error::{LensError, Result};

/// Category value meaning "no constraint on this column".
pub const WILDCARD: &str = "all";

// ---------------------------------------------------------------------------
// Filter specification
// ---------------------------------------------------------------------------

/// Inclusive numeric bounds on one column. `min <= max`, neither is NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericRange {
    column: String,
    min: f64,
    max: f64,
}

impl NumericRange {
    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

// NaN is rejected at construction and -0.0 is stored as 0.0, so bitwise
// hashing agrees with `==`.
impl Eq for NumericRange {}

impl Hash for NumericRange {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.column.hash(state);
        self.min.to_bits().hash(state);
        self.max.to_bits().hash(state);
    }
}

/// Allowed values for one categorical column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selection {
    /// The wildcard was selected: every row passes.
    Any,
    /// Only these category labels pass. Empty means no row passes.
    OneOf(BTreeSet<String>),
}

impl Selection {
    pub fn admits(&self, cell: &CellValue) -> bool {
        match (self, cell) {
            (Selection::Any, _) => true,
            (Selection::OneOf(_), CellValue::Null) => false,
            (Selection::OneOf(allowed), CellValue::Text(s)) => allowed.contains(s.as_str()),
            (Selection::OneOf(allowed), other) => allowed.contains(&other.to_string()),
        }
    }
}

/// An immutable description of which rows to keep.
///
/// Categorical constraints are kept in an ordered map, so two specs with the
/// same constraints are equal (and hash equally) however they were built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawFilterSpec", into = "RawFilterSpec")]
pub struct FilterSpec {
    range: Option<NumericRange>,
    categories: BTreeMap<String, Selection>,
}

impl FilterSpec {
    pub fn builder() -> FilterSpecBuilder {
        FilterSpecBuilder::default()
    }

    /// A spec that keeps every row.
    pub fn unconstrained() -> Self {
        FilterSpec {
            range: None,
            categories: BTreeMap::new(),
        }
    }

    pub fn range(&self) -> Option<&NumericRange> {
        self.range.as_ref()
    }

    pub fn selection(&self, column: &str) -> Option<&Selection> {
        self.categories.get(column)
    }

    pub fn categories(&self) -> impl Iterator<Item = (&str, &Selection)> {
        self.categories.iter().map(|(c, s)| (c.as_str(), s))
    }

    /// Every column the spec names, wildcard selections included.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.range
            .iter()
            .map(|r| r.column.as_str())
            .chain(self.categories.keys().map(String::as_str))
    }

    /// Fail with [`LensError::UnknownColumn`] if any named column is absent
    /// from `table`.
    pub fn validate_against(&self, table: &Table) -> Result<()> {
        match self.columns().find(|c| !table.has_column(c)) {
            Some(column) => Err(LensError::UnknownColumn {
                column: column.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Parse the JSON shape, reading category values against `wildcard`
    /// unless the document names its own token.
    pub fn from_json_str(text: &str, wildcard: &str) -> Result<Self> {
        let mut raw: RawFilterSpec =
            serde_json::from_str(text).map_err(|e| LensError::parse("filter JSON", e))?;
        raw.wildcard.get_or_insert_with(|| wildcard.to_string());
        FilterSpec::try_from(raw)
    }

    /// A wildcard token that no allowed value of this spec spells.
    fn free_wildcard(&self) -> String {
        let taken = |token: &str| {
            self.categories.values().any(|selection| match selection {
                Selection::Any => false,
                Selection::OneOf(set) => set.contains(token),
            })
        };
        std::iter::once(WILDCARD.to_string())
            .chain((1..).map(|n| format!("{WILDCARD}{n}")))
            .find(|token| !taken(token))
            .unwrap_or_else(|| WILDCARD.to_string())
    }
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self::unconstrained()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct FilterSpecBuilder {
    range: Option<(String, f64, f64)>,
    categories: BTreeMap<String, BTreeSet<String>>,
    unconstrained: BTreeSet<String>,
    wildcard: Option<String>,
}

impl FilterSpecBuilder {
    /// Keep rows whose `column` value lies in `[min, max]`.
    pub fn numeric_range(mut self, column: impl Into<String>, min: f64, max: f64) -> Self {
        self.range = Some((column.into(), min, max));
        self
    }

    /// Shorthand for the age slider.
    pub fn age_range(self, min: f64, max: f64) -> Self {
        self.numeric_range("age", min, max)
    }

    /// Add allowed values for `column`. Passing no values still registers the
    /// column, which then matches nothing.
    pub fn allow<I, S>(mut self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories
            .entry(column.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// Select the wildcard for `column`, whatever token [`Self::wildcard`]
    /// sets.
    pub fn allow_all(mut self, column: impl Into<String>) -> Self {
        let column = column.into();
        self.categories.entry(column.clone()).or_default();
        self.unconstrained.insert(column);
        self
    }

    /// Override the wildcard token (default [`WILDCARD`]). The token is
    /// matched against allowed values at [`Self::build`].
    pub fn wildcard(mut self, token: impl Into<String>) -> Self {
        self.wildcard = Some(token.into());
        self
    }

    pub fn build(self) -> Result<FilterSpec> {
        let range = match self.range {
            Some((column, min, max)) => {
                if min.is_nan() || max.is_nan() || min > max {
                    return Err(LensError::InvalidRange { column, min, max });
                }
                // `+ 0.0` folds -0.0 into 0.0
                Some(NumericRange {
                    column,
                    min: min + 0.0,
                    max: max + 0.0,
                })
            }
            None => None,
        };

        let wildcard = self.wildcard.as_deref().unwrap_or(WILDCARD);
        let unconstrained = self.unconstrained;
        let categories = self
            .categories
            .into_iter()
            .map(|(column, values)| {
                let selection = if unconstrained.contains(&column) || values.contains(wildcard) {
                    Selection::Any
                } else {
                    Selection::OneOf(values)
                };
                (column, selection)
            })
            .collect();

        Ok(FilterSpec { range, categories })
    }

    /// Build, then check every named column exists in `schema`.
    pub fn build_for(self, schema: &Table) -> Result<FilterSpec> {
        let spec = self.build()?;
        spec.validate_against(schema)?;
        Ok(spec)
    }
}

// ---------------------------------------------------------------------------
// Serialized form
// ---------------------------------------------------------------------------

/// JSON shape of a [`FilterSpec`]:
/// `{"wildcard": "all", "range": {"column": "age", "min": 30, "max": 40}, "categories": {"job": ["all"]}}`
///
/// `wildcard` is optional and falls back to [`WILDCARD`] when read with
/// serde, or to the caller's token with [`FilterSpec::from_json_str`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct RawFilterSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    wildcard: Option<String>,
    range: Option<RawRange>,
    categories: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawRange {
    column: String,
    min: f64,
    max: f64,
}

impl TryFrom<RawFilterSpec> for FilterSpec {
    type Error = LensError;

    fn try_from(raw: RawFilterSpec) -> Result<Self> {
        let mut builder = FilterSpec::builder();
        if let Some(token) = raw.wildcard {
            builder = builder.wildcard(token);
        }
        if let Some(r) = raw.range {
            builder = builder.numeric_range(r.column, r.min, r.max);
        }
        for (column, values) in raw.categories {
            builder = builder.allow(column, values);
        }
        builder.build()
    }
}

impl From<FilterSpec> for RawFilterSpec {
    fn from(spec: FilterSpec) -> Self {
        let wildcard = spec.free_wildcard();
        RawFilterSpec {
            range: spec.range.map(|r| RawRange {
                column: r.column,
                min: r.min,
                max: r.max,
            }),
            categories: spec
                .categories
                .into_iter()
                .map(|(column, selection)| {
                    let values = match selection {
                        Selection::Any => vec![wildcard.clone()],
                        Selection::OneOf(set) => set.into_iter().collect(),
                    };
                    (column, values)
                })
                .collect(),
            wildcard: Some(wildcard),
        }
    }
}

// ---------------------------------------------------------------------------
// Filter engine
// ---------------------------------------------------------------------------

/// Return positions of rows that pass every constraint, in table order.
///
/// A row passes when:
/// * its value in the range column is numeric and inside the bounds
///   (null or non-numeric fails)
/// * for every categorical column without the wildcard, its label is in the
///   allowed set (null fails, an empty set fails every row)
///
/// Each constraint yields an independent row mask and the masks are
/// intersected, so the outcome does not depend on constraint order.
pub fn filtered_indices(table: &Table, spec: &FilterSpec) -> Result<Vec<usize>> {
    spec.validate_against(table)?;

    let mut keep = vec![true; table.num_rows()];

    if let Some(range) = &spec.range {
        let column = lookup(table, &range.column)?;
        let mask = column_mask(column, |cell| cell.as_f64().is_some_and(|v| range.contains(v)));
        intersect(&mut keep, &mask);
    }

    for (name, selection) in &spec.categories {
        if let Selection::OneOf(allowed) = selection {
            if allowed.is_empty() {
                warn!("Filter on '{name}' allows no values; every row is dropped");
            }
            let mask = column_mask(lookup(table, name)?, |cell| selection.admits(cell));
            intersect(&mut keep, &mask);
        }
    }

    Ok(keep
        .iter()
        .enumerate()
        .filter_map(|(i, &k)| k.then_some(i))
        .collect())
}

/// Apply `spec` to `table`, returning a new table with the surviving rows in
/// their original order and the original column order.
pub fn apply(table: &Table, spec: &FilterSpec) -> Result<Table> {
    let indices = filtered_indices(table, spec)?;
    debug!("Filter kept {} of {} rows", indices.len(), table.num_rows());
    if indices.is_empty() && !table.is_empty() {
        warn!("Filter removed every row");
    }
    Ok(table.take(&indices))
}

fn lookup<'a>(table: &'a Table, name: &str) -> Result<&'a Column> {
    table.column(name).ok_or_else(|| LensError::UnknownColumn {
        column: name.to_string(),
    })
}

fn column_mask(column: &Column, pred: impl Fn(&CellValue) -> bool) -> Vec<bool> {
    column.values().iter().map(pred).collect()
}

fn intersect(keep: &mut [bool], mask: &[bool]) {
    for (k, &m) in keep.iter_mut().zip(mask) {
        *k &= m;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank() -> Table {
        Table::new(vec![
            Column::from_cells(
                "age",
                vec![25i64.into(), 35i64.into(), 45i64.into(), 30i64.into(), CellValue::Null],
            ),
            Column::from_cells(
                "job",
                vec![
                    "admin.".into(),
                    "services".into(),
                    "admin.".into(),
                    "technician".into(),
                    "admin.".into(),
                ],
            ),
            Column::from_cells(
                "marital",
                vec![
                    "married".into(),
                    "single".into(),
                    "single".into(),
                    "married".into(),
                    CellValue::Null,
                ],
            ),
        ])
        .unwrap()
    }

    fn ages(table: &Table) -> Vec<CellValue> {
        table.column("age").unwrap().values().to_vec()
    }

    #[test]
    fn test_range_with_wildcard_keeps_rows_in_order() {
        let table = Table::new(vec![
            Column::from_cells("age", vec![25i64.into(), 35i64.into(), 45i64.into(), 30i64.into()]),
            Column::from_cells("job", vec!["a".into(), "b".into(), "c".into(), "d".into()]),
        ])
        .unwrap();
        let spec = FilterSpec::builder()
            .age_range(30.0, 40.0)
            .allow_all("job")
            .build()
            .unwrap();

        assert_eq!(filtered_indices(&table, &spec).unwrap(), vec![1, 3]);
        let out = apply(&table, &spec).unwrap();
        assert_eq!(ages(&out), vec![CellValue::Integer(35), CellValue::Integer(30)]);
    }

    #[test]
    fn test_range_bounds_inclusive_and_null_excluded() {
        let spec = FilterSpec::builder().age_range(25.0, 45.0).build().unwrap();
        assert_eq!(filtered_indices(&bank(), &spec).unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_empty_selection_matches_nothing() {
        let spec = FilterSpec::builder()
            .allow("job", Vec::<String>::new())
            .build()
            .unwrap();
        let out = apply(&bank(), &spec).unwrap();
        assert!(out.is_empty());
        assert_eq!(out.column_names(), vec!["age", "job", "marital"]);
    }

    #[test]
    fn test_wildcard_short_circuits_other_members() {
        let spec = FilterSpec::builder()
            .allow("job", ["services", WILDCARD])
            .build()
            .unwrap();
        assert_eq!(spec.selection("job"), Some(&Selection::Any));
        assert_eq!(apply(&bank(), &spec).unwrap(), bank());
    }

    #[test]
    fn test_custom_wildcard_token() {
        let spec = FilterSpec::builder()
            .wildcard("*")
            .allow("job", ["*"])
            .allow("marital", [WILDCARD])
            .build()
            .unwrap();
        assert_eq!(spec.selection("job"), Some(&Selection::Any));
        assert!(matches!(spec.selection("marital"), Some(Selection::OneOf(_))));
    }

    #[test]
    fn test_allow_all_follows_later_wildcard() {
        let spec = FilterSpec::builder()
            .allow_all("job")
            .allow("marital", ["all"])
            .wildcard("*")
            .build()
            .unwrap();
        assert_eq!(spec.selection("job"), Some(&Selection::Any));
        assert!(matches!(spec.selection("marital"), Some(Selection::OneOf(_))));
    }

    #[test]
    fn test_json_with_caller_wildcard() {
        let spec = FilterSpec::from_json_str(r#"{"categories": {"job": ["*"]}}"#, "*").unwrap();
        assert_eq!(spec.selection("job"), Some(&Selection::Any));
        assert_eq!(apply(&bank(), &spec).unwrap(), bank());

        // a token named in the document wins over the caller's
        let spec = FilterSpec::from_json_str(
            r#"{"wildcard": "any", "categories": {"job": ["*"], "marital": ["any"]}}"#,
            "*",
        )
        .unwrap();
        assert!(apply(&bank(), &spec).unwrap().is_empty());
        assert_eq!(spec.selection("marital"), Some(&Selection::Any));

        assert!(matches!(
            FilterSpec::from_json_str("{", "*"),
            Err(LensError::Parse { .. })
        ));
    }

    #[test]
    fn test_json_keeps_literal_all_value() {
        let spec = FilterSpec::builder()
            .wildcard("*")
            .allow("job", ["all"])
            .allow_all("marital")
            .build()
            .unwrap();
        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains(r#""wildcard":"all1""#), "{json}");

        let back: FilterSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
        assert_eq!(FilterSpec::from_json_str(&json, "*").unwrap(), spec);
        assert!(apply(&bank(), &back).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_category_value_matches_nothing() {
        let spec = FilterSpec::builder().allow("job", ["astronaut"]).build().unwrap();
        assert!(apply(&bank(), &spec).unwrap().is_empty());
    }

    #[test]
    fn test_null_category_never_matches() {
        let spec = FilterSpec::builder()
            .allow("marital", ["married", "single", ""])
            .build()
            .unwrap();
        assert_eq!(filtered_indices(&bank(), &spec).unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_unknown_column_fails_fast() {
        let spec = FilterSpec::builder().allow_all("education").build().unwrap();
        assert!(matches!(
            apply(&bank(), &spec),
            Err(LensError::UnknownColumn { column }) if column == "education"
        ));

        let err = FilterSpec::builder().numeric_range("duration", 0.0, 1.0).build_for(&bank());
        assert!(matches!(err, Err(LensError::UnknownColumn { .. })));
    }

    #[test]
    fn test_invalid_range_rejected() {
        let err = FilterSpec::builder().age_range(40.0, 30.0).build();
        assert!(matches!(err, Err(LensError::InvalidRange { min, max, .. }) if min == 40.0 && max == 30.0));
        assert!(FilterSpec::builder().age_range(f64::NAN, 30.0).build().is_err());
        assert!(FilterSpec::builder().age_range(30.0, 30.0).build().is_ok());
    }

    #[test]
    fn test_constraint_order_independence() {
        let only_job = FilterSpec::builder().allow("job", ["admin."]).build().unwrap();
        let only_marital = FilterSpec::builder().allow("marital", ["single"]).build().unwrap();
        let both = FilterSpec::builder()
            .allow("marital", ["single"])
            .allow("job", ["admin."])
            .build()
            .unwrap();
        let both_reversed = FilterSpec::builder()
            .allow("job", ["admin."])
            .allow("marital", ["single"])
            .build()
            .unwrap();

        let table = bank();
        let a_then_b = apply(&apply(&table, &only_job).unwrap(), &only_marital).unwrap();
        let b_then_a = apply(&apply(&table, &only_marital).unwrap(), &only_job).unwrap();
        let at_once = apply(&table, &both).unwrap();

        assert_eq!(both, both_reversed);
        assert_eq!(a_then_b, b_then_a);
        assert_eq!(a_then_b, at_once);
        assert_eq!(ages(&at_once), vec![CellValue::Integer(45)]);
    }

    #[test]
    fn test_reapplying_is_a_no_op_and_deterministic() {
        let spec = FilterSpec::builder()
            .age_range(26.0, 50.0)
            .allow("job", ["admin.", "services"])
            .build()
            .unwrap();
        let once = apply(&bank(), &spec).unwrap();
        let twice = apply(&once, &spec).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.fingerprint(), apply(&bank(), &spec).unwrap().fingerprint());
    }

    #[test]
    fn test_empty_table_gives_empty_table() {
        let empty = bank().take(&[]);
        let spec = FilterSpec::builder().age_range(0.0, 100.0).build().unwrap();
        let out = apply(&empty, &spec).unwrap();
        assert!(out.is_empty());
        assert_eq!(out.num_columns(), 3);
    }

    #[test]
    fn test_negative_zero_normalised() {
        let a = FilterSpec::builder().age_range(-0.0, 1.0).build().unwrap();
        let b = FilterSpec::builder().age_range(0.0, 1.0).build().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.range().unwrap().min().to_bits(), 0.0f64.to_bits());
    }

    #[test]
    fn test_spec_json_round_trip() {
        let json = r#"{"range": {"column": "age", "min": 30, "max": 40},
                       "categories": {"job": ["admin.", "all"], "loan": ["no"]}}"#;
        let spec: FilterSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.selection("job"), Some(&Selection::Any));
        assert_eq!(spec.range().unwrap().max(), 40.0);

        let back: FilterSpec = serde_json::from_str(&serde_json::to_string(&spec).unwrap()).unwrap();
        assert_eq!(back, spec);

        let bad = r#"{"range": {"column": "age", "min": 50, "max": 40}}"#;
        assert!(serde_json::from_str::<FilterSpec>(bad).is_err());
    }
}
