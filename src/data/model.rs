use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

use sha2::{Digest, Sha256};

use crate::error::{LensError, Result};

// ---------------------------------------------------------------------------
// CellValue – a single cell of a table
// ---------------------------------------------------------------------------

/// A dynamically-typed cell mirroring the common spreadsheet dtypes.
/// Categorical data is plain `Text`.
#[derive(Debug, Clone)]
pub enum CellValue {
    Integer(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Null,
}

// -- Manual Eq/Ord/Hash so floats can key sets and compare bit-for-bit --

impl PartialEq for CellValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for CellValue {}

impl PartialOrd for CellValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use CellValue::*;
        let da = self.tag();
        let db = other.tag();
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for CellValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.tag().hash(state);
        match self {
            CellValue::Text(s) => s.hash(state),
            CellValue::Integer(i) => i.hash(state),
            CellValue::Float(f) => f.to_bits().hash(state),
            CellValue::Bool(b) => b.hash(state),
            CellValue::Null => {}
        }
    }
}

/// Renders the category label of a cell. `Null` renders as the empty string.
impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Integer(i) => write!(f, "{i}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Null => Ok(()),
        }
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Integer(v)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Float(v)
    }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> Self {
        CellValue::Bool(v)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::Text(v)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(CellValue::Null, Into::into)
    }
}

impl CellValue {
    fn tag(&self) -> u8 {
        match self {
            CellValue::Null => 0,
            CellValue::Bool(_) => 1,
            CellValue::Integer(_) => 2,
            CellValue::Float(_) => 3,
            CellValue::Text(_) => 4,
        }
    }

    /// Try to interpret the value as an `f64` for range filtering.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Float(v) => Some(*v),
            CellValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// The column kind this cell belongs to, `None` for `Null`.
    pub fn kind(&self) -> Option<ColumnKind> {
        match self {
            CellValue::Integer(_) => Some(ColumnKind::Integer),
            CellValue::Float(_) => Some(ColumnKind::Float),
            CellValue::Bool(_) => Some(ColumnKind::Bool),
            CellValue::Text(_) => Some(ColumnKind::Text),
            CellValue::Null => None,
        }
    }

    fn coerce(self, kind: ColumnKind) -> CellValue {
        match (self, kind) {
            (CellValue::Null, _) => CellValue::Null,
            (CellValue::Integer(i), ColumnKind::Float) => CellValue::Float(i as f64),
            (cell, ColumnKind::Text) if !matches!(cell, CellValue::Text(_)) => {
                CellValue::Text(cell.to_string())
            }
            (cell, _) => cell,
        }
    }
}

// ---------------------------------------------------------------------------
// Column – a named, homogeneous sequence of cells
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    Integer,
    Float,
    Bool,
    Text,
}

impl ColumnKind {
    /// The narrowest kind able to hold values of both kinds.
    fn unify(self, other: ColumnKind) -> ColumnKind {
        use ColumnKind::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Integer, Float) | (Float, Integer) => Float,
            _ => Text,
        }
    }

    fn tag(self) -> u8 {
        match self {
            ColumnKind::Integer => 1,
            ColumnKind::Float => 2,
            ColumnKind::Bool => 3,
            ColumnKind::Text => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    kind: ColumnKind,
    values: Vec<CellValue>,
}

impl Column {
    /// Build a column of an explicit kind. Every non-null cell must match it.
    pub fn new(name: impl Into<String>, kind: ColumnKind, values: Vec<CellValue>) -> Result<Self> {
        let name = name.into();
        if let Some((row, cell)) = values
            .iter()
            .enumerate()
            .find(|(_, v)| v.kind().is_some_and(|k| k != kind))
        {
            return Err(LensError::Schema(format!(
                "column '{name}' is {kind:?} but row {row} holds {cell:?}"
            )));
        }
        Ok(Column { name, kind, values })
    }

    /// Build a column from already-typed cells, widening mixed kinds.
    /// Integer + Float widens to Float, any other mix falls back to Text.
    pub fn from_cells(name: impl Into<String>, values: Vec<CellValue>) -> Self {
        let kind = values
            .iter()
            .filter_map(CellValue::kind)
            .reduce(ColumnKind::unify)
            .unwrap_or(ColumnKind::Text);
        let values = values.into_iter().map(|v| v.coerce(kind)).collect();
        Column {
            name: name.into(),
            kind,
            values,
        }
    }

    /// Build a column from raw text tokens, inferring a single kind for the
    /// whole column. Empty tokens are null.
    pub fn infer<S: AsRef<str>>(name: impl Into<String>, tokens: &[S]) -> Self {
        let tokens: Vec<&str> = tokens.iter().map(|t| t.as_ref()).collect();
        let present = || tokens.iter().copied().filter(|t| !t.is_empty());

        let kind = if present().next().is_none() {
            ColumnKind::Text
        } else if present().all(|t| t.trim().parse::<i64>().is_ok()) {
            ColumnKind::Integer
        } else if present().all(|t| t.trim().parse::<f64>().is_ok()) {
            ColumnKind::Float
        } else if present().all(|t| t == "true" || t == "false") {
            ColumnKind::Bool
        } else {
            ColumnKind::Text
        };

        let values = tokens
            .iter()
            .map(|&t| {
                if t.is_empty() {
                    return CellValue::Null;
                }
                match kind {
                    ColumnKind::Integer => t.trim().parse().map_or(CellValue::Null, CellValue::Integer),
                    ColumnKind::Float => t.trim().parse().map_or(CellValue::Null, CellValue::Float),
                    ColumnKind::Bool => CellValue::Bool(t == "true"),
                    ColumnKind::Text => CellValue::Text(t.to_string()),
                }
            })
            .collect();

        Column {
            name: name.into(),
            kind,
            values,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ColumnKind {
        self.kind
    }

    pub fn values(&self) -> &[CellValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Distinct non-null category labels in order of first appearance.
    pub fn distinct_labels(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.values
            .iter()
            .filter(|v| !v.is_null())
            .map(ToString::to_string)
            .filter(|label| seen.insert(label.clone()))
            .collect()
    }

    fn take(&self, indices: &[usize]) -> Column {
        Column {
            name: self.name.clone(),
            kind: self.kind,
            values: indices.iter().map(|&i| self.values[i].clone()).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Fingerprint – content identity of a table
// ---------------------------------------------------------------------------

/// SHA-256 digest of a table's names, kinds and cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

// ---------------------------------------------------------------------------
// Table – the complete loaded dataset
// ---------------------------------------------------------------------------

/// An immutable, column-oriented table. Column names are unique and all
/// columns share one row count.
#[derive(Debug, Clone)]
pub struct Table {
    columns: Vec<Column>,
    fingerprint: OnceLock<Fingerprint>,
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns
    }
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let mut names = HashSet::new();
        for col in &columns {
            if !names.insert(col.name.as_str()) {
                return Err(LensError::Schema(format!("duplicate column '{}'", col.name)));
            }
        }
        if let Some(first) = columns.first() {
            if let Some(bad) = columns.iter().find(|c| c.len() != first.len()) {
                return Err(LensError::Schema(format!(
                    "column '{}' has {} rows but '{}' has {}",
                    bad.name,
                    bad.len(),
                    first.name,
                    first.len()
                )));
            }
        }
        Ok(Table {
            columns,
            fingerprint: OnceLock::new(),
        })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Cells of row `i` in column order.
    pub fn row(&self, i: usize) -> Option<Vec<&CellValue>> {
        if i >= self.num_rows() {
            return None;
        }
        Some(self.columns.iter().map(|c| &c.values[i]).collect())
    }

    /// A new table holding the given rows, in the given order.
    pub fn take(&self, indices: &[usize]) -> Table {
        Table {
            columns: self.columns.iter().map(|c| c.take(indices)).collect(),
            fingerprint: OnceLock::new(),
        }
    }

    /// The first `n` rows.
    pub fn head(&self, n: usize) -> Table {
        let indices: Vec<usize> = (0..n.min(self.num_rows())).collect();
        self.take(&indices)
    }

    /// Min and max of the numeric values of a column, `None` when it holds
    /// no numeric value.
    pub fn numeric_bounds(&self, name: &str) -> Result<Option<(f64, f64)>> {
        let column = self.column(name).ok_or_else(|| LensError::MissingColumn {
            column: name.to_string(),
        })?;
        Ok(column
            .values
            .iter()
            .filter_map(CellValue::as_f64)
            .filter(|v| !v.is_nan())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            }))
    }

    /// Content fingerprint, computed once per table instance.
    pub fn fingerprint(&self) -> Fingerprint {
        *self.fingerprint.get_or_init(|| self.compute_fingerprint())
    }

    fn compute_fingerprint(&self) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update((self.columns.len() as u64).to_le_bytes());
        for col in &self.columns {
            hasher.update((col.name.len() as u64).to_le_bytes());
            hasher.update(col.name.as_bytes());
            hasher.update([col.kind.tag()]);
            hasher.update((col.values.len() as u64).to_le_bytes());
            for cell in &col.values {
                hasher.update([cell.tag()]);
                match cell {
                    CellValue::Integer(i) => hasher.update(i.to_le_bytes()),
                    CellValue::Float(f) => hasher.update(f.to_bits().to_le_bytes()),
                    CellValue::Bool(b) => hasher.update([u8::from(*b)]),
                    CellValue::Text(s) => {
                        hasher.update((s.len() as u64).to_le_bytes());
                        hasher.update(s.as_bytes());
                    }
                    CellValue::Null => {}
                }
            }
        }
        Fingerprint(hasher.finalize().into())
    }
}
