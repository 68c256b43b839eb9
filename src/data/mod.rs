/// Data layer: table model, loading, filtering and summarising.
///
/// Architecture:
/// ```text
///  .csv / .xlsx / .json / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse bytes → Table
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  FilterSpec → new Table (rows kept in order)
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ summary   │  target column → ProportionSummary
///   └──────────┘
/// ```

pub mod columnar;
pub mod filter;
pub mod loader;
pub mod model;
pub mod summary;
