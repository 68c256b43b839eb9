//! Filtering and aggregation core for marketing-campaign analysis.
//!
//! A table is loaded once, then filtered by a [`FilterSpec`] (numeric range
//! plus allowed categories per column) and the outcome column of the raw and
//! filtered views is reduced to percentage breakdowns for comparison. Any of
//! the resulting tables can be exported as a spreadsheet.
//!
//! ```no_run
//! use campaign_lens::{load, summarize, apply, DataFormat, FilterSpec};
//!
//! # fn main() -> campaign_lens::Result<()> {
//! let bytes = std::fs::read("bank-additional.csv")?;
//! let raw = load(&bytes, DataFormat::Csv { delimiter: b';' })?;
//! let spec = FilterSpec::builder()
//!     .age_range(30.0, 40.0)
//!     .allow("job", ["admin.", "technician"])
//!     .allow_all("marital")
//!     .build_for(&raw)?;
//! let filtered = apply(&raw, &spec)?;
//! println!("{:?}", summarize(&filtered, "y")?.pairs());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod color;
pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod state;

pub use cache::{CachedFilterEngine, FilterCache, MemoCache, NoCache};
pub use config::PipelineConfig;
pub use data::filter::{apply, filtered_indices, FilterSpec, Selection, WILDCARD};
pub use data::loader::{load, load_file, DataFormat};
pub use data::model::{CellValue, Column, ColumnKind, Table};
pub use data::summary::{summarize, ProportionSummary};
pub use error::{LensError, Result};
pub use export::{export, ArtifactKind, ExportArtifact, ExportFormat, Exporter};
pub use state::{Comparison, FilterOptions, SessionState};
