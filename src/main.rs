use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;

use campaign_lens::color::ColorMap;
use campaign_lens::data::columnar::pretty;
use campaign_lens::{
    load_file, ExportFormat, Exporter, FilterSpec, PipelineConfig, ProportionSummary, SessionState,
};

#[derive(Parser, Debug)]
#[command(name = "campaign-lens")]
#[command(about = "Filter a marketing-campaign table and compare outcome proportions")]
#[command(version)]
struct Cli {
    /// Data file (.csv, .xlsx, .json or .parquet)
    data: PathBuf,

    /// Filter specification as JSON; keeps every row when omitted
    #[arg(long)]
    filter: Option<PathBuf>,

    /// Pipeline configuration as JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory receiving the exported tables
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Export format (overrides config)
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Rows shown in the before/after previews
    #[arg(long, default_value_t = 5)]
    preview: usize,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Xlsx,
    Parquet,
    Csv,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Xlsx => ExportFormat::Xlsx,
            FormatArg::Parquet => ExportFormat::Parquet,
            FormatArg::Csv => ExportFormat::Csv,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let start = Instant::now();

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(format) = cli.format {
        config.export_format = format.into();
    }

    let raw = load_file(&cli.data, config.delimiter_byte()?)
        .with_context(|| format!("loading {}", cli.data.display()))?;
    info!("Before filters:\n{}", pretty(&raw.head(cli.preview))?);

    let session = SessionState::new(raw, config)?;
    let spec = match &cli.filter {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading filter {}", path.display()))?;
            FilterSpec::from_json_str(&text, &session.config().wildcard)
                .with_context(|| format!("parsing filter {}", path.display()))?
        }
        None => session.options().default_spec()?,
    };

    let comparison = session.compare(&spec).context("applying filter")?;
    info!("After filters:\n{}", pretty(&comparison.filtered.head(cli.preview))?);

    print_summary("Raw proportions", &comparison.raw_summary);
    print_summary("Filtered proportions", &comparison.aligned_filtered_summary());

    let exporter = Exporter::from_config(session.config())?;
    fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("creating {}", cli.out_dir.display()))?;
    for artifact in comparison.export_all(&exporter)? {
        let path = cli.out_dir.join(&artifact.file_name);
        fs::write(&path, &artifact.bytes).with_context(|| format!("writing {}", path.display()))?;
        info!("Wrote {} ({} bytes)", path.display(), artifact.bytes.len());
    }

    info!("Finished in {:.2?}", start.elapsed());
    Ok(())
}

fn print_summary(title: &str, summary: &ProportionSummary) {
    println!("{title} ({} values)", summary.total());
    if summary.is_empty() {
        println!("  (no rows)");
        return;
    }
    for point in ColorMap::for_summary(summary).series(summary) {
        println!("  {:<12} {:>7}  {}", point.label, point.text, point.color);
    }
}
