use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::Result;
use core_fusion::{load_fusion_config_from_env, CellFilter, DirectoryFetcher, FusionConfig, FusionContext, Metric};
use tracing::info;

mod commands;

#[derive(Parser, Debug)]
#[command(author, version, about = "Planning metrics fusion inspector", long_about = None)]
struct Cli {
    /// Directory the catalogue locations are resolved against.
    #[arg(long, default_value = ".")]
    data_root: PathBuf,
    /// Fusion config file; defaults to `FUSION_CONFIG_PATH` or the builtin catalogue.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Statistical year substituted into `{year}` location templates.
    #[arg(long)]
    year: Option<u16>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fuse the grid sources and write the enriched grid as GeoJSON.
    Fuse {
        /// Allocate road traffic onto the grid before writing.
        #[arg(long)]
        with_traffic: bool,
        /// Add a `shade` property holding the 0..=100 value of this metric.
        #[arg(long)]
        shade: Option<Metric>,
        /// Write the traffic allocated to each cell as CSV.
        #[arg(long)]
        allocation_csv: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Rank grid cells or road links by a metric.
    Report {
        #[arg(long, value_enum, default_value_t = ReportSource::Grid)]
        source: ReportSource,
        #[arg(long, default_value = "traffic")]
        metric: Metric,
        /// Number of rows; clamped to the configured maximum.
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Aggregate a metric over a selection of cells.
    Range {
        #[arg(long)]
        metric: Metric,
        /// Selected cell codes.
        #[arg(long, value_delimiter = ',')]
        cells: Vec<String>,
        /// File listing selected cell codes, separated by commas or whitespace.
        #[arg(long)]
        cells_file: Option<PathBuf>,
        /// Write the aggregate as CSV.
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Write the per-cell values of the selection as CSV.
        #[arg(long)]
        table_csv: Option<PathBuf>,
    },
    /// Summarise every road link over the cells it crosses.
    Roads {
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List the cells passing threshold filters (`metric:min:max`).
    Filter {
        #[arg(long = "where", required = true)]
        filters: Vec<CellFilter>,
        /// Keep cells matching any filter instead of all of them.
        #[arg(long)]
        any: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ReportSource {
    Grid,
    Roads,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Arc::new(FusionConfig::from_file(path)?),
        None => load_fusion_config_from_env().0,
    };
    info!(
        data_root = %cli.data_root.display(),
        year = ?cli.year,
        "Inspecting planning sources"
    );

    let context = FusionContext::new(
        DirectoryFetcher::new(cli.data_root.clone()),
        config.sources(),
        cli.year,
    );

    match cli.command {
        Command::Fuse {
            with_traffic,
            shade,
            allocation_csv,
            output,
        } => {
            commands::fuse(
                &context,
                with_traffic,
                shade,
                allocation_csv.as_deref(),
                output.as_deref(),
            )
            .await
        }
        Command::Report {
            source,
            metric,
            limit,
            csv,
        } => {
            let limit = config.report().clamp_limit(limit);
            match source {
                ReportSource::Grid => {
                    commands::report_grid(&context, metric, limit, csv.as_deref()).await
                }
                ReportSource::Roads => {
                    commands::report_roads(&context, metric, limit, csv.as_deref()).await
                }
            }
        }
        Command::Range {
            metric,
            cells,
            cells_file,
            csv,
            table_csv,
        } => {
            let selection = commands::read_selection(cells, cells_file.as_deref()).await?;
            commands::range(
                &context,
                metric,
                &selection,
                csv.as_deref(),
                table_csv.as_deref(),
            )
            .await
        }
        Command::Roads { output } => commands::roads(&context, output.as_deref()).await,
        Command::Filter { filters, any } => commands::filter(&context, &filters, any).await,
    }
}
