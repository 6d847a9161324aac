use std::path::Path;

use color_eyre::Result;
use core_fusion::{
    aggregate_range, filter_cells, range_table, range_table_csv, rank_cells, rank_links,
    traffic_allocation_csv, CellFilter, FilterMode, FusedGrid, FusionContext, Metric,
    RangeSelection, RankingReport, SourceFetcher,
};
use serde::Serialize;
use tracing::{info, warn};

async fn emit(path: Option<&Path>, contents: &str) -> Result<()> {
    match path {
        Some(path) => {
            tokio::fs::write(path, contents).await?;
            info!(path = %path.display(), bytes = contents.len(), "Wrote output");
        }
        None => println!("{contents}"),
    }
    Ok(())
}

async fn fused_grid<F: SourceFetcher>(context: &FusionContext<F>, metric: Option<Metric>) -> FusedGrid {
    let grid = context.hydrate_grid().await;
    match metric {
        Some(metric) => context.hydrate_for(metric, &grid).await,
        None => grid,
    }
}

#[derive(Serialize)]
struct FuseSummary<'a> {
    cells: usize,
    maxima: &'a core_fusion::MetricMaxima,
    digest: String,
}

pub async fn fuse<F: SourceFetcher>(
    context: &FusionContext<F>,
    with_traffic: bool,
    shade: Option<Metric>,
    allocation_csv: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let hydrate = match shade {
        Some(metric) if metric.requires_traffic() => Some(metric),
        _ => with_traffic.then_some(Metric::Traffic),
    };
    let grid = fused_grid(context, hydrate).await;
    let summary = FuseSummary {
        cells: grid.len(),
        maxima: &grid.maxima,
        digest: format!("{:016x}", grid.digest()),
    };
    info!(summary = %serde_json::to_string(&summary)?, "Fused grid");

    if let Some(path) = allocation_csv {
        let allocation = context.traffic_allocation().await;
        info!(cells = allocation.len(), total = allocation.total(), "Allocated traffic");
        emit(Some(path), &traffic_allocation_csv(&allocation)?).await?;
    }

    let collection = context.grid().await;
    let enriched = match shade {
        Some(metric) => grid.apply_shaded(collection, metric),
        None => grid.apply_to(collection),
    };
    emit(output, &serde_json::to_string(&enriched)?).await
}

fn print_report(report: &RankingReport) {
    println!("{:>4}  {:<16} {}", "rank", "id", report.metric.label());
    for row in &report.rows {
        println!(
            "{:>4}  {:<16} {}",
            row.rank,
            row.id,
            report.metric.format_value(row.value)
        );
    }
    let average = report
        .average
        .map_or_else(|| "-".to_string(), |value| format!("{value:.1}"));
    println!("count={} average={}", report.count, average);
}

pub async fn report_grid<F: SourceFetcher>(
    context: &FusionContext<F>,
    metric: Metric,
    limit: usize,
    csv: Option<&Path>,
) -> Result<()> {
    let grid = fused_grid(context, Some(metric)).await;
    let report = rank_cells(&grid.cells, metric, limit);
    finish_report(&report, csv).await
}

pub async fn report_roads<F: SourceFetcher>(
    context: &FusionContext<F>,
    metric: Metric,
    limit: usize,
    csv: Option<&Path>,
) -> Result<()> {
    let grid = fused_grid(context, Some(Metric::Score)).await;
    let summaries = context.road_summaries(&grid).await;
    let report = rank_links(&summaries, metric, limit);
    finish_report(&report, csv).await
}

async fn finish_report(report: &RankingReport, csv: Option<&Path>) -> Result<()> {
    if report.rows.is_empty() {
        warn!(metric = %report.metric, "No rows to report");
    }
    print_report(report);
    if let Some(path) = csv {
        emit(Some(path), &report.to_csv()?).await?;
    }
    Ok(())
}

/// Merge codes given on the command line with those listed in a file.
pub async fn read_selection(cells: Vec<String>, cells_file: Option<&Path>) -> Result<RangeSelection> {
    let mut codes = cells;
    if let Some(path) = cells_file {
        let text = tokio::fs::read_to_string(path).await?;
        codes.extend(
            text.split(|c: char| c == ',' || c.is_whitespace())
                .map(str::to_string),
        );
    }
    Ok(RangeSelection::from_codes(codes.iter().map(String::as_str)))
}

pub async fn range<F: SourceFetcher>(
    context: &FusionContext<F>,
    metric: Metric,
    selection: &RangeSelection,
    csv: Option<&Path>,
    table_csv: Option<&Path>,
) -> Result<()> {
    let grid = fused_grid(context, Some(metric)).await;
    let selection = (!selection.is_empty()).then_some(selection);
    if selection.is_none() {
        warn!("Empty selection; reporting overall statistics only");
    }
    let aggregate = aggregate_range(&grid.cells, metric, selection);
    println!("{}", serde_json::to_string_pretty(&aggregate)?);

    if let Some(path) = csv {
        emit(Some(path), &aggregate.to_csv()?).await?;
    }
    if let (Some(path), Some(selection)) = (table_csv, selection) {
        let rows = range_table(&grid.cells, metric, selection);
        emit(Some(path), &range_table_csv(&rows, metric)?).await?;
    }
    Ok(())
}

pub async fn roads<F: SourceFetcher>(context: &FusionContext<F>, output: Option<&Path>) -> Result<()> {
    let grid = fused_grid(context, Some(Metric::Score)).await;
    let summaries = context.road_summaries(&grid).await;
    info!(links = summaries.len(), "Rolled up road metrics");
    emit(output, &serde_json::to_string_pretty(summaries.as_slice())?).await
}

pub async fn filter<F: SourceFetcher>(
    context: &FusionContext<F>,
    filters: &[CellFilter],
    any: bool,
) -> Result<()> {
    let mode = if any { FilterMode::Any } else { FilterMode::All };
    let needs_traffic = filters.iter().any(|filter| filter.metric.requires_traffic());
    let grid = fused_grid(context, needs_traffic.then_some(Metric::Traffic)).await;
    let matched = filter_cells(&grid.cells, filters, mode);
    info!(matched = matched.len(), cells = grid.len(), "Filtered grid");
    for code in &matched {
        println!("{code}");
    }
    Ok(())
}
