//! Top-N ranking reports and CSV exports.

use std::io;
use std::string::FromUtf8Error;

use csv::{Terminator, Writer, WriterBuilder};
use serde::Serialize;
use thiserror::Error;

use crate::grid_metrics::CellMetrics;
use crate::metric::Metric;
use crate::range::{Extremum, RangeAggregate, RangeRow};
use crate::road_metrics::RoadSummaries;
use crate::traffic::TrafficAllocation;

/// Identifier shown for cells that carry no code.
pub const MISSING_ID: &str = "-";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write csv record: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to flush csv output: {0}")]
    Flush(#[source] io::Error),
    #[error("csv output is not valid utf-8: {0}")]
    Encoding(#[from] FromUtf8Error),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingRow {
    pub rank: usize,
    pub id: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingReport {
    pub metric: Metric,
    pub rows: Vec<RankingRow>,
    pub count: usize,
    /// Mean of the listed values.
    pub average: Option<f64>,
}

impl RankingReport {
    fn from_entries(metric: Metric, mut entries: Vec<(String, f64)>, limit: usize) -> Self {
        entries.sort_by(|a, b| b.1.total_cmp(&a.1));
        entries.truncate(limit.max(1));
        let rows: Vec<RankingRow> = entries
            .into_iter()
            .enumerate()
            .map(|(index, (id, value))| RankingRow {
                rank: index + 1,
                id,
                value,
            })
            .collect();
        let count = rows.len();
        let average = (count > 0).then(|| rows.iter().map(|row| row.value).sum::<f64>() / count as f64);
        Self {
            metric,
            rows,
            count,
            average,
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|row| row.id.as_str())
    }

    pub fn to_csv(&self) -> Result<String, ReportError> {
        let mut writer = csv_writer();
        writer.write_record(["rank", "id", "metric", "value"])?;
        for row in &self.rows {
            writer.write_record([
                row.rank.to_string(),
                row.id.clone(),
                self.metric.label().to_string(),
                self.metric.format_value(row.value),
            ])?;
        }
        finish(writer)
    }
}

/// Rank grid cells by `metric`, highest first. Ties keep grid order and
/// undefined values rank as zero. `limit` is expected to be clamped by the
/// caller; it is never below one.
pub fn rank_cells(cells: &[CellMetrics], metric: Metric, limit: usize) -> RankingReport {
    let entries = cells
        .iter()
        .map(|cell| {
            (
                cell.code_str().unwrap_or(MISSING_ID).to_string(),
                cell.value(metric).unwrap_or(0.0),
            )
        })
        .collect();
    RankingReport::from_entries(metric, entries, limit)
}

/// Rank road links by `metric`, highest first, ties in first-seen order.
pub fn rank_links(summaries: &RoadSummaries, metric: Metric, limit: usize) -> RankingReport {
    let entries = summaries
        .iter()
        .map(|summary| (summary.link.to_string(), summary.value(metric)))
        .collect();
    RankingReport::from_entries(metric, entries, limit)
}

impl RangeAggregate {
    pub fn to_csv(&self) -> Result<String, ReportError> {
        let metric = self.metric;
        let number = |value: Option<f64>| value.map(|v| metric.format_value(v)).unwrap_or_default();
        let extremum = |value: Option<&Extremum>| match value {
            Some(extremum) => (
                metric.format_value(extremum.value),
                extremum
                    .code
                    .as_ref()
                    .map_or_else(|| MISSING_ID.to_string(), ToString::to_string),
            ),
            None => (String::new(), String::new()),
        };

        let mut writer = csv_writer();
        writer.write_record(["statistic", "value", "cell"])?;
        if let Some(range) = &self.range {
            let (max, max_cell) = extremum(range.max.as_ref());
            let (min, min_cell) = extremum(range.min.as_ref());
            writer.write_record(["range_sum", number(Some(range.sum)).as_str(), ""])?;
            writer.write_record(["range_count", range.count.to_string().as_str(), ""])?;
            writer.write_record(["range_average", number(range.average).as_str(), ""])?;
            writer.write_record(["range_max", max.as_str(), max_cell.as_str()])?;
            writer.write_record(["range_min", min.as_str(), min_cell.as_str()])?;
        }
        writer.write_record(["overall_sum", number(Some(self.overall_sum)).as_str(), ""])?;
        writer.write_record(["overall_count", self.overall_count.to_string().as_str(), ""])?;
        writer.write_record(["overall_average", number(self.overall_average).as_str(), ""])?;
        finish(writer)
    }
}

/// Export the per-cell listing produced by [`crate::range::range_table`].
pub fn range_table_csv(rows: &[RangeRow], metric: Metric) -> Result<String, ReportError> {
    let mut writer = csv_writer();
    writer.write_record(["cell", metric.as_str()])?;
    for row in rows {
        writer.write_record([row.code.as_str(), metric.format_value(row.value).as_str()])?;
    }
    finish(writer)
}

/// Export the traffic share allocated to each cell, in cell-code order.
pub fn traffic_allocation_csv(allocation: &TrafficAllocation) -> Result<String, ReportError> {
    let mut writer = csv_writer();
    writer.write_record(["cell", Metric::Traffic.as_str()])?;
    for (code, value) in allocation.iter() {
        writer.write_record([code.as_str(), Metric::Traffic.format_value(value).as_str()])?;
    }
    finish(writer)
}

fn csv_writer() -> Writer<Vec<u8>> {
    WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new())
}

fn finish(writer: Writer<Vec<u8>>) -> Result<String, ReportError> {
    let bytes = writer
        .into_inner()
        .map_err(|err| ReportError::Flush(err.into_error()))?;
    Ok(String::from_utf8(bytes)?)
}
