//! Statistics over an analyst-selected subset of grid cells.
//!
//! Cells whose value is exactly zero are left out of every sum, count and
//! average, on the assumption that zero means "no data" for these sources.

use std::collections::HashSet;

use serde::Serialize;

use crate::grid_metrics::CellMetrics;
use crate::ids::CellCode;
use crate::metric::Metric;

/// An unordered set of cell codes chosen for aggregation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSelection {
    codes: HashSet<CellCode>,
}

impl RangeSelection {
    /// Build a selection from raw codes; blank entries are ignored.
    pub fn from_codes<'a>(codes: impl IntoIterator<Item = &'a str>) -> Self {
        codes.into_iter().filter_map(CellCode::parse).collect()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.codes.contains(code)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl FromIterator<CellCode> for RangeSelection {
    fn from_iter<I: IntoIterator<Item = CellCode>>(iter: I) -> Self {
        Self {
            codes: iter.into_iter().collect(),
        }
    }
}

/// An extreme value and the first cell that reached it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Extremum {
    pub code: Option<CellCode>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeStats {
    pub sum: f64,
    pub count: usize,
    pub average: Option<f64>,
    pub max: Option<Extremum>,
    pub min: Option<Extremum>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeAggregate {
    pub metric: Metric,
    /// `None` when no selection was given or it was empty.
    pub range: Option<RangeStats>,
    pub overall_sum: f64,
    pub overall_count: usize,
    pub overall_average: Option<f64>,
}

#[derive(Default)]
struct Tally<'a> {
    sum: f64,
    count: usize,
    max: Option<(&'a CellMetrics, f64)>,
    min: Option<(&'a CellMetrics, f64)>,
}

impl<'a> Tally<'a> {
    fn add(&mut self, cell: &'a CellMetrics, value: f64) {
        self.sum += value;
        self.count += 1;
        if self.max.map_or(true, |(_, max)| value > max) {
            self.max = Some((cell, value));
        }
        if self.min.map_or(true, |(_, min)| value < min) {
            self.min = Some((cell, value));
        }
    }

    fn average(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    fn into_stats(self) -> RangeStats {
        let extremum = |(cell, value): (&CellMetrics, f64)| Extremum {
            code: cell.code.clone(),
            value,
        };
        RangeStats {
            sum: self.sum,
            count: self.count,
            average: self.average(),
            max: self.max.map(extremum),
            min: self.min.map(extremum),
        }
    }
}

fn counted_value(cell: &CellMetrics, metric: Metric) -> Option<f64> {
    cell.value(metric)
        .filter(|value| value.is_finite() && *value != 0.0)
}

/// Aggregate `metric` over the whole grid and, when given, over `selection`.
pub fn aggregate_range(
    cells: &[CellMetrics],
    metric: Metric,
    selection: Option<&RangeSelection>,
) -> RangeAggregate {
    let selection = selection.filter(|selection| !selection.is_empty());
    let mut overall = Tally::default();
    let mut range = selection.map(|_| Tally::default());

    for cell in cells {
        let Some(value) = counted_value(cell, metric) else {
            continue;
        };
        overall.add(cell, value);
        if let (Some(tally), Some(selection)) = (range.as_mut(), selection) {
            if cell.code_str().is_some_and(|code| selection.contains(code)) {
                tally.add(cell, value);
            }
        }
    }

    RangeAggregate {
        metric,
        range: range.map(Tally::into_stats),
        overall_sum: overall.sum,
        overall_count: overall.count,
        overall_average: overall.average(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeRow {
    pub code: CellCode,
    pub value: f64,
}

/// The selected cells in grid order with their value of `metric`.
pub fn range_table(
    cells: &[CellMetrics],
    metric: Metric,
    selection: &RangeSelection,
) -> Vec<RangeRow> {
    cells
        .iter()
        .filter_map(|cell| {
            let code = cell.code.as_ref()?;
            selection.contains(code.as_str()).then(|| RangeRow {
                code: code.clone(),
                value: cell.value(metric).unwrap_or(0.0),
            })
        })
        .collect()
}
