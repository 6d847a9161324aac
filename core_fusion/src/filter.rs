//! Threshold filters over fused cells.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grid_metrics::CellMetrics;
use crate::ids::CellCode;
use crate::metric::{Metric, MetricParseError};

/// Inclusive bounds on one metric. An open bound does not constrain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellFilter {
    pub metric: Metric,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl CellFilter {
    pub fn new(metric: Metric, min: Option<f64>, max: Option<f64>) -> Self {
        Self { metric, min, max }
    }

    pub fn matches(&self, cell: &CellMetrics) -> bool {
        let value = cell.value(self.metric).unwrap_or(0.0);
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum FilterParseError {
    #[error("filter `{0}` should look like metric:min:max")]
    Shape(String),
    #[error(transparent)]
    Metric(#[from] MetricParseError),
    #[error("filter bound `{0}` is not a number")]
    Bound(String),
}

/// Parses `metric:min:max`, where either bound may be left empty.
impl FromStr for CellFilter {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let [metric, min, max] = parts.as_slice() else {
            return Err(FilterParseError::Shape(s.to_string()));
        };
        Ok(Self {
            metric: metric.parse()?,
            min: parse_bound(min)?,
            max: parse_bound(max)?,
        })
    }
}

fn parse_bound(raw: &str) -> Result<Option<f64>, FilterParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .map(Some)
        .ok_or_else(|| FilterParseError::Bound(trimmed.to_string()))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// Every filter must match.
    #[default]
    All,
    /// At least one filter must match.
    Any,
}

/// Codes of the cells passing `filters`, in grid order. Cells without a code
/// never match; an empty filter list matches every other cell.
pub fn filter_cells(cells: &[CellMetrics], filters: &[CellFilter], mode: FilterMode) -> Vec<CellCode> {
    cells
        .iter()
        .filter(|cell| {
            filters.is_empty()
                || match mode {
                    FilterMode::All => filters.iter().all(|filter| filter.matches(cell)),
                    FilterMode::Any => filters.iter().any(|filter| filter.matches(cell)),
                }
        })
        .filter_map(|cell| cell.code.clone())
        .collect()
}
