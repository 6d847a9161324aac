//! Per-link rollup of the cell metrics a road segment passes through.

use std::collections::HashMap;

use serde::Serialize;

use crate::features::RoadLink;
use crate::grid_metrics::CellMetrics;
use crate::ids::LinkId;
use crate::metric::Metric;
use crate::source_table::{RoadAreaDetail, TrafficTable};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoadSummary {
    pub link: LinkId,
    pub traffic_value: f64,
    pub population_value: f64,
    pub labor_value: f64,
    pub floor_value: f64,
    pub road_area: RoadAreaDetail,
    pub pop_0_14: f64,
    pub pop_15_64: f64,
    pub pop_65_over: f64,
    pub ratio_0_14: f64,
    pub ratio_15_64: f64,
    pub ratio_65_over: f64,
    /// Mean score of the referenced cells that carry one; zero when none do.
    pub score_norm: f64,
    pub matched_cells: usize,
}

impl RoadSummary {
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Traffic => self.traffic_value,
            Metric::Population => self.population_value,
            Metric::Labor => self.labor_value,
            Metric::Floor => self.floor_value,
            Metric::RoadAreaTotal => self.road_area.total,
            Metric::RoadAreaNat => self.road_area.nat,
            Metric::RoadAreaPref => self.road_area.pref,
            Metric::RoadAreaMuni => self.road_area.muni,
            Metric::RoadAreaOther => self.road_area.other,
            Metric::Ratio0To14 => self.ratio_0_14,
            Metric::Ratio15To64 => self.ratio_15_64,
            Metric::Ratio65Over => self.ratio_65_over,
            Metric::Score => self.score_norm,
        }
    }
}

/// Road summaries in first-seen link order, addressable by link id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoadSummaries {
    summaries: Vec<RoadSummary>,
    #[serde(skip)]
    index: HashMap<LinkId, usize>,
}

impl RoadSummaries {
    fn upsert(&mut self, summary: RoadSummary) {
        match self.index.get(&summary.link) {
            Some(&position) => self.summaries[position] = summary,
            None => {
                self.index.insert(summary.link.clone(), self.summaries.len());
                self.summaries.push(summary);
            }
        }
    }

    pub fn get(&self, link: &str) -> Option<&RoadSummary> {
        self.index
            .get(link)
            .and_then(|&position| self.summaries.get(position))
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoadSummary> {
        self.summaries.iter()
    }

    pub fn as_slice(&self) -> &[RoadSummary] {
        &self.summaries
    }

    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }
}

#[derive(Default)]
struct Accumulator {
    population: f64,
    labor: f64,
    floor: f64,
    road_area: RoadAreaDetail,
    pop_0_14: f64,
    pop_15_64: f64,
    pop_65_over: f64,
    score_sum: f64,
    score_count: usize,
    matched: usize,
}

impl Accumulator {
    fn add(&mut self, cell: &CellMetrics) {
        self.population += cell.population;
        self.labor += cell.labor;
        self.floor += cell.floor;
        self.road_area.total += cell.road_area.total;
        self.road_area.nat += cell.road_area.nat;
        self.road_area.pref += cell.road_area.pref;
        self.road_area.muni += cell.road_area.muni;
        self.road_area.other += cell.road_area.other;
        self.pop_0_14 += cell.pop_0_14;
        self.pop_15_64 += cell.pop_15_64;
        self.pop_65_over += cell.pop_65_over;
        if let Some(score) = cell.score_norm {
            self.score_sum += score;
            self.score_count += 1;
        }
        self.matched += 1;
    }

    fn finish(self, link: LinkId, traffic_value: f64) -> RoadSummary {
        let share = |part: f64| {
            if self.population > 0.0 {
                part / self.population * 100.0
            } else {
                0.0
            }
        };
        RoadSummary {
            link,
            traffic_value,
            population_value: self.population,
            labor_value: self.labor,
            floor_value: self.floor,
            road_area: self.road_area,
            pop_0_14: self.pop_0_14,
            pop_15_64: self.pop_15_64,
            pop_65_over: self.pop_65_over,
            ratio_0_14: share(self.pop_0_14),
            ratio_15_64: share(self.pop_15_64),
            ratio_65_over: share(self.pop_65_over),
            score_norm: if self.score_count > 0 {
                self.score_sum / self.score_count as f64
            } else {
                0.0
            },
            matched_cells: self.matched,
        }
    }
}

/// Summarise every identified link over the grid cells it references.
///
/// Codes missing from the grid are skipped. When the grid repeats a code the
/// last cell wins; when the roads repeat a link id the later summary replaces
/// the earlier one in place.
pub fn rollup_road_metrics(
    links: &[RoadLink],
    cells: &[CellMetrics],
    traffic: &TrafficTable,
) -> RoadSummaries {
    let grid_index: HashMap<&str, &CellMetrics> = cells
        .iter()
        .filter_map(|cell| cell.code_str().map(|code| (code, cell)))
        .collect();

    let mut summaries = RoadSummaries::default();
    for link in links {
        let Some(id) = link.id.as_ref() else {
            continue;
        };
        let mut totals = Accumulator::default();
        for code in &link.cells {
            if let Some(cell) = grid_index.get(code.as_str()) {
                totals.add(cell);
            }
        }
        let traffic_value = traffic.get(id).copied().unwrap_or(0.0);
        summaries.upsert(totals.finish(id.clone(), traffic_value));
    }

    tracing::debug!(
        target: "planning::fusion",
        links = links.len(),
        summaries = summaries.len(),
        "roads.rolled_up"
    );
    summaries
}
