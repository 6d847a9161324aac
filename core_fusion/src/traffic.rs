//! Spreading link-level traffic counts over the grid.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::features::RoadLink;
use crate::ids::CellCode;
use crate::source_table::TrafficTable;

/// Traffic volume attributed to each grid cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrafficAllocation {
    by_cell: BTreeMap<CellCode, f64>,
}

impl TrafficAllocation {
    pub fn get(&self, code: &str) -> Option<f64> {
        self.by_cell.get(code).copied()
    }

    pub fn len(&self) -> usize {
        self.by_cell.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_cell.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CellCode, f64)> {
        self.by_cell.iter().map(|(code, value)| (code, *value))
    }

    pub fn total(&self) -> f64 {
        self.by_cell.values().sum()
    }
}

/// Split each link's volume evenly across the cells it references.
///
/// A link referencing `n` cells adds `traffic / n` to each of them; shares
/// accumulate across links. Links without an id, without a positive volume, or
/// without cell references contribute nothing.
pub fn allocate_traffic(links: &[RoadLink], traffic: &TrafficTable) -> TrafficAllocation {
    let mut by_cell: BTreeMap<CellCode, f64> = BTreeMap::new();
    let mut allocated_links = 0usize;

    for link in links {
        let Some(id) = link.id.as_ref() else {
            continue;
        };
        let volume = traffic.get(id).copied().unwrap_or(0.0);
        if volume <= 0.0 || link.cells.is_empty() {
            continue;
        }
        let share = volume / link.cells.len() as f64;
        for code in &link.cells {
            *by_cell.entry(code.clone()).or_insert(0.0) += share;
        }
        allocated_links += 1;
    }

    tracing::debug!(
        target: "planning::fusion",
        links = links.len(),
        allocated_links,
        cells = by_cell.len(),
        "traffic.allocated"
    );
    TrafficAllocation { by_cell }
}
