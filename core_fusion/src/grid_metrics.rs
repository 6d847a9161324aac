//! Joining the grid-keyed sources onto grid cells and normalising them.

use std::hash::{BuildHasher, Hasher};

use ahash::RandomState;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::features::{FeatureCollection, GridCell};
use crate::ids::CellCode;
use crate::metric::Metric;
use crate::source_table::{CellTable, PopulationDetail, RoadAreaDetail};
use crate::traffic::TrafficAllocation;

/// Property written by [`FusedGrid::apply_shaded`].
pub const SHADE_PROPERTY: &str = "shade";

/// Derived attributes of one grid cell. Every number is finite and `>= 0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellMetrics {
    pub code: Option<CellCode>,
    pub population: f64,
    pub labor: f64,
    pub floor: f64,
    pub traffic: f64,
    pub road_area: RoadAreaDetail,
    pub pop_0_14: f64,
    pub pop_15_64: f64,
    pub pop_65_over: f64,
    pub population_norm: f64,
    pub labor_norm: f64,
    pub floor_norm: f64,
    pub traffic_norm: f64,
    pub road_area_norm: RoadAreaDetail,
    pub ratio_0_14: f64,
    pub ratio_15_64: f64,
    pub ratio_65_over: f64,
    /// Always set by the fuser; may be absent on bags read back from elsewhere.
    pub score_norm: Option<f64>,
}

impl CellMetrics {
    fn raw(
        code: Option<CellCode>,
        population: PopulationDetail,
        labor: f64,
        floor: f64,
        road_area: RoadAreaDetail,
    ) -> Self {
        Self {
            code,
            population: population.total,
            labor,
            floor,
            road_area,
            pop_0_14: population.pop_0_14,
            pop_15_64: population.pop_15_64,
            pop_65_over: population.pop_65_over,
            ..Self::default()
        }
    }

    pub fn code_str(&self) -> Option<&str> {
        self.code.as_ref().map(CellCode::as_str)
    }

    /// Raw value of `metric`; `None` only for a score that was never computed.
    pub fn value(&self, metric: Metric) -> Option<f64> {
        let value = match metric {
            Metric::Traffic => self.traffic,
            Metric::Population => self.population,
            Metric::Labor => self.labor,
            Metric::Floor => self.floor,
            Metric::RoadAreaTotal => self.road_area.total,
            Metric::RoadAreaNat => self.road_area.nat,
            Metric::RoadAreaPref => self.road_area.pref,
            Metric::RoadAreaMuni => self.road_area.muni,
            Metric::RoadAreaOther => self.road_area.other,
            Metric::Ratio0To14 => self.ratio_0_14,
            Metric::Ratio15To64 => self.ratio_15_64,
            Metric::Ratio65Over => self.ratio_65_over,
            Metric::Score => return self.score_norm,
        };
        Some(value)
    }

    fn normalise(&mut self, maxima: &MetricMaxima) {
        self.population_norm = normalised(self.population, maxima.population);
        self.labor_norm = normalised(self.labor, maxima.labor);
        self.floor_norm = normalised(self.floor, maxima.floor);
        self.traffic_norm = normalised(self.traffic, maxima.traffic);
        self.road_area_norm = RoadAreaDetail {
            total: normalised(self.road_area.total, maxima.road_area.total),
            nat: normalised(self.road_area.nat, maxima.road_area.nat),
            pref: normalised(self.road_area.pref, maxima.road_area.pref),
            muni: normalised(self.road_area.muni, maxima.road_area.muni),
            other: normalised(self.road_area.other, maxima.road_area.other),
        };
        self.ratio_0_14 = ratio(self.pop_0_14, self.population);
        self.ratio_15_64 = ratio(self.pop_15_64, self.population);
        self.ratio_65_over = ratio(self.pop_65_over, self.population);
        self.score_norm =
            Some((self.traffic_norm + self.population_norm + self.floor_norm) / 3.0);
    }

    /// Write every derived attribute into a property bag.
    pub fn write_properties(&self, bag: &mut Map<String, Value>) {
        let score = self.score_norm.map(Value::from).unwrap_or(Value::Null);
        let entries = [
            ("traffic_value", self.traffic),
            ("population_value", self.population),
            ("labor_value", self.labor),
            ("floor_value", self.floor),
            ("road_area_total", self.road_area.total),
            ("road_area_nat", self.road_area.nat),
            ("road_area_pref", self.road_area.pref),
            ("road_area_muni", self.road_area.muni),
            ("road_area_other", self.road_area.other),
            ("pop_0_14", self.pop_0_14),
            ("pop_15_64", self.pop_15_64),
            ("pop_65_over", self.pop_65_over),
            ("traffic_norm", self.traffic_norm),
            ("population_norm", self.population_norm),
            ("labor_norm", self.labor_norm),
            ("floor_norm", self.floor_norm),
            ("road_area_total_norm", self.road_area_norm.total),
            ("road_area_nat_norm", self.road_area_norm.nat),
            ("road_area_pref_norm", self.road_area_norm.pref),
            ("road_area_muni_norm", self.road_area_norm.muni),
            ("road_area_other_norm", self.road_area_norm.other),
            ("ratio_0_14", self.ratio_0_14),
            ("ratio_15_64", self.ratio_15_64),
            ("ratio_65_over", self.ratio_65_over),
        ];
        for (name, value) in entries {
            bag.insert(name.to_string(), Value::from(value));
        }
        bag.insert("score_norm".to_string(), score);
    }

    /// Read derived attributes back from a property bag. Missing or
    /// non-numeric values read as zero; a missing score stays undefined.
    pub fn from_properties(code: Option<CellCode>, bag: &Map<String, Value>) -> Self {
        let number = |name: &str| {
            bag.get(name)
                .and_then(Value::as_f64)
                .filter(|value| value.is_finite() && *value > 0.0)
                .unwrap_or(0.0)
        };
        Self {
            code,
            population: number("population_value"),
            labor: number("labor_value"),
            floor: number("floor_value"),
            traffic: number("traffic_value"),
            road_area: RoadAreaDetail {
                total: number("road_area_total"),
                nat: number("road_area_nat"),
                pref: number("road_area_pref"),
                muni: number("road_area_muni"),
                other: number("road_area_other"),
            },
            pop_0_14: number("pop_0_14"),
            pop_15_64: number("pop_15_64"),
            pop_65_over: number("pop_65_over"),
            population_norm: number("population_norm"),
            labor_norm: number("labor_norm"),
            floor_norm: number("floor_norm"),
            traffic_norm: number("traffic_norm"),
            road_area_norm: RoadAreaDetail {
                total: number("road_area_total_norm"),
                nat: number("road_area_nat_norm"),
                pref: number("road_area_pref_norm"),
                muni: number("road_area_muni_norm"),
                other: number("road_area_other_norm"),
            },
            ratio_0_14: number("ratio_0_14"),
            ratio_15_64: number("ratio_15_64"),
            ratio_65_over: number("ratio_65_over"),
            score_norm: bag
                .get("score_norm")
                .and_then(Value::as_f64)
                .filter(|value| value.is_finite()),
        }
    }
}

fn normalised(value: f64, max: f64) -> f64 {
    if max > 0.0 {
        value / max * 100.0
    } else {
        0.0
    }
}

fn ratio(part: f64, total: f64) -> f64 {
    if total > 0.0 {
        part / total * 100.0
    } else {
        0.0
    }
}

/// Largest raw value of each normalised metric across the grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricMaxima {
    pub population: f64,
    pub labor: f64,
    pub floor: f64,
    pub traffic: f64,
    pub road_area: RoadAreaDetail,
}

impl MetricMaxima {
    pub fn from_cells<'a>(cells: impl IntoIterator<Item = &'a CellMetrics>) -> Self {
        let mut maxima = Self::default();
        for cell in cells {
            maxima.observe(cell);
        }
        maxima
    }

    fn observe(&mut self, cell: &CellMetrics) {
        raise(&mut self.population, cell.population);
        raise(&mut self.labor, cell.labor);
        raise(&mut self.floor, cell.floor);
        raise(&mut self.traffic, cell.traffic);
        raise(&mut self.road_area.total, cell.road_area.total);
        raise(&mut self.road_area.nat, cell.road_area.nat);
        raise(&mut self.road_area.pref, cell.road_area.pref);
        raise(&mut self.road_area.muni, cell.road_area.muni);
        raise(&mut self.road_area.other, cell.road_area.other);
    }
}

fn raise(max: &mut f64, value: f64) {
    if value > *max {
        *max = value;
    }
}

/// Fused metrics for every grid cell, in grid order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FusedGrid {
    pub cells: Vec<CellMetrics>,
    pub maxima: MetricMaxima,
}

/// Join the grid-keyed sources onto `cells` and derive norms, ratios and the
/// composite score. Traffic starts at zero until [`FusedGrid::with_traffic`].
pub fn fuse_grid_metrics(
    cells: &[GridCell],
    population: &CellTable<PopulationDetail>,
    labor: &CellTable<f64>,
    floor: &CellTable<f64>,
    road_area: &CellTable<RoadAreaDetail>,
) -> FusedGrid {
    let mut matched = 0usize;
    let raw: Vec<CellMetrics> = cells
        .iter()
        .map(|cell| match cell.code.as_ref() {
            Some(code) => {
                let key = code.as_str();
                let detail = population.get(key).copied();
                if detail.is_some() {
                    matched += 1;
                }
                CellMetrics::raw(
                    Some(code.clone()),
                    detail.unwrap_or_default(),
                    labor.get(key).copied().unwrap_or(0.0),
                    floor.get(key).copied().unwrap_or(0.0),
                    road_area.get(key).copied().unwrap_or_default(),
                )
            }
            None => CellMetrics::default(),
        })
        .collect();

    let grid = FusedGrid::normalised(raw);
    tracing::debug!(
        target: "planning::fusion",
        cells = grid.cells.len(),
        population_matches = matched,
        max_population = grid.maxima.population,
        max_floor = grid.maxima.floor,
        "grid.fused"
    );
    grid
}

impl FusedGrid {
    fn normalised(mut cells: Vec<CellMetrics>) -> Self {
        let maxima = MetricMaxima::from_cells(&cells);
        for cell in &mut cells {
            cell.normalise(&maxima);
        }
        Self { cells, maxima }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, code: &str) -> Option<&CellMetrics> {
        self.cells.iter().find(|cell| cell.code_str() == Some(code))
    }

    /// Replace each cell's traffic with its allocated share and recompute the
    /// traffic maximum, norms and scores. Applying the same allocation twice
    /// gives the same grid.
    pub fn with_traffic(&self, allocation: &TrafficAllocation) -> FusedGrid {
        let cells = self
            .cells
            .iter()
            .map(|cell| {
                let mut cell = cell.clone();
                cell.traffic = cell
                    .code_str()
                    .and_then(|code| allocation.get(code))
                    .filter(|value| value.is_finite() && *value > 0.0)
                    .unwrap_or(0.0);
                cell
            })
            .collect();
        let grid = FusedGrid::normalised(cells);
        tracing::debug!(
            target: "planning::fusion",
            cells = grid.cells.len(),
            max_traffic = grid.maxima.traffic,
            "grid.traffic_refreshed"
        );
        grid
    }

    /// Copy `collection` with every feature's properties extended by the
    /// fused attributes. Features are matched to cells by position, so the
    /// collection should be the one the grid was fused from.
    pub fn apply_to(&self, collection: &FeatureCollection) -> FeatureCollection {
        let mut output = collection.clone();
        for (feature, cell) in output.features.iter_mut().zip(&self.cells) {
            cell.write_properties(&mut feature.properties);
        }
        output
    }

    /// Like [`FusedGrid::apply_to`], also copying the 0..=100 shading value of
    /// `metric` into [`SHADE_PROPERTY`]. Cells without one shade as null.
    pub fn apply_shaded(&self, collection: &FeatureCollection, metric: Metric) -> FeatureCollection {
        let mut output = self.apply_to(collection);
        for feature in &mut output.features {
            let shade = feature
                .properties
                .get(metric.norm_property())
                .cloned()
                .unwrap_or(Value::Null);
            feature.properties.insert(SHADE_PROPERTY.to_string(), shade);
        }
        output
    }

    /// Stable 64-bit fingerprint of the fused cells and maxima.
    pub fn digest(&self) -> u64 {
        let encoded = bincode::serialize(self).expect("fused grid serialization for hashing");
        let mut hasher = RandomState::with_seeds(0, 0, 0, 0).build_hasher();
        hasher.write(&encoded);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::RoadLink;
    use crate::ids::LinkId;
    use crate::source_table::TrafficTable;
    use crate::traffic::allocate_traffic;

    fn code(raw: &str) -> CellCode {
        CellCode::parse(raw).unwrap()
    }

    fn population(entries: &[(&str, f64, f64, f64, f64)]) -> CellTable<PopulationDetail> {
        entries
            .iter()
            .map(|&(key, total, young, working, old)| {
                (
                    code(key),
                    PopulationDetail {
                        total,
                        pop_0_14: young,
                        pop_15_64: working,
                        pop_65_over: old,
                    },
                )
            })
            .collect()
    }

    fn values(entries: &[(&str, f64)]) -> CellTable<f64> {
        entries.iter().map(|&(key, value)| (code(key), value)).collect()
    }

    fn sample_grid() -> FusedGrid {
        let cells = vec![GridCell::new("A"), GridCell::new("B"), GridCell::new("C")];
        let road_area: CellTable<RoadAreaDetail> = [(
            code("C"),
            RoadAreaDetail {
                total: 80.0,
                nat: 20.0,
                pref: 0.0,
                muni: 60.0,
                other: 0.0,
            },
        )]
        .into_iter()
        .collect();
        fuse_grid_metrics(
            &cells,
            &population(&[("A", 200.0, 20.0, 150.0, 30.0), ("B", 50.0, 0.0, 0.0, 50.0)]),
            &values(&[("A", 10.0), ("C", 40.0)]),
            &values(&[("A", 500.0), ("B", 1000.0)]),
            &road_area,
        )
    }

    #[test]
    fn norms_stay_within_scale() {
        let grid = sample_grid();
        for cell in &grid.cells {
            for norm in [
                cell.population_norm,
                cell.labor_norm,
                cell.floor_norm,
                cell.traffic_norm,
                cell.road_area_norm.total,
                cell.road_area_norm.muni,
            ] {
                assert!((0.0..=100.0).contains(&norm));
            }
        }
        let a = grid.cell("A").unwrap();
        assert_eq!(a.population_norm, 100.0);
        assert_eq!(a.floor_norm, 50.0);
        assert_eq!(a.labor_norm, 25.0);
        assert_eq!(grid.maxima.road_area.muni, 60.0);
        assert_eq!(grid.maxima.traffic, 0.0);
        assert_eq!(a.traffic_norm, 0.0);
    }

    #[test]
    fn score_averages_three_norms() {
        let grid = sample_grid();
        let a = grid.cell("A").unwrap();
        assert_eq!(a.score_norm, Some((0.0 + 100.0 + 50.0) / 3.0));
    }

    #[test]
    fn ratios_follow_population_and_vanish_without_it() {
        let grid = sample_grid();
        let a = grid.cell("A").unwrap();
        assert_eq!(a.ratio_0_14, 10.0);
        assert_eq!(a.ratio_15_64, 75.0);
        assert_eq!(a.ratio_65_over, 15.0);

        let c = grid.cell("C").unwrap();
        assert_eq!(c.population, 0.0);
        assert_eq!(
            (c.ratio_0_14, c.ratio_15_64, c.ratio_65_over),
            (0.0, 0.0, 0.0)
        );
    }

    #[test]
    fn missing_rows_fuse_as_zero() {
        let grid = sample_grid();
        let c = grid.cell("C").unwrap();
        assert_eq!(c.population, 0.0);
        assert_eq!(c.pop_0_14, 0.0);
        assert_eq!(c.population_norm, 0.0);
        assert_eq!(c.floor, 0.0);
        assert_eq!(c.labor, 40.0);
    }

    #[test]
    fn cells_without_codes_are_zeroed() {
        let cells = vec![GridCell::new("  "), GridCell::new("A")];
        let grid = fuse_grid_metrics(
            &cells,
            &population(&[("A", 10.0, 1.0, 8.0, 1.0)]),
            &CellTable::empty(),
            &CellTable::empty(),
            &CellTable::empty(),
        );
        assert_eq!(grid.cells[0].code, None);
        assert_eq!(grid.cells[0].population, 0.0);
        assert_eq!(grid.cells[0].score_norm, Some(0.0));
    }

    #[test]
    fn all_zero_metric_normalises_to_zero() {
        let cells = vec![GridCell::new("A"), GridCell::new("B")];
        let grid = fuse_grid_metrics(
            &cells,
            &CellTable::empty(),
            &CellTable::empty(),
            &CellTable::empty(),
            &CellTable::empty(),
        );
        assert!(grid
            .cells
            .iter()
            .all(|cell| cell.population_norm == 0.0 && cell.score_norm == Some(0.0)));
    }

    #[test]
    fn fusing_twice_yields_identical_digest() {
        assert_eq!(sample_grid().digest(), sample_grid().digest());
        assert_eq!(sample_grid(), sample_grid());
    }

    #[test]
    fn traffic_refresh_replaces_rather_than_adds() {
        let grid = sample_grid();
        let links = vec![RoadLink::new("L1", "A_B")];
        let traffic: TrafficTable = [(LinkId::parse("L1").unwrap(), 120.0)].into_iter().collect();
        let allocation = allocate_traffic(&links, &traffic);

        let once = grid.with_traffic(&allocation);
        let twice = once.with_traffic(&allocation);
        assert_eq!(once.digest(), twice.digest());

        let a = once.cell("A").unwrap();
        assert_eq!(a.traffic, 60.0);
        assert_eq!(a.traffic_norm, 100.0);
        assert_eq!(a.score_norm, Some((100.0 + 100.0 + 50.0) / 3.0));
        assert_eq!(once.cell("C").unwrap().traffic, 0.0);
        assert_eq!(grid.cell("A").unwrap().traffic, 0.0);
    }

    #[test]
    fn properties_round_trip_through_feature_bags() {
        let grid = sample_grid();
        let collection = FeatureCollection {
            features: ["A", "B", "C"]
                .iter()
                .map(|key| {
                    let mut bag = Map::new();
                    bag.insert("KEY_CODE".to_string(), Value::from(*key));
                    crate::features::Feature::with_properties(bag)
                })
                .collect(),
            ..FeatureCollection::default()
        };

        let applied = grid.apply_to(&collection);
        assert!(collection.features[0].property("population_value").is_none());
        let bag = &applied.features[0].properties;
        assert_eq!(bag.get("KEY_CODE"), Some(&Value::from("A")));

        let restored = CellMetrics::from_properties(Some(code("A")), bag);
        assert_eq!(&restored, grid.cell("A").unwrap());
    }

    #[test]
    fn shading_uses_norms_for_counts_and_values_for_ratios() {
        let cells = vec![GridCell::new("A"), GridCell::new("B")];
        let grid = fuse_grid_metrics(
            &cells,
            &population(&[("A", 50.0, 0.0, 40.0, 10.0)]),
            &CellTable::empty(),
            &CellTable::empty(),
            &CellTable::empty(),
        );
        let collection = FeatureCollection {
            features: vec![
                crate::features::Feature::with_properties(Map::new()),
                crate::features::Feature::with_properties(Map::new()),
            ],
            ..FeatureCollection::default()
        };

        let shaded = grid.apply_shaded(&collection, Metric::Population);
        assert_eq!(shaded.features[0].property(SHADE_PROPERTY), Some(&Value::from(100.0)));
        assert_eq!(shaded.features[1].property(SHADE_PROPERTY), Some(&Value::from(0.0)));

        let shaded = grid.apply_shaded(&collection, Metric::Ratio65Over);
        assert_eq!(shaded.features[0].property(SHADE_PROPERTY), Some(&Value::from(20.0)));
    }

    #[test]
    fn bag_without_score_reads_as_undefined() {
        let mut bag = Map::new();
        bag.insert("population_value".to_string(), Value::from(12));
        bag.insert("floor_value".to_string(), Value::from("oops"));
        let metrics = CellMetrics::from_properties(None, &bag);
        assert_eq!(metrics.population, 12.0);
        assert_eq!(metrics.floor, 0.0);
        assert_eq!(metrics.score_norm, None);
    }
}
