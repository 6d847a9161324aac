//! Per-session cache of loaded sources.
//!
//! A [`FusionContext`] owns its fetcher and resolved catalogue, and loads the
//! grid, road network and traffic table at most once each. Contexts never
//! share state, so two statistical years can be examined side by side.

use tokio::sync::OnceCell;

use crate::config::SourceCatalog;
use crate::features::{grid_cells, road_links, FeatureCollection, GridCell, RoadLink};
use crate::grid_metrics::{fuse_grid_metrics, FusedGrid};
use crate::loader::{load_base_sources, load_grid, load_roads, load_traffic, SourceFetcher};
use crate::metric::Metric;
use crate::road_metrics::{rollup_road_metrics, RoadSummaries};
use crate::source_table::TrafficTable;
use crate::traffic::{allocate_traffic, TrafficAllocation};

pub struct FusionContext<F> {
    fetcher: F,
    catalog: SourceCatalog,
    grid: OnceCell<FeatureCollection>,
    roads: OnceCell<FeatureCollection>,
    traffic: OnceCell<TrafficTable>,
}

impl<F: SourceFetcher> FusionContext<F> {
    /// Create a context for `year`, falling back to the catalogue's default.
    pub fn new(fetcher: F, catalog: &SourceCatalog, year: Option<u16>) -> Self {
        let catalog = catalog.resolve(year);
        tracing::debug!(
            target: "planning::fusion",
            year = ?catalog.default_year,
            "context.created"
        );
        Self {
            fetcher,
            catalog,
            grid: OnceCell::new(),
            roads: OnceCell::new(),
            traffic: OnceCell::new(),
        }
    }

    pub fn catalog(&self) -> &SourceCatalog {
        &self.catalog
    }

    pub fn year(&self) -> Option<u16> {
        self.catalog.default_year
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub async fn grid(&self) -> &FeatureCollection {
        self.grid
            .get_or_init(|| load_grid(&self.fetcher, &self.catalog.grid))
            .await
    }

    pub async fn roads(&self) -> &FeatureCollection {
        self.roads
            .get_or_init(|| load_roads(&self.fetcher, &self.catalog.roads))
            .await
    }

    /// Load the traffic table on first use; later calls return the cached one.
    pub async fn ensure_traffic(&self) -> &TrafficTable {
        self.traffic
            .get_or_init(|| load_traffic(&self.fetcher, &self.catalog.traffic))
            .await
    }

    pub async fn grid_cells(&self) -> Vec<GridCell> {
        grid_cells(self.grid().await, &self.catalog.grid.key_property)
    }

    pub async fn road_links(&self) -> Vec<RoadLink> {
        let roads = &self.catalog.roads;
        road_links(self.roads().await, &roads.link_property, &roads.cells_property)
    }

    /// Fuse the grid with every grid-keyed source. Traffic stays at zero.
    pub async fn hydrate_grid(&self) -> FusedGrid {
        let (grid, sources) = tokio::join!(
            self.grid(),
            load_base_sources(&self.fetcher, &self.catalog)
        );
        let cells = grid_cells(grid, &self.catalog.grid.key_property);
        fuse_grid_metrics(
            &cells,
            &sources.population,
            &sources.labor,
            &sources.floor,
            &sources.road_area,
        )
    }

    pub async fn traffic_allocation(&self) -> TrafficAllocation {
        let (links, traffic) = tokio::join!(self.road_links(), self.ensure_traffic());
        allocate_traffic(&links, traffic)
    }

    /// Return `grid` with allocated traffic merged in.
    pub async fn hydrate_traffic(&self, grid: &FusedGrid) -> FusedGrid {
        let allocation = self.traffic_allocation().await;
        grid.with_traffic(&allocation)
    }

    /// Hydrate traffic only when `metric` depends on it.
    pub async fn hydrate_for(&self, metric: Metric, grid: &FusedGrid) -> FusedGrid {
        if metric.requires_traffic() {
            self.hydrate_traffic(grid).await
        } else {
            grid.clone()
        }
    }

    pub async fn road_summaries(&self, grid: &FusedGrid) -> RoadSummaries {
        let (links, traffic) = tokio::join!(self.road_links(), self.ensure_traffic());
        rollup_road_metrics(&links, &grid.cells, traffic)
    }
}
