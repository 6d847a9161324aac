//! Fusion engine for the planning dashboard.
//!
//! Joins independently keyed statistical sources onto a census grid and a
//! road network, spreads link-level traffic over the cells each road touches,
//! normalises the results onto 0..=100 scales and aggregates them over
//! analyst-selected ranges. Every computation is a pure function of its
//! inputs; [`FusionContext`] is the only place sources are cached.

pub mod config;
pub mod context;
pub mod features;
pub mod filter;
pub mod grid_metrics;
pub mod ids;
pub mod loader;
pub mod metric;
pub mod range;
pub mod report;
pub mod road_metrics;
pub mod source_table;
pub mod traffic;

pub use config::{
    load_fusion_config_from_env, FusionConfig, FusionConfigError, FusionConfigMetadata,
    ReportConfig, SourceCatalog, BUILTIN_FUSION_CONFIG,
};
pub use context::FusionContext;
pub use features::{grid_cells, road_links, Feature, FeatureCollection, GridCell, RoadLink};
pub use filter::{filter_cells, CellFilter, FilterMode, FilterParseError};
pub use grid_metrics::{fuse_grid_metrics, CellMetrics, FusedGrid, MetricMaxima, SHADE_PROPERTY};
pub use ids::{split_cell_codes, CellCode, LinkId};
pub use loader::{
    load_base_sources, BaseSources, DirectoryFetcher, InMemoryFetcher, SourceError, SourceFetcher,
    SourceKind,
};
pub use metric::{Metric, MetricParseError};
pub use range::{aggregate_range, range_table, Extremum, RangeAggregate, RangeRow, RangeSelection, RangeStats};
pub use report::{
    rank_cells, rank_links, range_table_csv, traffic_allocation_csv, RankingReport, RankingRow,
    ReportError,
};
pub use road_metrics::{rollup_road_metrics, RoadSummaries, RoadSummary};
pub use source_table::{
    CellTable, DelimitedTable, PopulationDetail, RoadAreaDetail, SourceTable, TrafficTable,
};
pub use traffic::{allocate_traffic, TrafficAllocation};
