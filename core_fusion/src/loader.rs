//! Fetching and decoding of the raw datasets.
//!
//! Every loader fails softly: a source that cannot be fetched or decoded is
//! logged and replaced by an empty table (or an empty feature collection), so
//! one broken file never keeps the other sources from loading.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::{
    GridSource, PopulationSource, RoadAreaSource, RoadSource, SourceCatalog, TrafficSource,
    ValueSource,
};
use crate::features::FeatureCollection;
use crate::source_table::{
    population_table, road_area_table, traffic_table, value_table, CellTable, DelimitedTable,
    PopulationDetail, RoadAreaDetail, SourceTable, TrafficTable,
};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to fetch source `{location}`: {source}")]
    Fetch {
        location: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse delimited source `{location}`: {source}")]
    Parse {
        location: String,
        #[source]
        source: csv::Error,
    },
    #[error("failed to parse feature collection `{location}`: {source}")]
    Json {
        location: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown source location `{0}`")]
    NotFound(String),
}

/// The datasets the engine knows how to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Grid,
    Roads,
    Population,
    Labor,
    Floor,
    RoadArea,
    Traffic,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Grid => "grid",
            SourceKind::Roads => "roads",
            SourceKind::Population => "population",
            SourceKind::Labor => "labor",
            SourceKind::Floor => "floor",
            SourceKind::RoadArea => "road_area",
            SourceKind::Traffic => "traffic",
        }
    }
}

/// Resolves a catalogue location to its text content.
pub trait SourceFetcher {
    fn fetch_text(
        &self,
        location: &str,
    ) -> impl Future<Output = Result<String, SourceError>> + Send;
}

/// Reads sources from files below a data root.
#[derive(Debug, Clone)]
pub struct DirectoryFetcher {
    root: PathBuf,
}

impl DirectoryFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SourceFetcher for DirectoryFetcher {
    async fn fetch_text(&self, location: &str) -> Result<String, SourceError> {
        let path = self.root.join(location);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|source| SourceError::Fetch {
                location: location.to_string(),
                source,
            })?;
        // Invalid sequences become U+FFFD; ASCII key and value columns survive.
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Serves sources from memory; unknown locations fail with
/// [`SourceError::NotFound`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryFetcher {
    sources: HashMap<String, String>,
}

impl InMemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, location: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(location, text);
        self
    }

    pub fn insert(&mut self, location: impl Into<String>, text: impl Into<String>) {
        self.sources.insert(location.into(), text.into());
    }
}

impl SourceFetcher for InMemoryFetcher {
    async fn fetch_text(&self, location: &str) -> Result<String, SourceError> {
        self.sources
            .get(location)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(location.to_string()))
    }
}

/// Fetch and lex a delimited source without applying any join rules.
pub async fn fetch_delimited<F: SourceFetcher>(
    fetcher: &F,
    location: &str,
) -> Result<DelimitedTable, SourceError> {
    let text = fetcher.fetch_text(location).await?;
    DelimitedTable::parse(&text).map_err(|source| SourceError::Parse {
        location: location.to_string(),
        source,
    })
}

/// Fetch and decode a GeoJSON feature collection.
pub async fn fetch_collection<F: SourceFetcher>(
    fetcher: &F,
    location: &str,
) -> Result<FeatureCollection, SourceError> {
    let text = fetcher.fetch_text(location).await?;
    FeatureCollection::from_json_str(&text).map_err(|source| SourceError::Json {
        location: location.to_string(),
        source,
    })
}

async fn load_keyed<F, K, R>(
    fetcher: &F,
    kind: SourceKind,
    location: &str,
    build: impl FnOnce(&DelimitedTable) -> SourceTable<K, R>,
) -> SourceTable<K, R>
where
    F: SourceFetcher,
    K: Eq + std::hash::Hash,
{
    match fetch_delimited(fetcher, location).await {
        Ok(table) => {
            let keyed = build(&table);
            tracing::debug!(
                target: "planning::sources",
                source = kind.as_str(),
                location,
                rows = table.len(),
                keys = keyed.len(),
                "source_table.loaded"
            );
            keyed
        }
        Err(err) => {
            tracing::warn!(
                target: "planning::sources",
                source = kind.as_str(),
                location,
                error = %err,
                "source.load_failed"
            );
            SourceTable::empty()
        }
    }
}

async fn load_collection<F: SourceFetcher>(
    fetcher: &F,
    kind: SourceKind,
    location: &str,
) -> FeatureCollection {
    match fetch_collection(fetcher, location).await {
        Ok(collection) => {
            tracing::debug!(
                target: "planning::sources",
                source = kind.as_str(),
                location,
                features = collection.len(),
                "feature_collection.loaded"
            );
            collection
        }
        Err(err) => {
            tracing::warn!(
                target: "planning::sources",
                source = kind.as_str(),
                location,
                error = %err,
                "source.load_failed"
            );
            FeatureCollection::default()
        }
    }
}

pub async fn load_population<F: SourceFetcher>(
    fetcher: &F,
    source: &PopulationSource,
) -> CellTable<PopulationDetail> {
    load_keyed(fetcher, SourceKind::Population, &source.location, |table| {
        population_table(table, source)
    })
    .await
}

pub async fn load_labor<F: SourceFetcher>(fetcher: &F, source: &ValueSource) -> CellTable<f64> {
    load_keyed(fetcher, SourceKind::Labor, &source.location, |table| {
        value_table(table, source)
    })
    .await
}

pub async fn load_floor<F: SourceFetcher>(fetcher: &F, source: &ValueSource) -> CellTable<f64> {
    load_keyed(fetcher, SourceKind::Floor, &source.location, |table| {
        value_table(table, source)
    })
    .await
}

pub async fn load_road_area<F: SourceFetcher>(
    fetcher: &F,
    source: &RoadAreaSource,
) -> CellTable<RoadAreaDetail> {
    load_keyed(fetcher, SourceKind::RoadArea, &source.location, |table| {
        road_area_table(table, source)
    })
    .await
}

pub async fn load_traffic<F: SourceFetcher>(fetcher: &F, source: &TrafficSource) -> TrafficTable {
    load_keyed(fetcher, SourceKind::Traffic, &source.location, |table| {
        traffic_table(table, source)
    })
    .await
}

pub async fn load_grid<F: SourceFetcher>(fetcher: &F, source: &GridSource) -> FeatureCollection {
    load_collection(fetcher, SourceKind::Grid, &source.location).await
}

pub async fn load_roads<F: SourceFetcher>(fetcher: &F, source: &RoadSource) -> FeatureCollection {
    load_collection(fetcher, SourceKind::Roads, &source.location).await
}

/// The grid-keyed sources joined by the fuser.
#[derive(Debug, Clone, Default)]
pub struct BaseSources {
    pub population: CellTable<PopulationDetail>,
    pub labor: CellTable<f64>,
    pub floor: CellTable<f64>,
    pub road_area: CellTable<RoadAreaDetail>,
}

/// Load every grid-keyed source concurrently. Returns once all have settled;
/// failed sources come back empty.
pub async fn load_base_sources<F: SourceFetcher>(
    fetcher: &F,
    catalog: &SourceCatalog,
) -> BaseSources {
    let (population, labor, floor, road_area) = tokio::join!(
        load_population(fetcher, &catalog.population),
        load_labor(fetcher, &catalog.labor),
        load_floor(fetcher, &catalog.floor),
        load_road_area(fetcher, &catalog.road_area),
    );
    BaseSources {
        population,
        labor,
        floor,
        road_area,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> SourceCatalog {
        let mut catalog = SourceCatalog::default();
        catalog.population.location = "population.csv".to_string();
        catalog.labor.location = "labor.csv".to_string();
        catalog.floor.location = "floor.csv".to_string();
        catalog.road_area.location = "road_area.csv".to_string();
        catalog.traffic.location = "traffic.csv".to_string();
        catalog.grid.location = "grid.geojson".to_string();
        catalog
    }

    #[tokio::test]
    async fn missing_source_leaves_others_intact() {
        let fetcher = InMemoryFetcher::new()
            .with(
                "population.csv",
                "KEY_CODE,T001101001,T001101004,T001101010,T001101019\nA,100,10,60,30\n",
            )
            .with("labor.csv", "KEY_CODE,labor_count\nA,40\n")
            .with("road_area.csv", "KEY_CODE,road_area_total\nA,900\n");

        let sources = load_base_sources(&fetcher, &catalog()).await;
        assert_eq!(sources.population.get("A").map(|p| p.total), Some(100.0));
        assert_eq!(sources.labor.get("A"), Some(&40.0));
        assert!(sources.floor.is_empty());
        assert_eq!(sources.road_area.get("A").map(|r| r.total), Some(900.0));
    }

    #[tokio::test]
    async fn undecodable_collection_is_empty() {
        let fetcher = InMemoryFetcher::new().with("grid.geojson", "{ not json");
        let grid = load_grid(&fetcher, &catalog().grid).await;
        assert!(grid.is_empty());
    }

    #[tokio::test]
    async fn strict_fetch_reports_the_location() {
        let fetcher = InMemoryFetcher::new();
        let err = fetch_delimited(&fetcher, "nowhere.csv")
            .await
            .expect_err("unknown location");
        assert!(matches!(err, SourceError::NotFound(ref location) if location == "nowhere.csv"));
    }

    #[tokio::test]
    async fn directory_source_with_invalid_utf8_still_loads() {
        let root = std::env::temp_dir().join(format!("core_fusion_loader_{}", std::process::id()));
        tokio::fs::create_dir_all(&root).await.unwrap();
        let mut contents = b"KEY_CODE,T001101001,".to_vec();
        contents.extend_from_slice(&[0x90, 0x6c, 0x8c, 0xfb]);
        contents.extend_from_slice(b"\nA,100,1\n");
        tokio::fs::write(root.join("population.csv"), contents).await.unwrap();

        let fetcher = DirectoryFetcher::new(&root);
        let population = load_population(&fetcher, &catalog().population).await;
        tokio::fs::remove_dir_all(&root).await.unwrap();

        assert_eq!(population.len(), 1);
        assert_eq!(population.get("A").map(|p| p.total), Some(100.0));
    }

    #[tokio::test]
    async fn missing_directory_source_is_empty() {
        let fetcher = DirectoryFetcher::new(std::env::temp_dir().join("core_fusion_no_such_root"));
        let floor = load_floor(&fetcher, &catalog().floor).await;
        assert!(floor.is_empty());
    }

    #[tokio::test]
    async fn traffic_loads_by_link() {
        let fetcher = InMemoryFetcher::new()
            .with("traffic.csv", "linkid,koutuuryou_am,koutuuryou_pm\nL1,70,50\n");
        let traffic = load_traffic(&fetcher, &catalog().traffic).await;
        assert_eq!(traffic.get("L1"), Some(&120.0));
    }
}
