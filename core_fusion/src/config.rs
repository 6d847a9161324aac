//! Source catalogue and report settings.
//!
//! Loaded from `fusion_config.json` with support for an environment variable
//! override (`FUSION_CONFIG_PATH`).

use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const BUILTIN_FUSION_CONFIG: &str = include_str!("data/fusion_config.json");

const YEAR_PLACEHOLDER: &str = "{year}";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    sources: SourceCatalog,
    report: ReportConfig,
}

impl FusionConfig {
    pub fn new(sources: SourceCatalog, report: ReportConfig) -> Self {
        Self { sources, report }
    }

    pub fn builtin() -> Arc<Self> {
        Arc::new(
            serde_json::from_str(BUILTIN_FUSION_CONFIG)
                .expect("builtin fusion config should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, FusionConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| FusionConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let config = FusionConfig::from_json_str(&contents)?;
        Ok(config)
    }

    pub fn sources(&self) -> &SourceCatalog {
        &self.sources
    }

    pub fn report(&self) -> &ReportConfig {
        &self.report
    }
}

#[derive(Debug, Error)]
pub enum FusionConfigError {
    #[error("failed to parse fusion config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read fusion config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Where each dataset lives and which columns carry its key and values.
///
/// Locations may contain `{year}`, substituted by [`SourceCatalog::resolve`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceCatalog {
    pub default_year: Option<u16>,
    pub grid: GridSource,
    pub roads: RoadSource,
    pub population: PopulationSource,
    pub labor: ValueSource,
    pub floor: ValueSource,
    pub road_area: RoadAreaSource,
    pub traffic: TrafficSource,
}

impl Default for SourceCatalog {
    fn default() -> Self {
        Self {
            default_year: None,
            grid: GridSource {
                location: "data/grid/messyude-ta001.geojson".to_string(),
                key_property: default_key_column(),
            },
            roads: RoadSource {
                location: "data/roads/hirosima/roads.geojson".to_string(),
                link_property: default_link_column(),
                cells_property: default_cells_property(),
            },
            population: PopulationSource {
                location: "data/statistical/tblT001101H34.csv".to_string(),
                key_column: default_key_column(),
                total_column: default_population_total(),
                pop_0_14_column: default_population_0_14(),
                pop_15_64_column: default_population_15_64(),
                pop_65_over_column: default_population_65_over(),
            },
            labor: ValueSource {
                location: "data/labor/hirosima/labor.csv".to_string(),
                key_column: default_key_column(),
                value_column: "labor_count".to_string(),
            },
            floor: ValueSource {
                location: "data/yukamenseki/hirosima/yukamenseki_hirosima.csv".to_string(),
                key_column: default_key_column(),
                value_column: "total_floor_area".to_string(),
            },
            road_area: RoadAreaSource {
                location: "data/road_area/hirosima/road_area.csv".to_string(),
                key_column: default_key_column(),
                total_column: default_road_area_total(),
                nat_column: default_road_area_nat(),
                pref_column: default_road_area_pref(),
                muni_column: default_road_area_muni(),
                other_column: default_road_area_other(),
            },
            traffic: TrafficSource {
                location: "data/traffic/hirosima/traffic.csv".to_string(),
                link_column: default_link_column(),
                volume_prefix: default_volume_prefix(),
            },
        }
    }
}

impl SourceCatalog {
    /// Substitute the statistical year into every location template.
    ///
    /// `year` falls back to `default_year`; without either, templates are left
    /// untouched and the affected sources simply fail to load.
    pub fn resolve(&self, year: Option<u16>) -> SourceCatalog {
        let year = year.or(self.default_year);
        let mut resolved = self.clone();
        resolved.default_year = year;
        for location in [
            &mut resolved.grid.location,
            &mut resolved.roads.location,
            &mut resolved.population.location,
            &mut resolved.labor.location,
            &mut resolved.floor.location,
            &mut resolved.road_area.location,
            &mut resolved.traffic.location,
        ] {
            *location = resolve_location(location, year);
        }
        resolved
    }
}

fn resolve_location(template: &str, year: Option<u16>) -> String {
    match year {
        Some(year) => template.replace(YEAR_PLACEHOLDER, &year.to_string()),
        None => template.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSource {
    pub location: String,
    #[serde(default = "default_key_column")]
    pub key_property: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadSource {
    pub location: String,
    #[serde(default = "default_link_column")]
    pub link_property: String,
    #[serde(default = "default_cells_property")]
    pub cells_property: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationSource {
    pub location: String,
    #[serde(default = "default_key_column")]
    pub key_column: String,
    #[serde(default = "default_population_total")]
    pub total_column: String,
    #[serde(default = "default_population_0_14")]
    pub pop_0_14_column: String,
    #[serde(default = "default_population_15_64")]
    pub pop_15_64_column: String,
    #[serde(default = "default_population_65_over")]
    pub pop_65_over_column: String,
}

/// A grid-keyed source with a single value column (labour, floor area).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueSource {
    pub location: String,
    #[serde(default = "default_key_column")]
    pub key_column: String,
    pub value_column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadAreaSource {
    pub location: String,
    #[serde(default = "default_key_column")]
    pub key_column: String,
    #[serde(default = "default_road_area_total")]
    pub total_column: String,
    #[serde(default = "default_road_area_nat")]
    pub nat_column: String,
    #[serde(default = "default_road_area_pref")]
    pub pref_column: String,
    #[serde(default = "default_road_area_muni")]
    pub muni_column: String,
    #[serde(default = "default_road_area_other")]
    pub other_column: String,
}

/// Traffic counts keyed by link; every column starting with `volume_prefix`
/// is one time band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficSource {
    pub location: String,
    #[serde(default = "default_link_column")]
    pub link_column: String,
    #[serde(default = "default_volume_prefix")]
    pub volume_prefix: String,
}

fn default_key_column() -> String {
    "KEY_CODE".to_string()
}

fn default_link_column() -> String {
    "linkid".to_string()
}

fn default_cells_property() -> String {
    "kye_code".to_string()
}

fn default_population_total() -> String {
    "T001101001".to_string()
}

fn default_population_0_14() -> String {
    "T001101004".to_string()
}

fn default_population_15_64() -> String {
    "T001101010".to_string()
}

fn default_population_65_over() -> String {
    "T001101019".to_string()
}

fn default_road_area_total() -> String {
    "road_area_total".to_string()
}

fn default_road_area_nat() -> String {
    "road_area_nat".to_string()
}

fn default_road_area_pref() -> String {
    "road_area_pref".to_string()
}

fn default_road_area_muni() -> String {
    "road_area_muni".to_string()
}

fn default_road_area_other() -> String {
    "road_area_other".to_string()
}

fn default_volume_prefix() -> String {
    "koutuuryou".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    default_limit: usize,
    max_limit: usize,
}

impl ReportConfig {
    pub fn new(default_limit: usize, max_limit: usize) -> Self {
        Self {
            default_limit,
            max_limit,
        }
    }

    pub fn default_limit(&self) -> usize {
        self.default_limit.clamp(1, self.max_limit())
    }

    pub fn max_limit(&self) -> usize {
        self.max_limit.max(1)
    }

    /// Clamp a requested row count into `[1, max_limit]`.
    pub fn clamp_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or_else(|| self.default_limit())
            .clamp(1, self.max_limit())
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FusionConfigMetadata {
    path: Option<PathBuf>,
}

impl FusionConfigMetadata {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

pub fn load_fusion_config_from_env() -> (Arc<FusionConfig>, FusionConfigMetadata) {
    let override_path = env::var("FUSION_CONFIG_PATH").ok().map(PathBuf::from);
    let default_path =
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src/data/fusion_config.json");

    let candidates: Vec<PathBuf> = match override_path {
        Some(ref path) => vec![path.clone()],
        None => vec![default_path.clone()],
    };

    for path in candidates {
        match FusionConfig::from_file(&path) {
            Ok(config) => {
                tracing::info!(
                    target: "planning::config",
                    path = %path.display(),
                    "fusion_config.loaded=file"
                );
                return (Arc::new(config), FusionConfigMetadata::new(Some(path)));
            }
            Err(err) => {
                tracing::warn!(
                    target: "planning::config",
                    path = %path.display(),
                    error = %err,
                    "fusion_config.load_failed"
                );
            }
        }
    }

    let config = FusionConfig::builtin();
    tracing::info!(target: "planning::config", "fusion_config.loaded=builtin");
    (config, FusionConfigMetadata::new(None))
}
