use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An indicator that can be ranked, filtered, aggregated or shaded on the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Traffic,
    Population,
    Labor,
    Floor,
    RoadAreaTotal,
    RoadAreaNat,
    RoadAreaPref,
    RoadAreaMuni,
    RoadAreaOther,
    #[serde(rename = "ratio_0_14")]
    Ratio0To14,
    #[serde(rename = "ratio_15_64")]
    Ratio15To64,
    #[serde(rename = "ratio_65_over")]
    Ratio65Over,
    Score,
}

impl Metric {
    pub const ALL: [Metric; 13] = [
        Metric::Traffic,
        Metric::Population,
        Metric::Labor,
        Metric::Floor,
        Metric::RoadAreaTotal,
        Metric::RoadAreaNat,
        Metric::RoadAreaPref,
        Metric::RoadAreaMuni,
        Metric::RoadAreaOther,
        Metric::Ratio0To14,
        Metric::Ratio15To64,
        Metric::Ratio65Over,
        Metric::Score,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Traffic => "traffic",
            Metric::Population => "population",
            Metric::Labor => "labor",
            Metric::Floor => "floor",
            Metric::RoadAreaTotal => "road_area_total",
            Metric::RoadAreaNat => "road_area_nat",
            Metric::RoadAreaPref => "road_area_pref",
            Metric::RoadAreaMuni => "road_area_muni",
            Metric::RoadAreaOther => "road_area_other",
            Metric::Ratio0To14 => "ratio_0_14",
            Metric::Ratio15To64 => "ratio_15_64",
            Metric::Ratio65Over => "ratio_65_over",
            Metric::Score => "score",
        }
    }

    /// Property carrying the raw value in a fused property bag.
    pub fn value_property(self) -> &'static str {
        match self {
            Metric::Traffic => "traffic_value",
            Metric::Population => "population_value",
            Metric::Labor => "labor_value",
            Metric::Floor => "floor_value",
            Metric::RoadAreaTotal => "road_area_total",
            Metric::RoadAreaNat => "road_area_nat",
            Metric::RoadAreaPref => "road_area_pref",
            Metric::RoadAreaMuni => "road_area_muni",
            Metric::RoadAreaOther => "road_area_other",
            Metric::Ratio0To14 => "ratio_0_14",
            Metric::Ratio15To64 => "ratio_15_64",
            Metric::Ratio65Over => "ratio_65_over",
            Metric::Score => "score_norm",
        }
    }

    /// Property used to shade the map. Ratios and the score are already on a
    /// 0..=100 scale and shade by themselves.
    pub fn norm_property(self) -> &'static str {
        match self {
            Metric::Traffic => "traffic_norm",
            Metric::Population => "population_norm",
            Metric::Labor => "labor_norm",
            Metric::Floor => "floor_norm",
            Metric::RoadAreaTotal => "road_area_total_norm",
            Metric::RoadAreaNat => "road_area_nat_norm",
            Metric::RoadAreaPref => "road_area_pref_norm",
            Metric::RoadAreaMuni => "road_area_muni_norm",
            Metric::RoadAreaOther => "road_area_other_norm",
            Metric::Ratio0To14 | Metric::Ratio15To64 | Metric::Ratio65Over | Metric::Score => {
                self.value_property()
            }
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Metric::Traffic => "Traffic volume",
            Metric::Population => "Population",
            Metric::Labor => "Labour force",
            Metric::Floor => "Floor area",
            Metric::RoadAreaTotal => "Road area (total)",
            Metric::RoadAreaNat => "Road area (national)",
            Metric::RoadAreaPref => "Road area (prefectural)",
            Metric::RoadAreaMuni => "Road area (municipal)",
            Metric::RoadAreaOther => "Road area (other)",
            Metric::Ratio0To14 => "Share aged 0-14",
            Metric::Ratio15To64 => "Share aged 15-64",
            Metric::Ratio65Over => "Share aged 65+",
            Metric::Score => "Composite score",
        }
    }

    pub fn is_ratio(self) -> bool {
        matches!(
            self,
            Metric::Ratio0To14 | Metric::Ratio15To64 | Metric::Ratio65Over
        )
    }

    /// Whether traffic must be allocated before this metric is meaningful.
    pub fn requires_traffic(self) -> bool {
        matches!(self, Metric::Traffic | Metric::Score)
    }

    /// Render a value the way reports display it.
    pub fn format_value(self, value: f64) -> String {
        if self.is_ratio() {
            format!("{value:.1}%")
        } else if self == Metric::Score {
            format!("{value:.1}")
        } else {
            format!("{}", value.round())
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown metric `{0}`")]
pub struct MetricParseError(pub String);

impl FromStr for Metric {
    type Err = MetricParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        Metric::ALL
            .into_iter()
            .find(|metric| metric.as_str().eq_ignore_ascii_case(token))
            .ok_or_else(|| MetricParseError(token.to_string()))
    }
}
