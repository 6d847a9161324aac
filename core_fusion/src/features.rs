//! GeoJSON feature collections as consumed from the map layer.
//!
//! Geometry is carried through untouched; the engine only reads identifiers
//! from the property bags and writes derived attributes into copies of them.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::ids::{split_cell_codes, CellCode, LinkId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type", default = "collection_kind")]
    pub kind: String,
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(flatten)]
    pub foreign_members: Map<String, Value>,
}

impl Default for FeatureCollection {
    fn default() -> Self {
        Self {
            kind: collection_kind(),
            features: Vec::new(),
            foreign_members: Map::new(),
        }
    }
}

impl FeatureCollection {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type", default = "feature_kind")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub geometry: Value,
    #[serde(flatten)]
    pub foreign_members: Map<String, Value>,
}

impl Feature {
    pub fn with_properties(properties: Map<String, Value>) -> Self {
        Self {
            kind: feature_kind(),
            id: None,
            properties,
            geometry: Value::Null,
            foreign_members: Map::new(),
        }
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

fn collection_kind() -> String {
    "FeatureCollection".to_string()
}

fn feature_kind() -> String {
    "Feature".to_string()
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A polygon of the statistical grid, reduced to its join key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridCell {
    pub code: Option<CellCode>,
}

impl GridCell {
    pub fn new(code: &str) -> Self {
        Self {
            code: CellCode::parse(code),
        }
    }

    pub fn from_feature(feature: &Feature, key_property: &str) -> Self {
        Self {
            code: feature.property(key_property).and_then(CellCode::from_json),
        }
    }
}

/// A road segment together with the grid cells it overlaps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoadLink {
    pub id: Option<LinkId>,
    pub cells: Vec<CellCode>,
}

impl RoadLink {
    pub fn new(id: &str, cells: &str) -> Self {
        Self {
            id: LinkId::parse(id),
            cells: split_cell_codes(cells),
        }
    }

    /// The link id comes from `link_property`, falling back to the feature id.
    pub fn from_feature(feature: &Feature, link_property: &str, cells_property: &str) -> Self {
        let id = feature
            .property(link_property)
            .and_then(LinkId::from_json)
            .or_else(|| feature.id.as_ref().and_then(LinkId::from_json));
        let cells = match feature.property(cells_property) {
            Some(Value::String(raw)) => split_cell_codes(raw),
            Some(other) => CellCode::from_json(other).into_iter().collect(),
            None => Vec::new(),
        };
        Self { id, cells }
    }
}

pub fn grid_cells(collection: &FeatureCollection, key_property: &str) -> Vec<GridCell> {
    collection
        .features
        .iter()
        .map(|feature| GridCell::from_feature(feature, key_property))
        .collect()
}

pub fn road_links(
    collection: &FeatureCollection,
    link_property: &str,
    cells_property: &str,
) -> Vec<RoadLink> {
    collection
        .features
        .iter()
        .map(|feature| RoadLink::from_feature(feature, link_property, cells_property))
        .collect()
}
