//! Keyed tables built from delimited text sources.
//!
//! Lexing is left to the `csv` crate; this module applies the join rules:
//! rows with a blank key are dropped, metric fields that do not read as a
//! finite non-negative number count as zero, and a column missing from the
//! header makes every value in it absent.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};

use crate::config::{PopulationSource, RoadAreaSource, TrafficSource, ValueSource};
use crate::ids::{CellCode, LinkId};

#[derive(Debug, Clone, Default)]
pub struct DelimitedTable {
    header: Vec<String>,
    rows: Vec<StringRecord>,
}

impl DelimitedTable {
    /// Parse comma-delimited text whose first line is the header.
    pub fn parse(text: &str) -> Result<Self, csv::Error> {
        let clean = text.trim_start_matches('\u{feff}').trim();
        if clean.is_empty() {
            return Ok(Self::default());
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(clean.as_bytes());
        let header = reader
            .headers()?
            .iter()
            .map(|name| name.trim().to_string())
            .collect();
        let rows = reader.records().collect::<Result<Vec<_>, _>>()?;
        Ok(Self { header, rows })
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|column| column == name)
    }

    pub fn columns_with_prefix(&self, prefix: &str) -> Vec<usize> {
        self.header
            .iter()
            .enumerate()
            .filter(|(_, name)| name.starts_with(prefix))
            .map(|(index, _)| index)
            .collect()
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(Row)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Row<'a>(&'a StringRecord);

impl<'a> Row<'a> {
    pub fn field(&self, column: Option<usize>) -> Option<&'a str> {
        column.and_then(|index| self.0.get(index))
    }

    pub fn number(&self, column: Option<usize>) -> f64 {
        parse_metric(self.field(column))
    }
}

/// Read a metric field; anything but a finite positive number is zero.
pub fn parse_metric(raw: Option<&str>) -> f64 {
    raw.and_then(|text| text.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite() && *value > 0.0)
        .unwrap_or(0.0)
}

/// A source keyed by its join column. Later rows replace earlier ones with the
/// same key.
#[derive(Debug, Clone)]
pub struct SourceTable<K, R> {
    entries: HashMap<K, R>,
}

pub type CellTable<R> = SourceTable<CellCode, R>;
pub type TrafficTable = SourceTable<LinkId, f64>;

impl<K, R> Default for SourceTable<K, R> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, R> SourceTable<K, R> {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&R>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: K, record: R) -> Option<R> {
        self.entries.insert(key, record)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &R)> {
        self.entries.iter()
    }
}

impl<K: Eq + Hash, R> FromIterator<(K, R)> for SourceTable<K, R> {
    fn from_iter<I: IntoIterator<Item = (K, R)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PopulationDetail {
    pub total: f64,
    pub pop_0_14: f64,
    pub pop_15_64: f64,
    pub pop_65_over: f64,
}

/// Road surface area split by managing jurisdiction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RoadAreaDetail {
    pub total: f64,
    pub nat: f64,
    pub pref: f64,
    pub muni: f64,
    pub other: f64,
}

fn keyed_rows<K, R>(
    table: &DelimitedTable,
    key_column: &str,
    parse_key: impl Fn(&str) -> Option<K>,
    mut record: impl FnMut(Row<'_>) -> R,
) -> SourceTable<K, R>
where
    K: Eq + Hash,
{
    let key_index = table.column(key_column);
    let mut keyed = SourceTable::empty();
    for row in table.rows() {
        let Some(key) = row.field(key_index).and_then(&parse_key) else {
            continue;
        };
        keyed.insert(key, record(row));
    }
    keyed
}

pub fn population_table(
    table: &DelimitedTable,
    source: &PopulationSource,
) -> CellTable<PopulationDetail> {
    let total = table.column(&source.total_column);
    let pop_0_14 = table.column(&source.pop_0_14_column);
    let pop_15_64 = table.column(&source.pop_15_64_column);
    let pop_65_over = table.column(&source.pop_65_over_column);
    keyed_rows(table, &source.key_column, CellCode::parse, |row| {
        PopulationDetail {
            total: row.number(total),
            pop_0_14: row.number(pop_0_14),
            pop_15_64: row.number(pop_15_64),
            pop_65_over: row.number(pop_65_over),
        }
    })
}

pub fn value_table(table: &DelimitedTable, source: &ValueSource) -> CellTable<f64> {
    let value = table.column(&source.value_column);
    keyed_rows(table, &source.key_column, CellCode::parse, |row| {
        row.number(value)
    })
}

pub fn road_area_table(table: &DelimitedTable, source: &RoadAreaSource) -> CellTable<RoadAreaDetail> {
    let total = table.column(&source.total_column);
    let nat = table.column(&source.nat_column);
    let pref = table.column(&source.pref_column);
    let muni = table.column(&source.muni_column);
    let other = table.column(&source.other_column);
    keyed_rows(table, &source.key_column, CellCode::parse, |row| {
        RoadAreaDetail {
            total: row.number(total),
            nat: row.number(nat),
            pref: row.number(pref),
            muni: row.number(muni),
            other: row.number(other),
        }
    })
}

/// Sum every time-band column of the traffic survey into one volume per link.
pub fn traffic_table(table: &DelimitedTable, source: &TrafficSource) -> TrafficTable {
    let bands = table.columns_with_prefix(&source.volume_prefix);
    keyed_rows(table, &source.link_column, LinkId::parse, |row| {
        bands.iter().map(|&band| row.number(Some(band))).sum()
    })
}
