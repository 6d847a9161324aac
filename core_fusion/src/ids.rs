//! Join identifiers shared by every source.
//!
//! Grid cells and road links arrive keyed by values that may be JSON strings or
//! numbers depending on the exporter. They are normalised once here so that
//! every join site compares plain strings.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Code of a grid cell (`KEY_CODE` in the census exports).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellCode(String);

/// Identifier of a road link (`linkid` in the traffic survey).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            /// Normalise raw text into an identifier. Blank input has no identity.
            pub fn parse(raw: &str) -> Option<Self> {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(Self(trimmed.to_string()))
                }
            }

            /// Normalise a JSON attribute value into an identifier.
            pub fn from_json(value: &Value) -> Option<Self> {
                json_key(value).and_then(|text| Self::parse(&text))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(CellCode);
string_id!(LinkId);

/// Render a JSON scalar as key text. Integral numbers lose their fractional
/// part so `513355011` and `513355011.0` join to the same cell.
fn json_key(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                Some(int.to_string())
            } else if let Some(uint) = number.as_u64() {
                Some(uint.to_string())
            } else {
                let float = number.as_f64()?;
                if !float.is_finite() {
                    None
                } else if float.fract() == 0.0 && float.abs() < 9.0e15 {
                    Some(format!("{}", float as i64))
                } else {
                    Some(float.to_string())
                }
            }
        }
        _ => None,
    }
}

/// Split an underscore-delimited cell reference list (`kye_code`) into codes.
///
/// Empty segments are dropped, so `"A__B_"` yields `[A, B]`.
pub fn split_cell_codes(raw: &str) -> Vec<CellCode> {
    raw.split('_').filter_map(CellCode::parse).collect()
}
