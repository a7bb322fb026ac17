
use crate::entity::Entity;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::BTreeMap, fmt};

///
/// CONSTANTS
///

/// Canonical text layout for timestamps (second precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

///
/// Value
///
/// Dynamic value carried by entity fields, result rows and bind parameters.
///
/// Null     → SQL NULL, or an unset field.
/// Map      → decoded join-table row (column → value).
/// Entity   → decoded one-to-one relation.
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
    List(Vec<Self>),
    Map(BTreeMap<String, Self>),
    Entity(Box<Entity>),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_entity(&self) -> Option<&Entity> {
        match self {
            Self::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_map(&self) -> Option<&BTreeMap<String, Self>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Canonical, type-lenient text used for identity fingerprints and
    /// row de-duplication. `Int(7)` and `Text("7")` share one form, so a row
    /// reached by a direct fetch and by a nested join hashes identically.
    ///
    /// Returns `None` for null.
    #[must_use]
    pub fn canonical_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(value) => Some(value.to_string()),
            Self::Int(value) => Some(value.to_string()),
            Self::Float(value) => Some(canonical_float(*value)),
            Self::Text(text) => Some(text.clone()),
            Self::Timestamp(ts) => Some(ts.format(TIMESTAMP_FORMAT).to_string()),
            Self::List(items) => Some(
                items
                    .iter()
                    .map(|item| item.canonical_text().unwrap_or_default())
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            Self::Map(map) => Some(
                map.iter()
                    .map(|(k, v)| format!("{k}={}", v.canonical_text().unwrap_or_default()))
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            Self::Entity(entity) => Some(format!("{}{{{}}}", entity.name(), entity.len())),
        }
    }

    /// Lenient ordering across storage representations.
    ///
    /// Numbers compare numerically (text is parsed when the other side is
    /// numeric); timestamps compare against text in the canonical layout.
    /// Null and structural values are unordered.
    #[must_use]
    pub fn loose_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            (Self::Timestamp(a), Self::Text(b)) => parse_timestamp(b).map(|b| a.cmp(&b)),
            (Self::Text(a), Self::Timestamp(b)) => parse_timestamp(a).map(|a| a.cmp(b)),
            (Self::Int(_) | Self::Float(_) | Self::Text(_), _) => {
                let (a, b) = (self.as_f64()?, other.as_f64()?);
                a.partial_cmp(&b)
            }
            _ => None,
        }
    }

    /// Lenient equality; null is never equal to anything (SQL semantics).
    #[must_use]
    pub fn loose_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => false,
            (Self::List(_) | Self::Map(_) | Self::Entity(_), _) => self == other,
            _ => self.loose_cmp(other) == Some(Ordering::Equal),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            Self::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }
}

// Render integral floats without a fractional part so `1.0` keys like `1`.
fn canonical_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        #[expect(clippy::cast_possible_truncation)]
        let whole = value as i64;
        whole.to_string()
    } else {
        value.to_string()
    }
}

/// Parse the timestamp layouts accepted at the storage boundary.
#[must_use]
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    const LAYOUTS: [&str; 4] = [
        TIMESTAMP_FORMAT,
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
    ];

    let text = text.trim();
    for layout in LAYOUTS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, layout) {
            return Some(ts);
        }
    }

    if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(text) {
        return Some(ts.naive_utc());
    }

    chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Text(text) => write!(f, "'{}'", text.replace('\'', "''")),
            Self::Timestamp(ts) => write!(f, "'{}'", ts.format(TIMESTAMP_FORMAT)),
            Self::Entity(entity) => write!(f, "<{}>", entity.name()),
            other => write!(f, "{}", other.canonical_text().unwrap_or_default()),
        }
    }
}

///
/// Conversions
///

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Self::Timestamp(value)
    }
}

impl From<Entity> for Value {
    fn from(value: Entity) -> Self {
        Self::Entity(Box::new(value))
    }
}

impl From<Vec<Self>> for Value {
    fn from(value: Vec<Self>) -> Self {
        Self::List(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
