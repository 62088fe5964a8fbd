use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Festival {
    pub id: u64,
    pub name: String,
    pub city: String,
    pub country: String,
    pub coordinates: Coordinates,
    pub dates: DateRange,
    pub genre: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Inclusive calendar date range. `start <= end` is enforced by the store.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        if start <= end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    pub fn is_ordered(&self) -> bool {
        self.start <= self.end
    }

    pub fn start_month(&self) -> u32 {
        self.start.month()
    }

    pub fn end_month(&self) -> u32 {
        self.end.month()
    }
}

/// A festival proposed by the AI service, not yet part of the store.
///
/// Every field is optional on the wire and nulls read as empty. Coordinates
/// are kept as sent; the store checks them when the operator accepts the
/// candidate.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DiscoveryCandidate {
    #[serde(deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub city: String,
    pub coordinates: Option<Value>,
    #[serde(deserialize_with = "lenient_string")]
    pub start_date: String,
    #[serde(deserialize_with = "lenient_string")]
    pub end_date: String,
    #[serde(deserialize_with = "lenient_string")]
    pub genre: String,
    #[serde(deserialize_with = "lenient_opt_string")]
    pub website: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub description: String,
}

impl DiscoveryCandidate {
    pub fn coordinates(&self) -> Option<Coordinates> {
        self.coordinates
            .clone()
            .and_then(|value| serde_json::from_value::<Coordinates>(value).ok())
            .filter(Coordinates::is_valid)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DateUpdateSuggestion {
    #[serde(alias = "name", deserialize_with = "lenient_string")]
    pub festival_name: String,
    #[serde(alias = "startDate", deserialize_with = "lenient_string")]
    pub new_start: String,
    #[serde(alias = "endDate", deserialize_with = "lenient_string")]
    pub new_end: String,
    #[serde(alias = "note", alias = "source", deserialize_with = "lenient_string")]
    pub source_note: String,
}

// Null reads as empty, other scalars as their JSON text.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_opt_string(deserializer)?.unwrap_or_default())
}

fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    })
}

/// A suggestion resolved against a stored festival, pending operator approval.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DateChange {
    pub festival_id: u64,
    pub festival_name: String,
    pub old_start: NaiveDate,
    pub old_end: NaiveDate,
    pub new_start: NaiveDate,
    pub new_end: NaiveDate,
    pub source_note: String,
}

impl DateChange {
    pub fn is_noop(&self) -> bool {
        self.old_start == self.new_start && self.old_end == self.new_end
    }
}

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").ok()
}
