use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::{parse_date, DateRange, DiscoveryCandidate, Festival};
use crate::utils;

/// Sample document shipped with the binary, used when no data file exists.
pub const BUNDLED_DOCUMENT: &str = include_str!("../data/festivals.json");

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to load festivals: {0}")]
    Load(String),
    #[error("invalid festival: {0}")]
    Validation(String),
    #[error("no festival with id {0}")]
    NotFound(u64),
    #[error("invalid date range: {start} is after {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    festivals: Vec<Value>,
}

#[derive(Serialize)]
struct DocumentRef<'a> {
    festivals: &'a [Festival],
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub loaded: usize,
    pub dropped: usize,
}

/// Owns the festival list. Other components only ever see `&Festival`.
#[derive(Debug)]
pub struct FestivalStore {
    festivals: Vec<Festival>,
    next_id: u64,
}

impl Default for FestivalStore {
    fn default() -> Self {
        Self {
            festivals: Vec::new(),
            next_id: 1,
        }
    }
}

impl FestivalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the list wholesale. Malformed entries are dropped and counted,
    /// they never abort the whole load.
    pub fn load(&mut self, records: Vec<Value>) -> LoadReport {
        let mut festivals: Vec<Festival> = Vec::with_capacity(records.len());
        let mut seen_ids: HashSet<u64> = HashSet::new();
        let mut dropped = 0;

        for (index, record) in records.into_iter().enumerate() {
            match validate_record(record) {
                Ok(festival) if seen_ids.insert(festival.id) => festivals.push(festival),
                Ok(festival) => {
                    log::warn!(
                        "dropping festival #{index} '{}': duplicate id {}",
                        festival.name,
                        festival.id
                    );
                    dropped += 1;
                }
                Err(reason) => {
                    log::warn!("dropping festival #{index}: {reason}");
                    dropped += 1;
                }
            }
        }

        let max_id = festivals.iter().map(|f| f.id).max().unwrap_or(0);
        self.next_id = self.next_id.max(max_id.saturating_add(1));
        self.festivals = festivals;

        let report = LoadReport {
            loaded: self.festivals.len(),
            dropped,
        };
        log::info!(
            "loaded {} festivals ({} dropped)",
            report.loaded,
            report.dropped
        );
        report
    }

    /// Loads a `{"festivals": [...]}` document.
    pub fn load_str(&mut self, text: &str) -> Result<LoadReport, StoreError> {
        let document: RawDocument =
            serde_json::from_str(text).map_err(|err| StoreError::Load(err.to_string()))?;
        Ok(self.load(document.festivals))
    }

    pub fn load_path(&mut self, path: &Path) -> Result<LoadReport, StoreError> {
        let text = fs::read_to_string(path)
            .map_err(|err| StoreError::Load(format!("{}: {err}", path.display())))?;
        self.load_str(&text)
    }

    pub fn to_document(&self) -> Result<String, StoreError> {
        serde_json::to_string_pretty(&DocumentRef {
            festivals: &self.festivals,
        })
        .map_err(|err| StoreError::Load(err.to_string()))
    }

    pub fn export_to(&self, path: &Path) -> Result<(), StoreError> {
        let contents = self.to_document()?;
        utils::ensure_parent(path);
        fs::write(path, contents).map_err(|err| StoreError::Load(err.to_string()))
    }

    /// Appends an approved discovery candidate under the given country and
    /// returns its freshly assigned id.
    pub fn add(&mut self, candidate: &DiscoveryCandidate, country: &str) -> Result<u64, StoreError> {
        let name = candidate.name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation("name is required".into()));
        }
        let country = country.trim();
        if country.is_empty() {
            return Err(StoreError::Validation(format!("{name}: country is required")));
        }
        let coordinates = candidate.coordinates().ok_or_else(|| {
            StoreError::Validation(format!("{name}: valid coordinates are required"))
        })?;
        let start = parse_date(&candidate.start_date).ok_or_else(|| {
            StoreError::Validation(format!("{name}: bad start date '{}'", candidate.start_date))
        })?;
        let end = parse_date(&candidate.end_date).ok_or_else(|| {
            StoreError::Validation(format!("{name}: bad end date '{}'", candidate.end_date))
        })?;
        let dates = DateRange::new(start, end).ok_or(StoreError::InvalidRange { start, end })?;

        let id = self.next_id;
        self.next_id = id
            .checked_add(1)
            .ok_or_else(|| StoreError::Validation("festival ids are exhausted".into()))?;
        self.festivals.push(Festival {
            id,
            name: name.to_string(),
            city: candidate.city.trim().to_string(),
            country: country.to_string(),
            coordinates,
            dates,
            genre: candidate.genre.trim().to_string(),
            website: candidate
                .website
                .as_deref()
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string),
            description: candidate.description.clone(),
        });
        log::info!("added festival {id} '{name}' ({country})");
        Ok(id)
    }

    pub fn apply_date_update(
        &mut self,
        id: u64,
        new_start: NaiveDate,
        new_end: NaiveDate,
    ) -> Result<(), StoreError> {
        let festival = self
            .festivals
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or(StoreError::NotFound(id))?;
        festival.dates = DateRange::new(new_start, new_end).ok_or(StoreError::InvalidRange {
            start: new_start,
            end: new_end,
        })?;
        log::info!(
            "updated dates of festival {id} '{}' to {new_start}..{new_end}",
            festival.name
        );
        Ok(())
    }

    pub fn existing_names(&self) -> impl Iterator<Item = String> + '_ {
        self.festivals.iter().map(|f| f.name.to_lowercase())
    }

    pub fn distinct_genres(&self) -> Vec<String> {
        distinct(self.festivals.iter().map(|f| f.genre.as_str()))
    }

    pub fn distinct_countries(&self) -> Vec<String> {
        distinct(self.festivals.iter().map(|f| f.country.as_str()))
    }

    pub fn festivals(&self) -> &[Festival] {
        &self.festivals
    }

    pub fn get(&self, id: u64) -> Option<&Festival> {
        self.festivals.iter().find(|f| f.id == id)
    }

    pub fn in_country<'a>(&'a self, country: &'a str) -> impl Iterator<Item = &'a Festival> + 'a {
        self.festivals.iter().filter(move |f| f.country == country)
    }

    pub fn len(&self) -> usize {
        self.festivals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.festivals.is_empty()
    }
}

fn validate_record(record: Value) -> Result<Festival, String> {
    let label = record
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| "<unnamed>".to_string());
    let festival: Festival =
        serde_json::from_value(record).map_err(|err| format!("'{label}': {err}"))?;
    if festival.name.trim().is_empty() {
        return Err("empty name".into());
    }
    if !festival.dates.is_ordered() {
        return Err(format!(
            "'{label}': start {} is after end {}",
            festival.dates.start, festival.dates.end
        ));
    }
    if !festival.coordinates.is_valid() {
        return Err(format!("'{label}': coordinates out of range"));
    }
    if festival.id == u64::MAX {
        return Err(format!("'{label}': id {} leaves no room for new ids", festival.id));
    }
    Ok(festival)
}

// BTreeSet<&str> orders by bytes, i.e. lexicographic and case-sensitive.
fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    values
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: u64, name: &str, country: &str, genre: &str) -> Value {
        json!({
            "id": id,
            "name": name,
            "city": "Somewhere",
            "country": country,
            "coordinates": {"lat": 50.0, "lng": 10.0},
            "dates": {"start": "2025-07-30", "end": "2025-08-02"},
            "genre": genre,
            "website": "https://example.com",
            "description": "desc"
        })
    }

    fn candidate(name: &str) -> DiscoveryCandidate {
        DiscoveryCandidate {
            name: name.to_string(),
            city: "Novi Sad".to_string(),
            coordinates: Some(json!({"lat": 45.25, "lng": 19.86})),
            start_date: "2025-07-10".to_string(),
            end_date: "2025-07-13".to_string(),
            genre: "Electronic".to_string(),
            website: Some("https://exitfest.org".to_string()),
            description: "Fortress festival".to_string(),
        }
    }

    fn date(text: &str) -> NaiveDate {
        parse_date(text).expect("valid date")
    }

    #[test]
    fn load_drops_malformed_entries_and_keeps_the_rest() {
        let mut store = FestivalStore::new();
        let mut inverted = record(4, "Backwards", "Spain", "Rock");
        inverted["dates"] = json!({"start": "2025-07-10", "end": "2025-07-01"});
        let report = store.load(vec![
            record(1, "Primavera Sound", "Spain", "Indie"),
            json!({"id": 2, "city": "Nowhere"}),
            record(1, "Duplicate", "Spain", "Rock"),
            inverted,
            record(3, "Wacken Open Air", "Germany", "Metal"),
        ]);
        assert_eq!(report, LoadReport { loaded: 2, dropped: 3 });
        assert_eq!(store.len(), 2);
        assert_eq!(store.festivals()[1].name, "Wacken Open Air");
    }

    #[test]
    fn load_str_rejects_documents_without_festivals() {
        let mut store = FestivalStore::new();
        assert!(matches!(store.load_str("{}"), Err(StoreError::Load(_))));
        assert!(matches!(store.load_str("not json"), Err(StoreError::Load(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn add_assigns_next_id_and_country_override() {
        let mut store = FestivalStore::new();
        store.load(vec![
            record(7, "A", "Spain", "Rock"),
            record(2, "B", "Spain", "Rock"),
        ]);
        let id = store.add(&candidate("EXIT"), "Serbia").expect("add");
        assert_eq!(id, 8);
        let added = store.get(8).expect("stored");
        assert_eq!(added.country, "Serbia");
        assert_eq!(added.dates.start, date("2025-07-10"));

        let second = store.add(&candidate("EXIT 2"), "Serbia").expect("add");
        assert_eq!(second, 9);
    }

    #[test]
    fn ids_are_not_reused_after_reload() {
        let mut store = FestivalStore::new();
        store.load(vec![record(5, "A", "Spain", "Rock")]);
        store.add(&candidate("New"), "Spain").expect("add");
        store.load(vec![record(1, "B", "Spain", "Rock")]);
        let id = store.add(&candidate("Newer"), "Spain").expect("add");
        assert_eq!(id, 7);
    }

    #[test]
    fn add_rejects_candidates_missing_required_fields() {
        let mut store = FestivalStore::new();

        let mut nameless = candidate("x");
        nameless.name = "  ".into();
        assert!(matches!(store.add(&nameless, "Spain"), Err(StoreError::Validation(_))));

        let mut nowhere = candidate("Nowhere");
        nowhere.coordinates = None;
        assert!(matches!(store.add(&nowhere, "Spain"), Err(StoreError::Validation(_))));

        let mut half_placed = candidate("Half placed");
        half_placed.coordinates = Some(json!({"lat": 42.2}));
        assert!(matches!(store.add(&half_placed, "Spain"), Err(StoreError::Validation(_))));

        let mut off_map = candidate("Off map");
        off_map.coordinates = Some(json!({"lat": 142.2, "lng": 3.0}));
        assert!(matches!(store.add(&off_map, "Spain"), Err(StoreError::Validation(_))));

        let mut undated = candidate("Undated");
        undated.start_date = "July".into();
        assert!(matches!(store.add(&undated, "Spain"), Err(StoreError::Validation(_))));

        assert!(matches!(store.add(&candidate("Fine"), " "), Err(StoreError::Validation(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn largest_id_is_dropped_on_load() {
        let mut store = FestivalStore::new();
        let report = store.load(vec![
            record(u64::MAX, "Edge", "Spain", "Rock"),
            record(3, "Fine", "Spain", "Rock"),
        ]);
        assert_eq!(report, LoadReport { loaded: 1, dropped: 1 });
        assert_eq!(store.add(&candidate("Next"), "Spain").expect("add"), 4);
    }

    #[test]
    fn add_reports_exhausted_ids() {
        let mut store = FestivalStore::new();
        store.load(vec![record(u64::MAX - 1, "Last", "Spain", "Rock")]);
        assert!(matches!(
            store.add(&candidate("Overflow"), "Spain"),
            Err(StoreError::Validation(_))
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn apply_date_update_rejects_inverted_range() {
        let mut store = FestivalStore::new();
        store.load(vec![record(1, "A", "Spain", "Rock")]);
        let result = store.apply_date_update(1, date("2025-07-10"), date("2025-07-01"));
        assert!(matches!(result, Err(StoreError::InvalidRange { .. })));
        assert_eq!(store.get(1).unwrap().dates.start, date("2025-07-30"));
    }

    #[test]
    fn apply_date_update_unknown_id_is_not_found() {
        let mut store = FestivalStore::new();
        let result = store.apply_date_update(42, date("2025-07-01"), date("2025-07-02"));
        assert!(matches!(result, Err(StoreError::NotFound(42))));
    }

    #[test]
    fn distinct_values_are_sorted_case_sensitively() {
        let mut store = FestivalStore::new();
        store.load(vec![
            record(1, "A", "Spain", "rock"),
            record(2, "B", "Belgium", "Rock"),
            record(3, "C", "Spain", "Electronic"),
        ]);
        assert_eq!(store.distinct_genres(), vec!["Electronic", "Rock", "rock"]);
        assert_eq!(store.distinct_countries(), vec!["Belgium", "Spain"]);
    }

    #[test]
    fn existing_names_are_lower_cased() {
        let mut store = FestivalStore::new();
        store.load(vec![record(1, "Primavera Sound", "Spain", "Indie")]);
        let names: Vec<String> = store.existing_names().collect();
        assert_eq!(names, vec!["primavera sound"]);
    }

    #[test]
    fn bundled_document_loads_cleanly() {
        let mut store = FestivalStore::new();
        let report = store
            .load_str(BUNDLED_DOCUMENT)
            .expect("bundled data");
        assert_eq!(report.dropped, 0);
        assert_eq!(report.loaded, store.len());
        assert!(store.distinct_countries().contains(&"Germany".to_string()));
    }

    #[test]
    fn export_writes_a_reloadable_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out").join("festivals.json");
        let mut store = FestivalStore::new();
        store.load(vec![record(1, "A", "Spain", "Rock")]);
        store.add(&candidate("EXIT"), "Serbia").expect("add");
        store.export_to(&path).expect("export");

        let mut reloaded = FestivalStore::new();
        let report = reloaded.load_path(&path).expect("reload");
        assert_eq!(report.loaded, 2);
        assert_eq!(reloaded.festivals(), store.festivals());
    }
}
