use serde::Serialize;

use crate::models::Festival;

const ALL: &str = "all";

/// Filter selection as picked in the sidebar. `None` means "all".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterCriteria {
    pub month: Option<u32>,
    pub genre: Option<String>,
    pub country: Option<String>,
    pub search: String,
}

impl FilterCriteria {
    /// Builds criteria from raw selector values, where `"all"` (or an empty
    /// value) is the wildcard. Unknown month values fall back to "all".
    pub fn from_selections(month: &str, genre: &str, country: &str, search: &str) -> Self {
        let month = month
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|m| (1..=12).contains(m));
        Self {
            month,
            genre: selection(genre),
            country: selection(country),
            search: search.to_string(),
        }
    }

    pub fn matches(&self, festival: &Festival) -> bool {
        self.matches_month(festival)
            && self.matches_genre(festival)
            && self.matches_country(festival)
            && self.matches_search(festival)
    }

    // Months are compared independently of the year, so a range that crosses
    // New Year (e.g. Dec..Jan) matches no month at all.
    fn matches_month(&self, festival: &Festival) -> bool {
        match self.month {
            None => true,
            Some(month) => {
                festival.dates.start_month() <= month && month <= festival.dates.end_month()
            }
        }
    }

    fn matches_genre(&self, festival: &Festival) -> bool {
        self.genre.as_deref().map_or(true, |g| festival.genre == g)
    }

    fn matches_country(&self, festival: &Festival) -> bool {
        self.country.as_deref().map_or(true, |c| festival.country == c)
    }

    fn matches_search(&self, festival: &Festival) -> bool {
        if self.search.is_empty() {
            return true;
        }
        let needle = self.search.to_lowercase();
        festival.name.to_lowercase().contains(&needle)
            || festival.city.to_lowercase().contains(&needle)
            || festival.description.to_lowercase().contains(&needle)
    }
}

fn selection(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == ALL {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Stable filter: the result is a subsequence of `festivals`.
pub fn filter<'a>(festivals: &'a [Festival], criteria: &FilterCriteria) -> Vec<&'a Festival> {
    festivals.iter().filter(|f| criteria.matches(f)).collect()
}
