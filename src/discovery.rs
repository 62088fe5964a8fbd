use std::collections::HashSet;

use crate::extract::{self, ExtractError};
use crate::models::DiscoveryCandidate;

pub const CANDIDATES_FIELD: &str = "festivals";

/// Parses a discovery response and drops every candidate whose name equals
/// (case-insensitively) one of `known_names`. Survivors are returned as the
/// model sent them; the operator reviews them before they reach the store.
pub fn ingest<I, S>(raw: &str, known_names: I) -> Result<Vec<DiscoveryCandidate>, ExtractError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let response = extract::parse_response(raw)?;
    let candidates: Vec<DiscoveryCandidate> = extract::list_field(&response, CANDIDATES_FIELD)?;

    let known: HashSet<String> = known_names
        .into_iter()
        .map(|name| name.as_ref().to_lowercase())
        .collect();

    let total = candidates.len();
    let fresh: Vec<DiscoveryCandidate> = candidates
        .into_iter()
        .filter(|candidate| {
            let duplicate = known.contains(&candidate.name.to_lowercase());
            if duplicate {
                log::debug!("discovery: '{}' is already known", candidate.name);
            }
            !duplicate
        })
        .collect();

    log::info!(
        "discovery: {} candidates, {} new",
        total,
        fresh.len()
    );
    Ok(fresh)
}

pub fn build_discovery_prompt(country: &str, known_in_country: &[&str]) -> String {
    let known = if known_in_country.is_empty() {
        "(none yet)".to_string()
    } else {
        known_in_country.join(", ")
    };
    format!(
        "List notable music festivals taking place in {country} that are NOT in this list: {known}.\n\n\
         Respond with ONLY a JSON object of this shape:\n\
         {{\"festivals\": [{{\"name\": \"...\", \"city\": \"...\", \"coordinates\": {{\"lat\": 0.0, \"lng\": 0.0}}, \
         \"startDate\": \"YYYY-MM-DD\", \"endDate\": \"YYYY-MM-DD\", \"genre\": \"...\", \
         \"website\": \"https://...\", \"description\": \"...\"}}]}}\n\n\
         Rules:\n\
         - Use the next upcoming edition's dates.\n\
         - Coordinates are the festival site in decimal degrees.\n\
         - Keep descriptions to one sentence.\n\
         - If you know of no further festivals, return {{\"festivals\": []}}.\n",
        country = country,
        known = known
    )
}
