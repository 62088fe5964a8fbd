use crate::extract::{self, ExtractError};
use crate::models::{parse_date, DateChange, DateUpdateSuggestion, Festival};

pub const UPDATES_FIELD: &str = "updates";

/// Matches each suggested date update to one of the `checked` festivals by
/// case-insensitive name equality. Suggestions that match nothing, or carry
/// unusable dates, are dropped. The store is not touched.
pub fn reconcile(raw: &str, checked: &[Festival]) -> Result<Vec<DateChange>, ExtractError> {
    let response = extract::parse_response(raw)?;
    let suggestions: Vec<DateUpdateSuggestion> = extract::list_field(&response, UPDATES_FIELD)?;

    let changes: Vec<DateChange> = suggestions
        .into_iter()
        .filter_map(|suggestion| resolve(suggestion, checked))
        .collect();
    log::info!("date check: {} matched suggestions", changes.len());
    Ok(changes)
}

fn resolve(suggestion: DateUpdateSuggestion, checked: &[Festival]) -> Option<DateChange> {
    let wanted = suggestion.festival_name.to_lowercase();
    let Some(festival) = checked.iter().find(|f| f.name.to_lowercase() == wanted) else {
        log::debug!(
            "date check: no festival named '{}', dropping suggestion",
            suggestion.festival_name
        );
        return None;
    };

    let (Some(new_start), Some(new_end)) =
        (parse_date(&suggestion.new_start), parse_date(&suggestion.new_end))
    else {
        log::warn!(
            "date check: unusable dates for '{}': '{}'..'{}'",
            festival.name,
            suggestion.new_start,
            suggestion.new_end
        );
        return None;
    };
    if new_start > new_end {
        log::warn!(
            "date check: inverted dates for '{}': {new_start}..{new_end}",
            festival.name
        );
        return None;
    }

    Some(DateChange {
        festival_id: festival.id,
        festival_name: festival.name.clone(),
        old_start: festival.dates.start,
        old_end: festival.dates.end,
        new_start,
        new_end,
        source_note: suggestion.source_note,
    })
}

pub fn build_date_check_prompt(festivals: &[Festival]) -> String {
    let listing = festivals
        .iter()
        .map(|f| {
            format!(
                "- {} ({}): {} to {}",
                f.name, f.city, f.dates.start, f.dates.end
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Check the dates of the next edition of these music festivals:\n{listing}\n\n\
         Respond with ONLY a JSON object of this shape:\n\
         {{\"updates\": [{{\"festivalName\": \"exact name from the list\", \"newStart\": \"YYYY-MM-DD\", \
         \"newEnd\": \"YYYY-MM-DD\", \"sourceNote\": \"where the dates come from\"}}]}}\n\n\
         Rules:\n\
         - Only include festivals whose dates differ from the ones listed.\n\
         - Use the festival names exactly as listed.\n\
         - If everything is current, return {{\"updates\": []}}.\n",
        listing = listing
    )
}
