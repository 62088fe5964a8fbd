use serde::Serialize;

use crate::filter::{filter, FilterCriteria};
use crate::models::{Coordinates, Festival};

pub const DEFAULT_COLOR: &str = "#667eea";

const ICON_SIZE: u32 = 30;
const POPUP_MAX_WIDTH: u32 = 320;
const BOUNDS_PADDING: f64 = 0.1;

struct ColorRule {
    matches: fn(&str) -> bool,
    color: &'static str,
}

// Evaluated top to bottom, first match wins. "indie rock" is caught by the
// rock rule before the indie rule is reached.
static COLOR_RULES: [ColorRule; 4] = [
    ColorRule {
        matches: is_electronic,
        color: "#00d2ff",
    },
    ColorRule {
        matches: is_heavy,
        color: "#414345",
    },
    ColorRule {
        matches: is_rock,
        color: "#f12711",
    },
    ColorRule {
        matches: is_indie,
        color: "#11998e",
    },
];

fn is_electronic(genre: &str) -> bool {
    genre.contains("electronic") || genre.contains("edm")
}

fn is_heavy(genre: &str) -> bool {
    genre.contains("metal") || genre.contains("hard rock")
}

fn is_rock(genre: &str) -> bool {
    genre.contains("rock") && !genre.contains("metal")
}

fn is_indie(genre: &str) -> bool {
    genre.contains("indie") || genre.contains("alternative")
}

pub fn color_for(genre: &str) -> &'static str {
    let lower = genre.to_lowercase();
    COLOR_RULES
        .iter()
        .find(|rule| (rule.matches)(&lower))
        .map(|rule| rule.color)
        .unwrap_or(DEFAULT_COLOR)
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Marker {
    pub festival_id: u64,
    pub position: Coordinates,
    pub color: &'static str,
    pub icon_html: String,
    pub icon_size: [u32; 2],
    pub icon_anchor: [i32; 2],
    pub popup_anchor: [i32; 2],
    pub popup_html: String,
    pub popup_max_width: u32,
}

impl Marker {
    pub fn for_festival(festival: &Festival) -> Self {
        let color = color_for(&festival.genre);
        let half = (ICON_SIZE / 2) as i32;
        Self {
            festival_id: festival.id,
            position: festival.coordinates,
            color,
            icon_html: icon_html(color),
            icon_size: [ICON_SIZE, ICON_SIZE],
            icon_anchor: [half, half],
            popup_anchor: [0, -half],
            popup_html: popup_html(festival),
            popup_max_width: POPUP_MAX_WIDTH,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct Bounds {
    pub south_west: Coordinates,
    pub north_east: Coordinates,
}

impl Bounds {
    fn around<'a>(points: impl Iterator<Item = &'a Coordinates>) -> Option<Self> {
        points.fold(None, |acc: Option<Bounds>, p| {
            Some(match acc {
                None => Bounds {
                    south_west: *p,
                    north_east: *p,
                },
                Some(b) => Bounds {
                    south_west: Coordinates {
                        lat: b.south_west.lat.min(p.lat),
                        lng: b.south_west.lng.min(p.lng),
                    },
                    north_east: Coordinates {
                        lat: b.north_east.lat.max(p.lat),
                        lng: b.north_east.lng.max(p.lng),
                    },
                },
            })
        })
    }

    /// Grows the box by `ratio` of its span on every side.
    pub fn pad(&self, ratio: f64) -> Self {
        let lat_buffer = (self.north_east.lat - self.south_west.lat).abs() * ratio;
        let lng_buffer = (self.north_east.lng - self.south_west.lng).abs() * ratio;
        Self {
            south_west: Coordinates {
                lat: self.south_west.lat - lat_buffer,
                lng: self.south_west.lng - lng_buffer,
            },
            north_east: Coordinates {
                lat: self.north_east.lat + lat_buffer,
                lng: self.north_east.lng + lng_buffer,
            },
        }
    }
}

/// The full marker layer for one render pass. Always rebuilt from scratch.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MarkerLayer {
    pub markers: Vec<Marker>,
    pub count_label: String,
    pub fit_bounds: Option<Bounds>,
}

pub fn render_markers(festivals: &[Festival], criteria: &FilterCriteria) -> MarkerLayer {
    let visible = filter(festivals, criteria);
    let markers: Vec<Marker> = visible.iter().map(|f| Marker::for_festival(f)).collect();
    let fit_bounds =
        Bounds::around(markers.iter().map(|m| &m.position)).map(|b| b.pad(BOUNDS_PADDING));
    MarkerLayer {
        count_label: count_label(markers.len()),
        markers,
        fit_bounds,
    }
}

pub fn count_label(count: usize) -> String {
    if count == 1 {
        "1 festival".to_string()
    } else {
        format!("{count} festivals")
    }
}

/// "Jul 30 - Aug 2, 2025": short month-day for both ends plus the start year.
pub fn date_line(festival: &Festival) -> String {
    format!(
        "{} - {}, {}",
        festival.dates.start.format("%b %-d"),
        festival.dates.end.format("%b %-d"),
        festival.dates.start.format("%Y")
    )
}

pub fn popup_text(festival: &Festival) -> String {
    let mut lines = vec![
        festival.name.clone(),
        format!("📍 {}, {}", festival.city, festival.country),
        format!("📅 {}", date_line(festival)),
        format!("🎸 {}", festival.genre),
        festival.description.clone(),
    ];
    if let Some(website) = &festival.website {
        lines.push(format!("🌐 {website}"));
    }
    lines.join("\n")
}

pub fn popup_html(festival: &Festival) -> String {
    let link = festival
        .website
        .as_deref()
        .map(|url| {
            format!(
                "<a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\" class=\"website-link\">🌐 Visit Website</a>",
                escape_html(url)
            )
        })
        .unwrap_or_default();
    format!(
        "<div class=\"festival-popup\"><h3>{name}</h3><div class=\"location\">📍 {city}, {country}</div><div><span class=\"dates\">📅 {dates}</span><span class=\"genre\">🎸 {genre}</span></div><p class=\"description\">{description}</p>{link}</div>",
        name = escape_html(&festival.name),
        city = escape_html(&festival.city),
        country = escape_html(&festival.country),
        dates = date_line(festival),
        genre = escape_html(&festival.genre),
        description = escape_html(&festival.description),
        link = link,
    )
}

fn icon_html(color: &str) -> String {
    format!(
        "<div style=\"width: {size}px; height: {size}px; background: {color}; border-radius: 50%; border: 3px solid white; box-shadow: 0 4px 12px rgba(0, 0, 0, 0.3); display: flex; align-items: center; justify-content: center; font-size: 14px;\">🎵</div>",
        size = ICON_SIZE,
        color = color
    )
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{parse_date, DateRange};

    fn festival(id: u64, genre: &str, lat: f64, lng: f64) -> Festival {
        Festival {
            id,
            name: "Wacken Open Air".to_string(),
            city: "Wacken".to_string(),
            country: "Germany".to_string(),
            coordinates: Coordinates { lat, lng },
            dates: DateRange {
                start: parse_date("2025-07-30").unwrap(),
                end: parse_date("2025-08-02").unwrap(),
            },
            genre: genre.to_string(),
            website: Some("https://www.wacken.com".to_string()),
            description: "Heavy <loud> metal".to_string(),
        }
    }

    #[test]
    fn color_rules_apply_in_order() {
        assert_eq!(color_for("Electronic"), "#00d2ff");
        assert_eq!(color_for("EDM / Pop"), "#00d2ff");
        assert_eq!(color_for("Heavy Metal"), "#414345");
        assert_eq!(color_for("Hard Rock"), "#414345");
        assert_eq!(color_for("Rock"), "#f12711");
        assert_eq!(color_for("Indie Rock"), "#f12711");
        assert_eq!(color_for("Alternative"), "#11998e");
        assert_eq!(color_for("Indie"), "#11998e");
        assert_eq!(color_for("Multi-genre"), DEFAULT_COLOR);
    }

    #[test]
    fn electronic_beats_metal_when_both_present() {
        assert_eq!(color_for("Electronic Metal"), "#00d2ff");
    }

    #[test]
    fn popup_text_formats_dates_with_start_year() {
        let text = popup_text(&festival(1, "Metal", 54.0, 9.3));
        assert!(text.contains("📍 Wacken, Germany"));
        assert!(text.contains("📅 Jul 30 - Aug 2, 2025"));
        assert!(text.contains("🌐 https://www.wacken.com"));
    }

    #[test]
    fn popup_html_escapes_text_and_links_out() {
        let html = popup_html(&festival(1, "Metal", 54.0, 9.3));
        assert!(html.contains("Heavy &lt;loud&gt; metal"));
        assert!(html.contains("href=\"https://www.wacken.com\" target=\"_blank\""));

        let mut no_site = festival(1, "Metal", 54.0, 9.3);
        no_site.website = None;
        assert!(!popup_html(&no_site).contains("Visit Website"));
    }

    #[test]
    fn render_rebuilds_layer_with_count_and_padded_bounds() {
        let festivals = vec![festival(1, "Metal", 40.0, 0.0), festival(2, "Rock", 50.0, 10.0)];
        let layer = render_markers(&festivals, &FilterCriteria::default());
        assert_eq!(layer.markers.len(), 2);
        assert_eq!(layer.count_label, "2 festivals");
        assert_eq!(layer.markers[1].color, "#f12711");
        assert_eq!(layer.markers[0].icon_anchor, [15, 15]);
        let bounds = layer.fit_bounds.expect("bounds");
        assert!((bounds.south_west.lat - 39.0).abs() < 1e-9);
        assert!((bounds.north_east.lng - 11.0).abs() < 1e-9);

        let again = render_markers(&festivals, &FilterCriteria::default());
        assert_eq!(layer, again);
    }

    #[test]
    fn empty_render_has_no_bounds() {
        let layer = render_markers(&[], &FilterCriteria::default());
        assert!(layer.markers.is_empty());
        assert_eq!(layer.count_label, "0 festivals");
        assert!(layer.fit_bounds.is_none());
        assert_eq!(count_label(1), "1 festival");
    }
}
