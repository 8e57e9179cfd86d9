//! Jikan API v4 response types.
//!
//! Listing and roster entries are deserialized one record at a time from raw
//! JSON so that a single malformed record can be dropped without losing the
//! rest of the page.

use crate::error::CrawlError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::{AnimeImages, AnimeRef, ImageSet, UNRANKED};

/// Generic pagination wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    #[serde(default)]
    pub data: Vec<T>,
    #[serde(default)]
    pub pagination: Pagination,
}

/// Simple data wrapper (without pagination)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataResponse<T> {
    pub data: T,
}

/// Pagination metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub last_visible_page: u32,
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub current_page: u32,
}

/// Sort order of an `/anime` listing pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingOrder {
    /// Highest score first
    ByScore,
    /// Most popular first (popularity rank ascending)
    ByPopularity,
}

impl ListingOrder {
    pub fn order_by(&self) -> &'static str {
        match self {
            ListingOrder::ByScore => "score",
            ListingOrder::ByPopularity => "popularity",
        }
    }

    pub fn sort(&self) -> &'static str {
        match self {
            ListingOrder::ByScore => "desc",
            ListingOrder::ByPopularity => "asc",
        }
    }
}

/// Broadcast season of `/seasons/{year}/{season}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Fall,
}

impl Season {
    /// Season a calendar month (1-12) falls in
    pub fn from_month(month: u32) -> Self {
        match month {
            1..=3 => Season::Winter,
            4..=6 => Season::Spring,
            7..=9 => Season::Summer,
            _ => Season::Fall,
        }
    }

    /// The following season and its year
    pub fn next(self, year: i32) -> (i32, Season) {
        match self {
            Season::Winter => (year, Season::Spring),
            Season::Spring => (year, Season::Summer),
            Season::Summer => (year, Season::Fall),
            Season::Fall => (year + 1, Season::Winter),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Winter => "winter",
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Fall => "fall",
        }
    }
}

/// Anime entry of the `/anime` listing, numeric fields still raw
#[derive(Debug, Clone, Deserialize)]
pub struct ListingEntry {
    pub mal_id: u32,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub title_english: Option<String>,
    #[serde(rename = "type", default)]
    pub anime_type: Option<String>,
    #[serde(default)]
    pub score: Value,
    #[serde(default)]
    pub popularity: Value,
    #[serde(default)]
    pub rank: Value,
    #[serde(default)]
    pub members: Value,
    #[serde(default)]
    pub images: Option<AnimeImages>,
}

/// A listing entry whose numeric fields have been coerced
#[derive(Debug, Clone, PartialEq)]
pub struct ListedAnime {
    pub anime_type: Option<String>,
    pub score: Option<f64>,
    pub popularity: Option<u32>,
    pub anime: AnimeRef,
}

impl ListingEntry {
    /// Parse one raw listing record, coercing numeric fields.
    pub fn parse(raw: &Value) -> Result<ListedAnime, CrawlError> {
        let entry: ListingEntry = serde_json::from_value(raw.clone()).map_err(|e| {
            CrawlError::MalformedRecord {
                id: record_id(raw),
                reason: e.to_string(),
            }
        })?;
        entry.coerce()
    }

    fn coerce(self) -> Result<ListedAnime, CrawlError> {
        let id = self.mal_id.to_string();
        let score = coerce_f64(&self.score, &id, "score")?;
        let popularity = coerce_u64(&self.popularity, &id, "popularity")?.map(saturate_u32);
        let rank = coerce_u64(&self.rank, &id, "rank")?.map(saturate_u32);
        let members = coerce_u64(&self.members, &id, "members")?;

        Ok(ListedAnime {
            anime_type: self.anime_type,
            score,
            popularity,
            anime: AnimeRef {
                mal_id: self.mal_id,
                title: self.title.unwrap_or_else(|| "Unknown Title".to_string()),
                english_title: self.title_english,
                score: score.unwrap_or(0.0),
                popularity: popularity.unwrap_or(UNRANKED),
                members: members.unwrap_or(0),
                rank: rank.unwrap_or(UNRANKED),
                images: self.images,
            },
        })
    }
}

/// Subset of `/anime/{id}/full` used for enrichment
#[derive(Debug, Clone, Deserialize)]
pub struct AnimeDetails {
    pub mal_id: u32,
    #[serde(default)]
    pub title_english: Option<String>,
    #[serde(default)]
    pub images: Option<AnimeImages>,
}

/// Character entry of `/anime/{id}/characters`
#[derive(Debug, Clone, Deserialize)]
pub struct RosterEntry {
    pub character: CharacterSummary,
    pub role: String,
    #[serde(default)]
    pub favorites: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CharacterSummary {
    pub mal_id: u32,
    pub name: String,
    #[serde(default)]
    pub images: CharacterImages,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CharacterImages {
    #[serde(default)]
    pub jpg: ImageSet,
}

/// Subset of `/characters/{id}/full`
#[derive(Debug, Clone, Deserialize)]
pub struct CharacterDetails {
    pub mal_id: u32,
    pub name: String,
    #[serde(default)]
    pub images: CharacterImages,
    #[serde(default)]
    pub favorites: Value,
    #[serde(default)]
    pub role: Option<String>,
}

/// `/anime/{id}/themes`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThemeLists {
    #[serde(default)]
    pub openings: Vec<String>,
    #[serde(default)]
    pub endings: Vec<String>,
}

/// Best-effort id for log messages about a record that failed to parse
pub fn record_id(raw: &Value) -> String {
    raw.get("mal_id")
        .map(|id| id.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Coerce a JSON number or numeric string to f64. Null means absent.
pub fn coerce_f64(value: &Value, id: &str, field: &str) -> Result<Option<f64>, CrawlError> {
    let parsed = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(malformed(id, field, value)),
    }
}

/// Coerce a JSON number or numeric string to a non-negative integer.
/// Fractional values are truncated. Null means absent.
pub fn coerce_u64(value: &Value, id: &str, field: &str) -> Result<Option<u64>, CrawlError> {
    let parsed = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && *f >= 0.0)
                    .map(|f| f as u64)
            })
        }
        _ => None,
    };

    parsed.map(Some).ok_or_else(|| malformed(id, field, value))
}

fn saturate_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn malformed(id: &str, field: &str, value: &Value) -> CrawlError {
    CrawlError::MalformedRecord {
        id: id.to_string(),
        reason: format!("{} is not numeric: {}", field, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_listing_entry_coercion() {
        let raw = json!({
            "mal_id": 5114,
            "title": "Fullmetal Alchemist: Brotherhood",
            "type": "TV",
            "score": "9.1",
            "popularity": 3,
            "rank": 1.0,
            "members": "3400000"
        });

        let listed = ListingEntry::parse(&raw).unwrap();
        assert_eq!(listed.anime_type.as_deref(), Some("TV"));
        assert_eq!(listed.score, Some(9.1));
        assert_eq!(listed.anime.popularity, 3);
        assert_eq!(listed.anime.rank, 1);
        assert_eq!(listed.anime.members, 3_400_000);
    }

    #[test]
    fn test_listing_entry_defaults() {
        let raw = json!({"mal_id": 1, "title": "Cowboy Bebop", "type": "TV", "score": null});

        let listed = ListingEntry::parse(&raw).unwrap();
        assert_eq!(listed.score, None);
        assert_eq!(listed.popularity, None);
        assert_eq!(listed.anime.popularity, UNRANKED);
        assert_eq!(listed.anime.rank, UNRANKED);
        assert_eq!(listed.anime.members, 0);
    }

    #[test]
    fn test_malformed_numeric_field_rejected() {
        let raw = json!({"mal_id": 7, "title": "Broken", "type": "TV", "popularity": "very"});

        match ListingEntry::parse(&raw) {
            Err(CrawlError::MalformedRecord { id, reason }) => {
                assert_eq!(id, "7");
                assert!(reason.contains("popularity"));
            }
            other => panic!("expected malformed record, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_id_rejected() {
        let raw = json!({"title": "No id"});
        assert!(matches!(
            ListingEntry::parse(&raw),
            Err(CrawlError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn test_coerce_rejects_negative_and_bool() {
        assert!(coerce_u64(&json!(-3), "1", "rank").is_err());
        assert!(coerce_u64(&json!(true), "1", "rank").is_err());
        assert_eq!(coerce_u64(&json!("12"), "1", "rank").unwrap(), Some(12));
        assert_eq!(coerce_f64(&json!(6), "1", "score").unwrap(), Some(6.0));
    }

    #[test]
    fn test_season_rollover() {
        assert_eq!(Season::from_month(2), Season::Winter);
        assert_eq!(Season::from_month(6), Season::Spring);
        assert_eq!(Season::from_month(10), Season::Fall);
        assert_eq!(Season::Summer.next(2024), (2024, Season::Fall));
        assert_eq!(Season::Fall.next(2024), (2025, Season::Winter));
    }

    #[test]
    fn test_theme_lists_default_endings() {
        let themes: ThemeLists =
            serde_json::from_value(json!({"openings": ["\"Again\" by YUI"]})).unwrap();
        assert_eq!(themes.openings.len(), 1);
        assert!(themes.endings.is_empty());
    }
}
