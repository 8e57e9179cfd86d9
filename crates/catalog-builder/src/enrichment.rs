//! Per-anime enrichment: details, main characters and themes.
//!
//! Each candidate is turned into zero or more catalog records. Detail lookups
//! degrade to the data already on hand. A missing roster or theme list makes
//! the anime incomplete, so it is skipped and retried by a later run.
//! Throttling and upstream outages are returned to the caller, which ends
//! the batch.

use crate::api::{coerce_u64, record_id, CharacterDetails, JikanClient, RosterEntry, ThemeLists};
use crate::error::{CrawlError, CrawlResult};
use serde_json::Value;
use shared::config::EnrichmentConfig;
use shared::{AnimeRef, CharacterEntry, Difficulty, OpeningEntry, ThemeType};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Tier of a character from its favorite count.
///
/// `role` is the role reported on the character record itself; a `Main`
/// role there always makes the character easy.
pub fn classify_character(favorites: u64, role: Option<&str>) -> Difficulty {
    if role == Some("Main") {
        return Difficulty::Easy;
    }

    if favorites > 10_000 {
        Difficulty::Easy
    } else if favorites > 5_000 {
        Difficulty::Medium
    } else {
        Difficulty::Hard
    }
}

/// Tier of an anime (and its themes) from popularity and rank
pub fn classify_anime(popularity: u32, rank: u32) -> Difficulty {
    if popularity <= 100 || rank <= 100 {
        Difficulty::Easy
    } else if popularity <= 500 || rank <= 500 {
        Difficulty::Medium
    } else {
        Difficulty::Hard
    }
}

/// Split a raw theme string such as `"Again" by YUI` into title and artist
pub fn parse_theme(raw: &str) -> (String, String) {
    match raw.split_once(" by ") {
        Some((title, artist)) => (
            title.trim().trim_matches('"').to_string(),
            artist.trim().to_string(),
        ),
        None => (raw.trim().trim_matches('"').to_string(), "Unknown".to_string()),
    }
}

/// Records produced for one anime
#[derive(Debug, Clone)]
pub struct EnrichedAnime {
    pub anime: AnimeRef,
    pub characters: Vec<CharacterEntry>,
    pub openings: Vec<OpeningEntry>,
    /// Roster records dropped as malformed
    pub dropped_records: usize,
}

/// Turns candidate anime into catalog records
pub struct Enricher {
    config: EnrichmentConfig,
}

impl Enricher {
    pub fn new(config: EnrichmentConfig) -> Self {
        Self { config }
    }

    /// Enrich one anime.
    ///
    /// Characters whose id is in `known_characters` are not emitted again.
    pub async fn enrich(
        &self,
        client: &mut JikanClient,
        anime: AnimeRef,
        known_characters: &HashSet<String>,
    ) -> CrawlResult<EnrichedAnime> {
        info!(mal_id = anime.mal_id, title = %anime.title, "Enriching anime");

        let anime = self.with_details(client, anime).await?;
        let (characters, dropped_records) = self.main_characters(client, &anime, known_characters).await?;
        let openings = self.themes(client, &anime).await?;

        debug!(
            mal_id = anime.mal_id,
            characters = characters.len(),
            openings = openings.len(),
            dropped = dropped_records,
            "Anime enriched"
        );

        Ok(EnrichedAnime {
            anime,
            characters,
            openings,
            dropped_records,
        })
    }

    /// Fill the English title and images; keep the listing data on failure
    async fn with_details(&self, client: &mut JikanClient, mut anime: AnimeRef) -> CrawlResult<AnimeRef> {
        match client.anime_details(anime.mal_id).await {
            Ok(Some(details)) => {
                if details.title_english.is_some() {
                    anime.english_title = details.title_english;
                }
                if anime.images.is_none() {
                    anime.images = details.images;
                }
            }
            Ok(None) => {
                warn!(mal_id = anime.mal_id, "Anime details unavailable, keeping listing data");
            }
            Err(e) if e.is_batch_fatal() => return Err(e),
            Err(e) => {
                warn!(mal_id = anime.mal_id, error = %e, "Failed to fetch anime details, keeping listing data");
            }
        }
        Ok(anime)
    }

    async fn main_characters(
        &self,
        client: &mut JikanClient,
        anime: &AnimeRef,
        known_characters: &HashSet<String>,
    ) -> CrawlResult<(Vec<CharacterEntry>, usize)> {
        let Some(roster) = client.anime_characters(anime.mal_id).await? else {
            return Err(CrawlError::EntityIncomplete {
                mal_id: anime.mal_id,
                what: "character roster",
            });
        };

        let (entries, mut dropped) = parse_roster(&roster);
        let mut seen = HashSet::new();
        let mut characters = Vec::new();

        for entry in entries
            .into_iter()
            .filter(|entry| entry.role == self.config.character_role)
        {
            let id = entry.character.mal_id.to_string();
            if known_characters.contains(&id) || !seen.insert(id.clone()) {
                debug!(character_id = %id, "Character already in catalog");
                continue;
            }

            let summary = match character_from_roster(&entry, anime) {
                Ok(summary) => summary,
                Err(e) => {
                    warn!(error = %e, "Skipping invalid character record");
                    dropped += 1;
                    continue;
                }
            };

            let character = if self.config.fetch_character_details {
                self.with_character_details(client, summary).await?
            } else {
                summary
            };
            characters.push(character);
        }

        Ok((characters, dropped))
    }

    /// Replace the roster summary with the character's own record when available
    async fn with_character_details(
        &self,
        client: &mut JikanClient,
        summary: CharacterEntry,
    ) -> CrawlResult<CharacterEntry> {
        let Ok(character_id) = summary.id.parse::<u32>() else {
            return Ok(summary);
        };

        match client.character_details(character_id).await {
            Ok(Some(details)) => match character_from_details(details, &summary.anime) {
                Ok(character) => Ok(character),
                Err(e) => {
                    warn!(character_id = character_id, error = %e, "Invalid character details, using roster data");
                    Ok(summary)
                }
            },
            Ok(None) => {
                debug!(character_id = character_id, "Character details unavailable, using roster data");
                Ok(summary)
            }
            Err(e) if e.is_batch_fatal() => Err(e),
            Err(e) => {
                warn!(character_id = character_id, error = %e, "Failed to fetch character details, using roster data");
                Ok(summary)
            }
        }
    }

    async fn themes(&self, client: &mut JikanClient, anime: &AnimeRef) -> CrawlResult<Vec<OpeningEntry>> {
        let Some(themes) = client.anime_themes(anime.mal_id).await? else {
            return Err(CrawlError::EntityIncomplete {
                mal_id: anime.mal_id,
                what: "themes",
            });
        };
        Ok(theme_entries(&themes, anime, self.config.include_endings))
    }
}

/// Parse raw roster records, dropping malformed ones
pub fn parse_roster(raw: &[Value]) -> (Vec<RosterEntry>, usize) {
    let mut entries = Vec::with_capacity(raw.len());
    let mut dropped = 0;

    for record in raw {
        match serde_json::from_value::<RosterEntry>(record.clone()) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                let id = record
                    .get("character")
                    .map(record_id)
                    .unwrap_or_else(|| "unknown".to_string());
                warn!(character_id = %id, error = %e, "Skipping invalid roster record");
                dropped += 1;
            }
        }
    }

    (entries, dropped)
}

fn character_from_roster(entry: &RosterEntry, anime: &AnimeRef) -> CrawlResult<CharacterEntry> {
    let id = entry.character.mal_id.to_string();
    let favorites = coerce_u64(&entry.favorites, &id, "favorites")?.unwrap_or(0);

    Ok(CharacterEntry {
        name: entry.character.name.clone(),
        image_url: entry.character.images.jpg.image_url.clone().unwrap_or_default(),
        favorites,
        difficulty: classify_character(favorites, None),
        anime: anime.clone(),
        id,
    })
}

fn character_from_details(details: CharacterDetails, anime: &AnimeRef) -> Result<CharacterEntry, CrawlError> {
    let id = details.mal_id.to_string();
    let favorites = coerce_u64(&details.favorites, &id, "favorites")?.unwrap_or(0);

    Ok(CharacterEntry {
        difficulty: classify_character(favorites, details.role.as_deref()),
        name: details.name,
        image_url: details.images.jpg.image_url.unwrap_or_default(),
        favorites,
        anime: anime.clone(),
        id,
    })
}

/// Opening (and optionally ending) records for an anime
pub fn theme_entries(themes: &ThemeLists, anime: &AnimeRef, include_endings: bool) -> Vec<OpeningEntry> {
    let difficulty = classify_anime(anime.popularity, anime.rank);
    let openings = themes.openings.iter().map(|raw| (raw, ThemeType::Opening));
    let endings = themes
        .endings
        .iter()
        .filter(|_| include_endings)
        .map(|raw| (raw, ThemeType::Ending));

    openings
        .chain(endings)
        .map(|(raw, theme_type)| {
            let (title, artist) = parse_theme(raw);
            OpeningEntry {
                id: format!("{}_{}", anime.mal_id, raw),
                title,
                artist,
                theme_type,
                anime: anime.clone(),
                difficulty,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn anime(popularity: u32, rank: u32) -> AnimeRef {
        AnimeRef {
            mal_id: 1,
            title: "Cowboy Bebop".to_string(),
            english_title: None,
            score: 8.8,
            popularity,
            members: 1_900_000,
            rank,
            images: None,
        }
    }

    #[test]
    fn test_character_tiers() {
        assert_eq!(classify_character(12_000, None), Difficulty::Easy);
        assert_eq!(classify_character(6_000, None), Difficulty::Medium);
        assert_eq!(classify_character(100, None), Difficulty::Hard);
        assert_eq!(classify_character(10_000, None), Difficulty::Medium);
        assert_eq!(classify_character(5_000, None), Difficulty::Hard);
    }

    #[test]
    fn test_main_role_on_record_forces_easy() {
        assert_eq!(classify_character(3, Some("Main")), Difficulty::Easy);
        assert_eq!(classify_character(3, Some("Supporting")), Difficulty::Hard);
    }

    #[test]
    fn test_anime_tiers() {
        assert_eq!(classify_anime(100, 9_000), Difficulty::Easy);
        assert_eq!(classify_anime(9_000, 50), Difficulty::Easy);
        assert_eq!(classify_anime(101, 501), Difficulty::Medium);
        assert_eq!(classify_anime(800, 900), Difficulty::Hard);
    }

    #[test]
    fn test_parse_theme() {
        assert_eq!(
            parse_theme("\"Again\" by YUI"),
            ("Again".to_string(), "YUI".to_string())
        );
        assert_eq!(
            parse_theme("\"Silhouette\""),
            ("Silhouette".to_string(), "Unknown".to_string())
        );
        assert_eq!(
            parse_theme("\"Stand by Me\" by Oasis by Night"),
            ("Stand".to_string(), "Me\" by Oasis by Night".to_string())
        );
    }

    #[test]
    fn test_theme_entries_endings_optional() {
        let themes = ThemeLists {
            openings: vec!["\"Tank!\" by The Seatbelts".to_string()],
            endings: vec!["\"The Real Folk Blues\" by Mai Yamane".to_string()],
        };
        let anime = anime(40, 30);

        let openings = theme_entries(&themes, &anime, false);
        assert_eq!(openings.len(), 1);
        assert_eq!(openings[0].id, "1_\"Tank!\" by The Seatbelts");
        assert_eq!(openings[0].title, "Tank!");
        assert_eq!(openings[0].artist, "The Seatbelts");
        assert_eq!(openings[0].theme_type, ThemeType::Opening);
        assert_eq!(openings[0].difficulty, Difficulty::Easy);

        let all = theme_entries(&themes, &anime, true);
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].theme_type, ThemeType::Ending);
    }

    #[test]
    fn test_roster_parsing_drops_malformed_records() {
        let raw = vec![
            json!({
                "character": {"mal_id": 1, "name": "Spike Spiegel", "images": {"jpg": {"image_url": "https://cdn.example/1.jpg"}}},
                "role": "Main",
                "favorites": 45_000
            }),
            json!({"character": {"name": "No id"}, "role": "Main"}),
            json!({
                "character": {"mal_id": 3, "name": "Jet Black"},
                "role": "Main",
                "favorites": "7000"
            }),
        ];

        let (entries, dropped) = parse_roster(&raw);
        assert_eq!(dropped, 1);
        assert_eq!(entries.len(), 2);

        let spike = character_from_roster(&entries[0], &anime(40, 30)).unwrap();
        assert_eq!(spike.id, "1");
        assert_eq!(spike.image_url, "https://cdn.example/1.jpg");
        assert_eq!(spike.difficulty, Difficulty::Easy);

        let jet = character_from_roster(&entries[1], &anime(40, 30)).unwrap();
        assert_eq!(jet.favorites, 7_000);
        assert_eq!(jet.difficulty, Difficulty::Medium);
        assert_eq!(jet.image_url, "");
    }

    #[test]
    fn test_roster_role_does_not_affect_tier() {
        let raw = vec![json!({
            "character": {"mal_id": 9, "name": "Ein"},
            "role": "Main",
            "favorites": 10
        })];

        let (entries, _) = parse_roster(&raw);
        let ein = character_from_roster(&entries[0], &anime(40, 30)).unwrap();
        assert_eq!(ein.difficulty, Difficulty::Hard);
    }
}
