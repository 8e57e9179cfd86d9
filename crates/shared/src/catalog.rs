//! Read-only view of the published catalog.
//!
//! This is the interface consumed by the game front-end. It only ever reads
//! files that the catalog builder has fully flushed and never writes to them.

use crate::freshness;
use crate::models::{CharacterEntry, Difficulty, OpeningEntry};
use crate::paths::DataPaths;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::{error, info, warn};

/// In-memory copy of the published catalog
pub struct Catalog {
    paths: DataPaths,
    stale_after: Duration,
    initialized: bool,
    characters: Vec<CharacterEntry>,
    openings: Vec<OpeningEntry>,
    last_update: Option<DateTime<Utc>>,
}

impl Catalog {
    /// Create an empty, not yet initialized catalog view
    pub fn new(paths: DataPaths, stale_after: Duration) -> Self {
        Self {
            paths,
            stale_after,
            initialized: false,
            characters: Vec::new(),
            openings: Vec::new(),
            last_update: None,
        }
    }

    /// Load the catalog into memory once.
    ///
    /// Returns `false` when the characters file is missing or unreadable.
    /// Subsequent calls after a successful load are no-ops.
    pub fn ensure_initialized(&mut self) -> bool {
        if self.initialized {
            return true;
        }

        match self.load() {
            Ok(true) => {
                self.initialized = true;
                info!(
                    characters = self.characters.len(),
                    openings = self.openings.len(),
                    last_update = ?self.last_update,
                    "Catalog initialized"
                );
                true
            }
            Ok(false) => {
                warn!(path = %self.paths.characters_file().display(), "Catalog file not found");
                false
            }
            Err(e) => {
                error!(error = %e, "Failed to load catalog");
                false
            }
        }
    }

    fn load(&mut self) -> Result<bool> {
        let Some(characters) = read_records(&self.paths.characters_file())? else {
            return Ok(false);
        };
        let openings = read_records(&self.paths.openings_file())?.unwrap_or_default();
        let last_update = freshness::read_marker(self.paths.last_update_file())?;

        self.characters = characters;
        self.openings = openings;
        self.last_update = last_update;
        Ok(true)
    }

    /// Pick a random character, optionally restricted to one difficulty tier
    pub fn random_character(&self, difficulty: Option<Difficulty>) -> Option<&CharacterEntry> {
        let mut rng = rand::thread_rng();
        match difficulty {
            Some(tier) => {
                let matching: Vec<_> = self
                    .characters
                    .iter()
                    .filter(|c| c.difficulty == tier)
                    .collect();
                matching.choose(&mut rng).copied()
            }
            None => self.characters.choose(&mut rng),
        }
    }

    /// Pick a random opening, optionally restricted to one difficulty tier
    pub fn random_opening(&self, difficulty: Option<Difficulty>) -> Option<&OpeningEntry> {
        let mut rng = rand::thread_rng();
        match difficulty {
            Some(tier) => {
                let matching: Vec<_> = self
                    .openings
                    .iter()
                    .filter(|o| o.difficulty == tier)
                    .collect();
                matching.choose(&mut rng).copied()
            }
            None => self.openings.choose(&mut rng),
        }
    }

    /// Whether the catalog is older than its staleness window (or was never built).
    ///
    /// Reads the marker file directly so a refresh finished by another
    /// process is noticed without reloading the records.
    pub fn needs_update(&self) -> bool {
        let last_update = match freshness::read_marker(self.paths.last_update_file()) {
            Ok(marker) => marker.or(self.last_update),
            Err(e) => {
                warn!(error = %e, "Failed to read last update marker");
                self.last_update
            }
        };

        freshness::is_stale(last_update, Utc::now(), self.stale_after)
    }

    pub fn characters(&self) -> &[CharacterEntry] {
        &self.characters
    }

    pub fn openings(&self) -> &[OpeningEntry] {
        &self.openings
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }
}

/// Read a JSON array of catalog records. A missing file yields `None`.
pub fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Option<Vec<T>>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog file: {}", path.display()))?;

    let records = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse catalog file: {}", path.display()))?;

    Ok(Some(records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnimeRef, ThemeType};
    use tempfile::TempDir;

    fn anime(mal_id: u32) -> AnimeRef {
        AnimeRef {
            mal_id,
            title: format!("Anime {}", mal_id),
            english_title: None,
            score: 7.5,
            popularity: 200,
            members: 10_000,
            rank: 300,
            images: None,
        }
    }

    fn character(id: &str, difficulty: Difficulty) -> CharacterEntry {
        CharacterEntry {
            id: id.to_string(),
            name: format!("Character {}", id),
            image_url: String::new(),
            favorites: 100,
            difficulty,
            anime: anime(1),
        }
    }

    fn opening(id: &str, difficulty: Difficulty) -> OpeningEntry {
        OpeningEntry {
            id: id.to_string(),
            title: "Song".to_string(),
            artist: "Artist".to_string(),
            theme_type: ThemeType::Opening,
            anime: anime(1),
            difficulty,
        }
    }

    fn write_catalog(paths: &DataPaths, characters: &[CharacterEntry], openings: &[OpeningEntry]) -> Result<()> {
        paths.create_dirs()?;
        std::fs::write(paths.characters_file(), serde_json::to_string(characters)?)?;
        std::fs::write(paths.openings_file(), serde_json::to_string(openings)?)?;
        Ok(())
    }

    #[test]
    fn test_missing_catalog_not_initialized() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let mut catalog = Catalog::new(DataPaths::new(temp_dir.path()), Duration::days(7));

        assert!(!catalog.ensure_initialized());
        assert!(catalog.random_character(None).is_none());
        assert!(catalog.needs_update());

        Ok(())
    }

    #[test]
    fn test_ensure_initialized_is_idempotent() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let paths = DataPaths::new(temp_dir.path());
        write_catalog(&paths, &[character("1", Difficulty::Easy)], &[])?;

        let mut catalog = Catalog::new(paths.clone(), Duration::days(7));
        assert!(catalog.ensure_initialized());

        // A later rewrite is not picked up until a new view is created
        write_catalog(&paths, &[], &[])?;
        assert!(catalog.ensure_initialized());
        assert_eq!(catalog.characters().len(), 1);

        Ok(())
    }

    #[test]
    fn test_random_with_difficulty_filter() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let paths = DataPaths::new(temp_dir.path());
        write_catalog(
            &paths,
            &[character("1", Difficulty::Easy), character("2", Difficulty::Hard)],
            &[opening("op1", Difficulty::Medium)],
        )?;

        let mut catalog = Catalog::new(paths, Duration::days(7));
        assert!(catalog.ensure_initialized());

        for _ in 0..10 {
            let hard = catalog.random_character(Some(Difficulty::Hard)).unwrap();
            assert_eq!(hard.id, "2");
        }
        assert!(catalog.random_character(Some(Difficulty::Medium)).is_none());
        assert!(catalog.random_character(None).is_some());

        assert_eq!(catalog.random_opening(Some(Difficulty::Medium)).unwrap().id, "op1");
        assert!(catalog.random_opening(Some(Difficulty::Easy)).is_none());

        Ok(())
    }

    #[test]
    fn test_needs_update_uses_marker() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let paths = DataPaths::new(temp_dir.path());
        write_catalog(&paths, &[], &[])?;

        let catalog = Catalog::new(paths.clone(), Duration::days(7));
        assert!(catalog.needs_update());

        std::fs::write(paths.last_update_file(), Utc::now().to_rfc3339())?;
        assert!(!catalog.needs_update());

        let old = Utc::now() - Duration::days(8);
        std::fs::write(paths.last_update_file(), old.to_rfc3339())?;
        assert!(catalog.needs_update());

        Ok(())
    }
}
