//! Atomic materialization of the published catalog.
//!
//! Every file is written to a temporary sibling, synced, then renamed over
//! the target so a reader only ever sees the previous or the new version.

use crate::error::{CrawlError, CrawlResult};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared::{CharacterEntry, DataPaths, OpeningEntry};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Replace `path` with `content` via write-temp, fsync, rename.
pub fn write_atomic(path: &Path, content: &[u8]) -> CrawlResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| CrawlError::filesystem(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| CrawlError::filesystem(dir, e))?;
    let tmp_path = tmp.path().to_path_buf();
    let io_error = |e| CrawlError::filesystem(&tmp_path, e);
    tmp.write_all(content).map_err(io_error)?;
    tmp.flush().map_err(io_error)?;
    tmp.as_file().sync_all().map_err(io_error)?;

    tmp.persist(path)
        .map_err(|e| CrawlError::filesystem(path, e.error))?;
    Ok(())
}

/// Serialize `value` as pretty JSON and replace `path` with it.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> CrawlResult<()> {
    let content = serde_json::to_vec_pretty(value).map_err(|source| CrawlError::Serialization {
        what: path.display().to_string(),
        source,
    })?;
    write_atomic(path, &content)
}

/// Read a JSON file written by this module. A missing file yields `None`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> CrawlResult<Option<T>> {
    let content = match std::fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CrawlError::filesystem(path, e)),
    };

    serde_json::from_slice(&content)
        .map(Some)
        .map_err(|source| CrawlError::Serialization {
            what: path.display().to_string(),
            source,
        })
}

/// Writes the files the serving side reads
pub struct CatalogWriter {
    paths: DataPaths,
}

impl CatalogWriter {
    pub fn new(paths: DataPaths) -> Self {
        Self { paths }
    }

    /// Replace the published catalog wholesale.
    ///
    /// Files are replaced one at a time: openings, then characters (which
    /// readers check for first), then the processed set. The processed set
    /// goes last so it never claims anime whose records were not written.
    pub fn write_catalog(
        &self,
        characters: &[CharacterEntry],
        openings: &[OpeningEntry],
        processed: &BTreeSet<String>,
    ) -> CrawlResult<()> {
        write_json_atomic(&self.paths.openings_file(), openings)?;
        write_json_atomic(&self.paths.characters_file(), characters)?;
        write_json_atomic(&self.paths.processed_file(), processed)?;

        debug!(
            characters = characters.len(),
            openings = openings.len(),
            processed = processed.len(),
            "Catalog written"
        );
        Ok(())
    }

    /// Stamp the catalog as refreshed at `at`
    pub fn write_last_update(&self, at: DateTime<Utc>) -> CrawlResult<()> {
        let path = self.paths.last_update_file();
        write_atomic(&path, at.to_rfc3339().as_bytes())?;
        info!(last_update = %at.to_rfc3339(), "Catalog freshness marker written");
        Ok(())
    }

    /// Records currently published, empty when nothing was published yet
    pub fn read_published(&self) -> CrawlResult<(Vec<CharacterEntry>, Vec<OpeningEntry>)> {
        let characters = read_json(&self.paths.characters_file())?.unwrap_or_default();
        let openings = read_json(&self.paths.openings_file())?.unwrap_or_default();
        Ok((characters, openings))
    }

    /// Anime ids covered by the published catalog, `None` before the first publish
    pub fn read_processed(&self) -> CrawlResult<Option<BTreeSet<String>>> {
        read_json(&self.paths.processed_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{AnimeRef, Difficulty, ThemeType};
    use tempfile::TempDir;

    fn anime() -> AnimeRef {
        AnimeRef {
            mal_id: 21,
            title: "One Piece".to_string(),
            english_title: Some("One Piece".to_string()),
            score: 8.7,
            popularity: 20,
            members: 2_000_000,
            rank: 50,
            images: None,
        }
    }

    #[test]
    fn test_write_atomic_replaces_content() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("nested").join("file.json");

        write_atomic(&path, b"first")?;
        write_atomic(&path, b"second")?;

        assert_eq!(std::fs::read_to_string(&path)?, "second");

        // No temporary files left behind
        let entries = std::fs::read_dir(temp_dir.path().join("nested"))?.count();
        assert_eq!(entries, 1);

        Ok(())
    }

    #[test]
    fn test_write_atomic_into_missing_parent_fails_cleanly() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory")?;

        let result = write_atomic(&blocker.join("file.json"), b"data");
        assert!(matches!(result, Err(CrawlError::Filesystem { .. })));
        assert_eq!(std::fs::read_to_string(&blocker)?, "not a directory");

        Ok(())
    }

    #[test]
    fn test_catalog_roundtrip() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let paths = DataPaths::new(temp_dir.path());
        let writer = CatalogWriter::new(paths.clone());

        assert_eq!(writer.read_published()?, (vec![], vec![]));
        assert_eq!(writer.read_processed()?, None);

        let characters = vec![CharacterEntry {
            id: "40".to_string(),
            name: "Luffy Monkey D.".to_string(),
            image_url: "https://cdn.example/40.jpg".to_string(),
            favorites: 120_000,
            difficulty: Difficulty::Easy,
            anime: anime(),
        }];
        let openings = vec![OpeningEntry {
            id: "21_\"We Are!\" by Hiroshi Kitadani".to_string(),
            title: "We Are!".to_string(),
            artist: "Hiroshi Kitadani".to_string(),
            theme_type: ThemeType::Opening,
            anime: anime(),
            difficulty: Difficulty::Easy,
        }];

        // Anime 5 was processed but yielded no records
        let processed: BTreeSet<String> = ["21", "5"].iter().map(|id| id.to_string()).collect();

        writer.write_catalog(&characters, &openings, &processed)?;
        assert_eq!(writer.read_published()?, (characters, openings));
        assert_eq!(writer.read_processed()?, Some(processed));

        let now = Utc::now();
        writer.write_last_update(now)?;
        let marker = shared::freshness::read_marker(paths.last_update_file())?;
        assert_eq!(marker.map(|m| m.timestamp()), Some(now.timestamp()));

        Ok(())
    }

    #[test]
    fn test_interrupted_write_leaves_processed_untouched() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let paths = DataPaths::new(temp_dir.path());
        let writer = CatalogWriter::new(paths.clone());

        // A directory where characters.json belongs makes that write fail
        std::fs::create_dir_all(paths.characters_file())?;

        let processed: BTreeSet<String> = ["21"].iter().map(|id| id.to_string()).collect();
        let result = writer.write_catalog(&[], &[], &processed);
        assert!(matches!(result, Err(CrawlError::Filesystem { .. })));

        // Openings went first, the processed set never got written
        assert!(paths.openings_file().is_file());
        assert_eq!(writer.read_processed()?, None);

        Ok(())
    }
}
