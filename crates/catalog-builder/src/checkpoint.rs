//! Resumable crawl progress.
//!
//! The checkpoint is a snapshot of completed work that has not been
//! finalized yet. It lives next to the published catalog and is flushed
//! together with it after every batch.

use crate::error::{CrawlError, CrawlResult};
use crate::writer::{read_json, write_json_atomic, CatalogWriter};
use serde::{Deserialize, Serialize};
use shared::{CharacterEntry, OpeningEntry};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Run lifecycle as seen by the checkpoint store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Loading,
    Running,
    Flushing,
    Completed,
    Crashed,
}

impl RunState {
    fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle, Loading)
                | (Loading, Running)
                | (Loading, Crashed)
                | (Running, Flushing)
                | (Running, Completed)
                | (Running, Crashed)
                | (Flushing, Running)
                | (Flushing, Crashed)
        )
    }
}

/// Work completed so far
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Anime ids already enriched
    pub processed_anime: BTreeSet<String>,
    pub characters: Vec<CharacterEntry>,
    #[serde(default)]
    pub openings: Vec<OpeningEntry>,
}

impl Checkpoint {
    pub fn is_processed(&self, mal_id: u32) -> bool {
        self.processed_anime.contains(&mal_id.to_string())
    }
}

/// Loads and flushes the checkpoint, tracking the run state
pub struct CheckpointStore {
    path: PathBuf,
    state: RunState,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: RunState::Idle,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) -> CrawlResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(CrawlError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!(from = ?self.state, to = ?next, "Checkpoint state change");
        self.state = next;
        Ok(())
    }

    /// Read the last checkpoint; `None` when there is nothing to resume.
    ///
    /// A checkpoint that exists but cannot be read is an error.
    pub fn load(&mut self) -> CrawlResult<Option<Checkpoint>> {
        self.transition(RunState::Loading)?;

        match read_json::<Checkpoint>(&self.path) {
            Ok(checkpoint) => {
                if let Some(checkpoint) = &checkpoint {
                    info!(
                        processed = checkpoint.processed_anime.len(),
                        characters = checkpoint.characters.len(),
                        openings = checkpoint.openings.len(),
                        "Resuming from checkpoint"
                    );
                }
                self.transition(RunState::Running)?;
                Ok(checkpoint)
            }
            Err(e) => {
                self.transition(RunState::Crashed)?;
                Err(e)
            }
        }
    }

    /// Persist the checkpoint and publish the catalog it holds
    pub fn flush(&mut self, checkpoint: &Checkpoint, writer: &CatalogWriter) -> CrawlResult<()> {
        self.transition(RunState::Flushing)?;

        let written = write_json_atomic(&self.path, checkpoint)
            .and_then(|()| {
                writer.write_catalog(
                    &checkpoint.characters,
                    &checkpoint.openings,
                    &checkpoint.processed_anime,
                )
            });

        match written {
            Ok(()) => {
                self.transition(RunState::Running)?;
                info!(
                    processed = checkpoint.processed_anime.len(),
                    characters = checkpoint.characters.len(),
                    openings = checkpoint.openings.len(),
                    "Checkpoint flushed"
                );
                Ok(())
            }
            Err(e) => {
                self.transition(RunState::Crashed)?;
                Err(e)
            }
        }
    }

    /// Finish the run and drop the resume file
    pub fn complete(&mut self) -> CrawlResult<()> {
        self.transition(RunState::Completed)?;

        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Checkpoint removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(CrawlError::filesystem(&self.path, e)),
        }
        Ok(())
    }

    /// Record that the run ended without completing
    pub fn crash(&mut self) {
        if self.transition(RunState::Crashed).is_err() {
            warn!(state = ?self.state, "Run aborted outside of an active run");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{AnimeRef, DataPaths, Difficulty};
    use tempfile::TempDir;

    fn character(id: &str) -> CharacterEntry {
        CharacterEntry {
            id: id.to_string(),
            name: format!("Character {}", id),
            image_url: String::new(),
            favorites: 0,
            difficulty: Difficulty::Hard,
            anime: AnimeRef {
                mal_id: 1,
                title: "Trigun".to_string(),
                english_title: None,
                score: 8.2,
                popularity: 400,
                members: 0,
                rank: 300,
                images: None,
            },
        }
    }

    #[test]
    fn test_load_without_checkpoint() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let mut store = CheckpointStore::new(temp_dir.path().join("fetch_progress.json"));

        assert_eq!(store.state(), RunState::Idle);
        assert!(store.load()?.is_none());
        assert_eq!(store.state(), RunState::Running);

        Ok(())
    }

    #[test]
    fn test_flush_then_resume() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let paths = DataPaths::new(temp_dir.path());
        let writer = CatalogWriter::new(paths.clone());

        let mut checkpoint = Checkpoint::default();
        checkpoint.processed_anime.insert("1".to_string());
        checkpoint.characters.push(character("10"));

        let mut store = CheckpointStore::new(paths.checkpoint_file());
        store.load()?;
        store.flush(&checkpoint, &writer)?;
        assert_eq!(store.state(), RunState::Running);

        // Published catalog mirrors the checkpoint
        let (characters, openings) = writer.read_published()?;
        assert_eq!(characters, checkpoint.characters);
        assert!(openings.is_empty());
        assert_eq!(writer.read_processed()?, Some(checkpoint.processed_anime.clone()));

        let mut resumed = CheckpointStore::new(paths.checkpoint_file());
        let loaded = resumed.load()?.unwrap();
        assert_eq!(loaded, checkpoint);
        assert!(loaded.is_processed(1));

        Ok(())
    }

    #[test]
    fn test_checkpoint_without_openings_field() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("fetch_progress.json");
        std::fs::write(&path, r#"{"processed_anime": ["5"], "characters": []}"#)?;

        let mut store = CheckpointStore::new(&path);
        let loaded = store.load()?.unwrap();
        assert!(loaded.is_processed(5));
        assert!(loaded.openings.is_empty());

        Ok(())
    }

    #[test]
    fn test_corrupt_checkpoint_is_an_error() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("fetch_progress.json");
        std::fs::write(&path, "{ not json")?;

        let mut store = CheckpointStore::new(&path);
        assert!(matches!(store.load(), Err(CrawlError::Serialization { .. })));
        assert_eq!(store.state(), RunState::Crashed);

        Ok(())
    }

    #[test]
    fn test_complete_removes_checkpoint() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let paths = DataPaths::new(temp_dir.path());
        let writer = CatalogWriter::new(paths.clone());

        let mut store = CheckpointStore::new(paths.checkpoint_file());
        store.load()?;
        store.flush(&Checkpoint::default(), &writer)?;
        assert!(paths.checkpoint_file().exists());

        store.complete()?;
        assert_eq!(store.state(), RunState::Completed);
        assert!(!paths.checkpoint_file().exists());
        assert!(paths.characters_file().exists());

        Ok(())
    }

    #[test]
    fn test_invalid_transitions() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let paths = DataPaths::new(temp_dir.path());
        let writer = CatalogWriter::new(paths.clone());
        let mut store = CheckpointStore::new(paths.checkpoint_file());

        // Flushing before loading
        assert!(matches!(
            store.flush(&Checkpoint::default(), &writer),
            Err(CrawlError::InvalidTransition {
                from: RunState::Idle,
                to: RunState::Flushing
            })
        ));

        store.load()?;
        store.crash();
        assert_eq!(store.state(), RunState::Crashed);
        assert!(store.complete().is_err());

        Ok(())
    }
}
