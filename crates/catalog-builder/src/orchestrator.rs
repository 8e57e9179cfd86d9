//! Main pipeline orchestrator.
//!
//! Coordinates one refresh: lock the data directory, resume or seed state,
//! discover candidates, enrich them in batches with a flush after each
//! batch, then stamp the catalog as fresh.

use crate::api::JikanClient;
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::discovery::Discovery;
use crate::enrichment::Enricher;
use crate::lock::RunLock;
use crate::writer::CatalogWriter;
use anyhow::{Context, Result};
use chrono::Utc;
use shared::config::{DiscoveryConfig, EnrichmentConfig};
use shared::{AnimeRef, CharacterEntry, Config, DataPaths, OpeningEntry};
use std::collections::{BTreeSet, HashSet};
use tracing::{error, info, warn};

/// How the starting state of a run is chosen when no checkpoint exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshMode {
    /// Rebuild the catalog from scratch
    #[default]
    Full,
    /// Keep the published catalog and only enrich anime it does not cover
    Incremental,
}

/// Statistics for one run
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub candidates: usize,
    pub skipped: usize,
    pub enriched: usize,
    pub characters_added: usize,
    pub openings_added: usize,
    pub batches_flushed: usize,
    pub records_dropped: usize,
    pub errors: usize,
}

/// Work completed by one batch, merged into the checkpoint only once the
/// whole batch is done
#[derive(Default)]
struct BatchOutput {
    processed: Vec<String>,
    characters: Vec<CharacterEntry>,
    openings: Vec<OpeningEntry>,
}

/// Pipeline coordinator
pub struct Orchestrator {
    client: JikanClient,
    paths: DataPaths,
    discovery: DiscoveryConfig,
    enrichment: EnrichmentConfig,
    mode: RefreshMode,
}

impl Orchestrator {
    pub fn new(client: JikanClient, paths: DataPaths, config: &Config) -> Self {
        Self {
            client,
            paths,
            discovery: config.discovery.clone(),
            enrichment: config.enrichment.clone(),
            mode: RefreshMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: RefreshMode) -> Self {
        self.mode = mode;
        self
    }

    /// Run one refresh. The HTTP session is released whatever the outcome.
    pub async fn run(&mut self) -> Result<RunStats> {
        let result = self.refresh().await;
        self.client.close();

        if let Err(e) = &result {
            error!(error = %e, "Catalog refresh failed");
        }
        result
    }

    async fn refresh(&mut self) -> Result<RunStats> {
        info!(mode = ?self.mode, "Starting catalog refresh");

        let _lock = RunLock::acquire(self.paths.lock_file()).context("Failed to acquire run lock")?;
        let writer = CatalogWriter::new(self.paths.clone());
        let mut store = CheckpointStore::new(self.paths.checkpoint_file());
        let mut stats = RunStats::default();

        // Phase 1: starting state
        let mut checkpoint = match store.load().context("Failed to load checkpoint")? {
            Some(checkpoint) => checkpoint,
            None => match self.initial_state(&writer) {
                Ok(checkpoint) => checkpoint,
                Err(e) => {
                    store.crash();
                    return Err(e);
                }
            },
        };

        // Phase 2: candidates
        let mut discovery = Discovery::new(self.discovery.clone());
        let discovered = match self.mode {
            RefreshMode::Incremental if self.discovery.include_seasonal => {
                discovery
                    .run_with_seasonal(&mut self.client, Utc::now().date_naive())
                    .await
            }
            _ => discovery.run(&mut self.client).await,
        };
        let candidates = match discovered {
            Ok(candidates) => candidates,
            Err(e) => {
                store.crash();
                return Err(e).context("Candidate discovery failed");
            }
        };
        stats.records_dropped += discovery.stats().malformed_dropped;
        stats.candidates = candidates.len();

        let pending: Vec<AnimeRef> = candidates
            .into_iter()
            .filter(|anime| !checkpoint.is_processed(anime.mal_id))
            .collect();
        stats.skipped = stats.candidates - pending.len();
        info!(
            candidates = stats.candidates,
            already_processed = stats.skipped,
            pending = pending.len(),
            "Candidates ready for enrichment"
        );

        // Phase 3: enrichment in batches
        let enricher = Enricher::new(self.enrichment.clone());
        let mut known_characters: HashSet<String> =
            checkpoint.characters.iter().map(|c| c.id.clone()).collect();
        let batch_size = self.enrichment.batch_size.max(1);
        let total_batches = pending.len().div_ceil(batch_size);

        for (index, batch) in pending.chunks(batch_size).enumerate() {
            info!(
                progress = format!("{}/{}", index + 1, total_batches),
                size = batch.len(),
                "Processing batch"
            );

            let mut output = BatchOutput::default();
            for anime in batch {
                match enricher
                    .enrich(&mut self.client, anime.clone(), &known_characters)
                    .await
                {
                    Ok(enriched) => {
                        known_characters.extend(enriched.characters.iter().map(|c| c.id.clone()));
                        stats.enriched += 1;
                        stats.records_dropped += enriched.dropped_records;
                        output.processed.push(enriched.anime.mal_id.to_string());
                        output.characters.extend(enriched.characters);
                        output.openings.extend(enriched.openings);
                    }
                    Err(e) if e.is_batch_fatal() => {
                        store.crash();
                        return Err(e).with_context(|| {
                            format!("Batch {} aborted at anime {}", index + 1, anime.mal_id)
                        });
                    }
                    Err(e) => {
                        warn!(mal_id = anime.mal_id, title = %anime.title, error = %e, "Failed to enrich anime, skipping");
                        stats.errors += 1;
                    }
                }
            }

            stats.characters_added += output.characters.len();
            stats.openings_added += output.openings.len();
            merge_batch(&mut checkpoint, output);

            store
                .flush(&checkpoint, &writer)
                .with_context(|| format!("Failed to flush batch {}", index + 1))?;
            stats.batches_flushed += 1;
        }

        // Phase 4: finalize
        if stats.batches_flushed == 0 {
            store
                .flush(&checkpoint, &writer)
                .context("Failed to publish catalog")?;
        }
        if let Err(e) = writer.write_last_update(Utc::now()) {
            store.crash();
            return Err(e).context("Failed to write freshness marker");
        }
        store.complete().context("Failed to finalize checkpoint")?;

        info!(
            candidates = stats.candidates,
            skipped = stats.skipped,
            enriched = stats.enriched,
            characters_added = stats.characters_added,
            openings_added = stats.openings_added,
            batches = stats.batches_flushed,
            dropped = stats.records_dropped,
            errors = stats.errors,
            total_characters = checkpoint.characters.len(),
            total_openings = checkpoint.openings.len(),
            "Catalog refresh complete"
        );

        Ok(stats)
    }

    /// Starting state when there is no checkpoint to resume
    fn initial_state(&self, writer: &CatalogWriter) -> Result<Checkpoint> {
        match self.mode {
            RefreshMode::Full => Ok(Checkpoint::default()),
            RefreshMode::Incremental => {
                let (characters, openings) = writer
                    .read_published()
                    .context("Failed to read published catalog")?;
                let processed = writer
                    .read_processed()
                    .context("Failed to read processed anime list")?;
                let checkpoint = seed_from_published(characters, openings, processed);
                info!(
                    processed = checkpoint.processed_anime.len(),
                    characters = checkpoint.characters.len(),
                    openings = checkpoint.openings.len(),
                    "Seeded state from published catalog"
                );
                Ok(checkpoint)
            }
        }
    }
}

/// Treat every anime the published catalog covers as processed, including
/// those listed in `processed` that yielded no records
pub fn seed_from_published(
    characters: Vec<CharacterEntry>,
    openings: Vec<OpeningEntry>,
    processed: Option<BTreeSet<String>>,
) -> Checkpoint {
    let mut processed_anime = processed.unwrap_or_default();
    processed_anime.extend(
        characters
            .iter()
            .map(|c| c.anime.mal_id)
            .chain(openings.iter().map(|o| o.anime.mal_id))
            .map(|id| id.to_string()),
    );

    Checkpoint {
        processed_anime,
        characters,
        openings,
    }
}

fn merge_batch(checkpoint: &mut Checkpoint, output: BatchOutput) {
    checkpoint.processed_anime.extend(output.processed);
    checkpoint.characters.extend(output.characters);
    checkpoint.openings.extend(output.openings);
}
