//! Candidate discovery over the ranked anime listing.
//!
//! Walks the `/anime` listing twice, once by score and once by popularity,
//! keeps TV series that clear the respective threshold, and merges both
//! passes into one deduplicated candidate list. Incremental runs can add a
//! seasonal pass over the current and next season plus airing anime.

use crate::api::{JikanClient, ListedAnime, ListingEntry, ListingOrder, PaginatedResponse, Season};
use chrono::{Datelike, NaiveDate};
use crate::error::{CrawlError, CrawlResult};
use serde_json::Value;
use shared::config::DiscoveryConfig;
use shared::AnimeRef;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Items per listing page; a shorter page is the last one
pub const PAGE_SIZE: usize = 25;

/// Counters for one discovery run
#[derive(Debug, Clone, Default)]
pub struct DiscoveryStats {
    pub pages_fetched: usize,
    pub by_score: usize,
    pub by_popularity: usize,
    pub seasonal: usize,
    pub malformed_dropped: usize,
    pub candidates: usize,
}

/// Paged listing a pass walks
#[derive(Debug, Clone, Copy)]
enum Listing {
    Ranked(ListingOrder),
    Season { year: i32, season: Season },
    Airing,
}

impl Listing {
    fn label(&self) -> String {
        match self {
            Listing::Ranked(order) => format!("by {}", order.order_by()),
            Listing::Season { year, season } => format!("{} {}", season.as_str(), year),
            Listing::Airing => "airing".to_string(),
        }
    }

    async fn page(
        &self,
        client: &mut JikanClient,
        page: u32,
    ) -> CrawlResult<Option<PaginatedResponse<Value>>> {
        match *self {
            Listing::Ranked(order) => client.anime_page(order, page).await,
            Listing::Season { year, season } => client.season_page(year, season, page).await,
            Listing::Airing => client.airing_page(page).await,
        }
    }
}

/// One filtered pass over a listing
struct Pass {
    listing: Listing,
    early_stop_above_popularity: Option<u32>,
}

/// Current and next broadcast season for `today`
pub fn seasons_around(today: NaiveDate) -> [(i32, Season); 2] {
    let current = Season::from_month(today.month());
    [(today.year(), current), current.next(today.year())]
}

/// Discovery manager for finding candidate anime
pub struct Discovery {
    config: DiscoveryConfig,
    stats: DiscoveryStats,
}

impl Discovery {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            config,
            stats: DiscoveryStats::default(),
        }
    }

    pub fn stats(&self) -> &DiscoveryStats {
        &self.stats
    }

    /// Run both passes and merge them, ordered by popularity
    pub async fn run(&mut self, client: &mut JikanClient) -> CrawlResult<Vec<AnimeRef>> {
        info!(
            min_score = self.config.min_score,
            max_popularity = self.config.max_popularity,
            "Starting candidate discovery"
        );

        info!("Pass 1: anime by score");
        let by_score = self.by_score(client).await?;

        info!("Pass 2: anime by popularity");
        let by_popularity = self.by_popularity(client).await?;

        let candidates = merge_candidates(by_score, by_popularity);
        self.stats.candidates = candidates.len();

        info!(
            by_score = self.stats.by_score,
            by_popularity = self.stats.by_popularity,
            candidates = self.stats.candidates,
            pages = self.stats.pages_fetched,
            malformed = self.stats.malformed_dropped,
            "Candidate discovery complete"
        );

        Ok(candidates)
    }

    /// TV series with `score >= min_score`, best first
    pub async fn by_score(&mut self, client: &mut JikanClient) -> CrawlResult<Vec<AnimeRef>> {
        let min_score = self.config.min_score;
        let pass = Pass {
            listing: Listing::Ranked(ListingOrder::ByScore),
            early_stop_above_popularity: None,
        };
        let kept = self
            .walk(client, pass, |listed| meets_min_score(listed, min_score))
            .await?;
        self.stats.by_score = kept.len();
        Ok(kept)
    }

    /// TV series with `popularity <= max_popularity`, most popular first
    pub async fn by_popularity(&mut self, client: &mut JikanClient) -> CrawlResult<Vec<AnimeRef>> {
        let max_popularity = self.config.max_popularity;
        let pass = Pass {
            listing: Listing::Ranked(ListingOrder::ByPopularity),
            early_stop_above_popularity: Some(max_popularity),
        };
        let kept = self
            .walk(client, pass, |listed| within_popularity(listed, max_popularity))
            .await?;
        self.stats.by_popularity = kept.len();
        Ok(kept)
    }

    /// Run both ranked passes plus the seasonal pass
    pub async fn run_with_seasonal(
        &mut self,
        client: &mut JikanClient,
        today: NaiveDate,
    ) -> CrawlResult<Vec<AnimeRef>> {
        let ranked = self.run(client).await?;

        info!("Pass 3: seasonal and airing anime");
        let seasonal = self.seasonal(client, today).await?;

        let candidates = merge_candidates(ranked, seasonal);
        self.stats.candidates = candidates.len();
        info!(
            seasonal = self.stats.seasonal,
            candidates = self.stats.candidates,
            "Seasonal discovery complete"
        );

        Ok(candidates)
    }

    /// TV series of the current and next season and those airing now.
    ///
    /// No score or popularity threshold: new series have neither yet.
    pub async fn seasonal(&mut self, client: &mut JikanClient, today: NaiveDate) -> CrawlResult<Vec<AnimeRef>> {
        let mut listings: Vec<Listing> = seasons_around(today)
            .into_iter()
            .map(|(year, season)| Listing::Season { year, season })
            .collect();
        listings.push(Listing::Airing);

        let mut found = Vec::new();
        for listing in listings {
            let pass = Pass {
                listing,
                early_stop_above_popularity: None,
            };
            found.extend(self.walk(client, pass, |_| true).await?);
        }

        let mut seen = HashSet::new();
        found.retain(|anime| seen.insert(anime.mal_id));
        self.stats.seasonal = found.len();
        Ok(found)
    }

    async fn walk<F>(&mut self, client: &mut JikanClient, pass: Pass, keep: F) -> CrawlResult<Vec<AnimeRef>>
    where
        F: Fn(&ListedAnime) -> bool,
    {
        let mut kept = Vec::new();
        let mut seen = HashSet::new();
        let mut page = 1;

        loop {
            let response = match pass.listing.page(client, page).await {
                Ok(Some(response)) => response,
                Ok(None) => {
                    warn!(listing = %pass.listing.label(), page = page, "Listing page unavailable, ending pass");
                    break;
                }
                Err(e @ CrawlError::MalformedResponse { .. }) => {
                    warn!(listing = %pass.listing.label(), page = page, error = %e, "Unreadable listing page, ending pass");
                    break;
                }
                Err(e) => return Err(e),
            };
            self.stats.pages_fetched += 1;

            if response.data.is_empty() {
                break;
            }

            let listed = self.parse_page(&response.data);
            let before = kept.len();
            for item in &listed {
                if is_tv_series(item) && keep(item) && seen.insert(item.anime.mal_id) {
                    kept.push(item.anime.clone());
                }
            }

            debug!(
                listing = %pass.listing.label(),
                page = page,
                added = kept.len() - before,
                total = kept.len(),
                "Processed listing page"
            );

            let pagination = &response.pagination;
            let exhausted = response.data.len() < PAGE_SIZE
                || !pagination.has_next_page
                || (pagination.last_visible_page > 0 && page >= pagination.last_visible_page);
            if exhausted {
                break;
            }

            if let Some(threshold) = pass.early_stop_above_popularity {
                if all_above_popularity(&listed, threshold) {
                    debug!(page = page, threshold = threshold, "Remaining items exceed popularity threshold");
                    break;
                }
            }

            if let Some(max_pages) = self.config.max_pages {
                if page >= max_pages {
                    warn!(listing = %pass.listing.label(), max_pages = max_pages, "Reached page limit for pass");
                    break;
                }
            }

            page += 1;
        }

        Ok(kept)
    }

    /// Parse raw listing records, dropping malformed ones
    fn parse_page(&mut self, raw: &[Value]) -> Vec<ListedAnime> {
        let (listed, dropped) = parse_listing(raw);
        self.stats.malformed_dropped += dropped;
        listed
    }
}

/// Parse raw listing records. Returns the parsed records and how many were dropped.
pub fn parse_listing(raw: &[Value]) -> (Vec<ListedAnime>, usize) {
    let mut listed = Vec::with_capacity(raw.len());
    let mut dropped = 0;

    for record in raw {
        match ListingEntry::parse(record) {
            Ok(item) => listed.push(item),
            Err(e) => {
                warn!(error = %e, "Skipping invalid anime record");
                dropped += 1;
            }
        }
    }

    (listed, dropped)
}

/// TV type and not an OVA/movie by title
pub fn is_tv_series(listed: &ListedAnime) -> bool {
    if listed.anime_type.as_deref() != Some("TV") {
        return false;
    }

    let title = listed.anime.title.to_lowercase();
    !title.ends_with("ova") && !title.ends_with("movie")
}

fn meets_min_score(listed: &ListedAnime, min_score: f64) -> bool {
    listed.score.is_some_and(|score| score >= min_score)
}

fn within_popularity(listed: &ListedAnime, max_popularity: u32) -> bool {
    listed.popularity.is_some_and(|popularity| popularity <= max_popularity)
}

fn all_above_popularity(listed: &[ListedAnime], threshold: u32) -> bool {
    !listed.is_empty()
        && listed
            .iter()
            .all(|item| item.popularity.map_or(true, |p| p > threshold))
}

/// Union by MAL ID (first occurrence wins), ordered by popularity then ID
pub fn merge_candidates(by_score: Vec<AnimeRef>, by_popularity: Vec<AnimeRef>) -> Vec<AnimeRef> {
    let mut seen = HashSet::new();
    let mut merged: Vec<AnimeRef> = by_score
        .into_iter()
        .chain(by_popularity)
        .filter(|anime| seen.insert(anime.mal_id))
        .collect();

    merged.sort_by_key(|anime| (anime.popularity, anime.mal_id));
    merged
}
