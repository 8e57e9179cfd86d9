//! Jikan API client: typed endpoints on top of the cache and request client.

use super::request::{RequestClient, RequestSettings};
use super::types::*;
use crate::cache::CacheLayer;
use crate::error::{CrawlError, CrawlResult};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::config::JikanConfig;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Jikan API v4 client
pub struct JikanClient {
    request: RequestClient,
    cache: CacheLayer,
}

impl JikanClient {
    /// Create a new Jikan client
    pub fn new(request: RequestClient, cache: CacheLayer) -> Self {
        Self { request, cache }
    }

    /// Build the request client from configuration
    pub fn from_config(config: &JikanConfig, cache: CacheLayer) -> Self {
        let settings = RequestSettings {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.timeout_seconds),
            max_retries: config.rate_limit.max_retries,
            pacing: (&config.rate_limit).into(),
        };
        Self::new(RequestClient::new(settings), cache)
    }

    /// Serve from cache, otherwise issue the call and cache a successful response
    async fn fetch(&mut self, endpoint: &str, params: &[(&str, String)]) -> CrawlResult<Option<Value>> {
        if let Some(cached) = self.cache.get(endpoint, params) {
            return Ok(Some(cached));
        }

        let fetched = self.request.issue(endpoint, params).await?;
        if let Some(value) = &fetched {
            if let Err(e) = self.cache.put(endpoint, params, value) {
                warn!(endpoint = endpoint, error = %e, "Failed to cache response");
            }
        }
        Ok(fetched)
    }

    async fn fetch_as<T: DeserializeOwned>(
        &mut self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> CrawlResult<Option<T>> {
        match self.fetch(endpoint, params).await? {
            Some(value) => decode(endpoint, value).map(Some),
            None => Ok(None),
        }
    }

    /// Fetch one page of TV anime in the given order. Entries are left raw.
    pub async fn anime_page(
        &mut self,
        order: ListingOrder,
        page: u32,
    ) -> CrawlResult<Option<PaginatedResponse<Value>>> {
        info!(order_by = order.order_by(), page = page, "Fetching anime listing page");
        let params = [
            ("page", page.to_string()),
            ("type", "tv".to_string()),
            ("order_by", order.order_by().to_string()),
            ("sort", order.sort().to_string()),
        ];
        self.fetch_as("/anime", &params).await
    }

    /// Fetch one page of a broadcast season
    pub async fn season_page(
        &mut self,
        year: i32,
        season: Season,
        page: u32,
    ) -> CrawlResult<Option<PaginatedResponse<Value>>> {
        info!(year = year, season = season.as_str(), page = page, "Fetching season page");
        let params = [("page", page.to_string())];
        self.fetch_as(&format!("/seasons/{}/{}", year, season.as_str()), &params)
            .await
    }

    /// Fetch one page of currently airing TV anime
    pub async fn airing_page(&mut self, page: u32) -> CrawlResult<Option<PaginatedResponse<Value>>> {
        info!(page = page, "Fetching airing anime page");
        let params = [
            ("page", page.to_string()),
            ("type", "tv".to_string()),
            ("status", "airing".to_string()),
        ];
        self.fetch_as("/anime", &params).await
    }

    /// Fetch full anime details by MAL ID
    pub async fn anime_details(&mut self, mal_id: u32) -> CrawlResult<Option<AnimeDetails>> {
        debug!(mal_id = mal_id, "Fetching anime details");
        let response: Option<DataResponse<AnimeDetails>> =
            self.fetch_as(&format!("/anime/{}/full", mal_id), &[]).await?;
        Ok(response.map(|r| r.data))
    }

    /// Fetch the character roster of an anime. Entries are left raw.
    pub async fn anime_characters(&mut self, mal_id: u32) -> CrawlResult<Option<Vec<Value>>> {
        debug!(mal_id = mal_id, "Fetching anime characters");
        let response: Option<DataResponse<Vec<Value>>> =
            self.fetch_as(&format!("/anime/{}/characters", mal_id), &[]).await?;
        Ok(response.map(|r| r.data))
    }

    /// Fetch full character details
    pub async fn character_details(&mut self, character_id: u32) -> CrawlResult<Option<CharacterDetails>> {
        debug!(character_id = character_id, "Fetching character details");
        let response: Option<DataResponse<CharacterDetails>> =
            self.fetch_as(&format!("/characters/{}/full", character_id), &[]).await?;
        Ok(response.map(|r| r.data))
    }

    /// Fetch opening and ending themes of an anime
    pub async fn anime_themes(&mut self, mal_id: u32) -> CrawlResult<Option<ThemeLists>> {
        debug!(mal_id = mal_id, "Fetching anime themes");
        let response: Option<DataResponse<ThemeLists>> =
            self.fetch_as(&format!("/anime/{}/themes", mal_id), &[]).await?;
        Ok(response.map(|r| r.data))
    }

    pub fn request(&self) -> &RequestClient {
        &self.request
    }

    /// Release the HTTP session
    pub fn close(&mut self) {
        self.request.close();
    }
}

fn decode<T: DeserializeOwned>(endpoint: &str, value: Value) -> CrawlResult<T> {
    serde_json::from_value(value).map_err(|e| CrawlError::MalformedResponse {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_cached_response_skips_network() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let cache = CacheLayer::new(temp_dir.path(), true, ChronoDuration::hours(24))?;
        cache.put(
            "/anime/1/themes",
            &[],
            &json!({"data": {"openings": ["\"Tank!\" by The Seatbelts"], "endings": []}}),
        )?;

        // Unroutable base URL: any network access would fail
        let config = JikanConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..JikanConfig::default()
        };
        let mut client = JikanClient::from_config(&config, cache);

        let themes = client.anime_themes(1).await?.unwrap();
        assert_eq!(themes.openings, vec!["\"Tank!\" by The Seatbelts".to_string()]);
        assert!(!client.request().is_open());

        Ok(())
    }

    #[test]
    fn test_decode_reports_endpoint() {
        let result: CrawlResult<DataResponse<AnimeDetails>> = decode("/anime/1/full", json!({"data": 3}));
        match result {
            Err(CrawlError::MalformedResponse { endpoint, .. }) => assert_eq!(endpoint, "/anime/1/full"),
            other => panic!("expected malformed response, got {:?}", other.map(|_| ())),
        }
    }
}
