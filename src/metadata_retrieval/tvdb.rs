/// TheTVDB v4 episode order provider implementation.
use super::tvdb_types::{TvdbEpisode, TvdbEpisodePage, TvdbLogin, TvdbLoginRequest, TvdbResponse};
use super::{
    EpisodeOrderProvider, MetadataRetrievalError, OrderingVariant, RemoteEpisode,
    aired_positions,
};
use crate::cache::CacheStorage;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://api4.thetvdb.com/v4";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const TOKEN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const TOKEN_CACHE_KEY: &str = "bearer_token";

/// Credentials for the TheTVDB v4 API
#[derive(Debug, Clone)]
pub struct TvdbCredentials {
    /// Project or user API key
    pub api_key: String,
    /// Subscriber PIN, only needed for user-supported keys
    pub pin: Option<String>,
}

/// Bearer token as stored in the token cache
#[derive(Debug, Serialize, Deserialize)]
struct CachedToken {
    /// Leading characters of the API key the token was issued for
    key_prefix: String,
    token: String,
}

/// Episode order provider for the TheTVDB v4 API.
///
/// Logs in once per run (or reuses a cached bearer token) and memoizes every
/// ordering it fetches for the lifetime of the provider.
pub struct TvdbProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    credentials: TvdbCredentials,
    token: RefCell<Option<String>>,
    token_cache: Option<CacheStorage<CachedToken>>,
    orders: RefCell<HashMap<(u64, OrderingVariant), Vec<RemoteEpisode>>>,
}

impl TvdbProvider {
    /// Creates a new TheTVDB provider instance.
    ///
    /// A token cache that cannot be opened only disables token reuse.
    pub fn new(credentials: TvdbCredentials) -> Result<Self, MetadataRetrievalError> {
        let token_cache = match CacheStorage::open("tvdb", Some(TOKEN_TTL)) {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!("Token cache unavailable, logging in every run: {e}");
                None
            }
        };

        Self::with_token_cache(credentials, token_cache)
    }

    fn with_token_cache(
        credentials: TvdbCredentials,
        token_cache: Option<CacheStorage<CachedToken>>,
    ) -> Result<Self, MetadataRetrievalError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| MetadataRetrievalError::RequestError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            credentials,
            token: RefCell::new(None),
            token_cache,
            orders: RefCell::new(HashMap::new()),
        })
    }

    /// Talks to another API root, such as a mirror or proxy, instead of
    /// `https://api4.thetvdb.com/v4`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// The season-type path segment for an ordering
    fn season_type(variant: OrderingVariant) -> &'static str {
        match variant {
            OrderingVariant::Aired => "official",
            OrderingVariant::Dvd => "dvd",
            OrderingVariant::Absolute => "absolute",
            OrderingVariant::Streaming => "streaming",
        }
    }

    fn key_prefix(&self) -> String {
        self.credentials.api_key.chars().take(8).collect()
    }

    /// Returns a bearer token from memory, the token cache, or a fresh login.
    fn bearer_token(&self) -> Result<String, MetadataRetrievalError> {
        if let Some(token) = self.token.borrow().as_ref() {
            return Ok(token.clone());
        }

        let cached = self
            .token_cache
            .as_ref()
            .and_then(|cache| match cache.load(TOKEN_CACHE_KEY) {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Ignoring unreadable token cache: {e}");
                    None
                }
            })
            .filter(|entry| entry.key_prefix == self.key_prefix());

        let token = match cached {
            Some(entry) => {
                debug!("Reusing cached TheTVDB token");
                entry.token
            }
            None => {
                let token = self.login()?;
                if let Some(cache) = &self.token_cache {
                    let entry = CachedToken {
                        key_prefix: self.key_prefix(),
                        token: token.clone(),
                    };
                    if let Err(e) = cache.store(TOKEN_CACHE_KEY, &entry) {
                        debug!("Could not cache TheTVDB token: {e}");
                    }
                }
                token
            }
        };

        *self.token.borrow_mut() = Some(token.clone());
        Ok(token)
    }

    fn invalidate_token(&self) {
        self.token.borrow_mut().take();
        if let Some(cache) = &self.token_cache {
            cache.remove(TOKEN_CACHE_KEY);
        }
    }

    fn login(&self) -> Result<String, MetadataRetrievalError> {
        debug!("Logging in to TheTVDB");

        let response = self
            .client
            .post(format!("{}/login", self.base_url))
            .json(&TvdbLoginRequest {
                apikey: &self.credentials.api_key,
                pin: self.credentials.pin.as_deref(),
            })
            .send()
            .map_err(|e| MetadataRetrievalError::RequestError(e.to_string()))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(MetadataRetrievalError::Unauthorized);
        }
        ensure_success(response.status())?;

        let body: TvdbResponse<TvdbLogin> = response
            .json()
            .map_err(|e| MetadataRetrievalError::ParseError(e.to_string()))?;

        body.data.map(|login| login.token).ok_or_else(|| {
            MetadataRetrievalError::InvalidData("login response carries no token".to_string())
        })
    }

    /// Fetches one page of episodes, re-authenticating once on a stale token.
    fn fetch_page(
        &self,
        series_id: u64,
        variant: OrderingVariant,
        page: u32,
    ) -> Result<TvdbResponse<TvdbEpisodePage>, MetadataRetrievalError> {
        let url = format!(
            "{}/series/{}/episodes/{}",
            self.base_url,
            series_id,
            Self::season_type(variant)
        );

        let mut retried = false;
        loop {
            let token = self.bearer_token()?;
            let response = self
                .client
                .get(&url)
                .bearer_auth(&token)
                .query(&[("page", page)])
                .send()
                .map_err(|e| MetadataRetrievalError::RequestError(e.to_string()))?;

            match response.status() {
                StatusCode::UNAUTHORIZED if !retried => {
                    debug!("TheTVDB token rejected, logging in again");
                    self.invalidate_token();
                    retried = true;
                }
                StatusCode::UNAUTHORIZED => return Err(MetadataRetrievalError::Unauthorized),
                StatusCode::NOT_FOUND => {
                    return Err(MetadataRetrievalError::SeriesNotFound(series_id));
                }
                status => {
                    ensure_success(status)?;
                    return response
                        .json()
                        .map_err(|e| MetadataRetrievalError::ParseError(e.to_string()));
                }
            }
        }
    }

    /// Returns the memoized ordering, fetching every page on first use.
    fn episodes(
        &self,
        series_id: u64,
        variant: OrderingVariant,
    ) -> Result<Vec<RemoteEpisode>, MetadataRetrievalError> {
        if let Some(episodes) = self.orders.borrow().get(&(series_id, variant)) {
            return Ok(episodes.clone());
        }

        let mut raw = Vec::new();
        let mut page = 0;
        loop {
            let response = self.fetch_page(series_id, variant, page)?;
            let data = response.data.ok_or_else(|| {
                MetadataRetrievalError::InvalidData("episode page carries no data".to_string())
            })?;
            raw.extend(data.episodes);

            match response.links.and_then(|links| links.next) {
                Some(_) => page += 1,
                None => break,
            }
        }

        let episodes = convert_episodes(raw);
        debug!(
            "Fetched {} {} ordered episodes for series {}",
            episodes.len(),
            variant,
            series_id
        );

        self.orders
            .borrow_mut()
            .insert((series_id, variant), episodes.clone());
        Ok(episodes)
    }
}

/// Converts listed episodes into descriptors, dropping specials.
///
/// Episodes without a season, in season 0, or without a number cannot be
/// placed in an ordering and are skipped. The result is sorted by season,
/// then episode number; ties keep the listing order.
fn convert_episodes(raw: Vec<TvdbEpisode>) -> Vec<RemoteEpisode> {
    let mut episodes: Vec<RemoteEpisode> = raw
        .into_iter()
        .filter_map(|e| {
            let season = e.season_number.filter(|&s| s > 0)?;
            let number = e.number?;
            let episode = RemoteEpisode::new(e.id, season, number);
            Some(match e.name {
                Some(name) => episode.with_title(name),
                None => episode,
            })
        })
        .collect();

    episodes.sort_by_key(RemoteEpisode::position);
    episodes
}

fn ensure_success(status: StatusCode) -> Result<(), MetadataRetrievalError> {
    if status.is_success() {
        return Ok(());
    }

    Err(MetadataRetrievalError::RequestError(format!(
        "HTTP {} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown")
    )))
}

impl EpisodeOrderProvider for TvdbProvider {
    fn fetch_order(
        &self,
        series_id: u64,
        variant: OrderingVariant,
    ) -> Result<Vec<RemoteEpisode>, MetadataRetrievalError> {
        self.episodes(series_id, variant)
    }

    fn fetch_aired_number(
        &self,
        series_id: u64,
        variant: OrderingVariant,
        season: u32,
        episode: u32,
    ) -> Result<(u32, u32), MetadataRetrievalError> {
        self.fetch_aired_span(series_id, variant, season, episode)?
            .into_iter()
            .next()
            .ok_or(MetadataRetrievalError::EpisodeNotFound {
                variant,
                season,
                episode,
            })
    }

    fn fetch_aired_span(
        &self,
        series_id: u64,
        variant: OrderingVariant,
        season: u32,
        episode: u32,
    ) -> Result<Vec<(u32, u32)>, MetadataRetrievalError> {
        let order = self.episodes(series_id, variant)?;
        let aired = self.episodes(series_id, OrderingVariant::Aired)?;
        aired_positions(&order, &aired, variant, season, episode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::mpsc;
    use std::thread;

    const EPISODE_PAGE: &str = r#"{
        "status": "success",
        "data": {
            "series": {"id": 75760, "name": "Example"},
            "episodes": [
                {"id": 3, "name": "Third", "number": 1, "seasonNumber": 2, "absoluteNumber": 3},
                {"id": 9, "name": "Special", "number": 1, "seasonNumber": 0},
                {"id": 1, "name": null, "number": 1, "seasonNumber": 1},
                {"id": 2, "name": "Second", "number": 2, "seasonNumber": 1},
                {"id": 4, "name": "Unnumbered", "number": null, "seasonNumber": 2}
            ]
        },
        "links": {"prev": null, "self": "x", "next": null, "total_items": 5, "page_size": 500}
    }"#;

    #[test]
    fn test_parse_and_convert_episode_page() {
        let response: TvdbResponse<TvdbEpisodePage> = serde_json::from_str(EPISODE_PAGE).unwrap();
        assert!(response.links.unwrap().next.is_none());

        let episodes = convert_episodes(response.data.unwrap().episodes);
        let positions: Vec<_> = episodes.iter().map(|e| (e.id, e.season, e.episode)).collect();
        assert_eq!(positions, vec![(1, 1, 1), (2, 1, 2), (3, 2, 1)]);
        assert_eq!(episodes[0].title, None);
        assert_eq!(episodes[1].title.as_deref(), Some("Second"));
        assert!(episodes.iter().all(|e| e.part_count == 1));
    }

    #[test]
    fn test_parse_login() {
        let response: TvdbResponse<TvdbLogin> =
            serde_json::from_str(r#"{"status": "success", "data": {"token": "abc"}}"#).unwrap();
        assert_eq!(response.data.unwrap().token, "abc");
    }

    #[test]
    fn test_login_request_omits_missing_pin() {
        let body = serde_json::to_string(&TvdbLoginRequest {
            apikey: "key",
            pin: None,
        })
        .unwrap();
        assert_eq!(body, r#"{"apikey":"key"}"#);
    }

    #[test]
    fn test_season_types() {
        assert_eq!(TvdbProvider::season_type(OrderingVariant::Aired), "official");
        assert_eq!(TvdbProvider::season_type(OrderingVariant::Dvd), "dvd");
        assert_eq!(TvdbProvider::season_type(OrderingVariant::Absolute), "absolute");
        assert_eq!(TvdbProvider::season_type(OrderingVariant::Streaming), "streaming");
    }

    #[test]
    fn test_non_success_status() {
        let err = ensure_success(StatusCode::BAD_GATEWAY).unwrap_err();
        assert_eq!(err.to_string(), "Request failed: HTTP 502 Bad Gateway");
        assert!(ensure_success(StatusCode::OK).is_ok());
    }

    const API_KEY: &str = "test-key-0001";
    const LOGIN_OK: &str = r#"{"status": "success", "data": {"token": "fresh"}}"#;
    const FIRST_PAGE: &str = r#"{
        "data": {"episodes": [
            {"id": 1, "name": "One", "number": 1, "seasonNumber": 1},
            {"id": 2, "name": "Two", "number": 2, "seasonNumber": 1}
        ]},
        "links": {"next": "https://api4.thetvdb.com/v4/series/7/episodes/official?page=1"}
    }"#;
    const SECOND_PAGE: &str = r#"{
        "data": {"episodes": [
            {"id": 3, "name": "Three", "number": 1, "seasonNumber": 2}
        ]},
        "links": {"next": null}
    }"#;
    const REJECTED: &str = r#"{"status": "failure", "message": "Unauthorized"}"#;

    /// A request as seen by the local server
    #[derive(Debug)]
    struct Recorded {
        line: String,
        authorization: Option<String>,
    }

    /// Serves the scripted responses in order, one connection each, and
    /// reports every request it answered.
    fn serve(responses: Vec<(u16, &'static str)>) -> (String, mpsc::Receiver<Recorded>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let (sender, receiver) = mpsc::channel();

        thread::spawn(move || {
            for (status, body) in responses {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                let recorded = read_request(&stream);
                let reason = match status {
                    200 => "OK",
                    401 => "Unauthorized",
                    404 => "Not Found",
                    _ => "Error",
                };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = sender.send(recorded);
                let _ = stream.write_all(response.as_bytes());
            }
        });

        (base_url, receiver)
    }

    fn read_request(stream: &TcpStream) -> Recorded {
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();

        let mut authorization = None;
        let mut content_length = 0;
        loop {
            let mut header = String::new();
            reader.read_line(&mut header).unwrap();
            let header = header.trim_end();
            if header.is_empty() {
                break;
            }
            if let Some((name, value)) = header.split_once(':') {
                match name.to_ascii_lowercase().as_str() {
                    "authorization" => authorization = Some(value.trim().to_string()),
                    "content-length" => content_length = value.trim().parse().unwrap(),
                    _ => {}
                }
            }
        }
        let mut body = vec![0; content_length];
        reader.read_exact(&mut body).unwrap();

        Recorded {
            line: line.trim_end().to_string(),
            authorization,
        }
    }

    fn provider(base_url: &str, cache_dir: &std::path::Path) -> TvdbProvider {
        let credentials = TvdbCredentials {
            api_key: API_KEY.to_string(),
            pin: None,
        };
        let cache = CacheStorage::open_in(cache_dir, Some(TOKEN_TTL)).unwrap();
        TvdbProvider::with_token_cache(credentials, Some(cache))
            .unwrap()
            .with_base_url(base_url)
    }

    fn seed_token(cache_dir: &std::path::Path, token: &str) {
        let cache = CacheStorage::open_in(cache_dir, Some(TOKEN_TTL)).unwrap();
        let entry = CachedToken {
            key_prefix: API_KEY.chars().take(8).collect(),
            token: token.to_string(),
        };
        cache.store(TOKEN_CACHE_KEY, &entry).unwrap();
    }

    fn cached_token(cache_dir: &std::path::Path) -> Option<String> {
        let cache: CacheStorage<CachedToken> =
            CacheStorage::open_in(cache_dir, Some(TOKEN_TTL)).unwrap();
        cache.load(TOKEN_CACHE_KEY).unwrap().map(|entry| entry.token)
    }

    #[test]
    fn test_pages_are_concatenated() {
        let cache_dir = tempfile::tempdir().unwrap();
        let (base_url, requests) =
            serve(vec![(200, LOGIN_OK), (200, FIRST_PAGE), (200, SECOND_PAGE)]);
        let provider = provider(&base_url, cache_dir.path());

        let order = provider.fetch_order(7, OrderingVariant::Aired).unwrap();
        let ids: Vec<_> = order.iter().map(|e| (e.id, e.season, e.episode)).collect();
        assert_eq!(ids, vec![(1, 1, 1), (2, 1, 2), (3, 2, 1)]);

        let requests: Vec<_> = requests.try_iter().collect();
        let lines: Vec<_> = requests.iter().map(|r| r.line.as_str()).collect();
        assert_eq!(
            lines,
            vec![
                "POST /login HTTP/1.1",
                "GET /series/7/episodes/official?page=0 HTTP/1.1",
                "GET /series/7/episodes/official?page=1 HTTP/1.1",
            ]
        );
        assert_eq!(requests[2].authorization.as_deref(), Some("Bearer fresh"));
        assert_eq!(cached_token(cache_dir.path()).as_deref(), Some("fresh"));

        // Memoized, the server has no responses left
        let again = provider.fetch_order(7, OrderingVariant::Aired).unwrap();
        assert_eq!(again, order);
    }

    #[test]
    fn test_cached_token_is_reused() {
        let cache_dir = tempfile::tempdir().unwrap();
        seed_token(cache_dir.path(), "cached");
        let (base_url, requests) = serve(vec![(200, SECOND_PAGE)]);

        let order = provider(&base_url, cache_dir.path())
            .fetch_order(7, OrderingVariant::Dvd)
            .unwrap();
        assert_eq!(order.len(), 1);

        let requests: Vec<_> = requests.try_iter().collect();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].line,
            "GET /series/7/episodes/dvd?page=0 HTTP/1.1"
        );
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer cached"));
    }

    #[test]
    fn test_rejected_token_triggers_one_login() {
        let cache_dir = tempfile::tempdir().unwrap();
        seed_token(cache_dir.path(), "stale");
        let (base_url, requests) =
            serve(vec![(401, REJECTED), (200, LOGIN_OK), (200, SECOND_PAGE)]);

        let order = provider(&base_url, cache_dir.path())
            .fetch_order(7, OrderingVariant::Aired)
            .unwrap();
        assert_eq!(order.len(), 1);

        let requests: Vec<_> = requests.try_iter().collect();
        let auth: Vec<_> = requests
            .iter()
            .map(|r| (r.line.split(' ').next().unwrap(), r.authorization.as_deref()))
            .collect();
        assert_eq!(
            auth,
            vec![
                ("GET", Some("Bearer stale")),
                ("POST", None),
                ("GET", Some("Bearer fresh")),
            ]
        );
        assert_eq!(cached_token(cache_dir.path()).as_deref(), Some("fresh"));
    }

    #[test]
    fn test_second_rejection_is_unauthorized() {
        let cache_dir = tempfile::tempdir().unwrap();
        seed_token(cache_dir.path(), "stale");
        let (base_url, requests) = serve(vec![(401, REJECTED), (200, LOGIN_OK), (401, REJECTED)]);

        let result = provider(&base_url, cache_dir.path()).fetch_order(7, OrderingVariant::Aired);
        assert!(matches!(result, Err(MetadataRetrievalError::Unauthorized)));

        let logins = requests
            .try_iter()
            .filter(|r| r.line.starts_with("POST /login"))
            .count();
        assert_eq!(logins, 1);
    }

    #[test]
    fn test_unknown_series() {
        let cache_dir = tempfile::tempdir().unwrap();
        seed_token(cache_dir.path(), "cached");
        let (base_url, _requests) = serve(vec![(404, REJECTED)]);

        let result = provider(&base_url, cache_dir.path()).fetch_order(7, OrderingVariant::Aired);
        assert!(matches!(
            result,
            Err(MetadataRetrievalError::SeriesNotFound(7))
        ));
    }
}
