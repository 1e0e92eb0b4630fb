/// TheTVDB v4 API request and response types.
///
/// These structures mirror the JSON format of the TheTVDB v4 API.
use serde::{Deserialize, Serialize};

/// Every v4 response wraps its payload in `data`.
#[derive(Debug, Deserialize)]
pub(super) struct TvdbResponse<T> {
    /// The payload, absent on some error responses
    pub data: Option<T>,
    /// Pagination links, present on paged endpoints
    #[serde(default)]
    pub links: Option<TvdbLinks>,
}

/// Pagination links of a paged response.
#[derive(Debug, Deserialize)]
pub(super) struct TvdbLinks {
    /// URL of the next page, null on the last page
    pub next: Option<String>,
}

/// Body of `POST /login`.
#[derive(Debug, Serialize)]
pub(super) struct TvdbLoginRequest<'a> {
    pub apikey: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin: Option<&'a str>,
}

/// Payload of a successful login.
#[derive(Debug, Deserialize)]
pub(super) struct TvdbLogin {
    pub token: String,
}

/// Payload of `GET /series/{id}/episodes/{season-type}`.
#[derive(Debug, Deserialize)]
pub(super) struct TvdbEpisodePage {
    #[serde(default)]
    pub episodes: Vec<TvdbEpisode>,
}

/// A single episode as listed for one season type.
#[derive(Debug, Deserialize)]
pub(super) struct TvdbEpisode {
    /// Episode id, identical across season types
    pub id: u64,
    /// Episode title (may be null)
    pub name: Option<String>,
    /// Episode number within the season type
    pub number: Option<u32>,
    /// Season number within the season type (0 for specials)
    #[serde(rename = "seasonNumber")]
    pub season_number: Option<u32>,
}
