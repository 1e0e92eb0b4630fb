/// Data structures and traits for remote episode ordering retrieval.
///
/// This module provides the remote side of the alignment: ordered episode
/// descriptors for a series in one of several orderings, and the translation
/// of a position in a non-aired ordering back to aired season/episode numbers.
mod in_memory;
mod tvdb;
mod tvdb_types;

pub use in_memory::InMemoryProvider;
pub use tvdb::{TvdbCredentials, TvdbProvider};

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Errors that can occur during metadata retrieval operations.
#[derive(Debug, Error)]
pub enum MetadataRetrievalError {
    /// Request to the metadata provider failed
    #[error("Request failed: {0}")]
    RequestError(String),

    /// Failed to parse the provider's JSON response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// The provider rejected the configured credentials
    #[error("TheTVDB rejected the API key (and PIN, if given)")]
    Unauthorized,

    /// The requested series was not found
    #[error("Series not found: {0}")]
    SeriesNotFound(u64),

    /// A position in a non-aired ordering has no aired counterpart
    #[error("S{season:02}E{episode:02} in {variant} order has no aired counterpart")]
    EpisodeNotFound {
        variant: OrderingVariant,
        season: u32,
        episode: u32,
    },

    /// The API returned invalid or unexpected data
    #[error("API returned invalid data: {0}")]
    InvalidData(String),
}

/// The episode orderings a remote source can provide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OrderingVariant {
    /// Broadcast order, the canonical naming order
    #[default]
    Aired,
    /// Order of the DVD release
    Dvd,
    /// Single running episode count across seasons
    Absolute,
    /// Order used by a streaming service
    Streaming,
}

impl OrderingVariant {
    /// Returns true for the canonical aired ordering
    pub fn is_aired(self) -> bool {
        self == OrderingVariant::Aired
    }
}

impl fmt::Display for OrderingVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderingVariant::Aired => "aired",
            OrderingVariant::Dvd => "dvd",
            OrderingVariant::Absolute => "absolute",
            OrderingVariant::Streaming => "streaming",
        };
        f.write_str(name)
    }
}

/// One episode descriptor of a remote ordering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEpisode {
    /// Identifier of the episode at the remote source, stable across orderings
    pub id: u64,
    /// Season number within the ordering
    pub season: u32,
    /// Episode number within the ordering
    pub episode: u32,
    /// Episode title, if known
    pub title: Option<String>,
    /// Number of local files this episode absorbs (at least 1)
    pub part_count: u32,
}

impl RemoteEpisode {
    /// Creates a single-part episode descriptor without a title
    pub fn new(id: u64, season: u32, episode: u32) -> Self {
        Self {
            id,
            season,
            episode,
            title: None,
            part_count: 1,
        }
    }

    /// Sets the display title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the number of local files this episode is split across
    pub fn with_parts(mut self, part_count: u32) -> Self {
        self.part_count = part_count.max(1);
        self
    }

    /// Season and episode number as a pair
    pub fn position(&self) -> (u32, u32) {
        (self.season, self.episode)
    }
}

/// Trait for providers that know the episode orderings of a series.
///
/// Implementors can retrieve orderings from TheTVDB or any other source that
/// identifies episodes consistently across orderings.
pub trait EpisodeOrderProvider {
    /// Fetches all episodes of a series in the requested ordering.
    ///
    /// # Arguments
    ///
    /// * `series_id` - The provider's identifier of the series
    /// * `variant` - Which ordering to return
    ///
    /// # Returns
    ///
    /// The episodes ordered by season, then episode number of that ordering
    fn fetch_order(
        &self,
        series_id: u64,
        variant: OrderingVariant,
    ) -> Result<Vec<RemoteEpisode>, MetadataRetrievalError>;

    /// Translates a position in `variant` order into aired season and episode.
    fn fetch_aired_number(
        &self,
        series_id: u64,
        variant: OrderingVariant,
        season: u32,
        episode: u32,
    ) -> Result<(u32, u32), MetadataRetrievalError>;

    /// Translates a position in `variant` order into every aired episode that
    /// shares it, in ordering sequence.
    ///
    /// Several aired episodes share one position when a release combines them,
    /// e.g. a double episode on DVD.
    fn fetch_aired_span(
        &self,
        series_id: u64,
        variant: OrderingVariant,
        season: u32,
        episode: u32,
    ) -> Result<Vec<(u32, u32)>, MetadataRetrievalError> {
        Ok(vec![self.fetch_aired_number(
            series_id, variant, season, episode,
        )?])
    }
}

/// Maps every descriptor at `(season, episode)` of `order` onto the aired
/// ordering by episode id.
pub(crate) fn aired_positions(
    order: &[RemoteEpisode],
    aired: &[RemoteEpisode],
    variant: OrderingVariant,
    season: u32,
    episode: u32,
) -> Result<Vec<(u32, u32)>, MetadataRetrievalError> {
    let not_found = || MetadataRetrievalError::EpisodeNotFound {
        variant,
        season,
        episode,
    };

    let aired_by_id: HashMap<u64, &RemoteEpisode> = aired.iter().map(|e| (e.id, e)).collect();

    let positions = order
        .iter()
        .filter(|e| e.position() == (season, episode))
        .map(|e| {
            aired_by_id
                .get(&e.id)
                .map(|aired| aired.position())
                .ok_or_else(not_found)
        })
        .collect::<Result<Vec<_>, _>>()?;

    if positions.is_empty() {
        return Err(not_found());
    }

    Ok(positions)
}
