//! In-memory episode order provider
//!
//! Serves fixed orderings without any network access. Useful for offline
//! runs and for exercising the alignment with deterministic data.

use super::{
    EpisodeOrderProvider, MetadataRetrievalError, OrderingVariant, RemoteEpisode,
    aired_positions,
};
use std::collections::HashMap;

/// Provider backed by orderings supplied up front
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    series_id: u64,
    orders: HashMap<OrderingVariant, Vec<RemoteEpisode>>,
}

impl InMemoryProvider {
    /// Creates an empty provider answering for `series_id` only
    pub fn new(series_id: u64) -> Self {
        Self {
            series_id,
            orders: HashMap::new(),
        }
    }

    /// Registers the episodes of one ordering
    pub fn with_order(mut self, variant: OrderingVariant, episodes: Vec<RemoteEpisode>) -> Self {
        self.orders.insert(variant, episodes);
        self
    }

    fn order(
        &self,
        series_id: u64,
        variant: OrderingVariant,
    ) -> Result<&[RemoteEpisode], MetadataRetrievalError> {
        if series_id != self.series_id {
            return Err(MetadataRetrievalError::SeriesNotFound(series_id));
        }

        self.orders.get(&variant).map(Vec::as_slice).ok_or_else(|| {
            MetadataRetrievalError::InvalidData(format!("no {variant} order for series {series_id}"))
        })
    }
}

impl EpisodeOrderProvider for InMemoryProvider {
    fn fetch_order(
        &self,
        series_id: u64,
        variant: OrderingVariant,
    ) -> Result<Vec<RemoteEpisode>, MetadataRetrievalError> {
        self.order(series_id, variant).map(<[RemoteEpisode]>::to_vec)
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
        let order = self.order(series_id, variant)?;
        let aired = self.order(series_id, OrderingVariant::Aired)?;
        aired_positions(order, aired, variant, season, episode)
    }
}
