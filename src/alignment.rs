//! Alignment of local files against a remote episode ordering
//!
//! Local entries and remote episodes are both already in their canonical
//! order, so alignment is a single lockstep walk: every remote episode takes
//! as many consecutive local entries as it has parts. The aligned episodes are
//! then translated into aired numbering, which is what target names use.

use crate::config::{ConfigError, RenameConfig, SplitHint};
use crate::metadata_retrieval::{EpisodeOrderProvider, MetadataRetrievalError, RemoteEpisode};
use crate::naming::EpisodeTarget;
use crate::sequencer::LocalEntry;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use tracing::{debug, warn};

/// One local entry paired with the remote episode it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignedEntry {
    /// The local file
    pub local: LocalEntry,
    /// The remote episode, still in the requested ordering
    pub episode: RemoteEpisode,
    /// 1-based part index when the episode spans several local files
    pub part: Option<u32>,
}

/// Result of the lockstep walk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Alignment {
    /// Aligned pairs in local order
    pub aligned: Vec<AlignedEntry>,
    /// Local entries left over after the remote ordering ran out
    pub unmatched_local: Vec<LocalEntry>,
    /// Remote episodes left over after the local entries ran out
    pub unmatched_remote: Vec<RemoteEpisode>,
}

/// Local entries paired with their aired targets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedTargets {
    /// Local entry and the aired target it is renamed to
    pub targets: Vec<(LocalEntry, EpisodeTarget)>,
    /// Entries whose episode has no aired counterpart (only when tolerated)
    pub untranslated: Vec<LocalEntry>,
}

/// Number of local files the remote ordering expects
pub fn total_parts(remote: &[RemoteEpisode]) -> usize {
    remote.iter().map(|e| e.part_count.max(1) as usize).sum()
}

/// Applies multipart hints to the remote ordering
///
/// Every hint must name an episode present in `remote`.
pub fn apply_split_hints(
    remote: &mut [RemoteEpisode],
    hints: &[SplitHint],
) -> Result<(), ConfigError> {
    for hint in hints {
        let episode = remote
            .iter_mut()
            .find(|e| e.position() == (hint.season, hint.episode))
            .ok_or(ConfigError::UnknownSplitHint {
                season: hint.season,
                episode: hint.episode,
            })?;

        debug!(
            "S{:02}E{:02} is split across {} files",
            hint.season, hint.episode, hint.parts
        );
        episode.part_count = hint.parts.max(1);
    }

    Ok(())
}

/// Collapses consecutive episodes sharing one position into one episode
///
/// Used when local files each hold every episode listed at one position of
/// the ordering. The first episode of each run is kept.
pub fn combine_shared_positions(remote: Vec<RemoteEpisode>) -> Vec<RemoteEpisode> {
    let mut combined: Vec<RemoteEpisode> = Vec::with_capacity(remote.len());

    for episode in remote {
        match combined.last() {
            Some(last) if last.position() == episode.position() => {}
            _ => combined.push(episode),
        }
    }

    combined
}

/// Walks local entries and remote episodes in lockstep
///
/// Each remote episode consumes `part_count` consecutive local entries, tagged
/// with part indices in local order when there is more than one. The walk
/// stops at the first episode whose parts no longer fit; everything after
/// that point on either side is reported as unmatched.
pub fn align(local: &[LocalEntry], remote: &[RemoteEpisode]) -> Alignment {
    let mut aligned = Vec::with_capacity(local.len());
    let mut li = 0;
    let mut ri = 0;

    while let Some(episode) = remote.get(ri) {
        let parts = episode.part_count.max(1) as usize;
        let Some(group) = local.get(li..li + parts) else {
            break;
        };

        for (offset, entry) in group.iter().enumerate() {
            aligned.push(AlignedEntry {
                local: entry.clone(),
                episode: episode.clone(),
                part: (parts > 1).then_some(offset as u32 + 1),
            });
        }

        li += parts;
        ri += 1;
    }

    Alignment {
        aligned,
        unmatched_local: local[li..].to_vec(),
        unmatched_remote: remote[ri..].to_vec(),
    }
}

/// Translates aligned entries into aired targets
///
/// For the aired ordering the remote numbers are used as they are. Any other
/// ordering is translated through the provider once per remote episode.
/// An episode without aired counterpart is fatal unless mismatches are
/// ignored, in which case its files are reported as untranslated.
pub fn resolve_targets<P>(
    aligned: &[AlignedEntry],
    provider: &P,
    series_id: u64,
    config: &RenameConfig,
) -> Result<ResolvedTargets, MetadataRetrievalError>
where
    P: EpisodeOrderProvider + ?Sized,
{
    let mut resolved = ResolvedTargets::default();
    let mut translations: HashMap<u64, Option<Vec<(u32, u32)>>> = HashMap::new();
    let mut occurrences: HashMap<(u32, u32), usize> = HashMap::new();

    for entry in aligned {
        let span = match translations.entry(entry.episode.id) {
            Entry::Occupied(known) => known.into_mut(),
            Entry::Vacant(slot) => {
                let seen = occurrences.entry(entry.episode.position()).or_insert(0);
                let occurrence = *seen;
                *seen += 1;
                slot.insert(translate(&entry.episode, occurrence, provider, series_id, config)?)
            }
        };

        match span {
            Some(span) => resolved
                .targets
                .push((entry.local.clone(), target_from_span(span, entry))),
            None => resolved.untranslated.push(entry.local.clone()),
        }
    }

    Ok(resolved)
}

/// Aired positions covered by one remote episode
///
/// `occurrence` counts earlier episodes at the same position, so that
/// uncombined episodes sharing a position map onto distinct aired episodes.
fn translate<P>(
    episode: &RemoteEpisode,
    occurrence: usize,
    provider: &P,
    series_id: u64,
    config: &RenameConfig,
) -> Result<Option<Vec<(u32, u32)>>, MetadataRetrievalError>
where
    P: EpisodeOrderProvider + ?Sized,
{
    let variant = config.variant;
    if variant.is_aired() {
        return Ok(Some(vec![episode.position()]));
    }

    let (season, number) = episode.position();
    let result = if config.combined {
        provider.fetch_aired_span(series_id, variant, season, number)
    } else if occurrence == 0 {
        provider
            .fetch_aired_number(series_id, variant, season, number)
            .map(|aired| vec![aired])
    } else {
        provider
            .fetch_aired_span(series_id, variant, season, number)
            .and_then(|span| {
                span.get(occurrence)
                    .map(|&aired| vec![aired])
                    .ok_or(MetadataRetrievalError::EpisodeNotFound {
                        variant,
                        season,
                        episode: number,
                    })
            })
    };

    match result {
        Ok(span) => {
            debug!("S{season:02}E{number:02} ({variant}) is aired as {span:?}");
            Ok(Some(span))
        }
        Err(e @ MetadataRetrievalError::EpisodeNotFound { .. }) if config.ignore_mismatch => {
            warn!("{e}, leaving its files untouched");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Builds the target for one aligned entry from its aired span
///
/// A span covering several episodes of the first aired season renders as a
/// range from the lowest to the highest episode number.
fn target_from_span(span: &[(u32, u32)], entry: &AlignedEntry) -> EpisodeTarget {
    let season = span.first().map_or(entry.episode.season, |&(s, _)| s);
    let numbers = span.iter().filter(|&&(s, _)| s == season).map(|&(_, e)| e);
    let first = numbers.clone().min().unwrap_or(entry.episode.episode);
    let last = numbers.max().unwrap_or(first);

    EpisodeTarget {
        season,
        episode: first,
        last_episode: (last != first).then_some(last),
        part: entry.part,
        title: entry.episode.title.clone(),
        original: entry
            .local
            .path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata_retrieval::{InMemoryProvider, OrderingVariant};
    use crate::sequencer::{SortMode, sequence};
    use std::path::PathBuf;

    fn local(names: &[&str]) -> Vec<LocalEntry> {
        sequence(names.iter().map(PathBuf::from), SortMode::Natural)
    }

    fn names(entries: &[LocalEntry]) -> Vec<String> {
        entries
            .iter()
            .map(|e| e.path.to_string_lossy().into_owned())
            .collect()
    }

    fn season(count: u32) -> Vec<RemoteEpisode> {
        (1..=count)
            .map(|n| RemoteEpisode::new(u64::from(n), 1, n))
            .collect()
    }

    #[test]
    fn test_align_bijection_preserves_order() {
        let local = local(&["e1", "e2", "e3"]);
        let remote = season(3);

        let alignment = align(&local, &remote);
        assert!(alignment.unmatched_local.is_empty());
        assert!(alignment.unmatched_remote.is_empty());

        let pairs: Vec<_> = alignment
            .aligned
            .iter()
            .map(|a| (a.local.position, a.episode.episode, a.part))
            .collect();
        assert_eq!(pairs, vec![(0, 1, None), (1, 2, None), (2, 3, None)]);
    }

    #[test]
    fn test_align_multipart_tags_parts_in_local_order() {
        let local = local(&["a", "b", "c"]);
        let remote = vec![RemoteEpisode::new(1, 1, 1).with_parts(3)];

        let alignment = align(&local, &remote);
        let parts: Vec<_> = alignment
            .aligned
            .iter()
            .map(|a| (a.local.path.to_string_lossy().into_owned(), a.part))
            .collect();
        assert_eq!(
            parts,
            vec![
                ("a".to_string(), Some(1)),
                ("b".to_string(), Some(2)),
                ("c".to_string(), Some(3))
            ]
        );
    }

    #[test]
    fn test_align_excess_local() {
        let local = local(&["e1", "e2", "e3", "e4", "e5"]);
        let alignment = align(&local, &season(4));

        assert_eq!(alignment.aligned.len(), 4);
        assert_eq!(names(&alignment.unmatched_local), vec!["e5"]);
        assert!(alignment.unmatched_remote.is_empty());
    }

    #[test]
    fn test_align_stops_when_parts_do_not_fit() {
        let local = local(&["e1", "e2", "e3"]);
        let remote = vec![
            RemoteEpisode::new(1, 1, 1),
            RemoteEpisode::new(2, 1, 2).with_parts(3),
        ];

        let alignment = align(&local, &remote);
        assert_eq!(alignment.aligned.len(), 1);
        assert_eq!(names(&alignment.unmatched_local), vec!["e2", "e3"]);
        assert_eq!(alignment.unmatched_remote, vec![remote[1].clone()]);
    }

    #[test]
    fn test_total_parts() {
        let remote = vec![
            RemoteEpisode::new(1, 1, 1).with_parts(2),
            RemoteEpisode::new(2, 1, 2),
        ];
        assert_eq!(total_parts(&remote), 3);
    }

    #[test]
    fn test_apply_split_hints() {
        let mut remote = season(3);
        apply_split_hints(
            &mut remote,
            &[SplitHint {
                season: 1,
                episode: 2,
                parts: 2,
            }],
        )
        .unwrap();
        assert_eq!(
            remote.iter().map(|e| e.part_count).collect::<Vec<_>>(),
            vec![1, 2, 1]
        );

        let err = apply_split_hints(
            &mut remote,
            &[SplitHint {
                season: 4,
                episode: 1,
                parts: 2,
            }],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnknownSplitHint {
                season: 4,
                episode: 1
            }
        ));
    }

    #[test]
    fn test_combine_shared_positions() {
        let remote = vec![
            RemoteEpisode::new(1, 1, 1),
            RemoteEpisode::new(2, 1, 1),
            RemoteEpisode::new(3, 1, 2),
            RemoteEpisode::new(4, 2, 2),
        ];
        let ids: Vec<_> = combine_shared_positions(remote)
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![1, 3, 4]);
    }

    fn dvd_provider() -> InMemoryProvider {
        // DVD release swaps the first two episodes and packs 4+5 together
        InMemoryProvider::new(7)
            .with_order(
                OrderingVariant::Aired,
                vec![
                    RemoteEpisode::new(101, 1, 1),
                    RemoteEpisode::new(102, 1, 2),
                    RemoteEpisode::new(103, 1, 3),
                    RemoteEpisode::new(104, 1, 4),
                    RemoteEpisode::new(105, 1, 5),
                ],
            )
            .with_order(
                OrderingVariant::Dvd,
                vec![
                    RemoteEpisode::new(102, 1, 1),
                    RemoteEpisode::new(101, 1, 2),
                    RemoteEpisode::new(103, 1, 3),
                    RemoteEpisode::new(104, 1, 4),
                    RemoteEpisode::new(105, 1, 4),
                ],
            )
    }

    fn dvd_config(combined: bool) -> RenameConfig {
        RenameConfig {
            variant: OrderingVariant::Dvd,
            combined,
            ..RenameConfig::default()
        }
    }

    fn target_numbers(resolved: &ResolvedTargets) -> Vec<(u32, u32, Option<u32>)> {
        resolved
            .targets
            .iter()
            .map(|(_, t)| (t.season, t.episode, t.last_episode))
            .collect()
    }

    #[test]
    fn test_resolve_targets_aired_passthrough() {
        let local = local(&["a", "b"]);
        let remote = vec![
            RemoteEpisode::new(1, 2, 5).with_title("Five"),
            RemoteEpisode::new(2, 2, 6),
        ];
        let alignment = align(&local, &remote);

        // The aired ordering never consults the provider
        let provider = InMemoryProvider::new(0);
        let resolved =
            resolve_targets(&alignment.aligned, &provider, 1, &RenameConfig::default()).unwrap();

        assert_eq!(target_numbers(&resolved), vec![(2, 5, None), (2, 6, None)]);
        assert_eq!(resolved.targets[0].1.title.as_deref(), Some("Five"));
    }

    #[test]
    fn test_resolve_targets_translates_to_aired() {
        let provider = dvd_provider();
        let remote = provider.fetch_order(7, OrderingVariant::Dvd).unwrap();
        let local = local(&["d1", "d2", "d3", "d4", "d5"]);
        let alignment = align(&local, &remote);

        let resolved =
            resolve_targets(&alignment.aligned, &provider, 7, &dvd_config(false)).unwrap();

        // Two uncombined episodes at DVD 1x04 map onto aired 4 and 5
        assert_eq!(
            target_numbers(&resolved),
            vec![
                (1, 2, None),
                (1, 1, None),
                (1, 3, None),
                (1, 4, None),
                (1, 5, None)
            ]
        );
    }

    #[test]
    fn test_resolve_targets_combined_range() {
        let provider = dvd_provider();
        let remote =
            combine_shared_positions(provider.fetch_order(7, OrderingVariant::Dvd).unwrap());
        let local = local(&["d1", "d2", "d3", "d4"]);
        let alignment = align(&local, &remote);
        assert!(alignment.unmatched_local.is_empty());

        let resolved =
            resolve_targets(&alignment.aligned, &provider, 7, &dvd_config(true)).unwrap();
        assert_eq!(
            target_numbers(&resolved),
            vec![(1, 2, None), (1, 1, None), (1, 3, None), (1, 4, Some(5))]
        );
    }

    #[test]
    fn test_resolve_targets_multipart_translated_once() {
        let provider = dvd_provider();
        let mut remote = provider.fetch_order(7, OrderingVariant::Dvd).unwrap();
        remote.truncate(1);
        remote[0].part_count = 2;

        let local = local(&["p1", "p2"]);
        let alignment = align(&local, &remote);
        let resolved =
            resolve_targets(&alignment.aligned, &provider, 7, &dvd_config(false)).unwrap();

        let targets: Vec<_> = resolved
            .targets
            .iter()
            .map(|(_, t)| (t.season, t.episode, t.part))
            .collect();
        assert_eq!(targets, vec![(1, 2, Some(1)), (1, 2, Some(2))]);
    }

    #[test]
    fn test_resolve_targets_missing_aired_counterpart() {
        let provider = InMemoryProvider::new(7)
            .with_order(OrderingVariant::Aired, vec![RemoteEpisode::new(1, 1, 1)])
            .with_order(
                OrderingVariant::Dvd,
                vec![RemoteEpisode::new(1, 1, 1), RemoteEpisode::new(2, 1, 2)],
            );
        let remote = provider.fetch_order(7, OrderingVariant::Dvd).unwrap();
        let local = local(&["a", "b"]);
        let alignment = align(&local, &remote);

        let err =
            resolve_targets(&alignment.aligned, &provider, 7, &dvd_config(false)).unwrap_err();
        assert!(matches!(err, MetadataRetrievalError::EpisodeNotFound { .. }));

        let tolerant = RenameConfig {
            ignore_mismatch: true,
            ..dvd_config(false)
        };
        let resolved = resolve_targets(&alignment.aligned, &provider, 7, &tolerant).unwrap();
        assert_eq!(target_numbers(&resolved), vec![(1, 1, None)]);
        assert_eq!(names(&resolved.untranslated), vec!["b"]);
    }
}
