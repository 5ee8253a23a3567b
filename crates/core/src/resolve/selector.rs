//! # Version Selector
//!
//! Picks the best candidate version for a set of filters.
//!
//! ## Scoring
//!
//! - Release channel is a hard filter: ineligible candidates never win.
//! - Game versions and platforms are ranked by position in the filter's
//!   priority list: a hit at index `i` of an `n`-long list scores `n - i`,
//!   a declared value missing from the list scores `-1`, and a candidate
//!   scores the best of its declared values (0 when it declares none).
//!   An unset or empty filter list contributes 0.
//! - The aggregate is `game_score * max(1, platform_filter_len) + platform_score`,
//!   so game-version rank dominates when several platforms are requested.
//!
//! A candidate is only selected if its aggregate is strictly positive, so a
//! request with neither list set never selects anything.

use crate::models::{ProjectVersion, ReleaseChannel, ReleaseChannelFilter, VersionFilters};

/// Best candidate for `filters`, or `None`.
///
/// Ties go to the earliest candidate; callers order candidates (newest first)
/// before calling.
pub fn select<'a>(
    candidates: &'a [ProjectVersion],
    filters: &VersionFilters,
) -> Option<&'a ProjectVersion> {
    let mut best: Option<(i64, &ProjectVersion)> = None;

    for candidate in candidates {
        let Some(score) = score(candidate, filters) else {
            continue;
        };
        if best.map_or(true, |(best_score, _)| score > best_score) {
            best = Some((score, candidate));
        }
    }

    best.filter(|(score, _)| *score > 0)
        .map(|(_, candidate)| candidate)
}

/// Aggregate score, or `None` if the release channel rules the candidate out
pub fn score(candidate: &ProjectVersion, filters: &VersionFilters) -> Option<i64> {
    if !is_suitable_channel(candidate.release_channel, filters.release_channel) {
        return None;
    }

    let game_score = rank(&candidate.game_versions, filters.game_versions.as_deref());
    let platform_score = rank(&candidate.platforms, filters.platforms.as_deref());
    let platform_weight = filters
        .platforms
        .as_ref()
        .map_or(1, |platforms| platforms.len().max(1)) as i64;

    Some(game_score * platform_weight + platform_score)
}

fn is_suitable_channel(channel: ReleaseChannel, required: Option<ReleaseChannelFilter>) -> bool {
    match (channel, required) {
        (ReleaseChannel::Release, _) => true,
        (_, None | Some(ReleaseChannelFilter::Any)) => true,
        (ReleaseChannel::Beta, Some(ReleaseChannelFilter::AtLeastBeta)) => true,
        _ => false,
    }
}

fn rank(declared: &[String], priority: Option<&[String]>) -> i64 {
    let Some(priority) = priority.filter(|p| !p.is_empty()) else {
        return 0;
    };
    let len = priority.len() as i64;

    declared
        .iter()
        .map(|value| {
            priority
                .iter()
                .position(|wanted| wanted == value)
                .map_or(-1, |index| len - index as i64)
        })
        .max()
        .unwrap_or(0)
}
