//! Post-hoc filtering and aggregate statistics over match results.

use serde::{Deserialize, Serialize};

use crate::types::{ContactKind, MatchedContact};

/// Filter criteria. Every present criterion must hold; absent criteria are
/// no-ops.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchFilter {
    pub min_score: Option<f64>,
    pub kind: Option<ContactKind>,
    pub group_id: Option<String>,
}

/// Applies the filter, preserving order.
pub fn filter_matches(matches: &[MatchedContact], filter: &MatchFilter) -> Vec<MatchedContact> {
    matches
        .iter()
        .filter(|matched| {
            if let Some(min_score) = filter.min_score {
                if matched.score < min_score {
                    return false;
                }
            }
            if let Some(kind) = filter.kind {
                if matched.kind != kind {
                    return false;
                }
            }
            if let Some(ref group_id) = filter.group_id {
                if matched.group_id.as_deref() != Some(group_id.as_str()) {
                    return false;
                }
            }
            true
        })
        .cloned()
        .collect()
}

/// Aggregate counts over one match list. Score bands: high above 0.8,
/// medium above 0.6, low otherwise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchStats {
    pub total: usize,
    pub friends: usize,
    pub group_members: usize,
    pub high_score: usize,
    pub medium_score: usize,
    pub low_score: usize,
    pub average_score: f64,
}

/// Single pass over the matches; an empty input reports an average of zero.
pub fn match_stats(matches: &[MatchedContact]) -> MatchStats {
    let mut stats = MatchStats {
        total: matches.len(),
        ..MatchStats::default()
    };

    let mut score_sum = 0.0;
    for matched in matches {
        score_sum += matched.score;

        match matched.kind {
            ContactKind::Friend => stats.friends += 1,
            ContactKind::GroupMember => stats.group_members += 1,
        }

        if matched.score > 0.8 {
            stats.high_score += 1;
        } else if matched.score > 0.6 {
            stats.medium_score += 1;
        } else {
            stats.low_score += 1;
        }
    }

    if !matches.is_empty() {
        stats.average_score = score_sum / matches.len() as f64;
    }
    stats
}
