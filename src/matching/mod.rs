//! Fuzzy matching of candidate names against the contact directory.
//!
//! The engine searches friends and per-group member lists independently,
//! fuses the approximate-match distance with the candidate's recognition
//! confidence into a single ranking score, and deduplicates by identity key
//! so one logical target appears at most once.

pub mod fuzzy;
pub mod stats;

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{
    CandidateName, Contact, ContactKind, GroupInfo, GroupMember, MatchedContact,
};

use self::fuzzy::SearchField;

pub use self::stats::{filter_matches, match_stats, MatchFilter, MatchStats};

/// Relative weights of the searchable fields. Remark and card outrank the
/// nickname because they are user-chosen, usually more literal labels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldWeights {
    pub nickname: f64,
    pub remark: f64,
    pub card: f64,
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self {
            nickname: 0.7,
            remark: 0.8,
            card: 0.6,
        }
    }
}

/// Match engine configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Minimum fused score a match must reach to be retained.
    pub match_threshold: f64,
    /// Maximum approximate-match distance for regular searches.
    pub search_tolerance: f64,
    /// Tightened distance ceiling used by [`FuzzyMatcher::exact_search`].
    pub exact_tolerance: f64,
    pub weights: FieldWeights,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.6,
            search_tolerance: 0.4,
            exact_tolerance: 0.2,
            weights: FieldWeights::default(),
        }
    }
}

impl MatcherConfig {
    fn clamped(mut self) -> Self {
        self.match_threshold = self.match_threshold.clamp(0.0, 1.0);
        self.search_tolerance = self.search_tolerance.clamp(0.0, 1.0);
        self.exact_tolerance = self.exact_tolerance.clamp(0.0, 1.0);
        self.weights.nickname = self.weights.nickname.clamp(0.0, 1.0);
        self.weights.remark = self.weights.remark.clamp(0.0, 1.0);
        self.weights.card = self.weights.card.clamp(0.0, 1.0);
        self
    }
}

/// All four views of one matching run, so callers can tell origin apart
/// without re-filtering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchResults {
    pub friends: Vec<MatchedContact>,
    pub group_members: Vec<MatchedContact>,
    pub all: Vec<MatchedContact>,
    pub total_count: usize,
}

/// Fuses the approximate-match distance (lower is better) with the
/// candidate's recognition confidence (higher is better) into one score.
/// This is the only place the distance is inverted.
pub fn fuse_score(raw_distance: f64, confidence: f64) -> f64 {
    let inverted = 1.0 - raw_distance;
    (inverted * 0.7 + confidence * 0.3).clamp(0.0, 1.0)
}

/// The match engine. Plain value type; construct one per configuration.
#[derive(Debug, Clone)]
pub struct FuzzyMatcher {
    config: MatcherConfig,
}

impl FuzzyMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self {
            config: config.clamped(),
        }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Searches the friends list. Empty inputs yield empty results.
    pub fn match_friends(
        &self,
        candidates: &[CandidateName],
        friends: &[Contact],
    ) -> Vec<MatchedContact> {
        self.match_friends_at(candidates, friends, self.config.search_tolerance)
    }

    /// Searches every group's member list independently.
    pub fn match_group_members(
        &self,
        candidates: &[CandidateName],
        members_by_group: &HashMap<String, Vec<GroupMember>>,
        group_info: &HashMap<String, GroupInfo>,
    ) -> Vec<MatchedContact> {
        self.match_group_members_at(
            candidates,
            members_by_group,
            group_info,
            self.config.search_tolerance,
        )
    }

    /// Searches friends and group members, returning each partial list plus
    /// the merged, deduplicated ranking.
    pub fn match_all(
        &self,
        candidates: &[CandidateName],
        friends: &[Contact],
        members_by_group: &HashMap<String, Vec<GroupMember>>,
        group_info: &HashMap<String, GroupInfo>,
    ) -> MatchResults {
        self.match_all_at(
            candidates,
            friends,
            members_by_group,
            group_info,
            self.config.search_tolerance,
        )
    }

    /// Looks up one name at the tightened tolerance. The tolerance is a call
    /// parameter, so concurrent regular searches never observe it.
    pub fn exact_search(
        &self,
        name: &str,
        friends: &[Contact],
        members_by_group: &HashMap<String, Vec<GroupMember>>,
        group_info: &HashMap<String, GroupInfo>,
    ) -> Vec<MatchedContact> {
        let candidates = vec![CandidateName::manual(name, 1.0)];
        self.match_all_at(
            &candidates,
            friends,
            members_by_group,
            group_info,
            self.config.exact_tolerance,
        )
        .all
    }

    fn match_all_at(
        &self,
        candidates: &[CandidateName],
        friends: &[Contact],
        members_by_group: &HashMap<String, Vec<GroupMember>>,
        group_info: &HashMap<String, GroupInfo>,
        tolerance: f64,
    ) -> MatchResults {
        let friend_matches = self.match_friends_at(candidates, friends, tolerance);
        let member_matches =
            self.match_group_members_at(candidates, members_by_group, group_info, tolerance);

        let mut merged = Vec::with_capacity(friend_matches.len() + member_matches.len());
        merged.extend(friend_matches.iter().cloned());
        merged.extend(member_matches.iter().cloned());
        let all = dedup_and_sort(merged);
        let total_count = all.len();

        MatchResults {
            friends: friend_matches,
            group_members: member_matches,
            all,
            total_count,
        }
    }

    fn match_friends_at(
        &self,
        candidates: &[CandidateName],
        friends: &[Contact],
        tolerance: f64,
    ) -> Vec<MatchedContact> {
        let weights = self.config.weights;
        let mut matches = Vec::new();

        for candidate in candidates {
            for friend in friends {
                let fields = [
                    SearchField {
                        text: &friend.nickname,
                        weight: weights.nickname,
                    },
                    SearchField {
                        text: &friend.remark,
                        weight: weights.remark,
                    },
                ];
                if let Some(score) = self.score_hit(&candidate.name, &fields, tolerance, candidate)
                {
                    matches.push(MatchedContact::friend(friend.clone(), score));
                }
            }
        }

        dedup_and_sort(matches)
    }

    fn match_group_members_at(
        &self,
        candidates: &[CandidateName],
        members_by_group: &HashMap<String, Vec<GroupMember>>,
        group_info: &HashMap<String, GroupInfo>,
        tolerance: f64,
    ) -> Vec<MatchedContact> {
        let weights = self.config.weights;
        let mut matches = Vec::new();

        for (group_id, members) in members_by_group {
            if members.is_empty() {
                continue;
            }
            let group_name = group_info
                .get(group_id)
                .map(|info| info.group_name.clone())
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| format!("群{group_id}"));

            for candidate in candidates {
                for member in members {
                    let fields = [
                        SearchField {
                            text: &member.nickname,
                            weight: weights.nickname,
                        },
                        SearchField {
                            text: &member.card,
                            weight: weights.card,
                        },
                    ];
                    if let Some(score) =
                        self.score_hit(&candidate.name, &fields, tolerance, candidate)
                    {
                        matches.push(MatchedContact::group_member(
                            member.clone(),
                            score,
                            group_id.clone(),
                            group_name.clone(),
                        ));
                    }
                }
            }
        }

        dedup_and_sort(matches)
    }

    /// Distance lookup, tolerance cut, score fusion, threshold cut.
    fn score_hit(
        &self,
        query: &str,
        fields: &[SearchField],
        tolerance: f64,
        candidate: &CandidateName,
    ) -> Option<f64> {
        let distance = fuzzy::best_distance(query, fields)?;
        if distance > tolerance {
            return None;
        }
        let score = fuse_score(distance, candidate.confidence);
        if score < self.config.match_threshold {
            return None;
        }
        Some(score)
    }
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self::new(MatcherConfig::default())
    }
}

/// Collapses matches sharing an identity key to the best-scoring entry and
/// sorts by score descending. Ties break on user and group ids so identical
/// inputs always produce identical output.
fn dedup_and_sort(matches: Vec<MatchedContact>) -> Vec<MatchedContact> {
    let mut best: HashMap<(String, ContactKind, String), MatchedContact> = HashMap::new();
    for candidate in matches {
        let key = candidate.identity_key();
        match best.get(&key) {
            Some(existing) if existing.score >= candidate.score => {}
            _ => {
                best.insert(key, candidate);
            }
        }
    }

    let mut ranked: Vec<MatchedContact> = best.into_values().collect();
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.contact.user_id().cmp(b.contact.user_id()))
            .then_with(|| a.group_id.cmp(&b.group_id))
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GroupRole;

    fn friend(user_id: &str, nickname: &str, remark: &str) -> Contact {
        Contact {
            user_id: user_id.to_string(),
            nickname: nickname.to_string(),
            remark: remark.to_string(),
            avatar: String::new(),
        }
    }

    fn member(user_id: &str, nickname: &str, card: &str) -> GroupMember {
        GroupMember {
            user_id: user_id.to_string(),
            nickname: nickname.to_string(),
            card: card.to_string(),
            role: GroupRole::Member,
        }
    }

    fn candidate(name: &str, confidence: f64) -> CandidateName {
        CandidateName::manual(name, confidence)
    }

    fn group_setup(
        members: Vec<GroupMember>,
    ) -> (HashMap<String, Vec<GroupMember>>, HashMap<String, GroupInfo>) {
        let mut by_group = HashMap::new();
        by_group.insert("g1".to_string(), members);
        let mut info = HashMap::new();
        info.insert(
            "g1".to_string(),
            GroupInfo {
                group_id: "g1".to_string(),
                group_name: "ops".to_string(),
                member_count: 2,
                max_member_count: 200,
            },
        );
        (by_group, info)
    }

    #[test]
    fn test_fuse_score_bounds() {
        assert!((fuse_score(0.0, 1.0) - 1.0).abs() < 1e-12);
        assert_eq!(fuse_score(1.0, 0.0), 0.0);
        assert_eq!(fuse_score(0.0, 0.0), 0.7);
        assert_eq!(fuse_score(1.0, 1.0), 0.3);
        for distance in [0.0, 0.25, 0.5, 0.75, 1.0] {
            for confidence in [0.0, 0.25, 0.5, 0.75, 1.0] {
                let score = fuse_score(distance, confidence);
                assert!((0.0..=1.0).contains(&score), "{distance}/{confidence} -> {score}");
            }
        }
    }

    #[test]
    fn test_match_friends_basic() {
        let matcher = FuzzyMatcher::default();
        let friends = vec![friend("1", "张三三", ""), friend("2", "李雷", "")];
        let matches = matcher.match_friends(&[candidate("张三", 0.9)], &friends);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].contact.user_id(), "1");
        assert!(matches[0].score >= 0.6);
        assert_eq!(matches[0].kind, ContactKind::Friend);
    }

    #[test]
    fn test_match_on_remark() {
        let matcher = FuzzyMatcher::default();
        let friends = vec![friend("1", "sunshine9527", "张三")];
        let matches = matcher.match_friends(&[candidate("张三", 0.8)], &friends);
        assert_eq!(matches.len(), 1);
        assert!(matches[0].score >= 0.6);
    }

    #[test]
    fn test_empty_inputs() {
        let matcher = FuzzyMatcher::default();
        assert!(matcher.match_friends(&[], &[friend("1", "a", "")]).is_empty());
        assert!(matcher.match_friends(&[candidate("张三", 0.9)], &[]).is_empty());

        let results = matcher.match_all(
            &[candidate("张三", 0.9)],
            &[],
            &HashMap::new(),
            &HashMap::new(),
        );
        assert_eq!(results.total_count, 0);
        assert!(results.all.is_empty());
    }

    #[test]
    fn test_group_members_and_name_fallback() {
        let matcher = FuzzyMatcher::default();
        let (by_group, info) = group_setup(vec![member("5", "张三", "")]);
        let matches =
            matcher.match_group_members(&[candidate("张三", 0.9)], &by_group, &info);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].group_name.as_deref(), Some("ops"));

        // Unknown group falls back to a synthesized label.
        let matches =
            matcher.match_group_members(&[candidate("张三", 0.9)], &by_group, &HashMap::new());
        assert_eq!(matches[0].group_name.as_deref(), Some("群g1"));
    }

    #[test]
    fn test_dedup_keeps_best_score() {
        let a = MatchedContact::friend(friend("1", "张三", ""), 0.5);
        let b = MatchedContact::friend(friend("1", "张三", ""), 0.7);
        let deduped = dedup_and_sort(vec![a, b]);
        assert_eq!(deduped.len(), 1);
        assert!((deduped[0].score - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn test_same_user_in_friend_and_group_kept_apart() {
        let f = MatchedContact::friend(friend("1", "张三", ""), 0.8);
        let m = MatchedContact::group_member(member("1", "张三", ""), 0.7, "g1", "ops");
        let deduped = dedup_and_sort(vec![f, m]);
        assert_eq!(deduped.len(), 2);
    }

    #[test]
    fn test_ranking_sorted_descending() {
        let matcher = FuzzyMatcher::default();
        let friends = vec![friend("1", "张三", ""), friend("2", "张三丰", "")];
        let (by_group, info) = group_setup(vec![member("3", "张三三", "")]);
        let results = matcher.match_all(&[candidate("张三", 0.9)], &friends, &by_group, &info);

        assert!(!results.all.is_empty());
        for pair in results.all.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        // Partial lists are individually sorted subsets of `all`.
        for list in [&results.friends, &results.group_members] {
            for pair in list.windows(2) {
                assert!(pair[0].score >= pair[1].score);
            }
            for matched in list.iter() {
                assert!(results
                    .all
                    .iter()
                    .any(|m| m.identity_key() == matched.identity_key()));
            }
        }
        assert_eq!(results.total_count, results.all.len());
    }

    #[test]
    fn test_threshold_filters_low_confidence() {
        let matcher = FuzzyMatcher::default();
        let friends = vec![friend("1", "张三", "")];
        // Exact name but rock-bottom recognition confidence:
        // 0.7 * 1.0 + 0.3 * 0.0 = 0.7 still passes, so push the distance up
        // instead with a weak candidate and a weak spelling.
        let matches = matcher.match_friends(&[candidate("张七丰", 0.0)], &friends);
        assert!(matches.is_empty());
    }

    #[test]
    fn test_exact_search_tightens_tolerance() {
        let matcher = FuzzyMatcher::default();
        // wendi vs wendy sits near distance 0.37: inside the regular
        // tolerance, outside the exact one.
        let friends = vec![friend("1", "wendy", "")];
        let regular = matcher.match_friends(&[candidate("wendi", 1.0)], &friends);
        assert_eq!(regular.len(), 1);

        let exact = matcher.exact_search("wendi", &friends, &HashMap::new(), &HashMap::new());
        assert!(exact.is_empty());

        // The exact spelling still passes the tightened tolerance.
        let exact = matcher.exact_search("wendy", &friends, &HashMap::new(), &HashMap::new());
        assert_eq!(exact.len(), 1);
        assert!((exact[0].score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_end_to_end_scenario() {
        let matcher = FuzzyMatcher::default();
        let friends = vec![friend("1", "张三三", "")];
        let candidates = vec![candidate("张三", 0.9), candidate("李四", 0.9)];
        let results =
            matcher.match_all(&candidates, &friends, &HashMap::new(), &HashMap::new());
        assert_eq!(results.all.len(), 1);
        assert_eq!(results.all[0].contact.user_id(), "1");
        assert!(results.all[0].score >= 0.6);
        assert_eq!(results.total_count, 1);
    }
}
