//! Name candidate extraction from recognized text fragments.
//!
//! Pattern rules pull name-shaped substrings out of each fragment, a
//! validation pass drops obvious non-names, and a case-insensitive dedup
//! keeps the highest-confidence instance per spelling. Near-spellings are
//! left alone here; merging those is the match engine's job.

use std::cmp::Ordering;
use std::collections::HashMap;

use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SnapError};
use crate::types::{CandidateName, NamePosition, RecognizedFragment};

/// Terms that disqualify a candidate outright: temporal, contact-detail,
/// organizational and security vocabulary that OCR often lifts from chat
/// screenshots. Tuned for a CJK + Latin mix; override via
/// [`ExtractorConfig`] rather than editing.
pub const DEFAULT_EXCLUSION_VOCABULARY: &[&str] = &[
    "时间", "日期", "地址", "电话", "手机", "微信", "QQ", "公司", "部门", "职位", "标题",
    "内容", "备注", "说明", "数字", "金额", "价格", "密码", "验证码", "链接", "网址",
];

/// Name-shape patterns, applied in order per fragment:
/// runs of 2-4 CJK ideographs, two capitalized Latin words, and
/// `@`-prefixed handles (half- or full-width).
pub const DEFAULT_NAME_PATTERNS: &[&str] = &[
    r"[\x{4e00}-\x{9fa5}]{2,4}",
    r"[A-Z][a-z]+ [A-Z][a-z]+",
    r"[@＠][^\s@＠]+",
];

static DIGITS_AND_PUNCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\d\s\-\+\(\)\.]+$").expect("digit/punct pattern"));
static CONTACT_DETAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)@|\.com|\.cn|http|www").expect("contact-detail pattern"));

/// Extraction rule-set. The defaults reproduce the shipped heuristics; all of
/// it is plain data so deployments can tune recall without a rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Minimum candidate length in characters, after trimming.
    pub min_length: usize,
    /// Maximum candidate length in characters.
    pub max_length: usize,
    /// Substrings that mark a candidate as a non-name.
    pub exclusion_vocabulary: Vec<String>,
    /// Regex sources for the name-shape rules, applied in order.
    pub name_patterns: Vec<String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            min_length: 2,
            max_length: 10,
            exclusion_vocabulary: DEFAULT_EXCLUSION_VOCABULARY
                .iter()
                .map(|s| s.to_string())
                .collect(),
            name_patterns: DEFAULT_NAME_PATTERNS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Scans recognized fragments for candidate names.
pub struct NameExtractor {
    config: ExtractorConfig,
    patterns: Vec<Regex>,
    vocabulary: Option<AhoCorasick>,
}

impl NameExtractor {
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        let patterns = config
            .name_patterns
            .iter()
            .map(|source| {
                Regex::new(source)
                    .map_err(|e| SnapError::Config(format!("invalid name pattern {source:?}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        let vocabulary = if config.exclusion_vocabulary.is_empty() {
            None
        } else {
            Some(
                AhoCorasick::new(&config.exclusion_vocabulary)
                    .map_err(|e| SnapError::Config(format!("invalid exclusion vocabulary: {e}")))?,
            )
        };

        Ok(Self {
            config,
            patterns,
            vocabulary,
        })
    }

    /// Extracts candidate names from all fragments: pattern hits, validation,
    /// case-insensitive dedup keeping the highest confidence, sorted by
    /// confidence descending. Empty input yields an empty result.
    pub fn extract(&self, fragments: &[RecognizedFragment]) -> Vec<CandidateName> {
        let mut by_key: HashMap<String, CandidateName> = HashMap::new();

        for (fragment_idx, fragment) in fragments.iter().enumerate() {
            let mut hit = 0usize;
            for pattern in &self.patterns {
                for found in pattern.find_iter(&fragment.text) {
                    let cleaned: String = found
                        .as_str()
                        .chars()
                        .filter(|c| *c != '@' && *c != '＠')
                        .collect();
                    let name = cleaned.trim();
                    if !self.is_valid_name(name) {
                        hit += 1;
                        continue;
                    }

                    let candidate = CandidateName {
                        name: name.to_string(),
                        confidence: fragment.confidence,
                        position: NamePosition {
                            fragment: fragment_idx,
                            hit,
                            region: fragment.region.clone(),
                        },
                    };
                    hit += 1;

                    let key = candidate.name.to_lowercase();
                    match by_key.get(&key) {
                        Some(existing) if existing.confidence >= candidate.confidence => {}
                        _ => {
                            by_key.insert(key, candidate);
                        }
                    }
                }
            }
        }

        let mut names: Vec<CandidateName> = by_key.into_values().collect();
        names.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });
        names
    }

    /// Whether a cleaned pattern hit looks like a person's name.
    pub fn is_valid_name(&self, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        let length = name.chars().count();
        if length < self.config.min_length || length > self.config.max_length {
            return false;
        }
        if let Some(vocabulary) = &self.vocabulary {
            if vocabulary.is_match(name) {
                return false;
            }
        }
        if DIGITS_AND_PUNCT.is_match(name) {
            return false;
        }
        if CONTACT_DETAIL.is_match(name) {
            return false;
        }
        true
    }
}
