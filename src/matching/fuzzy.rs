//! Approximate string comparison over weighted contact fields.
//!
//! Produces a distance in `[0, 1]` (lower is better) from a query against a
//! set of searchable fields. Matching ignores where in the field the query
//! lands and accepts single-character queries; a lower field weight inflates
//! that field's distance so it has to match more literally, while a perfect
//! match keeps distance 0 on any field.

/// One searchable field with its weight in `(0, 1]`.
#[derive(Debug, Clone, Copy)]
pub struct SearchField<'a> {
    pub text: &'a str,
    pub weight: f64,
}

/// Similarity in `[0, 1]`, higher is better. Case-insensitive; containment
/// scores high regardless of position, everything else falls through to
/// edit distance.
fn similarity(query: &str, target: &str) -> f64 {
    let query = query.trim().to_lowercase();
    let target = target.trim().to_lowercase();
    if query.is_empty() || target.is_empty() {
        return 0.0;
    }
    if query == target {
        return 1.0;
    }

    let query_len = query.chars().count();
    let target_len = target.chars().count();

    if target.contains(query.as_str()) {
        return 0.9 + 0.1 * (query_len as f64 / target_len as f64);
    }
    if query.contains(target.as_str()) {
        return 0.85;
    }

    let distance = levenshtein(&query, &target);
    let max_len = query_len.max(target_len);
    let ratio = 1.0 - distance as f64 / max_len as f64;
    if ratio < 0.5 {
        0.0
    } else {
        ratio * 0.85
    }
}

/// Char-based Levenshtein distance, two-row formulation.
fn levenshtein(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut previous: Vec<usize> = (0..=b_chars.len()).collect();
    let mut current = vec![0usize; b_chars.len() + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        current[0] = i + 1;
        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b_chars.len()]
}

/// Distance of the query against one field, or `None` when the field is
/// empty or shares nothing with the query.
fn field_distance(query: &str, field: &SearchField) -> Option<f64> {
    let sim = similarity(query, field.text);
    if sim <= 0.0 {
        return None;
    }
    let inflation = 1.0 + (1.0 - field.weight.clamp(0.0, 1.0)) * 0.5;
    Some(((1.0 - sim) * inflation).clamp(0.0, 1.0))
}

/// Best (lowest) distance across all fields, or `None` when no field
/// resembles the query at all.
pub fn best_distance(query: &str, fields: &[SearchField]) -> Option<f64> {
    fields
        .iter()
        .filter_map(|field| field_distance(query, field))
        .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
}
