//! Fuzzy text similarity, shared by anything that has to match a loosely
//! formatted name against a canonical one (e.g. a bot manager's free-text
//! outcome name against the two teams on an event).

use std::collections::HashSet;

/// Normalised similarity score between two strings: `0.0` (no similarity) to
/// `1.0` (identical after normalisation). Combines Jaccard word overlap with a
/// containment bonus so a short name substantially contained in a longer one
/// still scores well.
pub fn similarity(a: &str, b: &str) -> f64 {
    let norm = |s: &str| -> Vec<String> {
        s.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2)
            .map(String::from)
            .collect()
    };

    let words_a = norm(a);
    let words_b = norm(b);

    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }

    let set_a: HashSet<&str> = words_a.iter().map(|s| s.as_str()).collect();
    let set_b: HashSet<&str> = words_b.iter().map(|s| s.as_str()).collect();

    let intersection = set_a.intersection(&set_b).count() as f64;
    let union = set_a.union(&set_b).count() as f64;
    let jaccard = if union > 0.0 { intersection / union } else { 0.0 };

    let containment = if set_a.len() <= set_b.len() {
        intersection / set_a.len() as f64
    } else {
        intersection / set_b.len() as f64
    };

    (0.6 * jaccard + 0.4 * containment).min(1.0)
}

/// Pick whichever of `candidates` best matches `needle`, provided its score clears
/// `threshold`. Used to resolve a bot manager's free-text outcome name to one of
/// an event's two team names.
pub fn best_match<'a>(needle: &str, candidates: &[&'a str], threshold: f64) -> Option<&'a str> {
    candidates
        .iter()
        .map(|candidate| (*candidate, similarity(needle, candidate)))
        .filter(|(_, score)| *score >= threshold)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(candidate, _)| candidate)
}
