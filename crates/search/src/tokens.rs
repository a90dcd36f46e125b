use std::collections::BTreeSet;

/// Lowercase whitespace tokens of a retrieval query. Punctuation stays attached to its token.
#[must_use]
pub fn query_tokens(query: &str) -> BTreeSet<String> {
    query.split_whitespace().map(str::to_lowercase).collect()
}

/// Jaccard similarity of two token sets; 0.0 when either side is empty.
#[must_use]
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    #[allow(clippy::cast_precision_loss)]
    let score = intersection as f32 / union as f32;
    score
}
