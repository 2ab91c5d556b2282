//! Diversity metric over a recommendation list.

use crate::scorer::Recommendation;
use std::collections::HashSet;

/// How varied a recommendation list's genres are: one minus the mean
/// pairwise genre Jaccard similarity. Lists of one (or zero) items are
/// maximally diverse by definition.
pub fn diversity_score(recommendations: &[Recommendation]) -> f64 {
    if recommendations.len() < 2 {
        return 1.0;
    }

    let genre_sets: Vec<HashSet<&str>> = recommendations
        .iter()
        .map(|r| r.genres.iter().map(String::as_str).collect())
        .collect();

    let mut total = 0.0;
    let mut pairs = 0usize;
    for i in 0..genre_sets.len() {
        for j in (i + 1)..genre_sets.len() {
            total += jaccard(&genre_sets[i], &genre_sets[j]);
            pairs += 1;
        }
    }
    1.0 - total / pairs as f64
}

fn jaccard(a: &HashSet<&str>, b: &HashSet<&str>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}
