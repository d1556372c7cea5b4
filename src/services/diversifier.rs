//! Maximal Marginal Relevance re-ranking.
//!
//! Trades a little ranking purity for variety: after the best-scoring game,
//! each next pick maximizes `λ·score − (1−λ)·max similarity to the picks so
//! far`, where similarity is the Jaccard index of genre+tag sets.

use std::collections::HashSet;

use crate::services::ranker::ScoredGame;

/// Jaccard index of two term sets; 0 when both are empty.
pub fn jaccard(a: &HashSet<&str>, b: &HashSet<&str>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Greedy MMR selection of `count` items from a score-ordered list.
pub fn rerank<'a>(ranked: Vec<ScoredGame<'a>>, count: usize, lambda: f64) -> Vec<ScoredGame<'a>> {
    let mut remaining: Vec<(ScoredGame<'a>, HashSet<&'a str>)> = ranked
        .into_iter()
        .map(|s| {
            let game = s.game;
            (s, game.descriptor_terms())
        })
        .collect();
    let mut selected: Vec<(ScoredGame<'a>, HashSet<&'a str>)> = Vec::with_capacity(count);

    while selected.len() < count && !remaining.is_empty() {
        let next = if selected.is_empty() {
            0
        } else {
            let mut best = 0;
            let mut best_value = f64::NEG_INFINITY;
            for (i, (candidate, terms)) in remaining.iter().enumerate() {
                let redundancy = selected
                    .iter()
                    .map(|(_, chosen)| jaccard(terms, chosen))
                    .fold(0.0, f64::max);
                let value = lambda * candidate.breakdown.score - (1.0 - lambda) * redundancy;
                // strict comparison keeps the earlier (higher-scored) item on ties
                if value > best_value {
                    best = i;
                    best_value = value;
                }
            }
            best
        };
        selected.push(remaining.remove(next));
    }

    selected.into_iter().map(|(s, _)| s).collect()
}
