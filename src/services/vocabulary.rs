//! Dynamic genre/tag vocabulary.
//!
//! Positions handed out here index into the context vector, so they must
//! never move: the first scan is sorted, and every later discovery is sorted
//! among itself and appended after the existing terms.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::models::InstalledGame;

/// Weekend, morning, afternoon, night, hours since last session.
pub const USER_FEATURES: usize = 5;
/// Five playtime buckets followed by five recency buckets.
pub const GAME_BUCKET_FEATURES: usize = 10;

/// Shape of a context vector for a given vocabulary size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureLayout {
    pub genres: usize,
    pub tags: usize,
}

impl FeatureLayout {
    pub const fn new(genres: usize, tags: usize) -> Self {
        Self { genres, tags }
    }

    pub const fn dimension(&self) -> usize {
        USER_FEATURES + self.genres + self.tags + GAME_BUCKET_FEATURES
    }

    pub const fn genre_offset(&self) -> usize {
        USER_FEATURES
    }

    pub const fn tag_offset(&self) -> usize {
        USER_FEATURES + self.genres
    }

    pub const fn bucket_offset(&self) -> usize {
        USER_FEATURES + self.genres + self.tags
    }

    /// True if every feature of `self` has a place in `other`
    pub const fn fits_within(&self, other: &FeatureLayout) -> bool {
        self.genres <= other.genres && self.tags <= other.tags
    }

    /// Position of feature `index` of this layout inside `target`.
    ///
    /// Only meaningful when `self.fits_within(target)`.
    pub fn position_in(&self, index: usize, target: &FeatureLayout) -> usize {
        if index < self.genre_offset() {
            index
        } else if index < self.tag_offset() {
            target.genre_offset() + (index - self.genre_offset())
        } else if index < self.bucket_offset() {
            target.tag_offset() + (index - self.tag_offset())
        } else {
            target.bucket_offset() + (index - self.bucket_offset())
        }
    }
}

/// Persistable form of the vocabulary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VocabularySnapshot {
    pub genres: Vec<String>,
    pub tags: Vec<String>,
}

/// What a refresh added
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VocabularyGrowth {
    pub new_genres: Vec<String>,
    pub new_tags: Vec<String>,
    /// Terms ignored because a list reached its cap
    pub dropped: usize,
}

impl VocabularyGrowth {
    pub fn grew(&self) -> bool {
        !self.new_genres.is_empty() || !self.new_tags.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
struct TermIndex {
    terms: Vec<String>,
    positions: HashMap<String, usize>,
}

impl TermIndex {
    fn from_terms(terms: Vec<String>) -> Self {
        let mut index = TermIndex::default();
        for term in terms {
            index.push(term);
        }
        index
    }

    fn push(&mut self, term: String) -> bool {
        if self.positions.contains_key(&term) {
            return false;
        }
        self.positions.insert(term.clone(), self.terms.len());
        self.terms.push(term);
        true
    }

    /// Appends unseen terms in sorted order, up to `cap` entries in total.
    fn absorb<'a>(
        &mut self,
        candidates: impl Iterator<Item = &'a String>,
        cap: usize,
    ) -> (Vec<String>, usize) {
        let unseen: BTreeSet<&String> = candidates
            .filter(|t| !self.positions.contains_key(*t))
            .collect();
        let room = cap.saturating_sub(self.terms.len());
        let dropped = unseen.len().saturating_sub(room);

        let added: Vec<String> = unseen.into_iter().take(room).cloned().collect();
        for term in &added {
            self.push(term.clone());
        }
        (added, dropped)
    }
}

/// Known genres and tags with stable positions.
#[derive(Debug, Clone)]
pub struct FeatureVocabulary {
    genres: TermIndex,
    tags: TermIndex,
    max_terms: usize,
}

impl FeatureVocabulary {
    pub fn new(max_terms: usize) -> Self {
        Self {
            genres: TermIndex::default(),
            tags: TermIndex::default(),
            max_terms,
        }
    }

    /// Restores a persisted vocabulary, keeping its order.
    pub fn from_snapshot(snapshot: VocabularySnapshot, max_terms: usize) -> Self {
        Self {
            genres: TermIndex::from_terms(snapshot.genres),
            tags: TermIndex::from_terms(snapshot.tags),
            max_terms,
        }
    }

    pub fn snapshot(&self) -> VocabularySnapshot {
        VocabularySnapshot {
            genres: self.genres.terms.clone(),
            tags: self.tags.terms.clone(),
        }
    }

    /// Scans the catalog's genre/tag union and appends unseen terms.
    pub fn refresh(&mut self, games: &[InstalledGame]) -> VocabularyGrowth {
        let (new_genres, dropped_genres) = self
            .genres
            .absorb(games.iter().flat_map(|g| g.genres.iter()), self.max_terms);
        let (new_tags, dropped_tags) = self
            .tags
            .absorb(games.iter().flat_map(|g| g.tags.iter()), self.max_terms);

        let growth = VocabularyGrowth {
            new_genres,
            new_tags,
            dropped: dropped_genres + dropped_tags,
        };

        if growth.dropped > 0 {
            tracing::warn!(
                dropped = growth.dropped,
                max_terms = self.max_terms,
                "Vocabulary cap reached, ignoring new genres/tags"
            );
        }
        if growth.grew() {
            tracing::info!(
                new_genres = growth.new_genres.len(),
                new_tags = growth.new_tags.len(),
                dimension = self.layout().dimension(),
                "Feature vocabulary grew"
            );
        }

        growth
    }

    pub fn layout(&self) -> FeatureLayout {
        FeatureLayout::new(self.genres.terms.len(), self.tags.terms.len())
    }

    pub fn genre_index(&self, genre: &str) -> Option<usize> {
        self.genres.positions.get(genre).copied()
    }

    pub fn tag_index(&self, tag: &str) -> Option<usize> {
        self.tags.positions.get(tag).copied()
    }

    pub fn genres(&self) -> &[String] {
        &self.genres.terms
    }

    pub fn tags(&self) -> &[String] {
        &self.tags.terms
    }
}
