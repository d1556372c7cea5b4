use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An installed game as reported by the catalog provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstalledGame {
    /// Launcher-wide game identifier
    pub id: String,
    pub genres: Vec<String>,
    pub tags: Vec<String>,
    /// Cumulative playtime across all sessions
    pub playtime_minutes: u64,
    pub last_played_at: Option<DateTime<Utc>>,
}

impl InstalledGame {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            genres: Vec::new(),
            tags: Vec::new(),
            playtime_minutes: 0,
            last_played_at: None,
        }
    }

    pub fn with_genres<I, S>(mut self, genres: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.genres = genres.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_playtime_minutes(mut self, minutes: u64) -> Self {
        self.playtime_minutes = minutes;
        self
    }

    pub fn with_last_played_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_played_at = Some(at);
        self
    }

    /// Union of genres and tags, used for similarity between games
    pub fn descriptor_terms(&self) -> HashSet<&str> {
        self.genres
            .iter()
            .chain(self.tags.iter())
            .map(String::as_str)
            .collect()
    }
}

/// Parses a genre/tag column as stored by the launcher.
///
/// Accepts a JSON array of strings or a comma/semicolon separated list.
/// Anything else is treated as an empty list.
pub fn parse_term_list(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Vec::new();
    };

    let terms: Vec<String> = if raw.starts_with('[') {
        match serde_json::from_str::<Vec<serde_json::Value>>(raw) {
            Ok(values) => values
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Err(e) => {
                tracing::debug!(error = %e, raw = %raw, "Malformed term list, treating as empty");
                return Vec::new();
            }
        }
    } else {
        raw.split([',', ';']).map(str::to_string).collect()
    };

    let mut seen = HashSet::new();
    terms
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_array() {
        let terms = parse_term_list(Some(r#"["RPG", "Action", "RPG"]"#));
        assert_eq!(terms, vec!["RPG", "Action"]);
    }

    #[test]
    fn test_parse_separated_list() {
        let terms = parse_term_list(Some("Puzzle, Indie;  Co-op ,"));
        assert_eq!(terms, vec!["Puzzle", "Indie", "Co-op"]);
    }

    #[test]
    fn test_parse_malformed_is_empty() {
        assert!(parse_term_list(Some("[\"RPG\", ")).is_empty());
        assert!(parse_term_list(Some("   ")).is_empty());
        assert!(parse_term_list(None).is_empty());
    }

    #[test]
    fn test_parse_json_skips_non_strings() {
        let terms = parse_term_list(Some(r#"["Strategy", 4, null]"#));
        assert_eq!(terms, vec!["Strategy"]);
    }

    #[test]
    fn test_descriptor_terms_union() {
        let game = InstalledGame::new("g1")
            .with_genres(["RPG", "Action"])
            .with_tags(["Action", "Open World"]);
        let terms = game.descriptor_terms();
        assert_eq!(terms.len(), 3);
        assert!(terms.contains("Open World"));
    }
}
