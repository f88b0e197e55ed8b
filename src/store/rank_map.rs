//! Frequency tallies keyed by URL (pagerank) or text fragment (textrank).
//!
//! Stored as a JSON array of `[key, count]` pairs ordered by key, e.g.
//! `[["https://a.org/",2],["https://a.org/x",1]]`.

use crate::store::error::DbError;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankMap(BTreeMap<String, u64>);

impl RankMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one occurrence of `key`
    pub fn increment(&mut self, key: impl Into<String>) {
        *self.0.entry(key.into()).or_insert(0) += 1;
    }

    /// Add one occurrence of every key in `keys`
    pub fn update<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for key in keys {
            self.increment(key);
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, count: u64) {
        self.0.insert(key.into(), count);
    }

    /// Count for `key`, zero when never seen
    pub fn get(&self, key: &str) -> u64 {
        self.0.get(key).copied().unwrap_or(0)
    }

    /// Highest count in the map
    pub fn max(&self) -> u64 {
        self.0.values().copied().max().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn to_json(&self) -> Result<String, DbError> {
        let pairs: Vec<(&String, &u64)> = self.0.iter().collect();
        serde_json::to_string(&pairs)
            .map_err(|e| DbError::Data(format!("Failed to encode rank map: {}", e)))
    }

    pub fn from_json(raw: &str) -> Result<Self, DbError> {
        if raw.trim().is_empty() {
            return Ok(Self::new());
        }
        let pairs: Vec<(String, u64)> = serde_json::from_str(raw)
            .map_err(|e| DbError::Data(format!("Failed to decode rank map: {}", e)))?;
        Ok(Self(pairs.into_iter().collect()))
    }
}

impl FromIterator<(String, u64)> for RankMap {
    fn from_iter<T: IntoIterator<Item = (String, u64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
