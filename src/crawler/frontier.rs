//! Crawl frontier: visited flags and inbound-link tallies keyed by URL.

use crate::store::RankMap;
use std::collections::HashMap;

/// State of one URL during a crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraverseEntry {
    pub visited: bool,
    /// Starts at 1 and grows by one per inbound reference
    pub pagerank: u64,
}

impl Default for TraverseEntry {
    fn default() -> Self {
        Self {
            visited: false,
            pagerank: 1,
        }
    }
}

/// URLs discovered during a crawl, kept in first-seen order
#[derive(Debug, Default)]
pub struct Frontier {
    order: Vec<String>,
    entries: HashMap<String, TraverseEntry>,
}

impl Frontier {
    /// Frontier holding only the site root, unvisited
    pub fn seeded(root_url: impl Into<String>) -> Self {
        let mut frontier = Self::default();
        frontier.add_reference(root_url);
        frontier
    }

    /// Record one reference to `url`: a new entry starts at 1, a known one is incremented
    pub fn add_reference(&mut self, url: impl Into<String>) {
        let url = url.into();
        if let Some(entry) = self.entries.get_mut(&url) {
            entry.pagerank += 1;
            return;
        }
        self.order.push(url.clone());
        self.entries.insert(url, TraverseEntry::default());
    }

    pub fn get(&self, url: &str) -> Option<&TraverseEntry> {
        self.entries.get(url)
    }

    /// Unvisited URLs, most referenced first; ties keep first-seen order
    pub fn unvisited_by_rank(&self) -> Vec<String> {
        let mut pending: Vec<(&String, u64)> = self
            .order
            .iter()
            .filter_map(|url| {
                let entry = self.entries.get(url)?;
                (!entry.visited).then_some((url, entry.pagerank))
            })
            .collect();
        pending.sort_by(|a, b| b.1.cmp(&a.1));
        pending.into_iter().map(|(url, _)| url.clone()).collect()
    }

    pub fn mark_visited(&mut self, url: &str) {
        if let Some(entry) = self.entries.get_mut(url) {
            entry.visited = true;
        }
    }

    pub fn all_visited(&self) -> bool {
        self.entries.values().all(|entry| entry.visited)
    }

    pub fn visited_count(&self) -> u64 {
        self.entries.values().filter(|entry| entry.visited).count() as u64
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Visited URLs in first-seen order with their tallies; unvisited overflow is dropped
    pub fn into_visited(self) -> (Vec<String>, RankMap) {
        let mut sitemap = Vec::new();
        let mut pagerank = RankMap::new();
        for url in self.order {
            if let Some(entry) = self.entries.get(&url) {
                if entry.visited {
                    pagerank.insert(url.clone(), entry.pagerank);
                    sitemap.push(url);
                }
            }
        }
        (sitemap, pagerank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::SiteRoot;
    use crate::crawler::links::resolve_against_root;

    #[test]
    fn test_tally_counts_references() {
        let mut frontier = Frontier::seeded("http://a/");
        frontier.add_reference("http://a/x");
        frontier.add_reference("http://a/x");
        frontier.add_reference("http://a/x");
        frontier.add_reference("http://a/");

        assert_eq!(frontier.len(), 2);
        assert_eq!(frontier.get("http://a/x").unwrap().pagerank, 3);
        assert_eq!(frontier.get("http://a/").unwrap().pagerank, 2);
    }

    #[test]
    fn test_equivalent_hrefs_share_one_entry() {
        let root = SiteRoot::parse("http://a/").unwrap();
        let mut frontier = Frontier::seeded(root.url());
        for href in ["/about", "./about", "/team/../about"] {
            if let Some(url) = resolve_against_root(href, &root) {
                frontier.add_reference(url);
            }
        }

        assert_eq!(frontier.len(), 2);
        assert_eq!(frontier.get("http://a/about").unwrap().pagerank, 3);
    }

    #[test]
    fn test_unvisited_ordering() {
        let mut frontier = Frontier::seeded("http://a/");
        frontier.add_reference("http://a/low");
        frontier.add_reference("http://a/high");
        frontier.add_reference("http://a/high");
        frontier.add_reference("http://a/tie");
        frontier.mark_visited("http://a/");

        assert_eq!(
            frontier.unvisited_by_rank(),
            vec!["http://a/high", "http://a/low", "http://a/tie"]
        );
        assert_eq!(frontier.visited_count(), 1);
        assert!(!frontier.all_visited());
    }

    #[test]
    fn test_into_visited_drops_overflow() {
        let mut frontier = Frontier::seeded("http://a/");
        frontier.add_reference("http://a/b");
        frontier.add_reference("http://a/c");
        frontier.mark_visited("http://a/");
        frontier.mark_visited("http://a/c");

        let (sitemap, pagerank) = frontier.into_visited();
        assert_eq!(sitemap, vec!["http://a/", "http://a/c"]);
        assert_eq!(pagerank.len(), 2);
        assert_eq!(pagerank.get("http://a/b"), 0);
    }
}
