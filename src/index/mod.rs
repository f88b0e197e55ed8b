//! Vector index module for RAG
//!
//! Holds the retrievable nodes of one index key, the on-disk persistence of
//! those nodes, and the build-or-load entry point.

mod builder;
pub mod error;
pub mod vector_store;

pub use builder::{IndexBuilder, IndexConfig, IndexKey};
pub use error::IndexError;

use crate::processor::ProcessedChunk;
use rig::embeddings::Embedding;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// Back-reference from a node to where its text came from.
///
/// Document pages order before URLs, and pages order numerically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceRef {
    /// 1-based page number of a fixed document
    Page(u32),
    /// Page URL of a crawled site
    Url(String),
}

impl SourceRef {
    /// Inverse of `Display`: all-digit strings are page numbers
    pub fn parse(value: &str) -> Self {
        if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(page) = value.parse() {
                return SourceRef::Page(page);
            }
        }
        SourceRef::Url(value.to_string())
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::Page(page) => write!(f, "{}", page),
            SourceRef::Url(url) => f.write_str(url),
        }
    }
}

/// A unit of retrievable text with its embedding
#[derive(Debug, Clone)]
pub struct Node {
    /// Unique within an index: `<source>::<position>`
    pub id: String,
    pub source: SourceRef,
    pub text: String,
    pub position: usize,
    pub heading: Option<String>,
    pub embedding: Embedding,
}

impl Node {
    pub fn node_id(source: &SourceRef, position: usize) -> String {
        format!("{}::{}", source, position)
    }
}

impl From<ProcessedChunk> for Node {
    fn from(chunk: ProcessedChunk) -> Self {
        Self {
            id: Node::node_id(&chunk.source, chunk.position),
            source: chunk.source,
            text: chunk.text,
            position: chunk.position,
            heading: chunk.heading,
            embedding: chunk.embedding,
        }
    }
}

/// A node with its similarity to a query
#[derive(Debug, Clone)]
pub struct ScoredNode {
    pub node: Node,
    pub score: f64,
}

/// In-memory collection of nodes for one index key
#[derive(Debug, Clone)]
pub struct VectorIndex {
    key: String,
    nodes: Vec<Node>,
}

impl VectorIndex {
    pub fn new(key: impl Into<String>, nodes: Vec<Node>) -> Self {
        Self {
            key: key.into(),
            nodes,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Top `top_k` nodes by cosine similarity, best first.
    ///
    /// With `restrict`, only nodes whose id is in the set are considered.
    /// Equal scores keep index order.
    pub fn search(
        &self,
        query: &Embedding,
        top_k: usize,
        restrict: Option<&HashSet<String>>,
    ) -> Vec<ScoredNode> {
        let mut scored: Vec<ScoredNode> = self
            .nodes
            .iter()
            .filter(|node| restrict.is_none_or(|ids| ids.contains(&node.id)))
            .map(|node| ScoredNode {
                score: cosine_similarity(&query.vec, &node.embedding.vec),
                node: node.clone(),
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        debug!(key = %self.key, candidates = scored.len(), top_k, "Searched index");
        scored
    }

    /// A temporary index over just the given node ids
    pub fn subset(&self, ids: &HashSet<String>) -> VectorIndex {
        VectorIndex {
            key: self.key.clone(),
            nodes: self
                .nodes
                .iter()
                .filter(|node| ids.contains(&node.id))
                .cloned()
                .collect(),
        }
    }
}

/// Cosine similarity; zero when either vector has no magnitude
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(source: SourceRef, position: usize, vec: Vec<f64>) -> Node {
        Node {
            id: Node::node_id(&source, position),
            source,
            text: format!("text {}", position),
            position,
            heading: None,
            embedding: Embedding {
                document: String::new(),
                vec,
            },
        }
    }

    fn query(vec: Vec<f64>) -> Embedding {
        Embedding {
            document: String::new(),
            vec,
        }
    }

    #[test]
    fn test_source_ref_order_and_parse() {
        let mut refs = vec![
            SourceRef::Url("https://a.org/x".to_string()),
            SourceRef::Page(10),
            SourceRef::Page(2),
        ];
        refs.sort();
        assert_eq!(
            refs,
            vec![
                SourceRef::Page(2),
                SourceRef::Page(10),
                SourceRef::Url("https://a.org/x".to_string())
            ]
        );

        assert_eq!(SourceRef::parse("12"), SourceRef::Page(12));
        assert_eq!(
            SourceRef::parse("https://a.org/"),
            SourceRef::Url("https://a.org/".to_string())
        );
        assert_eq!(SourceRef::parse(&SourceRef::Page(7).to_string()), SourceRef::Page(7));
    }

    #[test]
    fn test_search_ranks_and_restricts() {
        let index = VectorIndex::new(
            "manual",
            vec![
                node(SourceRef::Page(1), 0, vec![1.0, 0.0]),
                node(SourceRef::Page(2), 0, vec![0.6, 0.8]),
                node(SourceRef::Page(3), 0, vec![0.0, 1.0]),
            ],
        );

        let hits = index.search(&query(vec![1.0, 0.0]), 2, None);
        let ids: Vec<&str> = hits.iter().map(|h| h.node.id.as_str()).collect();
        assert_eq!(ids, vec!["1::0", "2::0"]);
        assert!((hits[1].score - 0.6).abs() < 1e-9);

        let only: HashSet<String> = ["3::0".to_string()].into_iter().collect();
        let hits = index.search(&query(vec![1.0, 0.0]), 2, Some(&only));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node.id, "3::0");
    }

    #[test]
    fn test_subset_keeps_order() {
        let index = VectorIndex::new(
            "manual",
            vec![
                node(SourceRef::Page(1), 0, vec![1.0]),
                node(SourceRef::Page(1), 1, vec![1.0]),
                node(SourceRef::Page(2), 0, vec![1.0]),
            ],
        );
        let ids: HashSet<String> = ["2::0".to_string(), "1::0".to_string()].into_iter().collect();
        let subset = index.subset(&ids);
        let kept: Vec<&str> = subset.nodes().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(kept, vec!["1::0", "2::0"]);
    }

    #[test]
    fn test_cosine_of_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
