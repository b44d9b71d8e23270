//! Vector store abstraction.
//!
//! The ingester and retrieval engine only talk to a [`VectorStore`]: a
//! named collection of [`Record`]s (id, text, flat metadata) supporting
//! upsert, top-k similarity queries with an optional metadata [`Filter`],
//! filtered listing, deletion by id, and metadata updates.
//!
//! Two backends are provided:
//!
//! | Backend | Similarity | Persistence |
//! |---------|------------|-------------|
//! | [`SqliteStore`] | cosine over embeddings, or FTS5 BM25 when embeddings are disabled | SQLite file |
//! | [`InMemoryStore`] | query-term overlap | none |
//!
//! Like any nearest-neighbour index, `query` returns up to `n_results`
//! records even when none of them share a term with the query.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::models::{Metadata, QueryHit, Record};

/// Equality / inclusion predicate over record metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `metadata[key] == value`
    Eq(String, Value),
    /// `metadata[key]` is one of the values. An empty list matches nothing.
    In(String, Vec<Value>),
    /// All sub-filters match. An empty list matches everything.
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(key: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(key.to_string(), value.into())
    }

    pub fn one_of<V: Into<Value>>(key: &str, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In(key.to_string(), values.into_iter().map(Into::into).collect())
    }

    /// Combine filters, collapsing a single filter to itself.
    pub fn all(mut filters: Vec<Filter>) -> Option<Self> {
        match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(Filter::And(filters)),
        }
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            Filter::Eq(key, value) => metadata.get(key) == Some(value),
            Filter::In(key, values) => metadata
                .get(key)
                .map(|v| values.contains(v))
                .unwrap_or(false),
            Filter::And(filters) => filters.iter().all(|f| f.matches(metadata)),
        }
    }
}

/// A persistent or in-memory collection of chunk records.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Name of the collection this store reads and writes.
    fn collection(&self) -> &str;

    /// Insert records, replacing any existing record with the same id.
    async fn add(&self, records: Vec<Record>) -> Result<()>;

    /// Up to `n_results` records most similar to `text`, best first.
    async fn query(
        &self,
        text: &str,
        n_results: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<QueryHit>>;

    /// All records matching `filter`, in insertion order.
    async fn get(&self, filter: Option<&Filter>) -> Result<Vec<Record>>;

    /// Records with the given ids, in insertion order. Unknown ids are ignored.
    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Record>> {
        Ok(self
            .get(None)
            .await?
            .into_iter()
            .filter(|r| ids.contains(&r.id))
            .collect())
    }

    /// Remove records by id. Unknown ids are ignored.
    async fn delete(&self, ids: &[String]) -> Result<()>;

    /// Replace the metadata of existing records. Unknown ids are ignored.
    async fn update(&self, ids: &[String], metadatas: Vec<Metadata>) -> Result<()>;

    async fn count(&self) -> Result<usize>;
}

/// Lowercased alphanumeric terms of `text`.
pub(crate) fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(pairs: &[(&str, Value)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_filter_matches() {
        let m = meta(&[
            ("document_type", json!("resume")),
            ("file_extension", json!(".md")),
            ("is_original_content", json!(true)),
        ]);
        assert!(Filter::eq("document_type", "resume").matches(&m));
        assert!(!Filter::eq("document_type", "code").matches(&m));
        assert!(Filter::one_of("file_extension", [".md", ".txt"]).matches(&m));
        assert!(!Filter::one_of("file_extension", Vec::<String>::new()).matches(&m));
        assert!(!Filter::eq("missing", "x").matches(&m));
        assert!(Filter::And(vec![
            Filter::eq("is_original_content", true),
            Filter::eq("document_type", "resume"),
        ])
        .matches(&m));
        assert!(Filter::And(vec![]).matches(&m));
    }

    #[test]
    fn test_filter_all_collapses() {
        assert_eq!(Filter::all(vec![]), None);
        assert_eq!(
            Filter::all(vec![Filter::eq("a", 1)]),
            Some(Filter::eq("a", 1))
        );
        assert!(matches!(
            Filter::all(vec![Filter::eq("a", 1), Filter::eq("b", 2)]),
            Some(Filter::And(_))
        ));
    }

    #[test]
    fn test_terms() {
        assert_eq!(terms("Rust, async-IO!"), vec!["rust", "async", "io"]);
    }
}
