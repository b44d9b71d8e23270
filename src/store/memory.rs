//! In-process store used by tests and embedders of the library.

use std::collections::HashSet;
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use super::{terms, Filter, VectorStore};
use crate::models::{Metadata, QueryHit, Record};

/// A [`VectorStore`] holding records in a `Vec`.
///
/// Similarity is the fraction of distinct query terms present in the
/// record text. Ties keep insertion order.
pub struct InMemoryStore {
    collection: String,
    records: RwLock<Vec<Record>>,
}

impl InMemoryStore {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            records: RwLock::new(Vec::new()),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<Record>>> {
        self.records
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<Record>>> {
        self.records
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new("user_profile")
    }
}

fn overlap_score(query_terms: &HashSet<String>, text: &str) -> f64 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let doc: HashSet<String> = terms(text).into_iter().collect();
    query_terms.intersection(&doc).count() as f64 / query_terms.len() as f64
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn add(&self, records: Vec<Record>) -> Result<()> {
        let mut stored = self.write()?;
        for record in records {
            match stored.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record,
                None => stored.push(record),
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        text: &str,
        n_results: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<QueryHit>> {
        let query_terms: HashSet<String> = terms(text).into_iter().collect();
        let stored = self.read()?;
        let mut hits: Vec<QueryHit> = stored
            .iter()
            .filter(|r| filter.map_or(true, |f| f.matches(&r.metadata)))
            .map(|r| QueryHit {
                score: overlap_score(&query_terms, &r.document),
                record: r.clone(),
            })
            .collect();
        // stable: equal scores keep insertion order
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(n_results);
        Ok(hits)
    }

    async fn get(&self, filter: Option<&Filter>) -> Result<Vec<Record>> {
        Ok(self
            .read()?
            .iter()
            .filter(|r| filter.map_or(true, |f| f.matches(&r.metadata)))
            .cloned()
            .collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        self.write()?.retain(|r| !ids.contains(r.id.as_str()));
        Ok(())
    }

    async fn update(&self, ids: &[String], metadatas: Vec<Metadata>) -> Result<()> {
        if ids.len() != metadatas.len() {
            bail!(
                "update: {} ids but {} metadata entries",
                ids.len(),
                metadatas.len()
            );
        }
        let mut stored = self.write()?;
        for (id, metadata) in ids.iter().zip(metadatas) {
            if let Some(record) = stored.iter_mut().find(|r| &r.id == id) {
                record.metadata = metadata;
            }
        }
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, text: &str, doc_type: &str) -> Record {
        let mut metadata = Metadata::new();
        metadata.insert("document_type".into(), json!(doc_type));
        Record {
            id: id.into(),
            document: text.into(),
            metadata,
        }
    }

    #[tokio::test]
    async fn test_add_upserts_by_id() {
        let store = InMemoryStore::default();
        store
            .add(vec![record("a", "one", "resume"), record("b", "two", "code")])
            .await
            .unwrap();
        store.add(vec![record("a", "uno", "resume")]).await.unwrap();

        let all = store.get(None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "a");
        assert_eq!(all[0].document, "uno");
    }

    #[tokio::test]
    async fn test_query_ranks_by_overlap() {
        let store = InMemoryStore::default();
        store
            .add(vec![
                record("a", "gardening tips", "document"),
                record("b", "rust systems engineer", "resume"),
                record("c", "rust hobby", "project"),
            ])
            .await
            .unwrap();

        let hits = store.query("rust engineer", 3, None).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.record.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert!((hits[0].score - 1.0).abs() < 1e-9);

        let filtered = store
            .query("rust", 5, Some(&Filter::eq("document_type", "project")))
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].record.id, "c");
    }

    #[tokio::test]
    async fn test_delete_and_update() {
        let store = InMemoryStore::default();
        store
            .add(vec![record("a", "x", "resume"), record("b", "y", "code")])
            .await
            .unwrap();

        store.delete(&["a".to_string(), "zzz".to_string()]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);

        let mut m = Metadata::new();
        m.insert("document_type".into(), json!("profile"));
        store.update(&["b".to_string()], vec![m]).await.unwrap();
        let b = store.get(None).await.unwrap();
        assert_eq!(b[0].metadata["document_type"], "profile");

        assert!(store.update(&["b".to_string()], vec![]).await.is_err());
    }
}
