//! Retrieval over the vector store.
//!
//! Four query modes share one result shape ([`QueryResult`]):
//!
//! - **plain**: top `n` hits in the store's native order;
//! - **multi-stage**: over-fetch `initial_results`, re-score each candidate
//!   with [`rerank_score`], stable-sort descending, keep `final_results`;
//! - **cluster**: over-fetch `3n`, group by `document_type`, round-robin
//!   across groups taking at most `max(1, n / groups)` from each;
//! - **personalized**: filter by category / file extension at query time,
//!   over-fetch `2n`, optionally reorder by ingestion recency.
//!
//! Store failures never propagate: they are logged and produce an empty
//! result tagged [`SourceIntegrity::Error`]. None of the modes write to the
//! store; [`RetrievalEngine::record_feedback`] is the only mutation here.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Utc;
use serde_json::{json, Value};

use crate::config::RetrievalConfig;
use crate::models::{
    fields, meta_bool, meta_i64, meta_str, IntegrityReport, IntegrityStatus, QueryHit,
    QueryResult, RetrievedChunk, SourceIntegrity,
};
use crate::store::{Filter, VectorStore};

const RESUME_QUERY_KEYWORDS: &[&str] = &["resume", "experience", "skills"];
const RECENT_WINDOW_SECS: i64 = 30 * 24 * 3600;

/// Filters and ordering for [`RetrievalEngine::personalized_query`].
#[derive(Debug, Clone, Default)]
pub struct Preferences {
    /// Allowed `document_type` values.
    pub categories: Option<Vec<String>>,
    /// Allowed file extensions, with or without the leading dot.
    pub preferred_file_types: Option<Vec<String>>,
    /// Order by ingestion time, newest first, before truncating.
    pub prefer_recent: bool,
}

impl Preferences {
    fn filter(&self) -> Option<Filter> {
        let mut filters = Vec::new();
        if let Some(categories) = &self.categories {
            filters.push(Filter::one_of(fields::DOCUMENT_TYPE, categories.clone()));
        }
        if let Some(types) = &self.preferred_file_types {
            let dotted: Vec<String> = types
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    if t.starts_with('.') {
                        t
                    } else {
                        format!(".{}", t)
                    }
                })
                .collect();
            filters.push(Filter::one_of(fields::FILE_EXTENSION, dotted));
        }
        Filter::all(filters)
    }
}

/// Heuristic re-ranking score for multi-stage retrieval.
///
/// Base 1.0; +0.5 for original content; +0.3 when the query asks about
/// resume/experience/skills and the candidate is a resume or CV; +0.1 when
/// ingested less than 30 days before `now`.
pub fn rerank_score(query: &str, metadata: &crate::models::Metadata, now: i64) -> f64 {
    let mut score = 1.0;

    if meta_bool(metadata, fields::IS_ORIGINAL_CONTENT) {
        score += 0.5;
    }

    let query = query.to_lowercase();
    if RESUME_QUERY_KEYWORDS.iter().any(|k| query.contains(k)) {
        let doc_type = meta_str(metadata, fields::DOCUMENT_TYPE)
            .unwrap_or_default()
            .to_lowercase();
        if doc_type == "resume" || doc_type == "cv" {
            score += 0.3;
        }
    }

    if let Some(ingested) = meta_i64(metadata, fields::INGESTION_TIME) {
        if ingested > 0 && now - ingested < RECENT_WINDOW_SECS {
            score += 0.1;
        }
    }

    score
}

fn to_chunk(hit: QueryHit) -> RetrievedChunk {
    RetrievedChunk {
        id: hit.record.id,
        text: hit.record.document,
        metadata: hit.record.metadata,
        score: None,
        cluster: None,
    }
}

pub struct RetrievalEngine {
    store: Arc<dyn VectorStore>,
    config: RetrievalConfig,
}

impl RetrievalEngine {
    pub fn new(store: Arc<dyn VectorStore>, config: RetrievalConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    async fn candidates(
        &self,
        mode: &str,
        text: &str,
        n: usize,
        filter: Option<&Filter>,
    ) -> Option<Vec<QueryHit>> {
        match self.store.query(text, n, filter).await {
            Ok(hits) => Some(hits),
            Err(e) => {
                tracing::error!(mode, query = text, error = %e, "retrieval failed");
                None
            }
        }
    }

    /// Plain top-`n` similarity query.
    pub async fn query(&self, text: &str, n_results: usize) -> QueryResult {
        let Some(hits) = self.candidates("plain", text, n_results, None).await else {
            return QueryResult::empty(text, SourceIntegrity::Error);
        };
        QueryResult {
            query: text.to_string(),
            chunks: hits.into_iter().map(to_chunk).collect(),
            source_integrity: SourceIntegrity::Preserved,
            cluster_info: None,
        }
    }

    /// Multi-stage query with the configured candidate and result counts.
    pub async fn multi_stage_query(&self, text: &str) -> QueryResult {
        self.multi_stage_query_with(text, self.config.initial_results, self.config.final_results)
            .await
    }

    pub async fn multi_stage_query_with(
        &self,
        text: &str,
        initial_results: usize,
        final_results: usize,
    ) -> QueryResult {
        let Some(hits) = self
            .candidates("multi_stage", text, initial_results, None)
            .await
        else {
            return QueryResult::empty(text, SourceIntegrity::Error);
        };

        let now = Utc::now().timestamp();
        let mut chunks: Vec<RetrievedChunk> = hits
            .into_iter()
            .map(|hit| {
                let score = rerank_score(text, &hit.record.metadata, now);
                RetrievedChunk {
                    score: Some(score),
                    ..to_chunk(hit)
                }
            })
            .collect();
        // stable: ties keep store order
        chunks.sort_by(|a, b| {
            b.score
                .unwrap_or_default()
                .total_cmp(&a.score.unwrap_or_default())
        });
        chunks.truncate(final_results);

        QueryResult {
            query: text.to_string(),
            chunks,
            source_integrity: SourceIntegrity::Preserved,
            cluster_info: None,
        }
    }

    /// Diversified query across document types.
    pub async fn cluster_query(&self, text: &str, n_results: usize) -> QueryResult {
        let Some(hits) = self
            .candidates("cluster", text, n_results.saturating_mul(3), None)
            .await
        else {
            return QueryResult::empty(text, SourceIntegrity::Error);
        };

        // groups in order of first appearance
        let mut clusters: Vec<(String, Vec<QueryHit>)> = Vec::new();
        for hit in hits {
            let label = meta_str(&hit.record.metadata, fields::DOCUMENT_TYPE)
                .unwrap_or("unknown")
                .to_string();
            match clusters.iter_mut().find(|(l, _)| *l == label) {
                Some((_, members)) => members.push(hit),
                None => clusters.push((label, vec![hit])),
            }
        }

        let cluster_info: BTreeMap<String, usize> = clusters
            .iter()
            .map(|(label, members)| (label.clone(), members.len()))
            .collect();

        let mut chunks = Vec::new();
        if !clusters.is_empty() {
            let per_cluster = (n_results / clusters.len()).max(1);
            let mut queues: Vec<(String, std::vec::IntoIter<QueryHit>)> = clusters
                .into_iter()
                .map(|(label, members)| (label, members.into_iter()))
                .collect();

            'rounds: for _ in 0..per_cluster {
                let mut took_any = false;
                for (label, queue) in queues.iter_mut() {
                    if chunks.len() >= n_results {
                        break 'rounds;
                    }
                    if let Some(hit) = queue.next() {
                        chunks.push(RetrievedChunk {
                            cluster: Some(label.clone()),
                            ..to_chunk(hit)
                        });
                        took_any = true;
                    }
                }
                if !took_any {
                    break;
                }
            }
        }

        QueryResult {
            query: text.to_string(),
            chunks,
            source_integrity: SourceIntegrity::Preserved,
            cluster_info: Some(cluster_info),
        }
    }

    /// Query restricted and ordered by user preferences.
    pub async fn personalized_query(
        &self,
        text: &str,
        preferences: &Preferences,
        n_results: usize,
    ) -> QueryResult {
        let filter = preferences.filter();
        let Some(hits) = self
            .candidates(
                "personalized",
                text,
                n_results.saturating_mul(2),
                filter.as_ref(),
            )
            .await
        else {
            return QueryResult::empty(text, SourceIntegrity::Error);
        };

        let mut chunks: Vec<RetrievedChunk> = hits.into_iter().map(to_chunk).collect();
        if preferences.prefer_recent {
            chunks.sort_by_key(|c| {
                std::cmp::Reverse(meta_i64(&c.metadata, fields::INGESTION_TIME).unwrap_or(0))
            });
        }
        chunks.truncate(n_results);

        QueryResult {
            query: text.to_string(),
            chunks,
            source_integrity: SourceIntegrity::Preserved,
            cluster_info: None,
        }
    }

    /// Check that the original-content chunks of `filename` share one hash.
    pub async fn verify(&self, filename: &str) -> IntegrityReport {
        let filter = Filter::And(vec![
            Filter::eq(fields::FILENAME, filename),
            Filter::eq(fields::IS_ORIGINAL_CONTENT, true),
        ]);
        let mut report = IntegrityReport {
            status: IntegrityStatus::NotFound,
            filename: filename.to_string(),
            original_hash: None,
            chunk_count: 0,
            integrity_preserved: false,
        };

        let records = match self.store.get(Some(&filter)).await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(filename, error = %e, "integrity check failed");
                report.status = IntegrityStatus::Error;
                return report;
            }
        };
        if records.is_empty() {
            return report;
        }

        let hashes: Vec<Option<&str>> = records
            .iter()
            .map(|r| meta_str(&r.metadata, fields::SOURCE_FILE_HASH))
            .collect();
        let first = hashes[0];
        let consistent = first.is_some() && hashes.iter().all(|h| *h == first);

        report.chunk_count = records.len();
        report.integrity_preserved = consistent;
        if consistent {
            report.status = IntegrityStatus::Verified;
            report.original_hash = first.map(str::to_string);
        } else {
            tracing::warn!(filename, "chunks disagree on source hash");
            report.status = IntegrityStatus::Error;
        }
        report
    }

    /// Append a relevance judgement to a chunk's `user_feedback` list.
    ///
    /// Returns `false` if no chunk has `chunk_id`.
    pub async fn record_feedback(
        &self,
        query: &str,
        chunk_id: &str,
        relevance_score: f64,
    ) -> Result<bool> {
        if !(0.0..=1.0).contains(&relevance_score) {
            bail!("relevance score must be in [0.0, 1.0], got {}", relevance_score);
        }

        let ids = [chunk_id.to_string()];
        let Some(record) = self.store.get_by_ids(&ids).await?.into_iter().next() else {
            tracing::warn!(chunk_id, "feedback for unknown chunk");
            return Ok(false);
        };

        let mut metadata = record.metadata;
        let entry = json!({
            "query": query,
            "relevance_score": relevance_score,
            "timestamp": Utc::now().timestamp(),
        });
        match metadata.get_mut(fields::USER_FEEDBACK) {
            Some(Value::Array(list)) => list.push(entry),
            _ => {
                metadata.insert(fields::USER_FEEDBACK.into(), Value::Array(vec![entry]));
            }
        }

        self.store.update(&ids, vec![metadata]).await?;
        tracing::info!(chunk_id, "recorded feedback");
        Ok(true)
    }
}
