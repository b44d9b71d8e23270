//! SQLite-backed [`VectorStore`].
//!
//! Records live in `records(collection, id, document, metadata_json, embedding)`
//! with an FTS5 mirror in `records_fts`. Metadata filters are compiled to
//! `json_extract` predicates.
//!
//! Ranking depends on the embedding provider:
//! - provider enabled: documents are embedded on `add`, queries are embedded
//!   and every candidate is scored by cosine similarity in Rust;
//! - provider disabled: FTS5 BM25 over the query terms, padded with
//!   non-matching records (score 0, insertion order) up to `n_results`.

use std::collections::HashSet;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};

use super::{terms, Filter, VectorStore};
use crate::config::Config;
use crate::db;
use crate::embedding::{self, blob_to_vec, cosine_similarity, vec_to_blob, EmbeddingProvider};
use crate::migrate;
use crate::models::{Metadata, QueryHit, Record};

pub struct SqliteStore {
    pool: SqlitePool,
    collection: String,
    embedder: Option<Box<dyn EmbeddingProvider>>,
}

/// A bind parameter for a compiled filter.
#[derive(Debug, Clone, PartialEq)]
enum SqlArg {
    Text(String),
    Int(i64),
    Real(f64),
}

impl SqlArg {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::String(s) => SqlArg::Text(s.clone()),
            Value::Bool(b) => SqlArg::Int(i64::from(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlArg::Int(i),
                None => SqlArg::Real(n.as_f64().unwrap_or(0.0)),
            },
            other => SqlArg::Text(other.to_string()),
        }
    }
}

fn json_path(key: &str) -> String {
    format!("$.\"{}\"", key.replace('"', "\\\""))
}

/// Compile `filter` to a SQL predicate over `r.metadata_json`.
fn filter_sql(filter: &Filter, args: &mut Vec<SqlArg>) -> String {
    match filter {
        Filter::Eq(key, value) => {
            args.push(SqlArg::Text(json_path(key)));
            args.push(SqlArg::from_json(value));
            "json_extract(r.metadata_json, ?) = ?".to_string()
        }
        Filter::In(key, values) => {
            if values.is_empty() {
                return "0".to_string();
            }
            args.push(SqlArg::Text(json_path(key)));
            args.extend(values.iter().map(SqlArg::from_json));
            let marks = vec!["?"; values.len()].join(", ");
            format!("json_extract(r.metadata_json, ?) IN ({})", marks)
        }
        Filter::And(filters) => {
            if filters.is_empty() {
                return "1".to_string();
            }
            let parts: Vec<String> = filters.iter().map(|f| filter_sql(f, args)).collect();
            format!("({})", parts.join(" AND "))
        }
    }
}

fn bind_all<'q>(
    mut query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    args: Vec<SqlArg>,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    for arg in args {
        query = match arg {
            SqlArg::Text(s) => query.bind(s),
            SqlArg::Int(i) => query.bind(i),
            SqlArg::Real(f) => query.bind(f),
        };
    }
    query
}

/// OR-joined quoted terms, safe to pass to `MATCH`.
fn fts_query(text: &str) -> Option<String> {
    let unique: Vec<String> = {
        let mut seen = HashSet::new();
        terms(text)
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect()
    };
    if unique.is_empty() {
        return None;
    }
    Some(
        unique
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

fn row_to_record(row: &SqliteRow) -> Result<Record> {
    let metadata_json: String = row.get("metadata_json");
    let metadata: Metadata = serde_json::from_str(&metadata_json)
        .with_context(|| "Corrupt metadata_json in records table")?;
    Ok(Record {
        id: row.get("id"),
        document: row.get("document"),
        metadata,
    })
}

impl SqliteStore {
    /// Open the configured database, run migrations, and select the collection.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(&config.db.path).await?;
        migrate::migrate_pool(&pool).await?;
        let embedder = if config.embedding.is_enabled() {
            Some(embedding::create_provider(config)?)
        } else {
            None
        };
        Ok(Self::with_pool(pool, &config.db.collection, embedder))
    }

    pub fn with_pool(
        pool: SqlitePool,
        collection: &str,
        embedder: Option<Box<dyn EmbeddingProvider>>,
    ) -> Self {
        Self {
            pool,
            collection: collection.to_string(),
            embedder,
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn fetch_records(
        &self,
        filter: Option<&Filter>,
        with_embedding: bool,
    ) -> Result<Vec<SqliteRow>> {
        let mut args = vec![SqlArg::Text(self.collection.clone())];
        let mut sql = format!(
            "SELECT r.id, r.document, r.metadata_json{} FROM records r WHERE r.collection = ?",
            if with_embedding { ", r.embedding" } else { "" }
        );
        if let Some(f) = filter {
            sql.push_str(" AND ");
            sql.push_str(&filter_sql(f, &mut args));
        }
        sql.push_str(" ORDER BY r.rowid");

        let rows = bind_all(sqlx::query(&sql), args)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn query_by_embedding(
        &self,
        embedder: &dyn EmbeddingProvider,
        text: &str,
        n_results: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<QueryHit>> {
        let query_vec = embedding::embed_query(embedder, text).await?;
        let rows = self.fetch_records(filter, true).await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Option<Vec<u8>> = row.get("embedding");
            let score = blob
                .map(|b| cosine_similarity(&query_vec, &blob_to_vec(&b)) as f64)
                .unwrap_or(0.0);
            hits.push(QueryHit {
                record: row_to_record(row)?,
                score,
            });
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(n_results);
        Ok(hits)
    }

    async fn query_by_keywords(
        &self,
        text: &str,
        n_results: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<QueryHit>> {
        let mut hits = Vec::new();

        if let Some(match_expr) = fts_query(text) {
            let mut args = vec![
                SqlArg::Text(match_expr),
                SqlArg::Text(self.collection.clone()),
            ];
            let mut sql = String::from(
                r#"
                SELECT r.id, r.document, r.metadata_json, bm25(records_fts) AS bm25_score
                FROM records_fts
                JOIN records r
                  ON r.collection = records_fts.collection AND r.id = records_fts.record_id
                WHERE records_fts MATCH ? AND records_fts.collection = ?
                "#,
            );
            if let Some(f) = filter {
                sql.push_str(" AND ");
                sql.push_str(&filter_sql(f, &mut args));
            }
            sql.push_str(" ORDER BY bm25_score LIMIT ?");
            args.push(SqlArg::Int(n_results as i64));

            let rows = bind_all(sqlx::query(&sql), args)
                .fetch_all(&self.pool)
                .await?;
            for row in &rows {
                let rank: f64 = row.get("bm25_score");
                hits.push(QueryHit {
                    record: row_to_record(row)?,
                    score: -rank, // negate so higher = better
                });
            }
        }

        if hits.len() < n_results {
            let seen: HashSet<String> = hits.iter().map(|h| h.record.id.clone()).collect();
            for row in self.fetch_records(filter, false).await? {
                if hits.len() >= n_results {
                    break;
                }
                let record = row_to_record(&row)?;
                if !seen.contains(&record.id) {
                    hits.push(QueryHit { record, score: 0.0 });
                }
            }
        }

        Ok(hits)
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn add(&self, records: Vec<Record>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let embeddings: Vec<Option<Vec<u8>>> = match &self.embedder {
            Some(embedder) => {
                let texts: Vec<String> = records.iter().map(|r| r.document.clone()).collect();
                embedder
                    .embed(&texts)
                    .await?
                    .iter()
                    .map(|v| Some(vec_to_blob(v)))
                    .collect()
            }
            None => vec![None; records.len()],
        };

        let mut tx = self.pool.begin().await?;
        for (record, blob) in records.iter().zip(embeddings) {
            let metadata_json = serde_json::to_string(&record.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO records (collection, id, document, metadata_json, embedding)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    document = excluded.document,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&self.collection)
            .bind(&record.id)
            .bind(&record.document)
            .bind(&metadata_json)
            .bind(blob)
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM records_fts WHERE collection = ? AND record_id = ?")
                .bind(&self.collection)
                .bind(&record.id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("INSERT INTO records_fts (collection, record_id, document) VALUES (?, ?, ?)")
                .bind(&self.collection)
                .bind(&record.id)
                .bind(&record.document)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn query(
        &self,
        text: &str,
        n_results: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<QueryHit>> {
        if n_results == 0 {
            return Ok(Vec::new());
        }
        match &self.embedder {
            Some(embedder) => {
                self.query_by_embedding(embedder.as_ref(), text, n_results, filter)
                    .await
            }
            None => self.query_by_keywords(text, n_results, filter).await,
        }
    }

    async fn get(&self, filter: Option<&Filter>) -> Result<Vec<Record>> {
        self.fetch_records(filter, false)
            .await?
            .iter()
            .map(row_to_record)
            .collect()
    }

    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Record>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let marks = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT r.id, r.document, r.metadata_json FROM records r \
             WHERE r.collection = ? AND r.id IN ({}) ORDER BY r.rowid",
            marks
        );
        let mut query = sqlx::query(&sql).bind(&self.collection);
        for id in ids {
            query = query.bind(id);
        }
        query
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(row_to_record)
            .collect()
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query("DELETE FROM records_fts WHERE collection = ? AND record_id = ?")
                .bind(&self.collection)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM records WHERE collection = ? AND id = ?")
                .bind(&self.collection)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
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
        let mut tx = self.pool.begin().await?;
        for (id, metadata) in ids.iter().zip(metadatas) {
            sqlx::query("UPDATE records SET metadata_json = ? WHERE collection = ? AND id = ?")
                .bind(serde_json::to_string(&metadata)?)
                .bind(&self.collection)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}
