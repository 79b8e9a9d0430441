//! SQLite-backed game index.
//!
//! Stores one row per game plus one embedding per game and answers
//! nearest-neighbour queries by brute-force cosine similarity over the
//! vectors produced by the current embedding model.
//!
//! Scores follow the distance convention of cosine vector stores:
//! `distance = 1 - cos_sim` and `score = max(0, 1 - distance)`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use crate::db;
use crate::embedding::{self, blob_to_vec, cosine_similarity, vec_to_blob, Embedder};
use crate::migrate;
use crate::models::{GameRecord, RetrievalItem, RetrievalResult};
use crate::traits::RetrievalProvider;

/// Counts reported by [`GameIndex::upsert_games`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertStats {
    /// Records read from the input, repeated ids and unchanged ones included.
    pub ingested: usize,
    /// Records whose vector was (re)computed.
    pub embedded: usize,
    /// Distinct records whose stored vector was already current.
    pub unchanged: usize,
}

pub struct GameIndex {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

struct PreparedGame<'a> {
    record: &'a GameRecord,
    document: String,
    metadata_json: String,
    content_hash: String,
}

impl GameIndex {
    /// Open the index at `path`, creating the schema if needed.
    pub async fn open(path: &Path, embedder: Arc<dyn Embedder>, batch_size: usize) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self {
            pool,
            embedder,
            batch_size: batch_size.max(1),
        })
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    /// Number of games stored.
    pub async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM games")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    /// Insert or update games by id.
    ///
    /// Vectors are recomputed only for games whose document text changed
    /// or that have no vector for the current model. When an id repeats,
    /// only its last occurrence is stored. All embedding calls happen
    /// before the write transaction, so an embedding failure leaves the
    /// index untouched.
    pub async fn upsert_games(&self, records: &[GameRecord]) -> Result<UpsertStats> {
        let model = self.embedder.model_name().to_string();
        let dims = self.embedder.dims();

        let prepared: Vec<PreparedGame<'_>> = last_occurrences(records)
            .into_iter()
            .map(prepare)
            .collect::<Result<_>>()?;

        let mut pending: Vec<&PreparedGame<'_>> = Vec::new();
        for game in &prepared {
            let stored_hash: Option<String> = sqlx::query_scalar(
                "SELECT content_hash FROM game_vectors WHERE game_id = ? AND model = ?",
            )
            .bind(&game.record.id)
            .bind(&model)
            .fetch_optional(&self.pool)
            .await?;

            if stored_hash.as_deref() != Some(game.content_hash.as_str()) {
                pending.push(game);
            }
        }

        let mut vectors: Vec<(&PreparedGame<'_>, Vec<f32>)> = Vec::with_capacity(pending.len());
        for batch in pending.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|g| g.document.clone()).collect();
            let embedded = self
                .embedder
                .embed(&texts)
                .await
                .context("Failed to embed game records")?;
            if embedded.len() != batch.len() {
                anyhow::bail!(
                    "Embedding provider returned {} vectors for {} texts",
                    embedded.len(),
                    batch.len()
                );
            }
            if let Some(bad) = embedded.iter().find(|v| v.len() != dims) {
                anyhow::bail!(
                    "Embedding model '{}' returned {}-dimensional vectors, expected {} \
                     (check embedding.dims)",
                    model,
                    bad.len(),
                    dims
                );
            }
            vectors.extend(batch.iter().copied().zip(embedded));
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for game in &prepared {
            sqlx::query(
                r#"
                INSERT INTO games (id, title, document, metadata_json, content_hash, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    document = excluded.document,
                    metadata_json = excluded.metadata_json,
                    content_hash = excluded.content_hash,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&game.record.id)
            .bind(&game.record.title)
            .bind(&game.document)
            .bind(&game.metadata_json)
            .bind(&game.content_hash)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        for (game, vector) in &vectors {
            sqlx::query(
                r#"
                INSERT INTO game_vectors (game_id, model, dims, content_hash, embedding)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(game_id) DO UPDATE SET
                    model = excluded.model,
                    dims = excluded.dims,
                    content_hash = excluded.content_hash,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&game.record.id)
            .bind(&model)
            .bind(vector.len() as i64)
            .bind(&game.content_hash)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        let stats = UpsertStats {
            ingested: records.len(),
            embedded: vectors.len(),
            unchanged: prepared.len() - vectors.len(),
        };
        tracing::info!(
            ingested = stats.ingested,
            embedded = stats.embedded,
            unchanged = stats.unchanged,
            model = %model,
            "upserted games"
        );
        Ok(stats)
    }

    /// Rank stored games against `query` and return the best `top_k`.
    pub async fn semantic_search(&self, query: &str, top_k: usize) -> Result<RetrievalResult> {
        if query.trim().is_empty() || top_k == 0 {
            return Ok(RetrievalResult::empty(query));
        }

        let model = self.embedder.model_name().to_string();
        let vector_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM game_vectors WHERE model = ?")
                .bind(&model)
                .fetch_one(&self.pool)
                .await?;
        if vector_count == 0 {
            tracing::debug!(model = %model, "index has no vectors for current model");
            return Ok(RetrievalResult::empty(query));
        }

        let query_vec = embedding::embed_query(self.embedder.as_ref(), query)
            .await
            .context("Failed to embed query")?;

        let rows = sqlx::query(
            r#"
            SELECT g.id, g.title, g.document, g.metadata_json, v.embedding
            FROM game_vectors v
            JOIN games g ON g.id = v.game_id
            WHERE v.model = ?
            "#,
        )
        .bind(&model)
        .fetch_all(&self.pool)
        .await?;

        let mut matches: Vec<RetrievalItem> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let similarity = cosine_similarity(&query_vec, &blob_to_vec(&blob)) as f64;
                let distance = 1.0 - similarity;
                let metadata_json: String = row.get("metadata_json");
                let id: String = row.get("id");
                let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata_json)
                    .unwrap_or_else(|e| {
                        tracing::warn!(
                            game_id = %id,
                            error = %e,
                            "stored metadata is corrupt; ignoring it"
                        );
                        BTreeMap::new()
                    });

                RetrievalItem {
                    id,
                    title: row.get("title"),
                    score: (1.0 - distance).max(0.0),
                    metadata,
                    description: row.get("document"),
                }
            })
            .collect();

        // Sort: score desc, id asc (deterministic)
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        matches.truncate(top_k);

        Ok(RetrievalResult {
            query: query.to_string(),
            matches,
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl RetrievalProvider for GameIndex {
    async fn search(&self, query: &str, top_k: usize) -> Result<RetrievalResult> {
        self.semantic_search(query, top_k).await
    }
}

/// Keep the last record per id, in file order of those last occurrences.
fn last_occurrences(records: &[GameRecord]) -> Vec<&GameRecord> {
    let mut last: HashMap<&str, usize> = HashMap::with_capacity(records.len());
    for (position, record) in records.iter().enumerate() {
        last.insert(record.id.as_str(), position);
    }
    records
        .iter()
        .enumerate()
        .filter(|(position, record)| last.get(record.id.as_str()) == Some(position))
        .map(|(_, record)| record)
        .collect()
}

fn prepare(record: &GameRecord) -> Result<PreparedGame<'_>> {
    let document = record.to_document();
    let metadata_json = serde_json::to_string(&record.to_metadata())?;
    let content_hash = content_hash(&document);
    Ok(PreparedGame {
        record,
        document,
        metadata_json,
        content_hash,
    })
}

fn content_hash(document: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document.as_bytes());
    format!("{:x}", hasher.finalize())
}
