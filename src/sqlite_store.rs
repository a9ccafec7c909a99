//! SQLite-backed [`IndexStore`] implementation.
//!
//! One row in `repo_indexes` per repository identity, plus its chunks and
//! vectors in `index_chunks`. [`upsert_index`](IndexStore::upsert_index)
//! deletes and re-inserts inside a single transaction, and queries read
//! inside a transaction too, so a reader sees either the old index or
//! the new one. Similarity is computed in Rust over the decoded vectors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use scout_core::embedding::{blob_to_vec, vec_to_blob};
use scout_core::models::{Chunk, IndexMeta, IndexRecord, ScoredChunk};
use scout_core::search::rank_top_k;
use scout_core::store::IndexStore;
use scout_core::{ScoutError, ScoutResult};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn store_err(e: sqlx::Error) -> ScoutError {
    ScoutError::Store(e.to_string())
}

const META_COLUMNS: &str = "repo_id, location, owner, name, built_at, total_files, total_chunks, \
                            skipped_files, model, dims";

fn meta_from_row(row: &SqliteRow) -> ScoutResult<IndexMeta> {
    // built_at is stored in milliseconds since the epoch
    let built_ms: i64 = row.try_get("built_at").map_err(store_err)?;
    let built_at: DateTime<Utc> = DateTime::from_timestamp_millis(built_ms)
        .ok_or_else(|| ScoutError::Store(format!("invalid built_at timestamp {built_ms}")))?;
    Ok(IndexMeta {
        repo_id: row.try_get("repo_id").map_err(store_err)?,
        location: row.try_get("location").map_err(store_err)?,
        owner: row.try_get("owner").map_err(store_err)?,
        name: row.try_get("name").map_err(store_err)?,
        built_at,
        total_files: row.try_get("total_files").map_err(store_err)?,
        total_chunks: row.try_get("total_chunks").map_err(store_err)?,
        skipped_files: row.try_get("skipped_files").map_err(store_err)?,
        model: row.try_get("model").map_err(store_err)?,
        dims: row.try_get("dims").map_err(store_err)?,
    })
}

#[async_trait]
impl IndexStore for SqliteStore {
    async fn upsert_index(&self, record: IndexRecord) -> ScoutResult<()> {
        if record.chunks.len() != record.vectors.len() {
            return Err(ScoutError::Store(format!(
                "{} chunks but {} vectors",
                record.chunks.len(),
                record.vectors.len()
            )));
        }
        let meta = &record.meta;
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        sqlx::query("DELETE FROM index_chunks WHERE repo_id = ?")
            .bind(&meta.repo_id)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        sqlx::query("DELETE FROM repo_indexes WHERE repo_id = ?")
            .bind(&meta.repo_id)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        sqlx::query(
            r#"
            INSERT INTO repo_indexes (repo_id, location, owner, name, built_at, total_files,
                                      total_chunks, skipped_files, model, dims)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&meta.repo_id)
        .bind(&meta.location)
        .bind(&meta.owner)
        .bind(&meta.name)
        .bind(meta.built_at.timestamp_millis())
        .bind(meta.total_files)
        .bind(meta.total_chunks)
        .bind(meta.skipped_files)
        .bind(&meta.model)
        .bind(meta.dims)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        for (ordinal, (chunk, vector)) in record.chunks.iter().zip(record.vectors.iter()).enumerate()
        {
            sqlx::query(
                r#"
                INSERT INTO index_chunks (id, repo_id, ordinal, file_path, chunk_index,
                                          start_line, end_line, language, text, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&meta.repo_id)
            .bind(ordinal as i64)
            .bind(&chunk.file_path)
            .bind(chunk.chunk_index)
            .bind(chunk.start_line)
            .bind(chunk.end_line)
            .bind(&chunk.language)
            .bind(&chunk.text)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        }

        tx.commit().await.map_err(store_err)?;
        Ok(())
    }

    async fn query(
        &self,
        repo_id: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> ScoutResult<Vec<ScoredChunk>> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let indexed: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM repo_indexes WHERE repo_id = ?")
            .bind(repo_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(store_err)?;
        if indexed == 0 {
            return Err(ScoutError::NotFound(format!(
                "no index for repository {repo_id}"
            )));
        }

        let rows = sqlx::query(
            r#"
            SELECT id, file_path, chunk_index, start_line, end_line, language, text, embedding
            FROM index_chunks
            WHERE repo_id = ?
            ORDER BY ordinal
            "#,
        )
        .bind(repo_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(store_err)?;
        tx.commit().await.map_err(store_err)?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.try_get("embedding").map_err(store_err)?;
            let chunk = Chunk {
                id: row.try_get("id").map_err(store_err)?,
                repo_id: repo_id.to_string(),
                file_path: row.try_get("file_path").map_err(store_err)?,
                chunk_index: row.try_get("chunk_index").map_err(store_err)?,
                start_line: row.try_get("start_line").map_err(store_err)?,
                end_line: row.try_get("end_line").map_err(store_err)?,
                text: row.try_get("text").map_err(store_err)?,
                language: row.try_get("language").map_err(store_err)?,
            };
            entries.push((chunk, blob_to_vec(&blob)));
        }

        rank_top_k(
            query_vector,
            entries.iter().map(|(c, v)| (c, v.as_slice())),
            top_k,
        )
    }

    async fn index_meta(&self, repo_id: &str) -> ScoutResult<Option<IndexMeta>> {
        let row = sqlx::query(&format!(
            "SELECT {META_COLUMNS} FROM repo_indexes WHERE repo_id = ?"
        ))
        .bind(repo_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        row.as_ref().map(meta_from_row).transpose()
    }

    async fn delete_index(&self, repo_id: &str) -> ScoutResult<bool> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        sqlx::query("DELETE FROM index_chunks WHERE repo_id = ?")
            .bind(repo_id)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        let result = sqlx::query("DELETE FROM repo_indexes WHERE repo_id = ?")
            .bind(repo_id)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        tx.commit().await.map_err(store_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_indexes(&self) -> ScoutResult<Vec<IndexMeta>> {
        let rows = sqlx::query(&format!(
            "SELECT {META_COLUMNS} FROM repo_indexes ORDER BY repo_id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        rows.iter().map(meta_from_row).collect()
    }
}
