use anyhow::Result;
use sqlx::SqlitePool;

/// Create the index tables if they do not exist yet.
///
/// `repo_indexes` holds one row per repository identity; `index_chunks`
/// holds that repository's chunks with their vectors as little-endian
/// f32 BLOBs.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS repo_indexes (
            repo_id TEXT PRIMARY KEY,
            location TEXT NOT NULL,
            owner TEXT,
            name TEXT,
            built_at INTEGER NOT NULL,
            total_files INTEGER NOT NULL,
            total_chunks INTEGER NOT NULL,
            skipped_files INTEGER NOT NULL DEFAULT 0,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_chunks (
            id TEXT NOT NULL,
            repo_id TEXT NOT NULL,
            ordinal INTEGER NOT NULL,
            file_path TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            start_line INTEGER NOT NULL,
            end_line INTEGER NOT NULL,
            language TEXT NOT NULL,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            PRIMARY KEY (repo_id, ordinal),
            FOREIGN KEY (repo_id) REFERENCES repo_indexes(repo_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_index_chunks_repo ON index_chunks(repo_id)")
        .execute(pool)
        .await?;

    Ok(())
}
