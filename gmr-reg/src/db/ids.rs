//! Committed analysis identifiers
//!
//! A row in `analysis_ids` means the ID is durably reserved. The commit is
//! `INSERT OR IGNORE` against the primary key, so two concurrent writers
//! cannot both observe success for the same ID.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::RegistryResult;

/// Whether the candidate ID has already been committed
pub async fn is_committed(pool: &SqlitePool, analysis_id: &str) -> RegistryResult<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM analysis_ids WHERE analysis_id = ?")
        .bind(analysis_id)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

/// Atomically reserve the ID. Returns `true` if this call inserted the row,
/// `false` if some earlier commit already owned it.
pub async fn try_commit(conn: &mut SqliteConnection, analysis_id: &str) -> RegistryResult<bool> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO analysis_ids (analysis_id, created_at) VALUES (?, ?)",
    )
    .bind(analysis_id)
    .bind(Utc::now().to_rfc3339())
    .execute(conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gmr_common::db::init::init_memory_database;

    #[tokio::test]
    async fn commit_is_first_writer_wins() {
        let pool = init_memory_database().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        assert!(try_commit(&mut conn, "AN1").await.unwrap());
        assert!(!try_commit(&mut conn, "AN1").await.unwrap());
        drop(conn);

        assert!(is_committed(&pool, "AN1").await.unwrap());
        assert!(!is_committed(&pool, "AN2").await.unwrap());
    }
}
