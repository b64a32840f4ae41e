//! Study persistence

use gmr_common::db::models::Study;
use sqlx::{Row, SqlitePool};

use crate::error::RegistryResult;

pub async fn exists(pool: &SqlitePool, study_id: &str) -> RegistryResult<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM studies WHERE study_id = ?")
        .bind(study_id)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

pub async fn save(pool: &SqlitePool, study: &Study) -> RegistryResult<()> {
    sqlx::query(
        r#"
        INSERT INTO studies (study_id, name, organization, description)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(study_id) DO UPDATE SET
            name = excluded.name,
            organization = excluded.organization,
            description = excluded.description
        "#,
    )
    .bind(&study.study_id)
    .bind(&study.name)
    .bind(&study.organization)
    .bind(&study.description)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get(pool: &SqlitePool, study_id: &str) -> RegistryResult<Option<Study>> {
    let row = sqlx::query(
        "SELECT study_id, name, organization, description FROM studies WHERE study_id = ?",
    )
    .bind(study_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| Study {
        study_id: row.get("study_id"),
        name: row.get("name"),
        organization: row.get("organization"),
        description: row.get("description"),
    }))
}
