//! Analysis persistence

use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::db::{parse_ts, parse_ts_opt};
use crate::error::{RegistryError, RegistryResult};
use crate::model::{Analysis, AnalysisState, AnalysisTypeId};

/// Write an analysis row. Resubmission under an already-committed ID
/// refreshes the metadata but never touches state or publish timestamps.
pub async fn save(conn: &mut SqliteConnection, analysis: &Analysis) -> RegistryResult<()> {
    sqlx::query(
        r#"
        INSERT INTO analyses
            (analysis_id, study_id, state, analysis_type_name, analysis_type_version,
             experiment, created_at, updated_at, published_at, first_published_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(analysis_id) DO UPDATE SET
            analysis_type_name = excluded.analysis_type_name,
            analysis_type_version = excluded.analysis_type_version,
            experiment = excluded.experiment,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&analysis.analysis_id)
    .bind(&analysis.study_id)
    .bind(analysis.state.as_str())
    .bind(&analysis.analysis_type.name)
    .bind(analysis.analysis_type.version as i64)
    .bind(analysis.experiment.to_string())
    .bind(analysis.created_at.to_rfc3339())
    .bind(analysis.updated_at.to_rfc3339())
    .bind(analysis.published_at.map(|t| t.to_rfc3339()))
    .bind(analysis.first_published_at.map(|t| t.to_rfc3339()))
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn get(pool: &SqlitePool, analysis_id: &str) -> RegistryResult<Option<Analysis>> {
    let row = sqlx::query(
        r#"
        SELECT analysis_id, study_id, state, analysis_type_name, analysis_type_version,
               experiment, created_at, updated_at, published_at, first_published_at
        FROM analyses
        WHERE analysis_id = ?
        "#,
    )
    .bind(analysis_id)
    .fetch_optional(pool)
    .await?;

    row.map(|row| from_row(&row)).transpose()
}

/// Move the analysis into `new_state`. A transition into PUBLISHED
/// refreshes `published_at` and sets `first_published_at` if unset.
pub async fn update_state(
    conn: &mut SqliteConnection,
    analysis_id: &str,
    new_state: AnalysisState,
    now: DateTime<Utc>,
) -> RegistryResult<()> {
    let result = if new_state == AnalysisState::Published {
        sqlx::query(
            r#"
            UPDATE analyses
            SET state = ?, updated_at = ?, published_at = ?,
                first_published_at = COALESCE(first_published_at, ?)
            WHERE analysis_id = ?
            "#,
        )
        .bind(new_state.as_str())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(analysis_id)
        .execute(conn)
        .await?
    } else {
        sqlx::query("UPDATE analyses SET state = ?, updated_at = ? WHERE analysis_id = ?")
            .bind(new_state.as_str())
            .bind(now.to_rfc3339())
            .bind(analysis_id)
            .execute(conn)
            .await?
    };

    if result.rows_affected() == 0 {
        return Err(RegistryError::AnalysisNotFound(analysis_id.to_string()));
    }

    Ok(())
}

/// Paged listing of a study's analyses, newest first
pub async fn list_for_study(
    pool: &SqlitePool,
    study_id: &str,
    limit: i64,
    offset: i64,
) -> RegistryResult<(i64, Vec<Analysis>)> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM analyses WHERE study_id = ?")
        .bind(study_id)
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query(
        r#"
        SELECT analysis_id, study_id, state, analysis_type_name, analysis_type_version,
               experiment, created_at, updated_at, published_at, first_published_at
        FROM analyses
        WHERE study_id = ?
        ORDER BY created_at DESC, analysis_id
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(study_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let mut analyses = Vec::with_capacity(rows.len());
    for row in rows {
        analyses.push(from_row(&row)?);
    }

    Ok((total, analyses))
}

fn from_row(row: &sqlx::sqlite::SqliteRow) -> RegistryResult<Analysis> {
    let state_text: String = row.get("state");
    let experiment_text: String = row.get("experiment");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    let version: i64 = row.get("analysis_type_version");

    Ok(Analysis {
        analysis_id: row.get("analysis_id"),
        study_id: row.get("study_id"),
        state: AnalysisState::parse(&state_text)?,
        analysis_type: AnalysisTypeId {
            name: row.get("analysis_type_name"),
            version: version as u32,
        },
        experiment: serde_json::from_str(&experiment_text)
            .map_err(|e| RegistryError::Internal(format!("decode experiment: {}", e)))?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
        published_at: parse_ts_opt(row.get("published_at"))?,
        first_published_at: parse_ts_opt(row.get("first_published_at"))?,
    })
}
