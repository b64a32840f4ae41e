//! Append-only analysis state history

use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::db::parse_ts;
use crate::error::RegistryResult;
use crate::model::{AnalysisState, StateChange};

/// Append one transition record. Never updated or deleted.
pub async fn append(conn: &mut SqliteConnection, change: &StateChange) -> RegistryResult<()> {
    sqlx::query(
        r#"
        INSERT INTO analysis_state_history (analysis_id, initial_state, updated_state, updated_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&change.analysis_id)
    .bind(change.initial_state.as_str())
    .bind(change.updated_state.as_str())
    .bind(change.updated_at.to_rfc3339())
    .execute(conn)
    .await?;

    Ok(())
}

/// Full history for an analysis, oldest first
pub async fn for_analysis(
    pool: &SqlitePool,
    analysis_id: &str,
) -> RegistryResult<Vec<StateChange>> {
    let rows = sqlx::query(
        r#"
        SELECT analysis_id, initial_state, updated_state, updated_at
        FROM analysis_state_history
        WHERE analysis_id = ?
        ORDER BY updated_at ASC, id ASC
        "#,
    )
    .bind(analysis_id)
    .fetch_all(pool)
    .await?;

    let mut history = Vec::with_capacity(rows.len());
    for row in rows {
        let initial: String = row.get("initial_state");
        let updated: String = row.get("updated_state");
        let at: String = row.get("updated_at");
        history.push(StateChange {
            analysis_id: row.get("analysis_id"),
            initial_state: AnalysisState::parse(&initial)?,
            updated_state: AnalysisState::parse(&updated)?,
            updated_at: parse_ts(&at)?,
        });
    }

    Ok(history)
}
