//! File metadata persistence
//!
//! `object_id` is assigned once at creation and never reassigned;
//! resubmission of the same logical file updates its metadata in place.

use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::error::{RegistryError, RegistryResult};
use crate::model::AnalysisFile;

pub async fn upsert(conn: &mut SqliteConnection, file: &AnalysisFile) -> RegistryResult<()> {
    sqlx::query(
        r#"
        INSERT INTO analysis_files
            (object_id, analysis_id, study_id, file_name, file_type, file_size,
             file_md5sum, file_access, data_type, info)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(object_id) DO UPDATE SET
            file_type = excluded.file_type,
            file_size = excluded.file_size,
            file_md5sum = excluded.file_md5sum,
            file_access = excluded.file_access,
            data_type = excluded.data_type,
            info = excluded.info
        "#,
    )
    .bind(&file.object_id)
    .bind(&file.analysis_id)
    .bind(&file.study_id)
    .bind(&file.file_name)
    .bind(&file.file_type)
    .bind(file.file_size)
    .bind(&file.file_md5sum)
    .bind(&file.file_access)
    .bind(&file.data_type)
    .bind(file.info.to_string())
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn for_analysis(
    pool: &SqlitePool,
    analysis_id: &str,
) -> RegistryResult<Vec<AnalysisFile>> {
    let rows = sqlx::query(
        r#"
        SELECT object_id, analysis_id, study_id, file_name, file_type, file_size,
               file_md5sum, file_access, data_type, info
        FROM analysis_files
        WHERE analysis_id = ?
        ORDER BY file_name
        "#,
    )
    .bind(analysis_id)
    .fetch_all(pool)
    .await?;

    let mut files = Vec::with_capacity(rows.len());
    for row in rows {
        let info_text: String = row.get("info");
        files.push(AnalysisFile {
            object_id: row.get("object_id"),
            analysis_id: row.get("analysis_id"),
            study_id: row.get("study_id"),
            file_name: row.get("file_name"),
            file_type: row.get("file_type"),
            file_size: row.get("file_size"),
            file_md5sum: row.get("file_md5sum"),
            file_access: row.get("file_access"),
            data_type: row.get("data_type"),
            info: serde_json::from_str(&info_text)
                .map_err(|e| RegistryError::Internal(format!("decode file info: {}", e)))?,
        });
    }

    Ok(files)
}
