//! Analysis-type persistence
//!
//! Versions are immutable once written. A new registration under an
//! existing name allocates `max(version) + 1` inside the caller's
//! transaction, so concurrent registrations cannot allocate the same
//! version number (the composite primary key backs this up).

use chrono::Utc;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::db::parse_ts;
use crate::error::{RegistryError, RegistryResult};
use crate::model::AnalysisType;

/// Insert the next version for `name`, returning the stored record
pub async fn insert_next_version(
    conn: &mut SqliteConnection,
    name: &str,
    schema: &serde_json::Value,
    file_types: Option<&[String]>,
) -> RegistryResult<AnalysisType> {
    let next_version: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(version), 0) + 1 FROM analysis_types WHERE name = ?",
    )
    .bind(name)
    .fetch_one(&mut *conn)
    .await?;

    let created_at = Utc::now();
    let file_types_json = file_types
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| RegistryError::Internal(format!("encode file types: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO analysis_types (name, version, schema, file_types, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(name)
    .bind(next_version)
    .bind(schema.to_string())
    .bind(&file_types_json)
    .bind(created_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(AnalysisType {
        name: name.to_string(),
        version: next_version as u32,
        schema: Some(schema.clone()),
        file_types: file_types.map(|f| f.to_vec()),
        created_at,
    })
}

pub async fn get(
    pool: &SqlitePool,
    name: &str,
    version: u32,
) -> RegistryResult<Option<AnalysisType>> {
    let row = sqlx::query(
        r#"
        SELECT name, version, schema, file_types, created_at
        FROM analysis_types
        WHERE name = ? AND version = ?
        "#,
    )
    .bind(name)
    .bind(version as i64)
    .fetch_optional(pool)
    .await?;

    row.map(|row| from_row(&row)).transpose()
}

pub async fn latest_version(pool: &SqlitePool, name: &str) -> RegistryResult<Option<u32>> {
    let version: Option<i64> =
        sqlx::query_scalar("SELECT MAX(version) FROM analysis_types WHERE name = ?")
            .bind(name)
            .fetch_one(pool)
            .await?;
    Ok(version.map(|v| v as u32))
}

/// Union of the allow-lists declared by versions earlier than `version`.
/// Versions that declared nothing contribute nothing.
pub async fn earlier_file_type_union(
    pool: &SqlitePool,
    name: &str,
    version: u32,
) -> RegistryResult<Vec<String>> {
    let rows = sqlx::query(
        r#"
        SELECT file_types FROM analysis_types
        WHERE name = ? AND version < ? AND file_types IS NOT NULL
        ORDER BY version
        "#,
    )
    .bind(name)
    .bind(version as i64)
    .fetch_all(pool)
    .await?;

    let mut union: Vec<String> = Vec::new();
    for row in rows {
        let encoded: String = row.get("file_types");
        let list: Vec<String> = serde_json::from_str(&encoded)
            .map_err(|e| RegistryError::Internal(format!("decode file types: {}", e)))?;
        for file_type in list {
            if !union.contains(&file_type) {
                union.push(file_type);
            }
        }
    }

    Ok(union)
}

/// Paged listing with optional name/version filters. `hide_schema`
/// suppresses the schema body for bandwidth.
pub async fn list(
    pool: &SqlitePool,
    names: Option<&[String]>,
    versions: Option<&[u32]>,
    hide_schema: bool,
    limit: i64,
    offset: i64,
) -> RegistryResult<(i64, Vec<AnalysisType>)> {
    // Filters are bound positionally; the two queries must stay in step
    let mut where_clauses: Vec<String> = Vec::new();
    if let Some(names) = names {
        let marks = vec!["?"; names.len()].join(", ");
        where_clauses.push(format!("name IN ({})", marks));
    }
    if let Some(versions) = versions {
        let marks = vec!["?"; versions.len()].join(", ");
        where_clauses.push(format!("version IN ({})", marks));
    }
    let where_sql = if where_clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", where_clauses.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM analysis_types{}", where_sql);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(names) = names {
        for name in names {
            count_query = count_query.bind(name);
        }
    }
    if let Some(versions) = versions {
        for version in versions {
            count_query = count_query.bind(*version as i64);
        }
    }
    let total = count_query.fetch_one(pool).await?;

    let rows_sql = format!(
        "SELECT name, version, schema, file_types, created_at FROM analysis_types{} \
         ORDER BY name, version LIMIT ? OFFSET ?",
        where_sql
    );
    let mut rows_query = sqlx::query(&rows_sql);
    if let Some(names) = names {
        for name in names {
            rows_query = rows_query.bind(name);
        }
    }
    if let Some(versions) = versions {
        for version in versions {
            rows_query = rows_query.bind(*version as i64);
        }
    }
    let rows = rows_query.bind(limit).bind(offset).fetch_all(pool).await?;

    let mut result = Vec::with_capacity(rows.len());
    for row in rows {
        let mut analysis_type = from_row(&row)?;
        if hide_schema {
            analysis_type.schema = None;
        }
        result.push(analysis_type);
    }

    Ok((total, result))
}

fn from_row(row: &sqlx::sqlite::SqliteRow) -> RegistryResult<AnalysisType> {
    let schema_text: String = row.get("schema");
    let schema: serde_json::Value = serde_json::from_str(&schema_text)
        .map_err(|e| RegistryError::Internal(format!("decode stored schema: {}", e)))?;

    let file_types: Option<Vec<String>> = row
        .get::<Option<String>, _>("file_types")
        .map(|encoded| {
            serde_json::from_str(&encoded)
                .map_err(|e| RegistryError::Internal(format!("decode file types: {}", e)))
        })
        .transpose()?;

    let created_at_text: String = row.get("created_at");
    let version: i64 = row.get("version");

    Ok(AnalysisType {
        name: row.get("name"),
        version: version as u32,
        schema: Some(schema),
        file_types,
        created_at: parse_ts(&created_at_text)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gmr_common::db::init::init_memory_database;
    use serde_json::json;

    #[tokio::test]
    async fn versions_increase_per_name() {
        let pool = init_memory_database().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let schema = json!({"type": "object", "properties": {"x": {"type": "string"}}});
        let v1 = insert_next_version(&mut conn, "sequencingRead", &schema, None)
            .await
            .unwrap();
        let v2 = insert_next_version(&mut conn, "sequencingRead", &schema, None)
            .await
            .unwrap();
        let other = insert_next_version(&mut conn, "variantCall", &schema, None)
            .await
            .unwrap();

        drop(conn);

        assert_eq!(v1.version, 1);
        assert_eq!(v2.version, 2);
        assert_eq!(other.version, 1);
        assert_eq!(
            latest_version(&pool, "sequencingRead").await.unwrap(),
            Some(2)
        );
    }

    #[tokio::test]
    async fn earlier_union_skips_undeclared_and_dedups() {
        let pool = init_memory_database().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let schema = json!({"type": "object", "properties": {"x": {}}});
        let bam_vcf = vec!["BAM".to_string(), "VCF".to_string()];
        let bam_cram = vec!["BAM".to_string(), "CRAM".to_string()];

        insert_next_version(&mut conn, "t", &schema, Some(&bam_vcf))
            .await
            .unwrap();
        insert_next_version(&mut conn, "t", &schema, None).await.unwrap();
        insert_next_version(&mut conn, "t", &schema, Some(&bam_cram))
            .await
            .unwrap();
        drop(conn);

        let union = earlier_file_type_union(&pool, "t", 4).await.unwrap();
        assert_eq!(union, vec!["BAM", "VCF", "CRAM"]);

        // Only versions strictly below the requested one contribute
        let union = earlier_file_type_union(&pool, "t", 3).await.unwrap();
        assert_eq!(union, vec!["BAM", "VCF"]);
    }

    #[tokio::test]
    async fn list_filters_and_hides_schema() {
        let pool = init_memory_database().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let schema = json!({"type": "object", "properties": {"x": {}}});
        insert_next_version(&mut conn, "a", &schema, None).await.unwrap();
        insert_next_version(&mut conn, "a", &schema, None).await.unwrap();
        insert_next_version(&mut conn, "b", &schema, None).await.unwrap();
        drop(conn);

        let (total, all) = list(&pool, None, None, false, 100, 0).await.unwrap();
        assert_eq!(total, 3);
        assert!(all.iter().all(|t| t.schema.is_some()));

        let names = vec!["a".to_string()];
        let versions = vec![2u32];
        let (total, filtered) = list(&pool, Some(&names), Some(&versions), true, 100, 0)
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(filtered[0].version, 2);
        assert!(filtered[0].schema.is_none());
    }
}
