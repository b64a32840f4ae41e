//! Database initialization
//!
//! Creates the registry schema on first run. Every `create_*_table`
//! statement is `IF NOT EXISTS`, so initialization is idempotent and safe
//! to repeat on every startup.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection pool and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    configure_pragmas(&pool).await?;
    create_all_tables(&pool).await?;

    Ok(pool)
}

/// Open an in-memory database with the full schema. Test helper.
///
/// Capped at one connection: every pooled connection to `sqlite::memory:`
/// would otherwise get its own empty database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    configure_pragmas(&pool).await?;
    create_all_tables(&pool).await?;
    Ok(pool)
}

async fn configure_pragmas(pool: &SqlitePool) -> Result<()> {
    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    // WAL allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;

    Ok(())
}

/// Create every registry table (idempotent)
pub async fn create_all_tables(pool: &SqlitePool) -> Result<()> {
    create_studies_table(pool).await?;
    create_donors_table(pool).await?;
    create_specimens_table(pool).await?;
    create_samples_table(pool).await?;
    create_analysis_types_table(pool).await?;
    create_analysis_ids_table(pool).await?;
    create_analyses_table(pool).await?;
    create_analysis_samples_table(pool).await?;
    create_analysis_files_table(pool).await?;
    create_analysis_state_history_table(pool).await?;
    Ok(())
}

pub async fn create_studies_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS studies (
            study_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            organization TEXT,
            description TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_donors_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS donors (
            donor_id TEXT PRIMARY KEY,
            study_id TEXT NOT NULL REFERENCES studies(study_id),
            submitter_donor_id TEXT NOT NULL,
            gender TEXT,
            info TEXT NOT NULL DEFAULT '{}',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (study_id, submitter_donor_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_specimens_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS specimens (
            specimen_id TEXT PRIMARY KEY,
            donor_id TEXT NOT NULL REFERENCES donors(donor_id),
            submitter_specimen_id TEXT NOT NULL,
            specimen_type TEXT,
            tissue_source TEXT,
            info TEXT NOT NULL DEFAULT '{}',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (donor_id, submitter_specimen_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_samples_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS samples (
            sample_id TEXT PRIMARY KEY,
            specimen_id TEXT NOT NULL REFERENCES specimens(specimen_id),
            submitter_sample_id TEXT NOT NULL,
            sample_type TEXT,
            matched_normal_submitter_sample_id TEXT,
            info TEXT NOT NULL DEFAULT '{}',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (specimen_id, submitter_sample_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_analysis_types_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_types (
            name TEXT NOT NULL,
            version INTEGER NOT NULL,
            schema TEXT NOT NULL,
            file_types TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (name, version)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Committed analysis identifiers. A row here means the ID is durably
/// reserved; the primary key makes the commit step atomic.
pub async fn create_analysis_ids_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_ids (
            analysis_id TEXT PRIMARY KEY,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_analyses_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analyses (
            analysis_id TEXT PRIMARY KEY,
            study_id TEXT NOT NULL REFERENCES studies(study_id),
            state TEXT NOT NULL DEFAULT 'UNPUBLISHED',
            analysis_type_name TEXT NOT NULL,
            analysis_type_version INTEGER NOT NULL,
            experiment TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            published_at TEXT,
            first_published_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_analysis_samples_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_samples (
            analysis_id TEXT NOT NULL REFERENCES analyses(analysis_id),
            sample_id TEXT NOT NULL REFERENCES samples(sample_id),
            PRIMARY KEY (analysis_id, sample_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_analysis_files_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_files (
            object_id TEXT PRIMARY KEY,
            analysis_id TEXT NOT NULL REFERENCES analyses(analysis_id),
            study_id TEXT NOT NULL,
            file_name TEXT NOT NULL,
            file_type TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            file_md5sum TEXT,
            file_access TEXT,
            data_type TEXT,
            info TEXT NOT NULL DEFAULT '{}',
            UNIQUE (analysis_id, file_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Append-only transition log. Rows are never updated or deleted.
pub async fn create_analysis_state_history_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_state_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            analysis_id TEXT NOT NULL REFERENCES analyses(analysis_id),
            initial_state TEXT NOT NULL,
            updated_state TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
