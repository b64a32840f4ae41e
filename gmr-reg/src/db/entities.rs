//! Donor / specimen / sample persistence
//!
//! Upserts key on the deterministic entity ID, which is derived from the
//! business key. Resubmission of the same logical entity updates it in
//! place rather than duplicating it.

use gmr_common::db::models::{Donor, Sample, Specimen};
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::error::RegistryResult;
use crate::model::CompositeSample;

pub async fn upsert_donor(conn: &mut SqliteConnection, donor: &Donor) -> RegistryResult<()> {
    sqlx::query(
        r#"
        INSERT INTO donors (donor_id, study_id, submitter_donor_id, gender, info)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(donor_id) DO UPDATE SET
            gender = excluded.gender,
            info = excluded.info,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(&donor.donor_id)
    .bind(&donor.study_id)
    .bind(&donor.submitter_donor_id)
    .bind(&donor.gender)
    .bind(donor.info.to_string())
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn upsert_specimen(
    conn: &mut SqliteConnection,
    specimen: &Specimen,
) -> RegistryResult<()> {
    sqlx::query(
        r#"
        INSERT INTO specimens
            (specimen_id, donor_id, submitter_specimen_id, specimen_type, tissue_source, info)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(specimen_id) DO UPDATE SET
            specimen_type = excluded.specimen_type,
            tissue_source = excluded.tissue_source,
            info = excluded.info,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(&specimen.specimen_id)
    .bind(&specimen.donor_id)
    .bind(&specimen.submitter_specimen_id)
    .bind(&specimen.specimen_type)
    .bind(&specimen.tissue_source)
    .bind(specimen.info.to_string())
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn upsert_sample(conn: &mut SqliteConnection, sample: &Sample) -> RegistryResult<()> {
    sqlx::query(
        r#"
        INSERT INTO samples
            (sample_id, specimen_id, submitter_sample_id, sample_type,
             matched_normal_submitter_sample_id, info)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(sample_id) DO UPDATE SET
            sample_type = excluded.sample_type,
            matched_normal_submitter_sample_id = excluded.matched_normal_submitter_sample_id,
            info = excluded.info,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(&sample.sample_id)
    .bind(&sample.specimen_id)
    .bind(&sample.submitter_sample_id)
    .bind(&sample.sample_type)
    .bind(&sample.matched_normal_submitter_sample_id)
    .bind(sample.info.to_string())
    .execute(conn)
    .await?;

    Ok(())
}

/// Attach a sample to an analysis (idempotent)
pub async fn link_analysis_sample(
    conn: &mut SqliteConnection,
    analysis_id: &str,
    sample_id: &str,
) -> RegistryResult<()> {
    sqlx::query("INSERT OR IGNORE INTO analysis_samples (analysis_id, sample_id) VALUES (?, ?)")
        .bind(analysis_id)
        .bind(sample_id)
        .execute(conn)
        .await?;

    Ok(())
}

/// Load the sample → specimen → donor tree for one analysis
pub async fn composite_for_analysis(
    pool: &SqlitePool,
    analysis_id: &str,
) -> RegistryResult<Vec<CompositeSample>> {
    let rows = sqlx::query(
        r#"
        SELECT
            sa.sample_id, sa.specimen_id, sa.submitter_sample_id, sa.sample_type,
            sa.matched_normal_submitter_sample_id, sa.info AS sample_info,
            sp.donor_id, sp.submitter_specimen_id, sp.specimen_type, sp.tissue_source,
            sp.info AS specimen_info,
            d.study_id, d.submitter_donor_id, d.gender, d.info AS donor_info
        FROM analysis_samples links
        JOIN samples sa ON sa.sample_id = links.sample_id
        JOIN specimens sp ON sp.specimen_id = sa.specimen_id
        JOIN donors d ON d.donor_id = sp.donor_id
        WHERE links.analysis_id = ?
        ORDER BY sa.submitter_sample_id
        "#,
    )
    .bind(analysis_id)
    .fetch_all(pool)
    .await?;

    let mut composites = Vec::new();
    for row in rows {
        let sample_info: String = row.get("sample_info");
        let specimen_info: String = row.get("specimen_info");
        let donor_info: String = row.get("donor_info");

        composites.push(CompositeSample {
            sample: Sample {
                sample_id: row.get("sample_id"),
                specimen_id: row.get("specimen_id"),
                submitter_sample_id: row.get("submitter_sample_id"),
                sample_type: row.get("sample_type"),
                matched_normal_submitter_sample_id: row
                    .get("matched_normal_submitter_sample_id"),
                info: serde_json::from_str(&sample_info).unwrap_or_default(),
            },
            specimen: Specimen {
                specimen_id: row.get("specimen_id"),
                donor_id: row.get("donor_id"),
                submitter_specimen_id: row.get("submitter_specimen_id"),
                specimen_type: row.get("specimen_type"),
                tissue_source: row.get("tissue_source"),
                info: serde_json::from_str(&specimen_info).unwrap_or_default(),
            },
            donor: Donor {
                donor_id: row.get("donor_id"),
                study_id: row.get("study_id"),
                submitter_donor_id: row.get("submitter_donor_id"),
                gender: row.get("gender"),
                info: serde_json::from_str(&donor_info).unwrap_or_default(),
            },
        });
    }

    Ok(composites)
}
