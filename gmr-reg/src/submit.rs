//! Submission orchestration
//!
//! One submission runs: study check → parse → validation → studyId
//! agreement → analysis-ID commit → entity graph upsert → file and
//! analysis persistence, with everything after validation inside a single
//! transaction so a partial failure leaves no durable state.

use chrono::Utc;
use gmr_common::db::models::{Donor, Sample, Specimen};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

use crate::db::{analyses, entities, files, studies};
use crate::error::{RegistryError, RegistryResult};
use crate::identifiers::IdService;
use crate::model::{Analysis, AnalysisFile, AnalysisState};
use crate::payload::{self, PayloadSample};
use crate::validator::PayloadValidator;

/// Result of a successful submission
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    pub analysis_id: String,
    pub status: AnalysisState,
}

/// Coordinates payload intake end to end
pub struct SubmissionOrchestrator {
    db: SqlitePool,
    validator: PayloadValidator,
    ids: IdService,
}

impl SubmissionOrchestrator {
    pub fn new(db: SqlitePool, validator: PayloadValidator, ids: IdService) -> Self {
        Self { db, validator, ids }
    }

    pub async fn submit(
        &self,
        study_id: &str,
        raw_payload: &str,
        ignore_collisions: bool,
    ) -> RegistryResult<SubmitReceipt> {
        if !studies::exists(&self.db, study_id).await? {
            return Err(RegistryError::StudyNotFound(study_id.to_string()));
        }

        let value = payload::parse_raw(raw_payload)?;
        let analysis_type = self.validator.validate(&value).await?;
        let payload = payload::from_value(&value)?;

        match payload.study_id.as_deref() {
            None => return Err(RegistryError::StudyIdMissing(study_id.to_string())),
            Some(declared) if declared != study_id => {
                return Err(RegistryError::StudyIdMismatch {
                    payload: declared.to_string(),
                    path: study_id.to_string(),
                });
            }
            Some(_) => {}
        }

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let analysis_id = self
            .ids
            .resolve_and_commit(&mut tx, payload.analysis_id.as_deref(), ignore_collisions)
            .await?;

        let analysis = Analysis {
            analysis_id: analysis_id.clone(),
            study_id: study_id.to_string(),
            state: AnalysisState::Unpublished,
            analysis_type: analysis_type.id(),
            experiment: payload.experiment.clone(),
            created_at: now,
            updated_at: now,
            published_at: None,
            first_published_at: None,
        };
        analyses::save(&mut tx, &analysis).await?;

        for sample in &payload.samples {
            let sample_id = self
                .persist_composite(&mut tx, study_id, sample)
                .await?;
            entities::link_analysis_sample(&mut tx, &analysis_id, &sample_id).await?;
        }

        for declared in &payload.files {
            let derived = self
                .ids
                .authority()
                .object_id(&analysis_id, &declared.file_name)
                .await?;
            let object_id =
                IdService::check_supplied("file", declared.object_id.as_deref(), &derived)?;

            let file = AnalysisFile {
                object_id,
                analysis_id: analysis_id.clone(),
                study_id: study_id.to_string(),
                file_name: declared.file_name.clone(),
                file_type: declared.file_type.clone(),
                file_size: declared.file_size,
                file_md5sum: declared.file_md5sum.clone(),
                file_access: declared.file_access.clone(),
                data_type: declared.data_type.clone(),
                info: normalize_info(&declared.info),
            };
            files::upsert(&mut tx, &file).await?;
        }

        tx.commit().await?;

        info!(
            study_id = %study_id,
            analysis_id = %analysis_id,
            analysis_type = %analysis.analysis_type.canonical(),
            samples = payload.samples.len(),
            files = payload.files.len(),
            "Accepted submission"
        );

        Ok(SubmitReceipt {
            analysis_id,
            status: AnalysisState::Unpublished,
        })
    }

    /// Resolve and upsert one donor → specimen → sample chain. Each step
    /// derives the ID from the business key, so resubmission reuses the
    /// prior rows instead of duplicating them.
    async fn persist_composite(
        &self,
        tx: &mut sqlx::SqliteConnection,
        study_id: &str,
        sample: &PayloadSample,
    ) -> RegistryResult<String> {
        let authority = self.ids.authority();

        let derived = authority
            .donor_id(&sample.donor.submitter_donor_id, study_id)
            .await?;
        let donor_id =
            IdService::check_supplied("donor", sample.donor.donor_id.as_deref(), &derived)?;
        entities::upsert_donor(
            tx,
            &Donor {
                donor_id: donor_id.clone(),
                study_id: study_id.to_string(),
                submitter_donor_id: sample.donor.submitter_donor_id.clone(),
                gender: sample.donor.gender.clone(),
                info: normalize_info(&sample.donor.info),
            },
        )
        .await?;

        let derived = authority
            .specimen_id(&sample.specimen.submitter_specimen_id, study_id)
            .await?;
        let specimen_id = IdService::check_supplied(
            "specimen",
            sample.specimen.specimen_id.as_deref(),
            &derived,
        )?;
        entities::upsert_specimen(
            tx,
            &Specimen {
                specimen_id: specimen_id.clone(),
                donor_id,
                submitter_specimen_id: sample.specimen.submitter_specimen_id.clone(),
                specimen_type: sample.specimen.specimen_type.clone(),
                tissue_source: sample.specimen.tissue_source.clone(),
                info: normalize_info(&sample.specimen.info),
            },
        )
        .await?;

        let derived = authority
            .sample_id(&sample.submitter_sample_id, study_id)
            .await?;
        let sample_id =
            IdService::check_supplied("sample", sample.sample_id.as_deref(), &derived)?;
        entities::upsert_sample(
            tx,
            &Sample {
                sample_id: sample_id.clone(),
                specimen_id,
                submitter_sample_id: sample.submitter_sample_id.clone(),
                sample_type: sample.sample_type.clone(),
                matched_normal_submitter_sample_id: sample
                    .matched_normal_submitter_sample_id
                    .clone(),
                info: normalize_info(&sample.info),
            },
        )
        .await?;

        Ok(sample_id)
    }
}

/// Absent info blocks are stored as empty objects
fn normalize_info(info: &serde_json::Value) -> serde_json::Value {
    if info.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        info.clone()
    }
}
