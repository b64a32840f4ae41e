//! Analysis lifecycle management
//!
//! Publish verifies every declared file against storage before the state
//! flips; a failed reconciliation leaves the analysis provably unchanged.
//! Each successful transition appends exactly one history record inside
//! the same transaction that moves the state.

use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

use crate::db::{analyses, entities, files, history};
use crate::error::{RegistryError, RegistryResult};
use crate::model::{Analysis, AnalysisDetail, AnalysisState, StateChange};
use crate::reconcile;
use crate::storage::StorageGateway;

/// Owns the analysis state machine
#[derive(Clone)]
pub struct LifecycleManager {
    db: SqlitePool,
    storage: Arc<dyn StorageGateway>,
}

impl LifecycleManager {
    pub fn new(db: SqlitePool, storage: Arc<dyn StorageGateway>) -> Self {
        Self { db, storage }
    }

    /// Publish: reconcile every file against storage, then transition.
    /// All-or-nothing across the analysis's whole file set.
    pub async fn publish(
        &self,
        study_id: &str,
        analysis_id: &str,
        ignore_undefined_md5: bool,
    ) -> RegistryResult<AnalysisState> {
        let analysis = self.load_owned(study_id, analysis_id).await?;
        self.check_transition(&analysis, AnalysisState::Published)?;

        let files = files::for_analysis(&self.db, analysis_id).await?;
        if files.is_empty() {
            return Err(RegistryError::AnalysisMissingFiles(analysis_id.to_string()));
        }

        reconcile::reconcile(self.storage.as_ref(), &files, ignore_undefined_md5).await?;

        self.transition(&analysis, AnalysisState::Published).await?;

        info!(
            study_id = %study_id,
            analysis_id = %analysis_id,
            files = files.len(),
            "Published analysis"
        );

        Ok(AnalysisState::Published)
    }

    /// Unpublish: allowed from PUBLISHED or UNPUBLISHED. Suppression can
    /// never be undone this way.
    pub async fn unpublish(
        &self,
        study_id: &str,
        analysis_id: &str,
    ) -> RegistryResult<AnalysisState> {
        let analysis = self.load_owned(study_id, analysis_id).await?;
        self.check_transition(&analysis, AnalysisState::Unpublished)?;
        self.transition(&analysis, AnalysisState::Unpublished).await?;
        Ok(AnalysisState::Unpublished)
    }

    /// Suppress: terminal withdrawal from any live state
    pub async fn suppress(
        &self,
        study_id: &str,
        analysis_id: &str,
    ) -> RegistryResult<AnalysisState> {
        let analysis = self.load_owned(study_id, analysis_id).await?;
        self.check_transition(&analysis, AnalysisState::Suppressed)?;
        self.transition(&analysis, AnalysisState::Suppressed).await?;
        Ok(AnalysisState::Suppressed)
    }

    /// Current state only
    pub async fn read_state(
        &self,
        study_id: &str,
        analysis_id: &str,
    ) -> RegistryResult<AnalysisState> {
        Ok(self.load_owned(study_id, analysis_id).await?.state)
    }

    /// Analysis with its files, composite sample tree, and chronological
    /// state history
    pub async fn deep_read(
        &self,
        study_id: &str,
        analysis_id: &str,
    ) -> RegistryResult<AnalysisDetail> {
        let analysis = self.load_owned(study_id, analysis_id).await?;

        let files = files::for_analysis(&self.db, analysis_id).await?;
        if files.is_empty() {
            return Err(RegistryError::AnalysisMissingFiles(analysis_id.to_string()));
        }

        let samples = entities::composite_for_analysis(&self.db, analysis_id).await?;
        let state_history = history::for_analysis(&self.db, analysis_id).await?;

        Ok(AnalysisDetail {
            analysis,
            files,
            samples,
            state_history,
        })
    }

    /// Paged listing of a study's analyses
    pub async fn list_for_study(
        &self,
        study_id: &str,
        limit: i64,
        offset: i64,
    ) -> RegistryResult<(i64, Vec<Analysis>)> {
        analyses::list_for_study(&self.db, study_id, limit, offset).await
    }

    /// Load and verify study ownership. An analysis that exists under a
    /// different study is a cross-tenant miss, not "not found".
    async fn load_owned(&self, study_id: &str, analysis_id: &str) -> RegistryResult<Analysis> {
        let analysis = analyses::get(&self.db, analysis_id)
            .await?
            .ok_or_else(|| RegistryError::AnalysisNotFound(analysis_id.to_string()))?;

        if analysis.study_id != study_id {
            return Err(RegistryError::EntityNotRelatedToStudy {
                entity_id: analysis_id.to_string(),
                study_id: study_id.to_string(),
            });
        }

        Ok(analysis)
    }

    fn check_transition(&self, analysis: &Analysis, target: AnalysisState) -> RegistryResult<()> {
        if !analysis.state.can_transition_to(target) {
            return Err(RegistryError::IllegalStateTransition(format!(
                "analysis {} cannot move {} -> {}",
                analysis.analysis_id,
                analysis.state.as_str(),
                target.as_str()
            )));
        }
        Ok(())
    }

    /// State update and history append commit together or not at all
    async fn transition(&self, analysis: &Analysis, target: AnalysisState) -> RegistryResult<()> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        analyses::update_state(&mut tx, &analysis.analysis_id, target, now).await?;
        history::append(
            &mut tx,
            &StateChange {
                analysis_id: analysis.analysis_id.clone(),
                initial_state: analysis.state,
                updated_state: target,
                updated_at: now,
            },
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ids, studies};
    use crate::model::{AnalysisFile, AnalysisTypeId};
    use crate::storage::{InMemoryStorage, StorageObject};
    use gmr_common::db::init::init_memory_database;
    use gmr_common::db::models::Study;

    /// Seed one study, one unpublished analysis with two files, and the
    /// matching storage objects.
    async fn seed() -> (LifecycleManager, Arc<InMemoryStorage>, SqlitePool) {
        let pool = init_memory_database().await.unwrap();
        let storage = Arc::new(InMemoryStorage::new());

        studies::save(
            &pool,
            &Study {
                study_id: "STUDY1".into(),
                name: "Study One".into(),
                organization: None,
                description: None,
            },
        )
        .await
        .unwrap();

        let now = Utc::now();
        let mut conn = pool.acquire().await.unwrap();
        ids::try_commit(&mut conn, "AN1").await.unwrap();
        analyses::save(
            &mut conn,
            &Analysis {
                analysis_id: "AN1".into(),
                study_id: "STUDY1".into(),
                state: AnalysisState::Unpublished,
                analysis_type: AnalysisTypeId {
                    name: "sequencingRead".into(),
                    version: 1,
                },
                experiment: serde_json::json!({}),
                created_at: now,
                updated_at: now,
                published_at: None,
                first_published_at: None,
            },
        )
        .await
        .unwrap();

        for (object_id, size, md5) in [("o1", 10, "aa"), ("o2", 20, "bb")] {
            files::upsert(
                &mut conn,
                &AnalysisFile {
                    object_id: object_id.into(),
                    analysis_id: "AN1".into(),
                    study_id: "STUDY1".into(),
                    file_name: format!("{}.bam", object_id),
                    file_type: "BAM".into(),
                    file_size: size,
                    file_md5sum: Some(md5.into()),
                    file_access: None,
                    data_type: None,
                    info: serde_json::json!({}),
                },
            )
            .await
            .unwrap();
            storage.put(StorageObject {
                object_id: object_id.into(),
                file_size: size,
                file_md5sum: Some(md5.into()),
            });
        }
        drop(conn);

        let manager = LifecycleManager::new(pool.clone(), storage.clone());
        (manager, storage, pool)
    }

    #[tokio::test]
    async fn publish_sets_timestamps_and_appends_history() {
        let (manager, _storage, pool) = seed().await;

        manager.publish("STUDY1", "AN1", false).await.unwrap();

        let analysis = analyses::get(&pool, "AN1").await.unwrap().unwrap();
        assert_eq!(analysis.state, AnalysisState::Published);
        assert!(analysis.published_at.is_some());
        assert!(analysis.first_published_at.is_some());

        let log = history::for_analysis(&pool, "AN1").await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].initial_state, AnalysisState::Unpublished);
        assert_eq!(log[0].updated_state, AnalysisState::Published);
    }

    #[tokio::test]
    async fn first_published_at_is_write_once() {
        let (manager, _storage, pool) = seed().await;

        manager.publish("STUDY1", "AN1", false).await.unwrap();
        let first = analyses::get(&pool, "AN1").await.unwrap().unwrap();

        manager.unpublish("STUDY1", "AN1").await.unwrap();
        manager.publish("STUDY1", "AN1", false).await.unwrap();
        let second = analyses::get(&pool, "AN1").await.unwrap().unwrap();

        assert_eq!(second.first_published_at, first.first_published_at);
        // published_at refreshes on every transition into PUBLISHED
        assert!(second.published_at >= first.published_at);

        // Three transitions, three chained records
        let log = history::for_analysis(&pool, "AN1").await.unwrap();
        assert_eq!(log.len(), 3);
        for pair in log.windows(2) {
            assert_eq!(pair[0].updated_state, pair[1].initial_state);
        }
    }

    #[tokio::test]
    async fn failed_publish_leaves_state_unchanged() {
        let (manager, storage, pool) = seed().await;

        storage.remove("o2");
        let err = manager.publish("STUDY1", "AN1", false).await.unwrap_err();
        assert!(matches!(err, RegistryError::MissingStorageObjects(_)));

        // Re-read: still unpublished, no history written
        let analysis = analyses::get(&pool, "AN1").await.unwrap().unwrap();
        assert_eq!(analysis.state, AnalysisState::Unpublished);
        assert!(analysis.published_at.is_none());
        assert!(history::for_analysis(&pool, "AN1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn suppress_is_terminal() {
        let (manager, _storage, _pool) = seed().await;

        manager.suppress("STUDY1", "AN1").await.unwrap();

        let err = manager.unpublish("STUDY1", "AN1").await.unwrap_err();
        assert!(matches!(err, RegistryError::IllegalStateTransition(_)));

        let err = manager.publish("STUDY1", "AN1", false).await.unwrap_err();
        assert!(matches!(err, RegistryError::IllegalStateTransition(_)));

        let err = manager.suppress("STUDY1", "AN1").await.unwrap_err();
        assert!(matches!(err, RegistryError::IllegalStateTransition(_)));
    }

    #[tokio::test]
    async fn unpublish_before_publish_is_a_recorded_transition() {
        let (manager, _storage, pool) = seed().await;

        let state = manager.unpublish("STUDY1", "AN1").await.unwrap();
        assert_eq!(state, AnalysisState::Unpublished);

        let log = history::for_analysis(&pool, "AN1").await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].initial_state, AnalysisState::Unpublished);
        assert_eq!(log[0].updated_state, AnalysisState::Unpublished);
    }

    #[tokio::test]
    async fn wrong_study_is_a_cross_tenant_miss() {
        let (manager, _storage, pool) = seed().await;

        studies::save(
            &pool,
            &Study {
                study_id: "STUDY2".into(),
                name: "Study Two".into(),
                organization: None,
                description: None,
            },
        )
        .await
        .unwrap();

        let err = manager.read_state("STUDY2", "AN1").await.unwrap_err();
        assert!(matches!(err, RegistryError::EntityNotRelatedToStudy { .. }));

        let err = manager.read_state("STUDY1", "AN404").await.unwrap_err();
        assert!(matches!(err, RegistryError::AnalysisNotFound(_)));
    }

    #[tokio::test]
    async fn publish_requires_files() {
        let (manager, _storage, pool) = seed().await;

        sqlx::query("DELETE FROM analysis_files WHERE analysis_id = 'AN1'")
            .execute(&pool)
            .await
            .unwrap();

        let err = manager.publish("STUDY1", "AN1", false).await.unwrap_err();
        assert!(matches!(err, RegistryError::AnalysisMissingFiles(_)));
    }

    #[tokio::test]
    async fn ignore_undefined_md5_controls_publish() {
        let (manager, storage, pool) = seed().await;

        // Blank out the stored checksum for o1
        storage.put(StorageObject {
            object_id: "o1".into(),
            file_size: 10,
            file_md5sum: None,
        });

        let err = manager.publish("STUDY1", "AN1", false).await.unwrap_err();
        assert!(matches!(
            err,
            RegistryError::MismatchingStorageObjectChecksums(_)
        ));
        let analysis = analyses::get(&pool, "AN1").await.unwrap().unwrap();
        assert_eq!(analysis.state, AnalysisState::Unpublished);

        manager.publish("STUDY1", "AN1", true).await.unwrap();
    }
}
