//! Identifier resolution
//!
//! Business-key identifiers (donor/specimen/sample/file) are derived
//! deterministically by an ID authority. The analysis identifier has its
//! own collision semantics: a candidate is merely *proposed* until
//! `resolve_and_commit` durably reserves it.

use async_trait::async_trait;
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use crate::db::ids;
use crate::error::{RegistryError, RegistryResult};

/// External authority for deterministic entity identifiers.
///
/// Every returned ID must be a canonical UUID string; anything else is a
/// fatal integration error, not a recoverable validation failure.
#[async_trait]
pub trait IdAuthority: Send + Sync {
    async fn donor_id(&self, submitter_id: &str, study_id: &str) -> RegistryResult<String>;
    async fn specimen_id(&self, submitter_id: &str, study_id: &str) -> RegistryResult<String>;
    async fn sample_id(&self, submitter_id: &str, study_id: &str) -> RegistryResult<String>;
    async fn object_id(&self, analysis_id: &str, file_name: &str) -> RegistryResult<String>;
}

/// Built-in authority deriving UUIDv5 ids from the business key.
/// Used when no authority URL is configured, and by tests.
pub struct LocalIdAuthority;

#[async_trait]
impl IdAuthority for LocalIdAuthority {
    async fn donor_id(&self, submitter_id: &str, study_id: &str) -> RegistryResult<String> {
        Ok(gmr_common::ids::derive(&["donor", study_id, submitter_id]).to_string())
    }

    async fn specimen_id(&self, submitter_id: &str, study_id: &str) -> RegistryResult<String> {
        Ok(gmr_common::ids::derive(&["specimen", study_id, submitter_id]).to_string())
    }

    async fn sample_id(&self, submitter_id: &str, study_id: &str) -> RegistryResult<String> {
        Ok(gmr_common::ids::derive(&["sample", study_id, submitter_id]).to_string())
    }

    async fn object_id(&self, analysis_id: &str, file_name: &str) -> RegistryResult<String> {
        Ok(gmr_common::ids::derive(&["file", analysis_id, file_name]).to_string())
    }
}

/// HTTP client for a remote ID authority
pub struct HttpIdAuthority {
    client: reqwest::Client,
    base_url: String,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl HttpIdAuthority {
    pub fn new(base_url: String, retry_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            retry_attempts,
            retry_delay,
        }
    }

    /// Fetch one ID, retrying transport failures with bounded attempts.
    /// Status-level responses are definitive and never retried.
    async fn fetch_id(&self, url: &str) -> RegistryResult<String> {
        let mut attempt = 0;
        let response = loop {
            match self.client.get(url).send().await {
                Ok(response) => break response,
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.retry_attempts {
                        return Err(RegistryError::IdAuthority(format!(
                            "request to {} failed after {} attempts: {}",
                            url, attempt, e
                        )));
                    }
                    debug!(url = %url, attempt, "ID authority request failed, retrying");
                    sleep(self.retry_delay).await;
                }
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            return Err(RegistryError::IdAuthority(format!(
                "{} returned {}",
                url, status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RegistryError::IdAuthority(format!("read body from {}: {}", url, e)))?;
        ensure_uuid(body.trim())
    }
}

#[async_trait]
impl IdAuthority for HttpIdAuthority {
    async fn donor_id(&self, submitter_id: &str, study_id: &str) -> RegistryResult<String> {
        let url = format!(
            "{}/donor/id?submitterId={}&studyId={}",
            self.base_url, submitter_id, study_id
        );
        self.fetch_id(&url).await
    }

    async fn specimen_id(&self, submitter_id: &str, study_id: &str) -> RegistryResult<String> {
        let url = format!(
            "{}/specimen/id?submitterId={}&studyId={}",
            self.base_url, submitter_id, study_id
        );
        self.fetch_id(&url).await
    }

    async fn sample_id(&self, submitter_id: &str, study_id: &str) -> RegistryResult<String> {
        let url = format!(
            "{}/sample/id?submitterId={}&studyId={}",
            self.base_url, submitter_id, study_id
        );
        self.fetch_id(&url).await
    }

    async fn object_id(&self, analysis_id: &str, file_name: &str) -> RegistryResult<String> {
        let url = format!(
            "{}/object/id?analysisId={}&fileName={}",
            self.base_url, analysis_id, file_name
        );
        self.fetch_id(&url).await
    }
}

/// Reject anything that is not a canonical UUID
fn ensure_uuid(candidate: &str) -> RegistryResult<String> {
    gmr_common::ids::parse(candidate)
        .map(|u| u.to_string())
        .map_err(|_| {
            RegistryError::IdAuthority(format!(
                "authority returned a non-UUID identifier: '{}'",
                candidate
            ))
        })
}

/// Resolves analysis identifiers against the committed-ID store
#[derive(Clone)]
pub struct IdService {
    db: SqlitePool,
    authority: Arc<dyn IdAuthority>,
}

impl IdService {
    pub fn new(db: SqlitePool, authority: Arc<dyn IdAuthority>) -> Self {
        Self { db, authority }
    }

    pub fn authority(&self) -> &dyn IdAuthority {
        self.authority.as_ref()
    }

    /// Resolve a candidate analysis ID without reserving it.
    ///
    /// Blank candidate → fresh random ID. A supplied candidate that is
    /// already committed collides unless `ignore_collisions`.
    pub async fn resolve_analysis_id(
        &self,
        candidate: Option<&str>,
        ignore_collisions: bool,
    ) -> RegistryResult<String> {
        match candidate.filter(|c| !c.trim().is_empty()) {
            None => Ok(gmr_common::ids::generate().to_string()),
            Some(submitted) => {
                if ids::is_committed(&self.db, submitted).await? && !ignore_collisions {
                    return Err(RegistryError::IdCollision(submitted.to_string()));
                }
                Ok(submitted.to_string())
            }
        }
    }

    /// Resolve and durably reserve inside the caller's transaction.
    ///
    /// The reservation is an atomic insert-if-absent, so of two concurrent
    /// submissions proposing the same explicit ID exactly one wins; the
    /// loser observes the collision. Re-committing an already-committed ID
    /// is a no-op only when `ignore_collisions` permits it.
    pub async fn resolve_and_commit(
        &self,
        conn: &mut SqliteConnection,
        candidate: Option<&str>,
        ignore_collisions: bool,
    ) -> RegistryResult<String> {
        let resolved = match candidate.filter(|c| !c.trim().is_empty()) {
            None => gmr_common::ids::generate().to_string(),
            Some(submitted) => submitted.to_string(),
        };

        let inserted = ids::try_commit(conn, &resolved).await?;
        if !inserted && !ignore_collisions {
            return Err(RegistryError::IdCollision(resolved));
        }

        Ok(resolved)
    }

    /// Reconcile a caller-supplied entity ID against the derived one.
    /// A non-blank submitted ID that disagrees is corruption.
    pub fn check_supplied(
        entity: &str,
        submitted: Option<&str>,
        derived: &str,
    ) -> RegistryResult<String> {
        match submitted.filter(|s| !s.trim().is_empty()) {
            Some(submitted) if submitted != derived => Err(RegistryError::IdCorrupted {
                entity: entity.to_string(),
                submitted: submitted.to_string(),
                derived: derived.to_string(),
            }),
            _ => Ok(derived.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gmr_common::db::init::init_memory_database;

    async fn service() -> IdService {
        let pool = init_memory_database().await.unwrap();
        IdService::new(pool, Arc::new(LocalIdAuthority))
    }

    #[tokio::test]
    async fn blank_candidates_mint_distinct_ids() {
        let service = service().await;

        let a = service.resolve_analysis_id(None, false).await.unwrap();
        let b = service.resolve_analysis_id(Some(""), false).await.unwrap();
        assert_ne!(a, b);

        // Committing twice with blank candidates also yields two distinct ids
        let mut conn = service.db.acquire().await.unwrap();
        let c = service
            .resolve_and_commit(&mut conn, None, false)
            .await
            .unwrap();
        let d = service
            .resolve_and_commit(&mut conn, None, false)
            .await
            .unwrap();
        drop(conn);

        assert_ne!(c, d);
        assert!(ids::is_committed(&service.db, &c).await.unwrap());
        assert!(ids::is_committed(&service.db, &d).await.unwrap());
    }

    #[tokio::test]
    async fn decision_table_for_supplied_candidates() {
        let service = service().await;

        // Supplied, not yet committed: used as-is and left uncommitted
        let id = service
            .resolve_analysis_id(Some("AN1"), false)
            .await
            .unwrap();
        assert_eq!(id, "AN1");
        assert!(!ids::is_committed(&service.db, "AN1").await.unwrap());

        // Commit it
        let mut conn = service.db.acquire().await.unwrap();
        let id = service
            .resolve_and_commit(&mut conn, Some("AN1"), false)
            .await
            .unwrap();
        assert_eq!(id, "AN1");
        drop(conn);

        // Now the same candidate collides...
        let err = service
            .resolve_analysis_id(Some("AN1"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::IdCollision(_)));

        // ...unless collisions are explicitly ignored
        let id = service
            .resolve_analysis_id(Some("AN1"), true)
            .await
            .unwrap();
        assert_eq!(id, "AN1");

        // Re-committing is a no-op only under ignore_collisions
        let mut conn = service.db.acquire().await.unwrap();
        let err = service
            .resolve_and_commit(&mut conn, Some("AN1"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::IdCollision(_)));
        let id = service
            .resolve_and_commit(&mut conn, Some("AN1"), true)
            .await
            .unwrap();
        assert_eq!(id, "AN1");
    }

    #[tokio::test]
    async fn supplied_entity_id_must_agree_with_derived() {
        let derived = LocalIdAuthority
            .donor_id("SUB-D-1", "STUDY1")
            .await
            .unwrap();

        // Blank or absent submitted ids adopt the derived one
        assert_eq!(
            IdService::check_supplied("donor", None, &derived).unwrap(),
            derived
        );
        assert_eq!(
            IdService::check_supplied("donor", Some("  "), &derived).unwrap(),
            derived
        );
        assert_eq!(
            IdService::check_supplied("donor", Some(&derived), &derived).unwrap(),
            derived
        );

        let err =
            IdService::check_supplied("donor", Some("deadbeef-0000-0000-0000-000000000000"), &derived)
                .unwrap_err();
        assert!(matches!(err, RegistryError::IdCorrupted { .. }));
    }

    #[test]
    fn non_uuid_authority_response_is_fatal() {
        assert!(ensure_uuid("not-a-uuid").is_err());
        assert!(ensure_uuid("123e4567-e89b-12d3-a456-426614174000").is_ok());
    }
}
