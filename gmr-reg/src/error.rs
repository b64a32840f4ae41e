//! Error types for gmr-reg
//!
//! `RegistryError` is the single error taxonomy for the registry engine.
//! Validation and referential errors are detected eagerly and surfaced
//! synchronously; transport failures against external services are retried
//! by the clients before they are reported here.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Registry error taxonomy
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Input violates a parameter grammar (e.g. a malformed `name:version` id)
    #[error("Malformed parameter: {0}")]
    MalformedParameter(String),

    /// Payload fails meta-schema, file-type, or analysis-type schema checks
    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    /// Submitted payload is not valid JSON
    #[error("Payload parsing failed: {0}")]
    PayloadParsing(String),

    #[error("Study not found: {0}")]
    StudyNotFound(String),

    #[error("Analysis not found: {0}")]
    AnalysisNotFound(String),

    #[error("Analysis type not found: {0}")]
    AnalysisTypeNotFound(String),

    #[error("Sample not found: {0}")]
    SampleNotFound(String),

    /// The referenced entity exists, but under a different study
    #[error("Entity {entity_id} is not related to study {study_id}")]
    EntityNotRelatedToStudy { entity_id: String, study_id: String },

    /// Payload carries no studyId to check against the request path
    #[error("Payload is missing a studyId (expected {0})")]
    StudyIdMissing(String),

    /// Payload studyId disagrees with the request path
    #[error("Payload studyId '{payload}' does not match path studyId '{path}'")]
    StudyIdMismatch { payload: String, path: String },

    /// Caller-supplied ID disagrees with the authority-derived one
    #[error("Corrupted {entity} id: submitted '{submitted}' but derived '{derived}'")]
    IdCorrupted {
        entity: String,
        submitted: String,
        derived: String,
    },

    /// Analysis ID already committed and collisions are disallowed
    #[error("Analysis id collision: '{0}' was already submitted")]
    IdCollision(String),

    #[error("Illegal state transition: {0}")]
    IllegalStateTransition(String),

    /// An analysis that should own files has none
    #[error("Analysis {0} has no files")]
    AnalysisMissingFiles(String),

    /// Declared files absent from the storage tier
    #[error("Missing storage objects: [{}]", .0.join(", "))]
    MissingStorageObjects(Vec<String>),

    /// Declared file sizes disagree with the storage tier
    #[error("Mismatching storage object sizes: [{}]", .0.join(", "))]
    MismatchingStorageObjectSizes(Vec<String>),

    /// Declared checksums disagree with the storage tier
    #[error("Mismatching storage object checksums: [{}]", .0.join(", "))]
    MismatchingStorageObjectChecksums(Vec<String>),

    /// Storage gateway unreachable or returned an unexpected shape
    #[error("Storage service error: {0}")]
    StorageService(String),

    /// ID authority returned something other than a canonical UUID
    #[error("ID authority integration error: {0}")]
    IdAuthority(String),

    /// Database operation error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// gmr-common error
    #[error("Common error: {0}")]
    Common(#[from] gmr_common::Error),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RegistryError {
    /// Stable machine-readable code for the error envelope
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::MalformedParameter(_) => "MALFORMED_PARAMETER",
            RegistryError::SchemaViolation(_) => "SCHEMA_VIOLATION",
            RegistryError::PayloadParsing(_) => "PAYLOAD_PARSING",
            RegistryError::StudyNotFound(_) => "STUDY_NOT_FOUND",
            RegistryError::AnalysisNotFound(_) => "ANALYSIS_NOT_FOUND",
            RegistryError::AnalysisTypeNotFound(_) => "ANALYSIS_TYPE_NOT_FOUND",
            RegistryError::SampleNotFound(_) => "SAMPLE_NOT_FOUND",
            RegistryError::EntityNotRelatedToStudy { .. } => "ENTITY_NOT_RELATED_TO_STUDY",
            RegistryError::StudyIdMissing(_) => "STUDY_ID_MISSING",
            RegistryError::StudyIdMismatch { .. } => "STUDY_ID_MISMATCH",
            RegistryError::IdCorrupted { .. } => "ID_CORRUPTED",
            RegistryError::IdCollision(_) => "ID_COLLISION",
            RegistryError::IllegalStateTransition(_) => "ILLEGAL_STATE_TRANSITION",
            RegistryError::AnalysisMissingFiles(_) => "ANALYSIS_MISSING_FILES",
            RegistryError::MissingStorageObjects(_) => "MISSING_STORAGE_OBJECTS",
            RegistryError::MismatchingStorageObjectSizes(_) => "MISMATCHING_STORAGE_OBJECT_SIZES",
            RegistryError::MismatchingStorageObjectChecksums(_) => {
                "MISMATCHING_STORAGE_OBJECT_CHECKSUMS"
            }
            RegistryError::StorageService(_) => "STORAGE_SERVICE_ERROR",
            RegistryError::IdAuthority(_) => "ID_AUTHORITY_ERROR",
            RegistryError::Database(_) => "DATABASE_ERROR",
            RegistryError::Common(_) => "COMMON_ERROR",
            RegistryError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            RegistryError::MalformedParameter(_)
            | RegistryError::SchemaViolation(_)
            | RegistryError::PayloadParsing(_)
            | RegistryError::StudyIdMissing(_)
            | RegistryError::StudyIdMismatch { .. }
            | RegistryError::IdCorrupted { .. } => StatusCode::BAD_REQUEST,

            RegistryError::StudyNotFound(_)
            | RegistryError::AnalysisNotFound(_)
            | RegistryError::AnalysisTypeNotFound(_)
            | RegistryError::SampleNotFound(_)
            | RegistryError::EntityNotRelatedToStudy { .. } => StatusCode::NOT_FOUND,

            RegistryError::IdCollision(_)
            | RegistryError::IllegalStateTransition(_)
            | RegistryError::AnalysisMissingFiles(_)
            | RegistryError::MissingStorageObjects(_)
            | RegistryError::MismatchingStorageObjectSizes(_)
            | RegistryError::MismatchingStorageObjectChecksums(_) => StatusCode::CONFLICT,

            RegistryError::StorageService(_) | RegistryError::IdAuthority(_) => {
                StatusCode::BAD_GATEWAY
            }

            RegistryError::Database(_)
            | RegistryError::Common(_)
            | RegistryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;
