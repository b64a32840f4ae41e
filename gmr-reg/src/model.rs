//! Core registry models
//!
//! Analysis lifecycle: UNPUBLISHED ⇄ PUBLISHED, either → SUPPRESSED,
//! SUPPRESSED is terminal. Every transition appends exactly one
//! `StateChange` record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};

/// Analysis lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AnalysisState {
    /// Initial state; files not yet verified against storage
    Unpublished,
    /// Files verified present and correct in storage
    Published,
    /// Withdrawn; terminal
    Suppressed,
}

impl AnalysisState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisState::Unpublished => "UNPUBLISHED",
            AnalysisState::Published => "PUBLISHED",
            AnalysisState::Suppressed => "SUPPRESSED",
        }
    }

    pub fn parse(s: &str) -> RegistryResult<Self> {
        match s {
            "UNPUBLISHED" => Ok(AnalysisState::Unpublished),
            "PUBLISHED" => Ok(AnalysisState::Published),
            "SUPPRESSED" => Ok(AnalysisState::Suppressed),
            other => Err(RegistryError::Internal(format!(
                "unknown analysis state '{}'",
                other
            ))),
        }
    }

    /// Whether a transition from `self` into `target` is permitted.
    /// SUPPRESSED has no outgoing transitions.
    pub fn can_transition_to(&self, target: AnalysisState) -> bool {
        match (self, target) {
            (AnalysisState::Suppressed, _) => false,
            (_, AnalysisState::Suppressed) => true,
            (AnalysisState::Unpublished, AnalysisState::Published)
            | (AnalysisState::Published, AnalysisState::Published)
            | (AnalysisState::Published, AnalysisState::Unpublished)
            | (AnalysisState::Unpublished, AnalysisState::Unpublished) => true,
        }
    }
}

/// One analysis row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub analysis_id: String,
    pub study_id: String,
    pub state: AnalysisState,
    pub analysis_type: AnalysisTypeId,
    /// Experiment-type-specific extension data
    pub experiment: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Refreshed on every transition into PUBLISHED
    pub published_at: Option<DateTime<Utc>>,
    /// Set exactly once, on the first transition into PUBLISHED
    pub first_published_at: Option<DateTime<Utc>>,
}

/// Reference to a registered analysis type version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisTypeId {
    pub name: String,
    pub version: u32,
}

impl AnalysisTypeId {
    /// Canonical `name:version` form
    pub fn canonical(&self) -> String {
        format!("{}:{}", self.name, self.version)
    }
}

/// A registered, immutable analysis-type version
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisType {
    pub name: String,
    pub version: u32,
    /// JSON Schema for the experiment portion of a payload.
    /// Suppressed in listings when the caller asks for ids only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
    /// File types this version accepts. `None` = nothing declared,
    /// `Some(vec![])` = explicitly unrestricted.
    pub file_types: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
}

impl AnalysisType {
    pub fn id(&self) -> AnalysisTypeId {
        AnalysisTypeId {
            name: self.name.clone(),
            version: self.version,
        }
    }
}

/// One declared file owned by an analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisFile {
    pub object_id: String,
    pub analysis_id: String,
    pub study_id: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub file_md5sum: Option<String>,
    pub file_access: Option<String>,
    pub data_type: Option<String>,
    pub info: serde_json::Value,
}

/// Immutable state-transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChange {
    pub analysis_id: String,
    pub initial_state: AnalysisState,
    pub updated_state: AnalysisState,
    pub updated_at: DateTime<Utc>,
}

/// Sample with its specimen and donor, as stored
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeSample {
    pub sample: gmr_common::db::models::Sample,
    pub specimen: gmr_common::db::models::Specimen,
    pub donor: gmr_common::db::models::Donor,
}

/// Deep read of one analysis: row, files, composite tree, full history
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisDetail {
    #[serde(flatten)]
    pub analysis: Analysis,
    pub files: Vec<AnalysisFile>,
    pub samples: Vec<CompositeSample>,
    pub state_history: Vec<StateChange>,
}
