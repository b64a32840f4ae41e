//! Shared database models

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Study {
    pub study_id: String,
    pub name: String,
    pub organization: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Donor {
    pub donor_id: String,
    pub study_id: String,
    pub submitter_donor_id: String,
    pub gender: Option<String>,
    pub info: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Specimen {
    pub specimen_id: String,
    pub donor_id: String,
    pub submitter_specimen_id: String,
    pub specimen_type: Option<String>,
    pub tissue_source: Option<String>,
    pub info: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub sample_id: String,
    pub specimen_id: String,
    pub submitter_sample_id: String,
    pub sample_type: Option<String>,
    pub matched_normal_submitter_sample_id: Option<String>,
    pub info: serde_json::Value,
}
