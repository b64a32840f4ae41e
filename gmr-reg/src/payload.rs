//! Submission payload types
//!
//! A payload is parsed in two steps: raw text → `serde_json::Value` (so the
//! analysis-type schema can be applied to the full body), then `Value` →
//! typed `Payload` once validation has passed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RegistryError, RegistryResult};

/// How much of a rejected payload gets echoed back in the parse error
const ECHO_LIMIT: usize = 256;

/// Reference to the analysis type a payload claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisTypeRef {
    pub name: String,
    /// Omitted version means "latest"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadDonor {
    #[serde(default)]
    pub donor_id: Option<String>,
    pub submitter_donor_id: String,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub info: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadSpecimen {
    #[serde(default)]
    pub specimen_id: Option<String>,
    pub submitter_specimen_id: String,
    #[serde(default)]
    pub specimen_type: Option<String>,
    #[serde(default)]
    pub tissue_source: Option<String>,
    #[serde(default)]
    pub info: Value,
}

/// One sample with its parent specimen and donor, as submitted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadSample {
    #[serde(default)]
    pub sample_id: Option<String>,
    pub submitter_sample_id: String,
    #[serde(default)]
    pub sample_type: Option<String>,
    #[serde(default)]
    pub matched_normal_submitter_sample_id: Option<String>,
    #[serde(default)]
    pub info: Value,
    pub specimen: PayloadSpecimen,
    pub donor: PayloadDonor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadFile {
    /// Optional caller-supplied object ID; must agree with the derived one
    #[serde(default)]
    pub object_id: Option<String>,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    #[serde(default)]
    pub file_md5sum: Option<String>,
    #[serde(default)]
    pub file_access: Option<String>,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub info: Value,
}

/// Typed view of a submission payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    pub analysis_type: AnalysisTypeRef,
    #[serde(default)]
    pub analysis_id: Option<String>,
    #[serde(default)]
    pub study_id: Option<String>,
    #[serde(default)]
    pub samples: Vec<PayloadSample>,
    #[serde(default)]
    pub files: Vec<PayloadFile>,
    #[serde(default)]
    pub experiment: Value,
}

/// Parse raw submission text into a JSON value.
///
/// The echoed snippet has `%` escaped as `%%` so it is safe to pass through
/// downstream format-string machinery, and is truncated to keep error
/// messages bounded.
pub fn parse_raw(raw: &str) -> RegistryResult<Value> {
    serde_json::from_str(raw).map_err(|e| {
        let mut snippet: String = raw.chars().take(ECHO_LIMIT).collect();
        if raw.chars().count() > ECHO_LIMIT {
            snippet.push_str("...");
        }
        RegistryError::PayloadParsing(format!("{}: {}", e, snippet.replace('%', "%%")))
    })
}

/// Extract the typed payload from a JSON value that has already passed
/// schema validation.
pub fn from_value(value: &Value) -> RegistryResult<Payload> {
    serde_json::from_value(value.clone())
        .map_err(|e| RegistryError::SchemaViolation(format!("payload shape: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = parse_raw("{not json").unwrap_err();
        assert!(matches!(err, RegistryError::PayloadParsing(_)));
    }

    #[test]
    fn percent_signs_are_escaped_in_echo() {
        let err = parse_raw("{\"x\": 100%}").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("100%%"));
        assert!(!msg.contains("100% "));
    }

    #[test]
    fn long_payloads_are_truncated_in_echo() {
        let raw = format!("{{\"a\": {}", "x".repeat(5000));
        let err = parse_raw(&raw).unwrap_err();
        assert!(err.to_string().len() < 1000);
    }

    #[test]
    fn typed_extraction_reads_camel_case() {
        let value = json!({
            "analysisType": {"name": "sequencingRead", "version": 2},
            "studyId": "STUDY1",
            "samples": [{
                "submitterSampleId": "SA-1",
                "sampleType": "DNA",
                "specimen": {"submitterSpecimenId": "SP-1", "specimenType": "Normal"},
                "donor": {"submitterDonorId": "DO-1", "gender": "Female"}
            }],
            "files": [{
                "fileName": "reads.bam",
                "fileType": "BAM",
                "fileSize": 1024,
                "fileMd5sum": "d41d8cd98f00b204e9800998ecf8427e"
            }],
            "experiment": {"libraryStrategy": "WGS"}
        });

        let payload = from_value(&value).unwrap();
        assert_eq!(payload.analysis_type.name, "sequencingRead");
        assert_eq!(payload.analysis_type.version, Some(2));
        assert_eq!(payload.study_id.as_deref(), Some("STUDY1"));
        assert_eq!(payload.samples.len(), 1);
        assert_eq!(payload.samples[0].donor.submitter_donor_id, "DO-1");
        assert_eq!(payload.files[0].file_name, "reads.bam");
        assert!(payload.files[0].object_id.is_none());
    }
}
