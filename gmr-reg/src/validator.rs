//! Payload validation pipeline
//!
//! Checks run in a fixed order and short-circuit by class:
//! 1. analysis-type reference meta-schema
//! 2. analysis-type resolution (latest when the version is omitted)
//! 3. file-type allow-list scoped to the resolved schema version
//! 4. full payload body against the resolved JSON Schema
//!
//! All violations of the failing class are aggregated into one
//! comma-joined message; nothing downstream of a failing class runs.

use once_cell::sync::Lazy;
use serde_json::{json, Value};

use crate::error::{RegistryError, RegistryResult};
use crate::model::AnalysisType;
use crate::schema_registry::{format_schema_error, SchemaRegistry};

/// Shape every payload must carry before an analysis type can be resolved.
/// The version is optional; when present it must be a positive integer.
static TYPE_REF_META_SCHEMA: Lazy<jsonschema::Validator> = Lazy::new(|| {
    let meta = json!({
        "type": "object",
        "required": ["analysisType"],
        "properties": {
            "analysisType": {
                "type": "object",
                "required": ["name"],
                "properties": {
                    "name": {
                        "type": "string",
                        "pattern": "^[A-Za-z0-9._-]+$"
                    },
                    "version": {
                        "type": "integer",
                        "minimum": 1
                    }
                }
            }
        }
    });
    jsonschema::options()
        .build(&meta)
        .expect("type-ref meta-schema compiles")
});

/// Validates submission payloads against registered analysis types
pub struct PayloadValidator {
    registry: SchemaRegistry,
    enforce_latest: bool,
}

impl PayloadValidator {
    pub fn new(registry: SchemaRegistry, enforce_latest: bool) -> Self {
        Self {
            registry,
            enforce_latest,
        }
    }

    /// Run the full pipeline. On success returns the resolved analysis type
    /// so the caller never re-resolves it.
    pub async fn validate(&self, payload: &Value) -> RegistryResult<AnalysisType> {
        self.check_type_ref(payload)?;

        let (name, version) = extract_type_ref(payload)?;
        let analysis_type = self.resolve_type(&name, version).await?;

        self.check_file_types(payload, &analysis_type).await?;
        self.check_body(payload, &analysis_type)?;

        Ok(analysis_type)
    }

    fn check_type_ref(&self, payload: &Value) -> RegistryResult<()> {
        let violations: Vec<String> = TYPE_REF_META_SCHEMA
            .iter_errors(payload)
            .map(|e| format_schema_error(&e))
            .collect();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(RegistryError::SchemaViolation(violations.join(", ")))
        }
    }

    async fn resolve_type(
        &self,
        name: &str,
        version: Option<u32>,
    ) -> RegistryResult<AnalysisType> {
        if self.enforce_latest {
            if let Some(requested) = version {
                let latest = self.registry.latest_version(name).await?;
                if let Some(latest) = latest {
                    if requested != latest {
                        return Err(RegistryError::SchemaViolation(format!(
                            "analysisType '{}' version {} is not the latest ({}); \
                             omit the version or resubmit against the latest",
                            name, requested, latest
                        )));
                    }
                }
            }
        }

        self.registry.resolve(name, version).await
    }

    async fn check_file_types(
        &self,
        payload: &Value,
        analysis_type: &AnalysisType,
    ) -> RegistryResult<()> {
        let allowed = self.registry.effective_file_types(analysis_type).await?;
        if allowed.is_empty() {
            return Ok(());
        }

        let files = payload
            .get("files")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut violations = Vec::new();
        for file in files {
            let file_name = file
                .get("fileName")
                .and_then(Value::as_str)
                .unwrap_or("<unnamed>");
            let file_type = file.get("fileType").and_then(Value::as_str).unwrap_or("");
            if !allowed.iter().any(|a| a == file_type) {
                violations.push(format!(
                    "file '{}' has type '{}' which is not allowed for {} (allowed: [{}])",
                    file_name,
                    file_type,
                    analysis_type.id().canonical(),
                    allowed.join(", ")
                ));
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(RegistryError::SchemaViolation(violations.join(", ")))
        }
    }

    fn check_body(&self, payload: &Value, analysis_type: &AnalysisType) -> RegistryResult<()> {
        let Some(schema) = &analysis_type.schema else {
            return Err(RegistryError::Internal(format!(
                "analysis type {} resolved without a schema body",
                analysis_type.id().canonical()
            )));
        };

        let validator = jsonschema::options().build(schema).map_err(|e| {
            RegistryError::Internal(format!(
                "stored schema {} does not compile: {}",
                analysis_type.id().canonical(),
                e
            ))
        })?;

        let violations: Vec<String> = validator
            .iter_errors(payload)
            .map(|e| format_schema_error(&e))
            .collect();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(RegistryError::SchemaViolation(violations.join(", ")))
        }
    }
}

fn extract_type_ref(payload: &Value) -> RegistryResult<(String, Option<u32>)> {
    // The meta-schema already passed, so the shape is known
    let reference = payload
        .get("analysisType")
        .ok_or_else(|| RegistryError::Internal("analysisType vanished after check".into()))?;
    let name = reference
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| RegistryError::Internal("analysisType.name vanished after check".into()))?
        .to_string();
    let version = reference
        .get("version")
        .and_then(Value::as_u64)
        .map(|v| v as u32);
    Ok((name, version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gmr_common::db::init::init_memory_database;

    fn strict_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "experiment": {
                    "type": "object",
                    "required": ["libraryStrategy"],
                    "properties": {
                        "libraryStrategy": { "type": "string" }
                    }
                }
            },
            "required": ["experiment"]
        })
    }

    fn payload(version: Option<u32>, file_type: &str, experiment: Value) -> Value {
        let mut analysis_type = json!({"name": "sequencingRead"});
        if let Some(v) = version {
            analysis_type["version"] = json!(v);
        }
        json!({
            "analysisType": analysis_type,
            "studyId": "STUDY1",
            "files": [
                {"fileName": "reads.bam", "fileType": file_type, "fileSize": 10}
            ],
            "experiment": experiment
        })
    }

    async fn validator(enforce_latest: bool) -> (PayloadValidator, SchemaRegistry) {
        let pool = init_memory_database().await.unwrap();
        let registry = SchemaRegistry::new(pool);
        (
            PayloadValidator::new(registry.clone(), enforce_latest),
            registry,
        )
    }

    #[tokio::test]
    async fn missing_type_ref_fails_the_meta_schema() {
        let (validator, _) = validator(false).await;

        let err = validator.validate(&json!({"studyId": "S"})).await.unwrap_err();
        match err {
            RegistryError::SchemaViolation(msg) => assert!(msg.contains("analysisType")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn omitted_version_resolves_latest() {
        let (validator, registry) = validator(false).await;
        let bam = vec!["BAM".to_string()];
        registry
            .register("sequencingRead", &strict_schema(), Some(&bam))
            .await
            .unwrap();
        registry
            .register("sequencingRead", &strict_schema(), Some(&bam))
            .await
            .unwrap();

        let resolved = validator
            .validate(&payload(None, "BAM", json!({"libraryStrategy": "WGS"})))
            .await
            .unwrap();
        assert_eq!(resolved.version, 2);
    }

    #[tokio::test]
    async fn enforce_latest_rejects_stale_pin() {
        let (validator, registry) = validator(true).await;
        registry
            .register("sequencingRead", &strict_schema(), None)
            .await
            .unwrap();
        registry
            .register("sequencingRead", &strict_schema(), None)
            .await
            .unwrap();

        let err = validator
            .validate(&payload(Some(1), "BAM", json!({"libraryStrategy": "WGS"})))
            .await
            .unwrap_err();
        match err {
            RegistryError::SchemaViolation(msg) => assert!(msg.contains("not the latest")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn disallowed_file_type_lists_offender_and_allowed_set() {
        let (validator, registry) = validator(false).await;
        let allowed = vec!["BAM".to_string(), "CRAM".to_string()];
        registry
            .register("sequencingRead", &strict_schema(), Some(&allowed))
            .await
            .unwrap();

        let err = validator
            .validate(&payload(None, "VCF", json!({"libraryStrategy": "WGS"})))
            .await
            .unwrap_err();
        match err {
            RegistryError::SchemaViolation(msg) => {
                assert!(msg.contains("reads.bam"));
                assert!(msg.contains("VCF"));
                assert!(msg.contains("BAM, CRAM"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn body_violations_are_aggregated() {
        let (validator, registry) = validator(false).await;
        registry
            .register("sequencingRead", &strict_schema(), None)
            .await
            .unwrap();

        // libraryStrategy is required and must be a string
        let err = validator
            .validate(&payload(None, "BAM", json!({"libraryStrategy": 7})))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::SchemaViolation(_)));

        let ok = validator
            .validate(&payload(None, "BAM", json!({"libraryStrategy": "WGS"})))
            .await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn unknown_type_is_not_found() {
        let (validator, _) = validator(false).await;

        let err = validator
            .validate(&payload(None, "BAM", json!({"libraryStrategy": "WGS"})))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::AnalysisTypeNotFound(_)));
    }
}
