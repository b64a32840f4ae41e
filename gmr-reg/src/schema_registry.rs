//! Versioned analysis-type registry
//!
//! Analysis types are named JSON Schemas. Registering under an existing
//! name creates the next version; existing versions are never mutated.
//! The canonical ID form is `name:version`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use sqlx::SqlitePool;

use crate::db::analysis_types;
use crate::error::{RegistryError, RegistryResult};
use crate::model::AnalysisType;

/// Analysis-type name grammar
static TYPE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("valid regex"));

/// Canonical `name:version` grammar; version is a positive decimal integer
static TYPE_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9._-]+):([1-9][0-9]*)$").expect("valid regex"));

/// Payload fields owned by the registry itself. A registered schema may not
/// redefine them, or submitted payloads would validate against two masters.
const RESERVED_PROPERTIES: &[&str] = &["analysisId", "analysisType", "studyId"];

/// Structural rules every registered schema must satisfy
static REGISTRATION_META_SCHEMA: Lazy<jsonschema::Validator> = Lazy::new(|| {
    let meta = json!({
        "type": "object",
        "required": ["type", "properties"],
        "properties": {
            "type": { "const": "object" },
            "properties": {
                "type": "object",
                "minProperties": 1
            }
        }
    });
    jsonschema::options()
        .build(&meta)
        .expect("registration meta-schema compiles")
});

/// Parse the canonical `name:version` form. Malformed input is a parameter
/// error, distinct from "not found".
pub fn parse_type_id(id: &str) -> RegistryResult<(String, u32)> {
    let captures = TYPE_ID_RE.captures(id).ok_or_else(|| {
        RegistryError::MalformedParameter(format!(
            "'{}' is not a valid analysis type id (expected name:version)",
            id
        ))
    })?;

    let name = captures[1].to_string();
    let version: u32 = captures[2].parse().map_err(|_| {
        RegistryError::MalformedParameter(format!("version out of range in '{}'", id))
    })?;

    Ok((name, version))
}

/// Versioned analysis-type store
#[derive(Clone)]
pub struct SchemaRegistry {
    db: SqlitePool,
}

impl SchemaRegistry {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Register a new version of `name`. The schema must pass the
    /// registration meta-schema and may not redefine reserved payload
    /// fields. Returns the stored record with its allocated version.
    pub async fn register(
        &self,
        name: &str,
        schema: &Value,
        file_types: Option<&[String]>,
    ) -> RegistryResult<AnalysisType> {
        if !TYPE_NAME_RE.is_match(name) {
            return Err(RegistryError::MalformedParameter(format!(
                "'{}' is not a valid analysis type name",
                name
            )));
        }

        let violations: Vec<String> = REGISTRATION_META_SCHEMA
            .iter_errors(schema)
            .map(|e| format_schema_error(&e))
            .collect();
        if !violations.is_empty() {
            return Err(RegistryError::SchemaViolation(violations.join(", ")));
        }

        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            let reserved: Vec<&str> = RESERVED_PROPERTIES
                .iter()
                .copied()
                .filter(|r| properties.contains_key(*r))
                .collect();
            if !reserved.is_empty() {
                return Err(RegistryError::SchemaViolation(format!(
                    "schema redefines reserved properties: [{}]",
                    reserved.join(", ")
                )));
            }
        }

        let mut tx = self.db.begin().await?;
        let analysis_type =
            analysis_types::insert_next_version(&mut tx, name, schema, file_types).await?;
        tx.commit().await?;

        tracing::info!(
            name = %analysis_type.name,
            version = analysis_type.version,
            "Registered analysis type"
        );

        Ok(analysis_type)
    }

    /// Resolve `name` at an explicit version, or at the latest when
    /// `version` is `None`. The not-found error reports the latest existing
    /// version so "no such name" and "version too high" read differently.
    pub async fn resolve(&self, name: &str, version: Option<u32>) -> RegistryResult<AnalysisType> {
        let latest = analysis_types::latest_version(&self.db, name).await?;

        let Some(latest) = latest else {
            return Err(RegistryError::AnalysisTypeNotFound(format!(
                "analysis type '{}' does not exist",
                name
            )));
        };

        let wanted = version.unwrap_or(latest);
        match analysis_types::get(&self.db, name, wanted).await? {
            Some(analysis_type) => Ok(analysis_type),
            None => Err(RegistryError::AnalysisTypeNotFound(format!(
                "analysis type '{}' has no version {} (latest is {})",
                name, wanted, latest
            ))),
        }
    }

    /// Latest registered version of `name`, if any
    pub async fn latest_version(&self, name: &str) -> RegistryResult<Option<u32>> {
        analysis_types::latest_version(&self.db, name).await
    }

    /// Resolve by canonical `name:version`
    pub async fn resolve_canonical(&self, id: &str) -> RegistryResult<AnalysisType> {
        let (name, version) = parse_type_id(id)?;
        self.resolve(&name, Some(version)).await
    }

    /// Effective file-type allow-list for one registered version: its own
    /// declaration, else the union of every earlier version's declarations.
    /// An explicitly-declared empty list means unrestricted.
    pub async fn effective_file_types(
        &self,
        analysis_type: &AnalysisType,
    ) -> RegistryResult<Vec<String>> {
        match &analysis_type.file_types {
            Some(declared) => Ok(declared.clone()),
            None => {
                analysis_types::earlier_file_type_union(
                    &self.db,
                    &analysis_type.name,
                    analysis_type.version,
                )
                .await
            }
        }
    }

    /// Paged listing with optional filters
    pub async fn list(
        &self,
        names: Option<&[String]>,
        versions: Option<&[u32]>,
        hide_schema: bool,
        limit: i64,
        offset: i64,
    ) -> RegistryResult<(i64, Vec<AnalysisType>)> {
        analysis_types::list(&self.db, names, versions, hide_schema, limit, offset).await
    }
}

/// Render one jsonschema violation with its instance path
pub(crate) fn format_schema_error(error: &jsonschema::ValidationError<'_>) -> String {
    let path = error.instance_path.to_string();
    if path.is_empty() {
        format!("{} at $", error)
    } else {
        format!("{} at ${}", error, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gmr_common::db::init::init_memory_database;

    fn experiment_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "experiment": {
                    "type": "object",
                    "properties": {
                        "libraryStrategy": { "type": "string" }
                    }
                }
            }
        })
    }

    #[test]
    fn canonical_id_grammar() {
        assert_eq!(
            parse_type_id("sequencingRead:3").unwrap(),
            ("sequencingRead".to_string(), 3)
        );
        assert_eq!(
            parse_type_id("variant.call_v2:11").unwrap(),
            ("variant.call_v2".to_string(), 11)
        );

        for bad in ["sequencingRead", "x:0", "x:-1", "x:1.5", "a b:1", ":2", "x:"] {
            assert!(
                matches!(
                    parse_type_id(bad),
                    Err(RegistryError::MalformedParameter(_))
                ),
                "expected malformed: {}",
                bad
            );
        }
    }

    #[tokio::test]
    async fn register_twice_yields_versions_one_and_two() {
        let pool = init_memory_database().await.unwrap();
        let registry = SchemaRegistry::new(pool);

        let v1 = registry
            .register("sequencingRead", &experiment_schema(), None)
            .await
            .unwrap();
        let v2 = registry
            .register("sequencingRead", &experiment_schema(), None)
            .await
            .unwrap();

        assert_eq!(v1.version, 1);
        assert_eq!(v2.version, 2);

        // Both resolvable independently
        assert_eq!(
            registry.resolve("sequencingRead", Some(1)).await.unwrap().version,
            1
        );
        assert_eq!(
            registry.resolve("sequencingRead", None).await.unwrap().version,
            2
        );
    }

    #[tokio::test]
    async fn missing_version_reports_latest() {
        let pool = init_memory_database().await.unwrap();
        let registry = SchemaRegistry::new(pool);

        registry
            .register("sequencingRead", &experiment_schema(), None)
            .await
            .unwrap();
        registry
            .register("sequencingRead", &experiment_schema(), None)
            .await
            .unwrap();

        let err = registry.resolve("sequencingRead", Some(3)).await.unwrap_err();
        match err {
            RegistryError::AnalysisTypeNotFound(msg) => {
                assert!(msg.contains("no version 3"));
                assert!(msg.contains("latest is 2"));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let err = registry.resolve("neverRegistered", Some(1)).await.unwrap_err();
        match err {
            RegistryError::AnalysisTypeNotFound(msg) => {
                assert!(msg.contains("does not exist"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn registration_rejects_bad_names_and_schemas() {
        let pool = init_memory_database().await.unwrap();
        let registry = SchemaRegistry::new(pool);

        let err = registry
            .register("bad name!", &experiment_schema(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::MalformedParameter(_)));

        // Not an object schema
        let err = registry
            .register("t", &json!({"type": "array"}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::SchemaViolation(_)));

        // Redefining a reserved payload field
        let err = registry
            .register(
                "t",
                &json!({
                    "type": "object",
                    "properties": { "studyId": { "type": "integer" } }
                }),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::SchemaViolation(_)));
    }

    #[tokio::test]
    async fn effective_file_types_fall_back_to_earlier_union() {
        let pool = init_memory_database().await.unwrap();
        let registry = SchemaRegistry::new(pool);

        let bam = vec!["BAM".to_string()];
        let vcf = vec!["VCF".to_string()];
        registry
            .register("t", &experiment_schema(), Some(&bam))
            .await
            .unwrap();
        registry
            .register("t", &experiment_schema(), Some(&vcf))
            .await
            .unwrap();
        let v3 = registry
            .register("t", &experiment_schema(), None)
            .await
            .unwrap();
        let v4 = registry
            .register("t", &experiment_schema(), Some(&[]))
            .await
            .unwrap();

        // Undeclared inherits the union of earlier declarations
        assert_eq!(
            registry.effective_file_types(&v3).await.unwrap(),
            vec!["BAM", "VCF"]
        );
        // Explicitly empty means unrestricted
        assert!(registry.effective_file_types(&v4).await.unwrap().is_empty());
    }
}
