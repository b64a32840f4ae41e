//! Publish-time reconciliation
//!
//! Cross-checks every declared file against the storage tier. Failures are
//! classified with a strict dominance order: existence, then size, then
//! checksum. The caller never receives a checksum complaint about a file
//! that does not exist, and the classification is a deterministic post-hoc
//! aggregation regardless of query order.

use tracing::debug;

use crate::error::{RegistryError, RegistryResult};
use crate::model::AnalysisFile;
use crate::storage::StorageGateway;

/// Verify that every file exists in storage with matching size and checksum.
///
/// A file whose checksum is undefined on either side is skipped when
/// `ignore_undefined_md5` is set, and counted as a checksum mismatch
/// otherwise.
pub async fn reconcile(
    gateway: &dyn StorageGateway,
    files: &[AnalysisFile],
    ignore_undefined_md5: bool,
) -> RegistryResult<()> {
    // Existence dominates: no further checks run when anything is absent
    let mut missing = Vec::new();
    for file in files {
        if !gateway.exists(&file.object_id).await? {
            missing.push(file.object_id.clone());
        }
    }
    if !missing.is_empty() {
        return Err(RegistryError::MissingStorageObjects(missing));
    }

    // Every file exists; fetch specs once and classify size before checksum
    let mut size_mismatches = Vec::new();
    let mut checksum_mismatches = Vec::new();
    for file in files {
        let spec = gateway.download_spec(&file.object_id).await?;

        if spec.file_size != file.file_size {
            debug!(
                object_id = %file.object_id,
                declared = file.file_size,
                stored = spec.file_size,
                "storage object size mismatch"
            );
            size_mismatches.push(file.object_id.clone());
            continue;
        }

        match (&file.file_md5sum, &spec.file_md5sum) {
            (Some(declared), Some(stored)) => {
                if declared != stored {
                    checksum_mismatches.push(file.object_id.clone());
                }
            }
            _ => {
                if !ignore_undefined_md5 {
                    checksum_mismatches.push(file.object_id.clone());
                }
            }
        }
    }

    if !size_mismatches.is_empty() {
        return Err(RegistryError::MismatchingStorageObjectSizes(size_mismatches));
    }
    if !checksum_mismatches.is_empty() {
        return Err(RegistryError::MismatchingStorageObjectChecksums(
            checksum_mismatches,
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryStorage, StorageObject};

    fn file(object_id: &str, size: i64, md5: Option<&str>) -> AnalysisFile {
        AnalysisFile {
            object_id: object_id.to_string(),
            analysis_id: "AN1".to_string(),
            study_id: "STUDY1".to_string(),
            file_name: format!("{}.bam", object_id),
            file_type: "BAM".to_string(),
            file_size: size,
            file_md5sum: md5.map(String::from),
            file_access: None,
            data_type: None,
            info: serde_json::Value::Object(Default::default()),
        }
    }

    fn stored(object_id: &str, size: i64, md5: Option<&str>) -> StorageObject {
        StorageObject {
            object_id: object_id.to_string(),
            file_size: size,
            file_md5sum: md5.map(String::from),
        }
    }

    #[tokio::test]
    async fn all_matching_files_pass() {
        let storage = InMemoryStorage::new();
        storage.put(stored("o1", 10, Some("aa")));
        storage.put(stored("o2", 20, Some("bb")));

        let files = [file("o1", 10, Some("aa")), file("o2", 20, Some("bb"))];
        assert!(reconcile(&storage, &files, false).await.is_ok());
    }

    #[tokio::test]
    async fn missing_dominates_size_mismatch() {
        let storage = InMemoryStorage::new();
        // o1 absent entirely; o2 present with the wrong size
        storage.put(stored("o2", 999, Some("bb")));

        let files = [file("o1", 10, Some("aa")), file("o2", 20, Some("bb"))];
        let err = reconcile(&storage, &files, false).await.unwrap_err();
        match err {
            RegistryError::MissingStorageObjects(ids) => assert_eq!(ids, vec!["o1"]),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn size_mismatch_dominates_checksum_mismatch() {
        let storage = InMemoryStorage::new();
        storage.put(stored("o1", 999, Some("aa")));
        storage.put(stored("o2", 20, Some("xx")));

        let files = [file("o1", 10, Some("aa")), file("o2", 20, Some("bb"))];
        let err = reconcile(&storage, &files, false).await.unwrap_err();
        match err {
            RegistryError::MismatchingStorageObjectSizes(ids) => assert_eq!(ids, vec!["o1"]),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn checksum_mismatch_reported_last() {
        let storage = InMemoryStorage::new();
        storage.put(stored("o1", 10, Some("zz")));

        let files = [file("o1", 10, Some("aa"))];
        let err = reconcile(&storage, &files, false).await.unwrap_err();
        assert!(matches!(
            err,
            RegistryError::MismatchingStorageObjectChecksums(_)
        ));
    }

    #[tokio::test]
    async fn undefined_md5_skipped_only_when_permitted() {
        let storage = InMemoryStorage::new();
        storage.put(stored("local-undefined", 10, Some("aa")));
        storage.put(stored("stored-undefined", 20, None));

        let files = [
            file("local-undefined", 10, None),
            file("stored-undefined", 20, Some("bb")),
        ];

        // Permitted: both undefined sides are skipped
        assert!(reconcile(&storage, &files, true).await.is_ok());

        // Not permitted: both count as checksum mismatches
        let err = reconcile(&storage, &files, false).await.unwrap_err();
        match err {
            RegistryError::MismatchingStorageObjectChecksums(ids) => {
                assert_eq!(ids, vec!["local-undefined", "stored-undefined"]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_file_set_trivially_passes() {
        let storage = InMemoryStorage::new();
        assert!(reconcile(&storage, &[], false).await.is_ok());
    }
}
