//! Integration tests for configuration resolution

use gmr_common::config::{resolve_root_folder, TomlConfig};
use std::io::Write;
use std::path::PathBuf;

#[test]
fn cli_arg_takes_priority() {
    let config = TomlConfig {
        root_folder: Some("/from/toml".to_string()),
        ..Default::default()
    };
    let resolved = resolve_root_folder(Some("/from/cli"), "GMR_TEST_UNSET_VAR", &config);
    assert_eq!(resolved, PathBuf::from("/from/cli"));
}

#[test]
fn toml_used_when_cli_and_env_absent() {
    let config = TomlConfig {
        root_folder: Some("/from/toml".to_string()),
        ..Default::default()
    };
    let resolved = resolve_root_folder(None, "GMR_TEST_UNSET_VAR", &config);
    assert_eq!(resolved, PathBuf::from("/from/toml"));
}

#[test]
fn env_var_beats_toml() {
    std::env::set_var("GMR_TEST_ROOT_VAR", "/from/env");
    let config = TomlConfig {
        root_folder: Some("/from/toml".to_string()),
        ..Default::default()
    };
    let resolved = resolve_root_folder(None, "GMR_TEST_ROOT_VAR", &config);
    std::env::remove_var("GMR_TEST_ROOT_VAR");
    assert_eq!(resolved, PathBuf::from("/from/env"));
}

#[test]
fn registry_table_parses_with_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
root_folder = "/data/gmr"

[registry]
port = 6001
enforce_latest = true
"#
    )
    .unwrap();

    let config = TomlConfig::load(file.path()).expect("Should parse config");
    assert_eq!(config.root_folder.as_deref(), Some("/data/gmr"));
    assert_eq!(config.registry.port, 6001);
    assert!(config.registry.enforce_latest);
    // Unspecified fields keep their defaults
    assert_eq!(config.registry.host, "127.0.0.1");
    assert_eq!(config.registry.retry_attempts, 3);
}

#[test]
fn malformed_config_is_an_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "registry = 12").unwrap();

    assert!(TomlConfig::load(file.path()).is_err());
}
