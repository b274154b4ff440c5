use std::fs;
use std::path::PathBuf;

use twinsqla::{Settings, TwinsqlaError};

#[test]
fn defaults_enable_dynamic_queries() {
    let settings = Settings::default();
    assert!(settings.available_dynamic_query);
    assert!(settings.validate_table_names);
    assert_eq!(settings.cache_size, None, "caches are unbounded by default");
    assert_eq!(settings.sql_file_root, None);
}

#[test]
fn settings_file_overrides_defaults() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("twinsqla.toml");
    fs::write(
        &path,
        "available_dynamic_query = false\nsql_file_root = \"sql\"\ncache_size = 16\n",
    )
    .expect("write settings");
    let settings = Settings::load(Some(&path)).expect("settings loaded");
    assert!(!settings.available_dynamic_query);
    assert_eq!(settings.sql_file_root, Some(PathBuf::from("sql")));
    assert_eq!(settings.cache_size, Some(16));
    assert!(settings.validate_table_names, "unset keys keep their default");
}

#[test]
fn broken_settings_file_is_a_config_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("twinsqla.toml");
    fs::write(&path, "cache_size = \"many\"\n").expect("write settings");
    assert!(matches!(Settings::load(Some(&path)), Err(TwinsqlaError::Config(_))));

    let missing = dir.path().join("absent.toml");
    assert!(matches!(Settings::load(Some(&missing)), Err(TwinsqlaError::Config(_))));
}
