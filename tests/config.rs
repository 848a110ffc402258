//! Loading configuration files and feeding them into the epoch and index.

use std::io::Write;
use std::time::Duration;

use tinykv_faster::config::{ConfigError, FasterConfig};
use tinykv_faster::epoch::LightEpoch;
use tinykv_faster::index::HashTable;
use tinykv_faster::{FasterError, Status};

#[test]
fn test_load_from_path_builds_components() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[epoch]
table_size = 16
saturation_passes = 10
saturation_backoff_ms = 5

[index]
table_size = 2048
"#
    )
    .unwrap();

    let config = FasterConfig::load_from_path(file.path()).unwrap();
    let epoch_config = config.epoch_config();
    assert_eq!(epoch_config.table_size, 16);
    assert_eq!(epoch_config.saturation_passes, 10);
    assert_eq!(epoch_config.saturation_backoff, Duration::from_millis(5));

    let epoch = LightEpoch::with_config(epoch_config).unwrap();
    assert_eq!(epoch.table_size(), 16);

    let table = HashTable::builder()
        .config(&config.index_config())
        .build()
        .unwrap();
    assert_eq!(table.size(), 2048);
}

#[test]
fn test_unknown_field_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("faster.toml");
    std::fs::write(&path, "[epoch]\nthreads = 4\n").unwrap();

    let err = FasterConfig::load_from_path(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Toml(_)));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = FasterConfig::load_from_path(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));

    let err = FasterError::from(err);
    assert!(!err.is_fatal());
    assert_eq!(Status::from(&err), Status::InvalidArgument);
}

#[test]
fn test_overrides_on_top_of_file() {
    let config_text = "[index]\ntable_size = 64\n";
    let mut config = FasterConfig::from_toml_str(config_text).unwrap();
    config
        .apply_overrides(vec![
            (
                "TINYKV_FASTER__INDEX__TABLE_SIZE".to_string(),
                "128".to_string(),
            ),
            ("UNRELATED".to_string(), "x".to_string()),
        ])
        .unwrap();

    assert_eq!(config.index_config().table_size, 128);

    // A non power-of-two override is caught when the table is built.
    config
        .apply_overrides(vec![(
            "TINYKV_FASTER__INDEX__TABLE_SIZE".to_string(),
            "100".to_string(),
        )])
        .unwrap();
    let err = HashTable::builder()
        .config(&config.index_config())
        .build()
        .unwrap_err();
    assert!(matches!(err, FasterError::NotPowerOfTwo { value: 100, .. }));
}
