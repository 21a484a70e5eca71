use std::fs;

use kitamo_config::{Config, ConfigError, ConfigManager};
use tempfile::tempdir;

#[test]
fn default_config_matches_engine_defaults() {
    let cfg = Config::default();

    assert_eq!(cfg.horizon_months, 12);
    assert_eq!(cfg.projection_days, 30);
    assert_eq!(cfg.alert_window_days, 7);
    assert_eq!(cfg.log_filter, "kitamo=info");
    assert_eq!(cfg.backup_retention, 5);
    assert!(cfg.data_dir.is_none());
    assert!(cfg.resolve_data_dir().ends_with("Kitamo"));
}

#[test]
fn missing_file_loads_defaults() {
    let dir = tempdir().expect("tempdir");
    let manager = ConfigManager::new(dir.path().join("config.json"));

    assert_eq!(manager.load().expect("load config"), Config::default());
}

#[test]
fn config_manager_persists_and_loads_config() {
    let dir = tempdir().expect("tempdir");
    let manager = ConfigManager::with_base_dir(dir.path().to_path_buf()).expect("manager");

    let cfg = Config {
        horizon_months: 6,
        data_dir: Some(dir.path().join("ledgers")),
        ..Config::default()
    };

    manager.save(&cfg).expect("save config");
    assert!(manager.config_path().exists());
    assert!(!manager.config_path().with_extension("json.tmp").exists());

    let loaded = manager.load().expect("load config");
    assert_eq!(loaded, cfg);
    assert_eq!(loaded.resolve_data_dir(), dir.path().join("ledgers"));
}

#[test]
fn partial_file_fills_in_defaults() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("config.json");
    fs::write(&path, r#"{ "projection_days": 90 }"#).expect("write config");

    let loaded = ConfigManager::new(path).load().expect("load config");
    assert_eq!(loaded.projection_days, 90);
    assert_eq!(loaded.horizon_months, 12);
}

#[test]
fn invalid_settings_are_rejected() {
    let dir = tempdir().expect("tempdir");
    let manager = ConfigManager::new(dir.path().join("config.json"));

    let cfg = Config {
        horizon_months: 0,
        ..Config::default()
    };
    assert!(matches!(
        manager.save(&cfg),
        Err(ConfigError::Invalid {
            field: "horizon_months",
            ..
        })
    ));

    fs::write(manager.config_path(), "{ not json").expect("write garbage");
    assert!(matches!(manager.load(), Err(ConfigError::Serde(_))));
}
