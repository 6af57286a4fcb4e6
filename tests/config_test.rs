use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pricewatcher::config::Config;
use pricewatcher::error::Error;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name: &str| vars.get(name).cloned()
}

#[test]
fn defaults_are_valid() {
    let config = Config::default();
    assert_eq!(config.database_file, PathBuf::from("watchers.db"));
    assert_eq!(config.log.minimum_level, "info");
    assert_eq!(config.watcher.timeout, 10);
    assert_eq!(config.watcher.check_interval, 6.0);
    assert_eq!(config.bind_address(), "localhost:8080");
    config.validate().unwrap();
}

#[test]
fn toml_overrides_only_given_fields() {
    let config = Config::from_toml_str(
        r#"
        database_file = "/var/lib/pricewatcher/w.db"

        [watcher]
        check_interval = 2.5
        "#,
    )
    .unwrap();

    assert_eq!(config.database_file, PathBuf::from("/var/lib/pricewatcher/w.db"));
    assert_eq!(config.watcher.check_interval, 2.5);
    assert_eq!(config.watcher.timeout, 10);
    assert_eq!(config.webserver.address, "http://localhost:8080");
}

#[test]
fn unknown_keys_are_rejected() {
    let err = Config::from_toml_str("[watcher]\ntimeuot = 5\n").unwrap_err();
    assert!(matches!(err, Error::Config(_)), "got {err:?}");
}

#[test]
fn missing_explicit_file_is_an_error() {
    let err = Config::from_file(Path::new("/definitely/not/here.toml")).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn file_is_read_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pricewatcher.toml");
    std::fs::write(&path, "[log]\nminimum_level = \"debug\"\n").unwrap();

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.log.minimum_level, "debug");
}

#[test]
fn environment_overrides_win() {
    let mut config = Config::default();
    config.apply_overrides(lookup(&[
        ("PRICEWATCHER_DATABASE_FILE", "/tmp/other.db"),
        ("LOG_LEVEL", "warn"),
        ("OTEL_ENDPOINT", "http://collector:4317"),
        ("PRICEWATCHER_WEBSERVER_ADDRESS", "0.0.0.0:9000"),
    ]));

    assert_eq!(config.database_file, PathBuf::from("/tmp/other.db"));
    assert_eq!(config.log.minimum_level, "warn");
    assert_eq!(config.log.otel_endpoint.as_deref(), Some("http://collector:4317"));
    assert_eq!(config.bind_address(), "0.0.0.0:9000");
    assert_eq!(config.submission_base_url(), "http://0.0.0.0:9000");
}

#[test]
fn empty_otel_endpoint_disables_export() {
    let mut config = Config::default();
    config.log.otel_endpoint = Some("http://collector:4317".to_string());
    config.apply_overrides(lookup(&[("OTEL_ENDPOINT", "")]));
    assert!(config.log.otel_endpoint.is_none());
}

#[test]
fn address_forms() {
    let mut config = Config::default();

    config.webserver.address = "https://prices.example.com:8443/".to_string();
    assert_eq!(config.bind_address(), "prices.example.com:8443");
    assert_eq!(config.submission_base_url(), "https://prices.example.com:8443");

    config.webserver.address = "http://".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn validation_rejects_bad_intervals() {
    let mut config = Config::default();
    config.watcher.timeout = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.watcher.check_interval = -1.0;
    assert!(config.validate().is_err());

    config.watcher.check_interval = f64::NAN;
    assert!(config.validate().is_err());

    config.watcher.check_interval = 0.0;
    config.validate().unwrap();
}

#[test]
fn oversized_timeout_is_rejected() {
    let mut config = Config::default();
    config.watcher.timeout = u64::MAX / 2;
    let err = config.validate().unwrap_err();
    assert!(matches!(err, Error::Config(_)), "got {err:?}");

    config.watcher.timeout = u64::MAX / 60;
    config.validate().unwrap();
}

#[test]
fn scheduler_settings_come_from_watcher_section() {
    let mut config = Config::default();
    config.watcher.timeout = 3;
    config.watcher.check_interval = 1.5;

    let scheduler = config.scheduler_config();
    assert_eq!(scheduler.interval, Duration::from_secs(180));
    assert_eq!(scheduler.staleness_threshold(), chrono::Duration::minutes(90));
}
