#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Config persistence tests using temporary directories.

use imagefeed::{FeedConfig, FeedError};

#[test]
fn save_and_reload_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = FeedConfig::default();
    config.search.cache.max_size = 20;
    config.search.pagination.throttle_ms = 250;
    config.feed.base_url = "https://gallery.example".into();
    config.feed.request_cache_ttl_ms = 2_000;

    config.save_to_file(&path).unwrap();
    let loaded = FeedConfig::from_file(&path).unwrap();
    assert_eq!(loaded, config);
    loaded.validate().unwrap();
}

#[test]
fn saved_file_uses_section_names() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    FeedConfig::default().save_to_file(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("[search.cache]"));
    assert!(text.contains("[search.pagination]"));
    assert!(text.contains("[feed]"));
    assert!(text.contains("per_query_max"));
}

#[test]
fn invalid_toml_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "this is not valid toml {{{").unwrap();
    assert!(matches!(
        FeedConfig::from_file(&path),
        Err(FeedError::Config(_))
    ));
}

#[test]
fn load_or_default_reads_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[feed]\nmonitor_interval_ms = 250\n").unwrap();

    let config = FeedConfig::load_or_default(&path).unwrap();
    assert_eq!(config.feed.monitor_interval_ms, 250);
    assert_eq!(config.search, Default::default());
}
