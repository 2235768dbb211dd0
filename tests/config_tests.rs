//! Configuration loading from YAML files on disk.

use campus_cache::observability::LogFormat;
use campus_cache::store::MemoryStore;
use campus_cache::{CampusServices, ServiceConfig, TtlPolicy};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[tokio::test]
async fn test_load_full_config_file() {
    let file = write_config(
        r#"
cache:
  in_memory_enabled: true
  in_memory:
    max_entries: 5000
  redis_enabled: false
  operation_timeout: 250ms
  store_timeout: 5s
ttl:
  dashboard:
    local: 1m
    shared: 10m
predictor:
  batch_size: 500
  default_page_size: 25
  years: [2023, 2024]
logging:
  level: debug
  format: json
"#,
    );

    let config = ServiceConfig::load_from_file(file.path()).await.unwrap();
    assert_eq!(config.cache.in_memory.max_entries, 5000);
    assert_eq!(config.cache.operation_timeout, Duration::from_millis(250));
    assert_eq!(config.ttl.dashboard, TtlPolicy::new(Duration::from_secs(60), Duration::from_secs(600)));
    assert_eq!(config.ttl.detail, TtlPolicy::detail());
    assert_eq!(config.predictor.batch_size, 500);
    assert_eq!(config.predictor.years, Some(vec![2023, 2024]));
    assert_eq!(config.logging.format, LogFormat::Json);

    // A local-only configuration builds without Redis
    let services = CampusServices::build(config, Arc::new(MemoryStore::new())).await.unwrap();
    assert!(!services.cache.has_shared_tier());
}

#[tokio::test]
async fn test_invalid_file_is_rejected() {
    let file = write_config(
        r#"
predictor:
  default_page_size: 500
  max_page_size: 100
"#,
    );
    let err = ServiceConfig::load_from_file(file.path()).await.unwrap_err();
    assert!(err.to_string().contains("default_page_size"));

    let garbage = write_config("cache: [not, a, map");
    assert!(ServiceConfig::load_from_file(garbage.path()).await.is_err());

    assert!(ServiceConfig::load_from_file("/nonexistent/campus.yaml").await.is_err());
}

#[test]
fn test_load_from_blocking_context() {
    let file = write_config("predictor:\n  batch_size: 64\n");
    let config = tokio_test::block_on(ServiceConfig::load_from_file(file.path())).unwrap();
    assert_eq!(config.predictor.batch_size, 64);
}
