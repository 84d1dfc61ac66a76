//! Integration tests for layered configuration loading.

use std::fs;

use ratesync::config::ConfigLoader;
use tempfile::TempDir;

#[test]
fn loads_layered_env_files() {
    let dir = TempDir::new().expect("temp dir");

    fs::write(
        dir.path().join(".env"),
        "RATESYNC_CRYPTO_SECRET=base-secret\nRATESYNC_SCHEDULE_TIME=07:15\n",
    )
    .expect("write .env");
    fs::write(
        dir.path().join(".env.local"),
        "RATESYNC_TENANT_CONCURRENCY=2\n",
    )
    .expect("write .env.local");

    let config = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .expect("config loads");

    assert_eq!(config.crypto_secret.as_deref(), Some("base-secret"));
    assert_eq!(config.sync.schedule_time, "07:15");
    assert_eq!(config.sync.tenant_concurrency, 2);
    // Untouched options keep their defaults.
    assert_eq!(config.fixing.max_attempts, 3);
    assert_eq!(config.sync.token_safety_window_seconds, 300);
}

#[test]
fn later_layers_override_earlier_ones() {
    let dir = TempDir::new().expect("temp dir");

    fs::write(
        dir.path().join(".env"),
        "RATESYNC_CRYPTO_SECRET=base-secret\nRATESYNC_SCHEDULE_TIME=07:15\n",
    )
    .expect("write .env");
    fs::write(
        dir.path().join(".env.local"),
        "RATESYNC_SCHEDULE_TIME=22:45\n",
    )
    .expect("write .env.local");

    let config = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .expect("config loads");

    assert_eq!(config.sync.schedule_time, "22:45");
}

#[test]
fn missing_crypto_secret_fails_validation() {
    let dir = TempDir::new().expect("temp dir");
    fs::write(dir.path().join(".env"), "RATESYNC_LOG_LEVEL=debug\n").expect("write .env");

    let result = ConfigLoader::with_base_dir(dir.path().to_path_buf()).load();
    assert!(result.is_err());
}
