use super::*;
use serial_test::serial;
use tempfile::TempDir;

#[test]
fn test_defaults() {
    let config = ServerConfig::default();
    assert_eq!(config.bind_addr(), "0.0.0.0:5001");
    assert_eq!(config.backlog, 5);
    assert_eq!(config.root, PathBuf::from("/"));
    assert_eq!(config.accounts, PathBuf::from("/tmp/accounts"));
    assert_eq!(config.buffer_size, 1024);
    assert_eq!(config.registry.min_capacity, 5);
    assert_eq!(config.registry.max_capacity, 20);
    assert_eq!(config.heartbeat(), Duration::from_secs(5));
    assert_eq!(config.session_timeout(), Duration::from_secs(8));
    assert_eq!(config.log.level, "info");
    assert!(config.log.file.is_none());
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_yaml_fills_defaults() {
    let yaml = r#"
port: 6000
root: /srv/share
registry:
  max_capacity: 40
datagram:
  timeout_secs: 12
"#;
    let config: ServerConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.port, 6000);
    assert_eq!(config.host, "0.0.0.0");
    assert_eq!(config.root, PathBuf::from("/srv/share"));
    assert_eq!(config.registry.min_capacity, 5);
    assert_eq!(config.registry.max_capacity, 40);
    assert_eq!(config.datagram.heartbeat_secs, 5);
    assert_eq!(config.datagram.timeout_secs, 12);
}

#[test]
fn test_empty_yaml_is_default() {
    let config: ServerConfig = serde_yaml::from_str("{}").unwrap();
    assert_eq!(config, ServerConfig::default());
}

#[test]
fn test_validate_rejects_bad_values() {
    let mut config = ServerConfig::default();
    config.registry.min_capacity = 0;
    assert!(config.validate().is_err());

    let mut config = ServerConfig::default();
    config.registry.min_capacity = 30;
    let err = config.validate().unwrap_err().to_string();
    assert!(err.contains("exceeds"));

    let mut config = ServerConfig::default();
    config.buffer_size = 16;
    assert!(config.validate().is_err());

    let mut config = ServerConfig::default();
    config.datagram.heartbeat_secs = 0;
    assert!(config.validate().is_err());

    let mut config = ServerConfig::default();
    config.datagram.timeout_secs = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_load_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "host: 127.0.0.1\nport: 7000\nlog:\n  level: debug\n").unwrap();

    let config = ServerConfig::load(&path).unwrap();
    assert_eq!(config.bind_addr(), "127.0.0.1:7000");
    assert_eq!(config.log.level, "debug");
}

#[test]
fn test_load_reports_path_on_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.yaml");
    std::fs::write(&path, "port: [not a number").unwrap();

    let err = ServerConfig::load(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("broken.yaml"));

    let missing = ServerConfig::load(&dir.path().join("absent.yaml")).unwrap_err();
    assert!(missing.to_string().contains("Failed to read config file"));
}

#[test]
fn test_load_runs_validation() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "buffer_size: 8\n").unwrap();
    assert!(ServerConfig::load(&path).is_err());
}

#[test]
fn test_discover_explicit_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("termd.yaml");
    std::fs::write(&path, "port: 5999\n").unwrap();

    let config = ServerConfig::discover(Some(&path)).unwrap();
    assert_eq!(config.port, 5999);
}

#[test]
#[serial]
fn test_accounts_env_override() {
    std::env::set_var(ACCOUNTS_ENV, "/var/lib/termd/accounts");
    let mut config = ServerConfig::default();
    config.apply_env();
    std::env::remove_var(ACCOUNTS_ENV);

    assert_eq!(config.accounts, PathBuf::from("/var/lib/termd/accounts"));
}

#[test]
#[serial]
fn test_empty_accounts_env_is_ignored() {
    std::env::set_var(ACCOUNTS_ENV, "");
    let mut config = ServerConfig::default();
    config.apply_env();
    std::env::remove_var(ACCOUNTS_ENV);

    assert_eq!(config.accounts, PathBuf::from("/tmp/accounts"));
}
