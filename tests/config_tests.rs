//! Loading configuration files

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use af_gateway::config::Config;
use pretty_assertions::assert_eq;
use tempfile::NamedTempFile;

fn write_config(yaml: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_yaml_file() {
    let file = write_config(
        r#"
server:
  port: 9050
  request_timeout: 45s
  advertised:
    scheme: https
    host: af.operator.example
    port: 443
    base_path: /af/v1
notifications:
  port: 9051
  consumer_header: x-tenant
  purge_on_session_delete: true
  webhook_timeout: 2s 500ms
downstream:
  af_id: AF_42
  nef:
    endpoint:
      host: nef.core
      port: 8060
    timeout: 5s
  pcf:
    endpoint:
      scheme: https
      host: pcf.core
      port: 29507
    auth:
      enabled: true
      client_id: af
      client_secret: secret
"#,
    );

    let config = Config::load(Some(file.path())).unwrap();

    assert_eq!(config.server.port, 9050);
    assert_eq!(config.server.request_timeout, Duration::from_secs(45));
    assert_eq!(config.server.advertised.base_url(), "https://af.operator.example:443/af/v1");
    assert_eq!(config.notifications.consumer_header, "x-tenant");
    assert!(config.notifications.purge_on_session_delete);
    assert_eq!(config.notifications.webhook_timeout, Duration::from_millis(2500));
    assert_eq!(config.downstream.af_id, "AF_42");
    assert_eq!(config.downstream.nef.endpoint.base_url(), "http://nef.core:8060");
    assert_eq!(config.downstream.nef.timeout, Duration::from_secs(5));
    assert!(config.downstream.pcf.auth.enabled);
    assert_eq!(config.downstream.pcf.auth.token_path, "/oauth2/token");
    // untouched sections keep their defaults
    assert_eq!(config.server.shutdown_timeout, Duration::from_secs(10));
    assert_eq!(
        config.notifications.advertised.base_url(),
        "http://localhost:8051/af/v1/notifications"
    );
}

#[test]
fn test_missing_file_is_an_error() {
    let err = Config::load(Some(Path::new("/nonexistent/af-gateway.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
}

#[test]
fn test_unusable_endpoint_is_an_error() {
    let file = write_config(
        r"
downstream:
  nef:
    endpoint:
      scheme: ftp
      host: nef.core
",
    );

    let err = Config::load(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("downstream.nef.endpoint.scheme"));
}

#[test]
fn test_malformed_duration_is_an_error() {
    let file = write_config("server:\n  request_timeout: soon\n");
    assert!(Config::load(Some(file.path())).is_err());
}
