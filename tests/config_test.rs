use anyhow::Result;
use drainpipe::utils::{Config, SourceKind};
use serial_test::serial;
use std::env;
use std::io::Write;
use std::time::Duration;

const ENV_VARS: [&str; 5] = [
    "QUEUE_URL",
    "AWS_REGION",
    "AWS_ENDPOINT_URL",
    "QUEUE_FIXTURES",
    "STATSD_ADDR",
];

fn clear_env() {
    for var in ENV_VARS {
        env::remove_var(var);
    }
}

fn write_config(contents: &str) -> Result<tempfile::NamedTempFile> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(contents.as_bytes())?;
    Ok(file)
}

#[test]
#[serial]
fn test_load_from_file() -> Result<()> {
    clear_env();
    let file = write_config(
        r#"
queue:
  queue_url: https://sqs.eu-west-1.amazonaws.com/123456789012/jobs
  region: eu-west-1
listener:
  wait_time: 10s
server:
  port: 9000
  max_staleness: 2m
"#,
    )?;

    let mut config = Config::from_file(file.path())?;
    config.apply_env();
    config.validate()?;

    assert_eq!(config.queue.source, SourceKind::Sqs);
    assert_eq!(config.queue.region.as_deref(), Some("eu-west-1"));
    assert_eq!(config.listener_settings().wait_time, Duration::from_secs(10));
    assert_eq!(config.listener_settings().max_messages, 10);
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.max_staleness(), Duration::from_secs(120));

    Ok(())
}

#[test]
#[serial]
fn test_env_overrides_file() -> Result<()> {
    clear_env();
    let file = write_config(
        r#"
queue:
  queue_url: https://sqs.eu-west-1.amazonaws.com/123456789012/jobs
  region: eu-west-1
"#,
    )?;

    env::set_var("QUEUE_URL", "https://sqs.us-east-2.amazonaws.com/123456789012/other");
    env::set_var("AWS_REGION", "us-east-2");

    let mut config = Config::from_file(file.path())?;
    config.apply_env();
    clear_env();

    assert_eq!(
        config.queue.queue_url.as_deref(),
        Some("https://sqs.us-east-2.amazonaws.com/123456789012/other")
    );
    assert_eq!(config.queue.region.as_deref(), Some("us-east-2"));
    assert!(config.validate().is_ok());

    Ok(())
}

#[test]
#[serial]
fn test_fixtures_env_switches_to_mock() {
    clear_env();
    env::set_var("QUEUE_FIXTURES", "fixtures/messages.json");

    let mut config = Config::default();
    config.apply_env();
    clear_env();

    assert_eq!(config.queue.source, SourceKind::Mock);
    assert!(config.validate().is_ok());
    assert!(config.to_string().contains("fixtures/messages.json"));
}

#[test]
#[serial]
fn test_statsd_addr_from_env() {
    clear_env();
    env::set_var("STATSD_ADDR", "127.0.0.1:8125");

    let mut config = Config::default();
    config.apply_env();
    clear_env();

    assert_eq!(config.metrics.statsd_addr.as_deref(), Some("127.0.0.1:8125"));
}

#[test]
#[serial]
fn test_missing_file_is_an_error() {
    let result = Config::from_file("/nonexistent/drainpipe.yaml");
    let err = result.unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
#[serial]
fn test_malformed_file_is_an_error() -> Result<()> {
    let file = write_config("queue: [not, a, map]")?;
    assert!(Config::from_file(file.path()).is_err());
    Ok(())
}
