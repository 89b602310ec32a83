use mirror_debate_gateway::config::AppConfig;
use serial_test::serial;
use std::env;
use std::fs;

const BIN: &str = "mirror-debate-gateway";

// Helper to clear environment variables that might interfere with tests
fn clear_env_vars() {
    unsafe {
        env::remove_var("MIRROR_SERVER__PORT");
        env::remove_var("MIRROR_AGENT__BASE_URL");
        env::remove_var("MIRROR_AGENT__DEFAULT_TOOLKITS");
        env::remove_var("MIRROR_RESILIENCE__RATE_LIMIT_ENABLED");
        env::remove_var("CONFIG_FILE");
        env::remove_var("PORT");
        env::remove_var("AGENT_BASE_URL");
        env::remove_var("RATE_LIMIT_ENABLED");
    }
}

#[test]
#[serial]
fn test_default_config() {
    clear_env_vars();

    let config = AppConfig::load_from_args([BIN]).expect("defaults should load");
    assert_eq!(config.server.port, 3000);
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.agent.base_url, "http://localhost:8000");
    assert!(config.agent.default_toolkits.is_empty());
    assert!(config.resilience.rate_limit_enabled);
    assert_eq!(config.resilience.burst_size, 10);
}

#[test]
#[serial]
fn test_env_override() {
    clear_env_vars();
    unsafe {
        env::set_var("MIRROR_SERVER__PORT", "9090");
        env::set_var("MIRROR_AGENT__DEFAULT_TOOLKITS", "crypto,web");
    }

    let config = AppConfig::load_from_args([BIN]).expect("Failed to load config");
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.agent.default_toolkits, vec!["crypto", "web"]);

    clear_env_vars();
}

#[test]
#[serial]
fn test_cli_beats_env() {
    clear_env_vars();
    unsafe {
        env::set_var("MIRROR_SERVER__PORT", "9090");
    }

    let config = AppConfig::load_from_args([
        BIN,
        "--port",
        "4040",
        "--agent-base-url",
        "https://agent.example.com",
        "--rate-limit-enabled",
        "false",
    ])
    .expect("Failed to load config");
    assert_eq!(config.server.port, 4040);
    assert_eq!(config.agent.base_url, "https://agent.example.com");
    assert!(!config.resilience.rate_limit_enabled);

    clear_env_vars();
}

#[test]
#[serial]
fn test_file_load() {
    clear_env_vars();

    let dir = tempfile::tempdir().expect("tempdir");
    let file_path = dir.path().join("gateway.yaml");
    fs::write(
        &file_path,
        r#"
server:
  port: 7070
agent:
  base_url: "http://agent:8000"
  default_toolkits: ["crypto"]
  timeout_secs: 120
"#,
    )
    .expect("Failed to write temp config");

    // Tell AppConfig to use this file via Env Var (mocking CLI arg indirectly)
    unsafe {
        env::set_var("CONFIG_FILE", &file_path);
    }

    let config = AppConfig::load_from_args([BIN]).expect("Failed to load config from file");
    assert_eq!(config.server.port, 7070);
    assert_eq!(config.agent.base_url, "http://agent:8000");
    assert_eq!(config.agent.default_toolkits, vec!["crypto"]);
    assert_eq!(config.agent.timeout_secs, Some(120.0));

    clear_env_vars();
}

#[test]
#[serial]
fn test_missing_named_file_fails() {
    clear_env_vars();
    assert!(AppConfig::load_from_args([BIN, "--config", "does-not-exist.yaml"]).is_err());
}

#[test]
#[serial]
fn test_invalid_base_url_rejected() {
    clear_env_vars();
    unsafe {
        env::set_var("MIRROR_AGENT__BASE_URL", "not a url");
    }
    assert!(AppConfig::load_from_args([BIN]).is_err());

    unsafe {
        env::set_var("MIRROR_AGENT__BASE_URL", "ftp://agent");
    }
    assert!(AppConfig::load_from_args([BIN]).is_err());

    clear_env_vars();
}

#[test]
#[serial]
fn test_cwd_config_fallback() {
    clear_env_vars();

    // Create ./config.yaml
    let config_content = r#"
server:
  port: 6060
    "#;
    let cwd_path = "config.yaml";
    fs::write(cwd_path, config_content).expect("Failed to write ./config.yaml");

    let config = AppConfig::load_from_args([BIN]);

    fs::remove_file(cwd_path).expect("Failed to remove ./config.yaml");

    assert_eq!(config.expect("Failed to load config").server.port, 6060);
}
