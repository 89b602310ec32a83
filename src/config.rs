use std::path::Path;

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::agent::AgentSettings;

/// Environment variable prefix, e.g. `MIRROR_SERVER__PORT=8000`.
pub const ENV_PREFIX: &str = "MIRROR";
/// Config file picked up from the working directory when none is named.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Base URL of the agent service
    #[arg(long, env = "AGENT_BASE_URL")]
    pub agent_base_url: Option<String>,

    /// Enable rate limiting
    #[arg(long, env = "RATE_LIMIT_ENABLED")]
    pub rate_limit_enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub agent: AgentConfig,
    pub resilience: ResilienceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    /// Upper bound on time to the response head. Streamed bodies are not cut.
    pub request_timeout_secs: u64,
    /// Emit logs as JSON lines.
    pub log_json: bool,
    /// Sessions idle longer than this are pruned.
    pub session_idle_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub base_url: String,
    #[serde(default)]
    pub default_toolkits: Vec<String>,
    #[serde(default)]
    pub timeout_secs: Option<f64>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl AgentConfig {
    /// Client settings for the agent service.
    #[must_use]
    pub fn settings(&self) -> AgentSettings {
        AgentSettings {
            base_url: self.base_url.clone(),
            default_toolkits: self.default_toolkits.clone(),
            timeout_secs: self.timeout_secs,
            provider: self.provider.clone(),
            model: self.model.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResilienceConfig {
    pub rate_limit_enabled: bool,
    pub requests_per_second: f32,
    pub burst_size: u32,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    /// Load configuration.
    ///
    /// Priority, highest first: CLI flag (or its env var), `MIRROR_*`
    /// environment, config file, defaults. The config file is `--config` /
    /// `CONFIG_FILE`, else `./config.yaml` when it exists.
    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder()
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.request_timeout_secs", 30)?
            .set_default("server.log_json", false)?
            .set_default("server.session_idle_secs", 6 * 60 * 60)?
            .set_default("agent.base_url", "http://localhost:8000")?
            .set_default("agent.default_toolkits", Vec::<String>::new())?
            .set_default("resilience.rate_limit_enabled", true)?
            .set_default("resilience.requests_per_second", 5.0)?
            .set_default("resilience.burst_size", 10)?;

        match &cli.config {
            Some(path) => builder = builder.add_source(File::with_name(path).required(true)),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false));
            }
            None => {}
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("agent.default_toolkits")
                .try_parsing(true),
        );

        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(url) = cli.agent_base_url {
            builder = builder.set_override("agent.base_url", url)?;
        }
        if let Some(rl) = cli.rate_limit_enabled {
            builder = builder.set_override("resilience.rate_limit_enabled", rl)?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        let url = url::Url::parse(&self.agent.base_url).map_err(|e| {
            config::ConfigError::Message(format!(
                "agent.base_url '{}' is not a valid URL: {e}",
                self.agent.base_url
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(config::ConfigError::Message(format!(
                "agent.base_url must use http or https, got '{}'",
                url.scheme()
            )));
        }
        Ok(())
    }
}
