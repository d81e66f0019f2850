use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{
    analysis::prompt::{DEFAULT_MAX_EVENTS, DEFAULT_MAX_LOG_CHARS},
    collector::DEFAULT_TAIL_LINES,
    llm::LLMConfig,
    store::DatabaseConfig,
    Error, Result,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub kube: KubeConfig,
    pub llm: LLMConfig,
    pub analysis: AnalysisConfig,
    pub database: DatabaseConfig,
    /// Filter used when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            kube: KubeConfig::default(),
            llm: LLMConfig::default(),
            analysis: AnalysisConfig::default(),
            database: DatabaseConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KubeConfig {
    /// Kubeconfig context; in-cluster or current context when unset.
    pub context: Option<String>,
    /// Upper bound on log lines fetched per pod.
    pub tail_lines: i64,
}

impl Default for KubeConfig {
    fn default() -> Self {
        Self {
            context: None,
            tail_lines: DEFAULT_TAIL_LINES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    #[serde(with = "duration_str")]
    pub default_lookback: Duration,
    /// Deadline shared by every analysis in one webhook batch.
    #[serde(with = "duration_str")]
    pub batch_timeout: Duration,
    /// Deadline for a single-target request.
    #[serde(with = "duration_str")]
    pub request_timeout: Duration,
    pub max_log_chars: usize,
    pub max_events: usize,
    pub max_concurrency: Option<usize>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            default_lookback: Duration::from_secs(3600),
            batch_timeout: Duration::from_secs(300),
            request_timeout: Duration::from_secs(300),
            max_log_chars: DEFAULT_MAX_LOG_CHARS,
            max_events: DEFAULT_MAX_EVENTS,
            max_concurrency: None,
        }
    }
}

impl Config {
    /// Load configuration: defaults, then an optional YAML file, then environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match ["config/config.yaml", "config.yaml"]
                .iter()
                .map(Path::new)
                .find(|p| p.exists())
            {
                Some(found) => Self::from_file(found)?,
                None => Config::default(),
            },
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("SERVER_ADDR") {
            self.server.addr = addr;
        }
        if let Ok(context) = std::env::var("KUBE_CONTEXT") {
            self.kube.context = (!context.is_empty()).then_some(context);
        }
        if let Some(lines) = env_parse::<i64>("LOG_TAIL_LINES")? {
            self.kube.tail_lines = lines;
        }
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            self.llm.provider = provider.to_lowercase();
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            if matches!(self.llm.provider.as_str(), "anthropic" | "claude") {
                self.llm.api_key = Some(key);
            }
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if self.llm.provider == "openai" {
                self.llm.api_key = Some(key);
            }
        }
        if let Some(tokens) = env_parse::<u64>("LLM_MAX_TOKENS")? {
            self.llm.max_tokens = tokens;
        }
        if let Some(temperature) = env_parse::<f64>("LLM_TEMPERATURE")? {
            self.llm.temperature = temperature;
        }
        if let Ok(raw) = std::env::var("ANALYSIS_DEFAULT_LOOKBACK") {
            self.analysis.default_lookback = parse_duration(&raw)?;
        }
        if let Ok(raw) = std::env::var("ANALYSIS_BATCH_TIMEOUT") {
            self.analysis.batch_timeout = parse_duration(&raw)?;
        }
        if let Ok(raw) = std::env::var("ANALYSIS_REQUEST_TIMEOUT") {
            self.analysis.request_timeout = parse_duration(&raw)?;
        }
        if let Some(limit) = env_parse::<usize>("ANALYSIS_MAX_CONCURRENCY")? {
            self.analysis.max_concurrency = (limit > 0).then_some(limit);
        }
        if let Ok(path) = std::env::var("SQLITE_PATH") {
            self.database.sqlite_path = PathBuf::from(path);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.analysis.default_lookback.is_zero() {
            return Err(Error::Config("analysis.default_lookback must be positive".to_string()));
        }
        if self.analysis.batch_timeout.is_zero() || self.analysis.request_timeout.is_zero() {
            return Err(Error::Config("analysis timeouts must be positive".to_string()));
        }
        if !matches!(self.llm.provider.as_str(), "anthropic" | "claude" | "openai" | "mock") {
            return Err(Error::Config(format!("unknown LLM provider: {}", self.llm.provider)));
        }
        if self.llm.api_key.as_deref().map_or(true, str::is_empty) && self.llm.provider != "mock" {
            tracing::warn!("LLM API key is not set. Analysis requests will fail until one is configured.");
        }
        self.database.validate().map_err(Error::Config)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("invalid value for {}: {}", name, raw))),
        Err(_) => Ok(None),
    }
}

lazy_static! {
    static ref DURATION_PART: Regex =
        Regex::new(r"(\d+(?:\.\d+)?)(ns|us|µs|ms|s|m|h)").expect("valid duration regex");
}

/// Parse a Go-style duration such as `90s`, `30m`, `1h30m` or `250ms`.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    let invalid = || Error::Validation(format!("invalid duration: {:?}", raw));

    if raw == "0" {
        return Ok(Duration::ZERO);
    }
    if raw.is_empty() {
        return Err(invalid());
    }

    let mut consumed = 0;
    let mut total = 0f64;
    for caps in DURATION_PART.captures_iter(raw) {
        let whole = caps.get(0).ok_or_else(invalid)?;
        if whole.start() != consumed {
            return Err(invalid());
        }
        consumed = whole.end();

        let value: f64 = caps[1].parse().map_err(|_| invalid())?;
        let unit_secs = match &caps[2] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return Err(invalid()),
        };
        total += value * unit_secs;
    }

    if consumed != raw.len() {
        return Err(invalid());
    }
    Duration::try_from_secs_f64(total).map_err(|_| invalid())
}

/// Render a duration in the grammar accepted by [`parse_duration`].
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();
    if secs == 0 {
        return format!("{}ms", millis);
    }
    let mut out = String::new();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        out.push_str(&format!("{}h", h));
    }
    if m > 0 {
        out.push_str(&format!("{}m", m));
    }
    if s > 0 || out.is_empty() {
        out.push_str(&format!("{}s", s));
    }
    out
}

mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
