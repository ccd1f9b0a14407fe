// src/config/ai.rs
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

pub const ENV_AI_CONFIG_PATH: &str = "AI_CONFIG_PATH";
pub const DEFAULT_AI_CONFIG_PATH: &str = "config/ai.json";

fn default_provider() -> String {
    "openai".to_string()
}
fn default_timeout_ms() -> u64 {
    5_000
}
fn default_daily_limit() -> u32 {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Only "openai" is wired up (case-insensitive).
    #[serde(default = "default_provider")]
    pub provider: String,
    /// "ENV" means: read from OPENAI_API_KEY
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            api_key: String::new(),
            model: None,
            timeout_ms: default_timeout_ms(),
            daily_limit: default_daily_limit(),
        }
    }
}

impl AiConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading AI config from {}", path.display()))?;
        Self::from_json_str(&data).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_json_str(data: &str) -> anyhow::Result<Self> {
        let mut cfg: AiConfig = serde_json::from_str(data)?;

        cfg.provider = cfg.provider.trim().to_lowercase();

        // Only resolve the key when it will actually be used.
        if cfg.enabled && cfg.api_key.trim().eq_ignore_ascii_case("env") {
            cfg.api_key = match cfg.provider.as_str() {
                "openai" => env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow::anyhow!("Missing OPENAI_API_KEY env var"))?,
                other => anyhow::bail!("Unsupported provider in config: {other}"),
            };
        }

        if cfg.timeout_ms == 0 {
            cfg.timeout_ms = default_timeout_ms();
        }

        Ok(cfg)
    }

    /// `AI_CONFIG_PATH` or `config/ai.json`; a missing file means "disabled".
    pub fn load() -> anyhow::Result<Self> {
        let path = env::var(ENV_AI_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_AI_CONFIG_PATH.into());
        if !Path::new(&path).exists() {
            return Ok(Self::default());
        }
        Self::load_from_file(path)
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}
