use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CAPTION_API_URL: &str =
    "https://api-inference.huggingface.co/models/Salesforce/blip-image-captioning-large";

/// Runtime settings, read from the environment (and `.env` if present).
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub upload_dir: PathBuf,
    pub log_file: PathBuf,
    pub log_level: String,
    pub cleanup_max_age: Duration,
    pub max_upload_bytes: usize,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub api_url: String,
    pub api_token: Option<String>,
    pub prompt: String,
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            upload_dir: PathBuf::from("uploaded_images"),
            log_file: PathBuf::from("app.log"),
            log_level: "info".to_string(),
            cleanup_max_age: Duration::from_secs(3600),
            max_upload_bytes: 10 * 1024 * 1024,
            engine: EngineConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_CAPTION_API_URL.to_string(),
            api_token: None,
            prompt: "a photography of".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Config::default();

        if let Some(addr) = parsed(&lookup, "CAPTIONER_ADDR")? {
            cfg.addr = addr;
        }
        if let Some(dir) = lookup("UPLOAD_FOLDER") {
            cfg.upload_dir = PathBuf::from(dir);
        }
        if let Some(file) = lookup("LOG_FILE") {
            cfg.log_file = PathBuf::from(file);
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            cfg.log_level = level;
        }
        if let Some(secs) = parsed::<u64, _>(&lookup, "CLEANUP_MAX_AGE_SECS")? {
            cfg.cleanup_max_age = Duration::from_secs(secs);
        }
        if let Some(bytes) = parsed(&lookup, "MAX_UPLOAD_BYTES")? {
            cfg.max_upload_bytes = bytes;
        }
        if let Some(url) = lookup("CAPTION_API_URL") {
            cfg.engine.api_url = url;
        }
        cfg.engine.api_token = lookup("CAPTION_API_TOKEN").filter(|t| !t.is_empty());
        if let Some(prompt) = lookup("CAPTION_PROMPT") {
            cfg.engine.prompt = prompt;
        }
        if let Some(secs) = parsed::<u64, _>(&lookup, "CAPTION_TIMEOUT_SECS")? {
            cfg.engine.timeout = Duration::from_secs(secs);
        }

        Ok(cfg)
    }
}

fn parsed<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("invalid value for {key}: {raw:?}"))
        })
        .transpose()
}
