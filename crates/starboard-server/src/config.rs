use std::path::PathBuf;

use anyhow::{Context, Result, bail};

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Tables are dropped and recreated on every start.
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    pub api_base: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    /// Bearer secret the event ingest requires; `None` accepts any caller.
    pub ingest_secret: Option<String>,
    pub locales_dir: PathBuf,
    pub mode: Mode,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let token = get("STARBOARD_TOKEN")
            .filter(|t| !t.is_empty())
            .context("STARBOARD_TOKEN must be set")?;

        let port = var("STARBOARD_PORT", "3100")
            .parse()
            .context("STARBOARD_PORT must be a port number")?;

        let mode = match var("STARBOARD_MODE", "prod").as_str() {
            "dev" => Mode::Dev,
            "prod" => Mode::Prod,
            other => bail!("STARBOARD_MODE must be dev or prod, got {:?}", other),
        };

        Ok(Self {
            token,
            api_base: var("STARBOARD_API_BASE", DEFAULT_API_BASE),
            db_path: PathBuf::from(var("STARBOARD_DB_PATH", "starboard.db")),
            host: var("STARBOARD_HOST", "0.0.0.0"),
            port,
            ingest_secret: get("STARBOARD_INGEST_SECRET").filter(|s| !s.is_empty()),
            locales_dir: PathBuf::from(var("STARBOARD_LOCALES", "./locales")),
            mode,
        })
    }
}
