use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use starboard_types::settings::DEFAULT_LANGUAGE;

pub const KEY_CARD_TITLE: &str = "message.content";
pub const KEY_CARD_AUTHOR: &str = "message.author";
pub const KEY_CARD_CHANNEL: &str = "message.channel";
pub const KEY_SELF_STAR_WARNING: &str = "starboard.self_star.warning";

const BUILTIN: &[(&str, &str)] = &[
    (KEY_CARD_TITLE, "Jump to message"),
    (KEY_CARD_AUTHOR, "Author"),
    (KEY_CARD_CHANNEL, "Channel"),
    (KEY_SELF_STAR_WARNING, "{0}, you cannot star your own messages."),
];

/// Renders a template for a guild's language.
pub trait Localizer: Send + Sync {
    fn render(&self, language: &str, key: &str, args: &[&str]) -> String;
}

/// String tables keyed by language, loaded from `<language>.json` files.
pub struct Locales {
    tables: HashMap<String, HashMap<String, String>>,
}

impl Locales {
    /// Only the built-in English strings.
    pub fn builtin() -> Self {
        let english = BUILTIN
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let mut tables = HashMap::new();
        tables.insert(DEFAULT_LANGUAGE.to_string(), english);
        Self { tables }
    }

    /// Built-in strings overlaid with every `*.json` table in `dir`.
    /// A missing directory is not an error.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut locales = Self::builtin();

        if !dir.is_dir() {
            warn!("Locale directory {} not found, using built-in strings", dir.display());
            return Ok(locales);
        }

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(language) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let table: HashMap<String, String> = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", path.display()))?;

            locales
                .tables
                .entry(language.to_string())
                .or_default()
                .extend(table);
        }

        info!("Loaded {} locale(s) from {}", locales.tables.len(), dir.display());
        Ok(locales)
    }

    fn lookup(&self, language: &str, key: &str) -> Option<&str> {
        self.tables
            .get(language)
            .and_then(|t| t.get(key))
            .or_else(|| self.tables.get(DEFAULT_LANGUAGE).and_then(|t| t.get(key)))
            .map(String::as_str)
    }
}

impl Localizer for Locales {
    fn render(&self, language: &str, key: &str, args: &[&str]) -> String {
        let Some(template) = self.lookup(language, key) else {
            return key.to_string();
        };

        args.iter()
            .enumerate()
            .fold(template.to_string(), |acc, (i, arg)| {
                acc.replace(&format!("{{{}}}", i), arg)
            })
    }
}
