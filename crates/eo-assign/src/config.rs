//! Configuration loading for eo-assign.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use eo_core::{
    EngineSettings, PolicyColumns, SequentialTokens, TokenSource, WordListTokens,
    DEFAULT_WORD_START, DEFAULT_WORD_STRIDE,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    pub engine: Option<EngineSettings>,
    pub tokens: Option<TokenConfig>,
    pub policy: Option<PolicyColumns>,
}

#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenStyle {
    #[default]
    Sequential,
    Words,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct TokenConfig {
    pub style: Option<TokenStyle>,
    pub prefix: Option<String>,
    pub word_list: Option<PathBuf>,
    pub start: Option<usize>,
    pub stride: Option<usize>,
}

/// Word list used when `style = "words"` names no file
pub const DEFAULT_WORD_LIST: &str = "/usr/share/dict/words";

impl Config {
    pub fn engine_settings(&self) -> EngineSettings {
        self.engine.clone().unwrap_or_default()
    }

    pub fn policy_columns(&self) -> PolicyColumns {
        self.policy.clone().unwrap_or_default()
    }

    pub fn token_style(&self) -> TokenStyle {
        self.tokens
            .as_ref()
            .and_then(|t| t.style)
            .unwrap_or_default()
    }

    /// Build the token generator for one run.
    /// Sequential tokens count from 1 unless `start` is set.
    pub fn token_source(&self) -> Result<Box<dyn TokenSource>> {
        let tokens = self.tokens.clone().unwrap_or_default();
        match self.token_style() {
            TokenStyle::Sequential => {
                let start = tokens.start.unwrap_or(1) as u64;
                let prefix = tokens.prefix.unwrap_or_default();
                Ok(Box::new(SequentialTokens::starting_at(prefix, start)))
            }
            TokenStyle::Words => {
                let path = tokens
                    .word_list
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_WORD_LIST));
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read word list: {}", path.display()))?;
                let words = WordListTokens::from_text(
                    &text,
                    tokens.start.unwrap_or(DEFAULT_WORD_START),
                    tokens.stride.unwrap_or(DEFAULT_WORD_STRIDE),
                );
                tracing::debug!(
                    "Loaded {} usable token(s) from {}",
                    words.remaining(),
                    path.display()
                );
                Ok(Box::new(words))
            }
        }
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let dirs =
        ProjectDirs::from("", "", "eo-assign").context("Could not determine config directory")?;
    Ok(dirs.config_dir().join("config.toml"))
}

pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&contents).with_context(|| {
        format!(
            "Invalid eo-assign config in {} (expected [engine], [tokens] and [policy] sections)",
            path.display()
        )
    })?;
    Ok(config)
}
