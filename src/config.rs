//! TOML configuration.
//!
//! Only `[store]` is required; every other section falls back to defaults
//! that reproduce the hosted setup (OpenAI chat completions, a single
//! attempt per external call). API keys are never read from the file, only
//! from the environment variables the file names.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub inventory: InventoryConfig,
    #[serde(default)]
    pub recipes: RecipesConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
}

fn default_backend() -> String {
    "sqlite".to_string()
}
fn default_store_path() -> PathBuf {
    PathBuf::from("./data/pantry.sqlite")
}
fn default_collection() -> String {
    "Inventory".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct InventoryConfig {
    #[serde(default = "default_conflict_retries")]
    pub max_conflict_retries: u32,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: default_conflict_retries(),
        }
    }
}

fn default_conflict_retries() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct RecipesConfig {
    #[serde(default = "default_recipes_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_recipes_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
}

impl Default for RecipesConfig {
    fn default() -> Self {
        Self {
            endpoint: default_recipes_endpoint(),
            model: default_recipes_model(),
            max_tokens: default_max_tokens(),
            api_key_env: default_openai_key_env(),
            timeout_secs: default_timeout_secs(),
            max_retries: 0,
        }
    }
}

fn default_recipes_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_recipes_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_max_tokens() -> u32 {
    100
}
fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    #[serde(default = "default_classifier_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_classifier_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: default_classifier_endpoint(),
            api_key_env: default_classifier_key_env(),
            timeout_secs: default_timeout_secs(),
            max_retries: 0,
        }
    }
}

fn default_classifier_endpoint() -> String {
    "https://openrouter.ai/api/v1/classify".to_string()
}
fn default_classifier_key_env() -> String {
    "CLASSIFIER_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

impl StoreConfig {
    pub fn is_memory(&self) -> bool {
        self.backend == "memory"
    }
}

impl Config {
    /// Parse and validate a config from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).with_context(|| "Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// An in-memory config with every default, for tests and scratch runs.
    pub fn in_memory() -> Self {
        Self {
            store: StoreConfig {
                backend: "memory".to_string(),
                path: default_store_path(),
                collection: default_collection(),
            },
            inventory: InventoryConfig::default(),
            recipes: RecipesConfig::default(),
            classifier: ClassifierConfig::default(),
            server: ServerConfig::default(),
        }
    }

    fn validate(&self) -> Result<()> {
        match self.store.backend.as_str() {
            "sqlite" | "memory" => {}
            other => anyhow::bail!(
                "Unknown store backend: '{}'. Must be sqlite or memory.",
                other
            ),
        }

        if self.store.collection.trim().is_empty() {
            anyhow::bail!("store.collection must not be empty");
        }

        if self.recipes.max_tokens == 0 {
            anyhow::bail!("recipes.max_tokens must be > 0");
        }

        for (name, endpoint) in [
            ("recipes.endpoint", &self.recipes.endpoint),
            ("classifier.endpoint", &self.classifier.endpoint),
        ] {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                anyhow::bail!("{} must be an http(s) URL, got '{}'", name, endpoint);
            }
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    Config::from_toml(&content)
}
