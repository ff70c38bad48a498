//! Configuration management
//!
//! Synthesis parameters, capability settings, and storage paths. Loaded
//! from a TOML file; every field has a default so a missing or partial
//! file still yields a working configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::embeddings::EmbeddingConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Clustering and promotion parameters
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    /// LLM provider settings
    #[serde(default)]
    pub llm: LlmConfig,
    /// Embedding backend settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Output and audit paths
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Clustering and promotion parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Cosine similarity at or above which a signal reinforces an
    /// existing principle
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    /// Reinforcement count at which a principle qualifies as an axiom
    #[serde(default = "default_promotion_threshold")]
    pub promotion_threshold: u32,
    /// Use the adaptive cascading threshold instead of a fixed one
    #[serde(default = "default_true")]
    pub cascade_enabled: bool,
    /// Distinct source categories required for core-identity emergence
    #[serde(default = "default_min_source_categories")]
    pub min_source_categories: usize,
    /// Optional distinct-dimension requirement for core-identity emergence
    #[serde(default)]
    pub min_dimensions: Option<usize>,
    /// Generalize signals before clustering
    #[serde(default = "default_true")]
    pub generalize_signals: bool,
}

fn default_similarity_threshold() -> f32 {
    0.85
}

fn default_promotion_threshold() -> u32 {
    3
}

fn default_min_source_categories() -> usize {
    3
}

fn default_true() -> bool {
    true
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            promotion_threshold: default_promotion_threshold(),
            cascade_enabled: true,
            min_source_categories: default_min_source_categories(),
            min_dimensions: None,
            generalize_signals: true,
        }
    }
}

/// LLM provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API key; usually supplied via environment instead of the file
    #[serde(skip)]
    pub api_key: Option<String>,
    /// Model used for classification, generalization, and notation
    #[serde(default = "default_model")]
    pub model: String,
    /// Call timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    "anthropic/claude-3.5-sonnet".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Output and audit paths
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for persisted signals, principles, and axioms
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Audit log file (line-delimited JSON)
    #[serde(default = "default_audit_log")]
    pub audit_log: PathBuf,
}

fn default_data_dir() -> PathBuf {
    data_dir().unwrap_or_else(|_| PathBuf::from(".soul-synth"))
}

fn default_audit_log() -> PathBuf {
    default_data_dir().join("audit.jsonl")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            audit_log: default_audit_log(),
        }
    }
}

impl StorageConfig {
    pub fn signals_path(&self) -> PathBuf {
        self.data_dir.join("signals.json")
    }

    pub fn principles_path(&self) -> PathBuf {
        self.data_dir.join("principles.json")
    }

    pub fn axioms_path(&self) -> PathBuf {
        self.data_dir.join("axioms.json")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            synthesis: SynthesisConfig::default(),
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default path, creating it with
    /// defaults on first run.
    pub fn load() -> Result<Self> {
        let path = config_path()?;

        if path.exists() {
            Self::load_from(&path)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        let path = config_path()?;
        let parent = path.parent().context("Config path has no parent")?;

        std::fs::create_dir_all(parent).context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&path, contents).context("Failed to write config file")?;

        Ok(())
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "soul-synth", "soul-synth")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "soul-synth", "soul-synth")
        .context("Failed to get project directories")?;
    Ok(base.data_dir().to_path_buf())
}
