//! Local configuration management.
//!
//! Config is stored at `~/.config/corpus/config.toml` and contains:
//! - embedding API credentials and model names
//! - document-engine endpoint and schema settings
//! - image ingestion limits

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::engine::{EmbeddingCodec, EngineError, TransportEncoding};

const CONFIG_DIR: &str = "corpus";
const CONFIG_FILE: &str = "config.toml";

/// Local configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    /// API key for the embedding service.
    #[serde(default)]
    pub embedding_api_key: Option<String>,

    /// Base URL for an OpenAI-compatible embeddings API.
    #[serde(default = "default_embedding_base_url")]
    pub embedding_base_url: String,

    /// Text embedding model.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Image embedding model.
    #[serde(default = "default_image_embedding_model")]
    pub image_embedding_model: String,

    /// Document-engine endpoint.
    #[serde(default = "default_engine_endpoint")]
    pub engine_endpoint: String,

    #[serde(default = "default_engine_namespace")]
    pub engine_namespace: String,

    #[serde(default = "default_document_type")]
    pub engine_document_type: String,

    #[serde(default = "default_image_document_type")]
    pub engine_image_document_type: String,

    #[serde(default = "default_rank_profile")]
    pub engine_rank_profile: String,

    #[serde(default = "default_image_rank_profile")]
    pub engine_image_rank_profile: String,

    #[serde(default = "default_engine_timeout_seconds")]
    pub engine_timeout_seconds: u64,

    /// Transport dimension for document embeddings; project embeddings are
    /// truncated/padded to this before transmission.
    #[serde(default = "default_embedding_dim")]
    pub engine_embedding_dim: usize,

    #[serde(default = "default_image_embedding_dim")]
    pub engine_image_embedding_dim: usize,

    /// How document embeddings cross the wire (float or packed sign bits).
    #[serde(default)]
    pub document_encoding: TransportEncoding,

    #[serde(default)]
    pub image_encoding: TransportEncoding,

    #[serde(default = "default_image_max_bytes")]
    pub image_max_bytes: usize,

    #[serde(default = "default_image_content_types")]
    pub image_allowed_content_types: Vec<String>,

    /// Public base URL for stored images; falls back to local paths.
    #[serde(default)]
    pub image_public_base_url: Option<String>,
}

fn default_embedding_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_image_embedding_model() -> String {
    "image-embedding-base".to_string()
}

fn default_engine_endpoint() -> String {
    "http://localhost:8080".to_string()
}

fn default_engine_namespace() -> String {
    "rag".to_string()
}

fn default_document_type() -> String {
    "rag_document".to_string()
}

fn default_image_document_type() -> String {
    "rag_image".to_string()
}

fn default_rank_profile() -> String {
    "rag-hybrid".to_string()
}

fn default_image_rank_profile() -> String {
    "rag-image".to_string()
}

fn default_engine_timeout_seconds() -> u64 {
    5
}

fn default_embedding_dim() -> usize {
    256
}

fn default_image_embedding_dim() -> usize {
    768
}

fn default_image_max_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_image_content_types() -> Vec<String> {
    ["image/jpeg", "image/png", "image/webp", "image/gif"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            embedding_api_key: None,
            embedding_base_url: default_embedding_base_url(),
            embedding_model: default_embedding_model(),
            image_embedding_model: default_image_embedding_model(),
            engine_endpoint: default_engine_endpoint(),
            engine_namespace: default_engine_namespace(),
            engine_document_type: default_document_type(),
            engine_image_document_type: default_image_document_type(),
            engine_rank_profile: default_rank_profile(),
            engine_image_rank_profile: default_image_rank_profile(),
            engine_timeout_seconds: default_engine_timeout_seconds(),
            engine_embedding_dim: default_embedding_dim(),
            engine_image_embedding_dim: default_image_embedding_dim(),
            document_encoding: TransportEncoding::default(),
            image_encoding: TransportEncoding::default(),
            image_max_bytes: default_image_max_bytes(),
            image_allowed_content_types: default_image_content_types(),
            image_public_base_url: None,
        }
    }
}

impl LocalConfig {
    /// Load config from the default location.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).context("Failed to read config file")?;

        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Save config to the default location.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&path, content).context("Failed to write config file")
    }

    /// Get the embedding API key as a SecretString.
    pub fn embedding_api_key_secret(&self) -> Option<SecretString> {
        self.embedding_api_key.clone().map(SecretString::from)
    }

    pub fn has_embedding_key(&self) -> bool {
        self.embedding_api_key
            .as_ref()
            .map(|k| !k.is_empty())
            .unwrap_or(false)
    }

    pub fn set_embedding_key(&mut self, key: String) {
        self.embedding_api_key = Some(key);
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_timeout_seconds)
    }

    /// Codec for document embeddings. Packing misconfiguration (dimension
    /// not divisible by 8) fails here, before any request is built.
    pub fn document_codec(&self) -> Result<EmbeddingCodec, EngineError> {
        EmbeddingCodec::new(self.engine_embedding_dim, self.document_encoding)
    }

    pub fn image_codec(&self) -> Result<EmbeddingCodec, EngineError> {
        EmbeddingCodec::new(self.engine_image_embedding_dim, self.image_encoding)
    }

    /// Validate an image payload before any side effect happens.
    pub fn check_image_payload(&self, bytes: &[u8], content_type: &str) -> Result<()> {
        anyhow::ensure!(
            bytes.len() <= self.image_max_bytes,
            "image exceeds the {} byte limit",
            self.image_max_bytes
        );
        anyhow::ensure!(
            self.image_allowed_content_types.iter().any(|t| t == content_type),
            "unsupported image content type: {content_type}"
        );
        Ok(())
    }

    /// Get the config file path.
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }
}
