//! Config command - manage local configuration.

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::local::LocalConfig;

#[derive(Args)]
pub struct ConfigCmd {
    #[command(subcommand)]
    pub command: ConfigSubCmd,
}

#[derive(Subcommand)]
pub enum ConfigSubCmd {
    /// Set the API key for embeddings
    SetKey(SetKeyCmd),

    /// Set the embeddings API base URL (default: https://api.openai.com)
    SetUrl(SetUrlCmd),

    /// Set the document-engine endpoint (default: http://localhost:8080)
    SetEngine(SetEngineCmd),

    /// Show current configuration
    Show,
}

#[derive(Args)]
pub struct SetKeyCmd {
    /// API key for the embeddings provider
    pub key: String,
}

#[derive(Args)]
pub struct SetUrlCmd {
    /// API base URL (e.g., https://openrouter.ai/api)
    pub url: String,
}

#[derive(Args)]
pub struct SetEngineCmd {
    /// Engine endpoint URL
    pub endpoint: String,
}

impl ConfigCmd {
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            ConfigSubCmd::SetKey(cmd) => {
                let mut config = LocalConfig::load()?;
                config.set_embedding_key(cmd.key.clone());
                config.save()?;
                println!("API key saved.");
            }
            ConfigSubCmd::SetUrl(cmd) => {
                let mut config = LocalConfig::load()?;
                config.embedding_base_url = cmd.url.clone();
                config.save()?;
                println!("Base URL set to: {}", cmd.url);
            }
            ConfigSubCmd::SetEngine(cmd) => {
                let mut config = LocalConfig::load()?;
                config.engine_endpoint = cmd.endpoint.clone();
                config.save()?;
                println!("Engine endpoint set to: {}", cmd.endpoint);
            }
            ConfigSubCmd::Show => {
                let config = LocalConfig::load()?;
                println!("Config: {}", LocalConfig::config_path()?.display());
                println!();
                println!(
                    "api_key:        {}",
                    if config.has_embedding_key() {
                        "(set)"
                    } else {
                        "(not set)"
                    }
                );
                println!("base_url:       {}", config.embedding_base_url);
                println!("model:          {}", config.embedding_model);
                println!("image_model:    {}", config.image_embedding_model);
                println!("engine:         {}", config.engine_endpoint);
                println!("doc_type:       {}", config.engine_document_type);
                println!("image_doc_type: {}", config.engine_image_document_type);
                println!("embedding_dim:  {}", config.engine_embedding_dim);
            }
        }
        Ok(())
    }
}
