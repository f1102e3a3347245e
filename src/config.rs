use config::{Config, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::embedder::{EmbedderConfig, HASHING_MODEL_NAME};
use crate::error::{Error, Result};

pub type Number = f32;

pub const EPSILON: f32 = 1e-6;

pub const CONFIG_FILE_NAME: &str = "docvec_config";
pub const ENV_PREFIX: &str = "DOCVEC";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    #[default]
    Exact,
    Ann,
    Hybrid,
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SearchMethod::Exact => "exact",
            SearchMethod::Ann => "ann",
            SearchMethod::Hybrid => "hybrid",
        };
        f.write_str(name)
    }
}

/// Effective settings for both pipelines.
///
/// Sources, lowest priority first: built-in defaults, an optional
/// `docvec_config.{toml,json,yaml,...}` in the working directory, then
/// `DOCVEC_*` environment variables. The CLI applies its flags on top.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub index_path: PathBuf,
    pub chunk_size: usize,
    pub overlap: usize,
    pub embedding_model_name: String,
    pub dimensions: usize,
    pub top_k: usize,
    pub search_method: SearchMethod,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from("vectorstore/db_docvec.dvix"),
            chunk_size: 500,
            overlap: 50,
            embedding_model_name: HASHING_MODEL_NAME.to_string(),
            dimensions: 384,
            top_k: 3,
            search_method: SearchMethod::Exact,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            .add_source(ConfigFile::with_name(CONFIG_FILE_NAME).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| Error::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.index_path.as_os_str().is_empty() {
            return Err(Error::Config("index_path must not be empty".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be greater than 0".to_string()));
        }
        if self.overlap >= self.chunk_size {
            return Err(Error::Config(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        if self.embedding_model_name.trim().is_empty() {
            return Err(Error::Config("embedding_model_name must not be empty".to_string()));
        }
        if self.dimensions == 0 {
            return Err(Error::Config("dimensions must be greater than 0".to_string()));
        }
        if self.top_k == 0 {
            return Err(Error::Config("top_k must be greater than 0".to_string()));
        }
        Ok(())
    }

    pub fn embedder_config(&self) -> EmbedderConfig {
        EmbedderConfig {
            model_name: self.embedding_model_name.clone(),
            dimensions: self.dimensions,
        }
    }

    pub fn print_config(&self) {
        println!("index_path={}", self.index_path.display());
        println!("chunk_size={}", self.chunk_size);
        println!("overlap={}", self.overlap);
        println!("embedding_model_name={}", self.embedding_model_name);
        println!("dimensions={}", self.dimensions);
        println!("top_k={}", self.top_k);
        println!("search_method={}", self.search_method);
    }
}
