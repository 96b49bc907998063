//! Configuration management for kgraph instances.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`KGRAPH__` prefix, `__` separator)
//! 2. Config file (`kgraph.toml` by default)
//! 3. Defaults

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::ConfigurationError;

/// Top-level settings for one knowledge graph instance.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub ontology: OntologySettings,

    #[serde(default)]
    pub ledger: LedgerSettings,

    #[serde(default)]
    pub search: SearchSettings,

    pub backend: BackendSettings,
}

impl Settings {
    /// Load settings from `{file_prefix}.toml` (optional) overlaid with
    /// `KGRAPH__SECTION__KEY` environment variables.
    pub fn load(file_prefix: &str) -> Result<Self, ConfigurationError> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("KGRAPH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = cfg.try_deserialize()?;
        tracing::debug!(
            backend = settings.backend.engine_name(),
            ledger = %settings.ledger.path.display(),
            "Settings loaded"
        );
        Ok(settings)
    }

    /// Parse settings from a TOML document, without consulting the environment.
    pub fn from_toml(source: &str) -> Result<Self, ConfigurationError> {
        let cfg = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }
}

/// Where the ontology artifacts live.
#[derive(Debug, Clone, Deserialize)]
pub struct OntologySettings {
    /// Kind hierarchy artifact (JSON).
    pub hierarchy_path: PathBuf,
    /// Data model artifact (JSON).
    pub data_model_path: PathBuf,
}

/// How identifiers are generated.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategy {
    /// `Kind/<32 hex chars>`
    #[default]
    Random,
    /// `Kind/<n>`, continuing from the highest counter in the ledger.
    Counter,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerSettings {
    /// Append-only identifier ledger file.
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,

    /// Generation attempts before an allocation is abandoned.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    #[serde(default)]
    pub strategy: IdStrategy,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
            max_attempts: default_max_attempts(),
            strategy: IdStrategy::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchSettings {
    /// Entities fetched from the engine per search round trip.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

/// Which engine backs the instance.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "engine", rename_all = "lowercase")]
pub enum BackendSettings {
    Neo4j(Neo4jSettings),
    Terminusdb(TerminusSettings),
}

impl BackendSettings {
    pub fn engine_name(&self) -> &'static str {
        match self {
            Self::Neo4j(_) => "neo4j",
            Self::Terminusdb(_) => "terminusdb",
        }
    }
}

/// Bolt connection parameters for the property-graph engine.
#[derive(Debug, Clone, Deserialize)]
pub struct Neo4jSettings {
    #[serde(default = "default_neo4j_uri")]
    pub uri: String,
    #[serde(default = "default_neo4j_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
}

/// Connection parameters for the document/WOQL engine.
///
/// `server` wins when set; otherwise `local` selects `http://localhost:6363`
/// and the default is TerminusDB cloud for `team`, authenticated with the
/// token held in the `token_env` environment variable.
#[derive(Debug, Clone, Deserialize)]
pub struct TerminusSettings {
    pub team: String,
    pub database: String,
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub local: bool,
    #[serde(default = "default_terminus_user")]
    pub user: String,
    #[serde(default = "default_terminus_password")]
    pub password: String,
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl TerminusSettings {
    /// Base URL of the TerminusDB server (no trailing slash).
    pub fn endpoint(&self) -> String {
        if let Some(server) = &self.server {
            server.trim_end_matches('/').to_string()
        } else if self.local {
            "http://localhost:6363".to_string()
        } else {
            format!("https://cloud.terminusdb.com/{}", self.team)
        }
    }

    /// Cloud connections authenticate with a token instead of a password.
    pub fn uses_token(&self) -> bool {
        self.server.is_none() && !self.local
    }
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("./kgraph_ids.txt")
}

fn default_max_attempts() -> usize {
    5
}

fn default_page_size() -> usize {
    100
}

fn default_neo4j_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_neo4j_user() -> String {
    "neo4j".to_string()
}

fn default_max_connections() -> u32 {
    16
}

fn default_fetch_size() -> usize {
    256
}

fn default_terminus_user() -> String {
    "admin".to_string()
}

fn default_terminus_password() -> String {
    "root".to_string()
}

fn default_token_env() -> String {
    "TERMINUSDB_ACCESS_TOKEN".to_string()
}
