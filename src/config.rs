use crate::database::{datastore_path, NetworkMode};
use crate::ledger::REPOVER_FILE;
use crate::migration::MigrationContext;
use anyhow::{anyhow, Context, Result};
use config::Config;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Environment variable prefix, e.g. `DSMIGRATE_REPO_PATH`
pub const ENV_PREFIX: &str = "DSMIGRATE";

#[derive(Debug, Clone, Serialize)]
pub struct MigrateConfig {
    /// Root of the repository holding `repover` and `datastore/`
    pub repo_path: String,

    /// Which datastore file to migrate
    pub network: NetworkMode,

    /// Datastore passphrase; empty for unencrypted datastores
    #[serde(skip_serializing)]
    pub db_password: String,
}

const EMPTY_CONFIG: &str = r#"### dsmigrate configuration file

### repository root containing `repover` and `datastore/`
# repo_path = "~/.dsmigrate"

### migrate the testnet datastore instead of mainnet
# testnet = false

### datastore passphrase (prefer the DSMIGRATE_DB_PASSWORD environment variable)
# db_password = ""
"#;

impl Default for MigrateConfig {
    fn default() -> Self {
        let home_dir = dirs::home_dir()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|| ".".to_string());

        Self {
            repo_path: format!("{}/.dsmigrate", home_dir),
            network: NetworkMode::Mainnet,
            db_password: String::new(),
        }
    }
}

impl MigrateConfig {
    /// Load the configuration file, then `DSMIGRATE_*` overrides
    ///
    /// Without `path` the file is `~/.dsmigrate/dsmigrate.toml`. A missing
    /// file is created from a commented template and loads as empty.
    pub fn new(path: &Option<String>) -> Result<MigrateConfig> {
        let home_dir = dirs::home_dir()
            .and_then(|h| h.to_str().map(str::to_owned))
            .ok_or_else(|| anyhow!("Could not determine home directory"))?;

        let file = match path {
            Some(p) => PathBuf::from(p),
            None => PathBuf::from(format!("{}/.dsmigrate/dsmigrate.toml", home_dir)),
        };
        write_template_if_missing(&file)?;

        let file_str = file
            .to_str()
            .ok_or_else(|| anyhow!("Config path {} is not valid UTF-8", file.display()))?;

        let settings = Config::builder()
            .add_source(config::File::new(file_str, config::FileFormat::Toml))
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()
            .with_context(|| format!("Failed to load configuration from {}", file_str))?
            .try_deserialize::<HashMap<String, String>>()
            .context("Failed to deserialize configuration")?;

        Self::from_map(&settings, &home_dir)
    }

    /// Build a configuration from flattened key/value settings
    fn from_map(config: &HashMap<String, String>, home_dir: &str) -> Result<MigrateConfig> {
        let repo_path = match config.get("repo_path") {
            Some(p) => expand_home(p, home_dir),
            None => format!("{}/.dsmigrate", home_dir),
        };

        let testnet = match config.get("testnet") {
            Some(v) => parse_bool(v).ok_or_else(|| anyhow!("Invalid value for testnet: '{}'", v))?,
            None => false,
        };

        let db_password = config.get("db_password").cloned().unwrap_or_default();

        Ok(MigrateConfig {
            repo_path,
            network: NetworkMode::from_testnet(testnet),
            db_password,
        })
    }

    /// Get the path to the datastore file being migrated
    pub fn datastore_path(&self) -> PathBuf {
        datastore_path(Path::new(&self.repo_path), self.network)
    }

    /// Get the path to the repository version file
    pub fn repover_path(&self) -> PathBuf {
        Path::new(&self.repo_path).join(REPOVER_FILE)
    }

    /// Build the migration context for this repository
    pub fn to_context(&self) -> MigrationContext {
        MigrationContext::new(&self.repo_path, &self.db_password, self.network)
    }

    /// Display configuration summary
    pub fn summary(&self) -> String {
        let lines = [
            format!("Repository:         {}", self.repo_path),
            format!("Network:            {}", self.network),
            format!("Datastore:          {}", self.datastore_path().display()),
            format!("Version File:       {}", self.repover_path().display()),
            format!(
                "Encrypted:          {}",
                if self.db_password.is_empty() { "no" } else { "yes" }
            ),
        ];
        lines.join("\n")
    }

    /// Get the config file path
    pub fn config_file_path() -> String {
        let home_dir = dirs::home_dir()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|| "~".to_string());
        format!("{}/.dsmigrate/dsmigrate.toml", home_dir)
    }
}

fn write_template_if_missing(file: &Path) -> Result<()> {
    if file.exists() {
        return Ok(());
    }
    if let Some(dir) = file.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Unable to create directory {}", dir.display()))?;
    }
    std::fs::write(file, EMPTY_CONFIG)
        .with_context(|| format!("Unable to create config file {}", file.display()))
}

fn expand_home(path: &str, home_dir: &str) -> String {
    match path.strip_prefix("~") {
        Some(rest) => format!("{}{}", home_dir, rest),
        None => path.to_string(),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
