use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use sieve_core::{SieveError, SieveResult};

const DEFAULT_CONFIG_NAME: &str = "sieve.json";
pub const DEFAULT_SQLITE_NAME: &str = "sieve.sqlite";
pub const DEFAULT_OWNER_TABLE: &str = "archived_records";
pub const DEFAULT_LABEL_TABLE: &str = "archived_record_labels";
pub const DEFAULT_CLUSTER_NAME: &str = "default";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum DatabaseConfig {
    Sqlite { path: Option<String> },
    Postgres { url: String },
    Mysql { url: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub connect_timeout_ms: Option<u64>,
    pub acquire_timeout_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
}

/// Names of the owner and label tables the selector compiler targets.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TablesConfig {
    pub owner_table: String,
    pub label_table: String,
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self {
            owner_table: DEFAULT_OWNER_TABLE.to_string(),
            label_table: DEFAULT_LABEL_TABLE.to_string(),
        }
    }
}

impl TablesConfig {
    pub fn validate(&self) -> SieveResult<()> {
        for name in [&self.owner_table, &self.label_table] {
            if !is_identifier(name) {
                log::warn!("rejecting table name {name:?}");
                return Err(SieveError::invalid(format!(
                    "table name '{name}' must match [A-Za-z_][A-Za-z0-9_]*"
                )));
            }
        }
        if self.owner_table == self.label_table {
            return Err(SieveError::invalid(
                "owner and label tables must be different",
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub name: Option<String>,
    pub scoping: Option<bool>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SieveConfig {
    pub database: DatabaseConfig,
    pub pool: Option<PoolConfig>,
    pub tables: Option<TablesConfig>,
    pub cluster: Option<ClusterConfig>,
}

impl SieveConfig {
    pub fn default_sqlite(path: impl Into<String>) -> Self {
        Self {
            database: DatabaseConfig::Sqlite {
                path: Some(path.into()),
            },
            pool: None,
            tables: Some(TablesConfig::default()),
            cluster: None,
        }
    }

    /// Reads `sieve.json` from `base_dir`, writing a SQLite config with the
    /// default tables there first if it does not exist yet. A relative SQLite
    /// path resolves against `base_dir`.
    pub fn load_or_init(base_dir: &Path) -> SieveResult<Self> {
        fs::create_dir_all(base_dir)
            .map_err(|err| SieveError::storage(format!("create config dir: {err}")))?;
        let config_path = base_dir.join(DEFAULT_CONFIG_NAME);
        if config_path.exists() {
            let raw = fs::read_to_string(&config_path)
                .map_err(|err| SieveError::storage(format!("read config: {err}")))?;
            let config: SieveConfig =
                serde_json::from_str(&raw).map_err(|err| SieveError::invalid(err.to_string()))?;
            config.tables().validate()?;
            return Ok(config);
        }
        let default = SieveConfig::default_sqlite(DEFAULT_SQLITE_NAME);
        let payload = serde_json::to_string_pretty(&default)
            .map_err(|err| SieveError::storage(format!("serialize config: {err}")))?;
        fs::write(&config_path, payload)
            .map_err(|err| SieveError::storage(format!("write config: {err}")))?;
        Ok(default)
    }

    pub fn sqlite_path(&self, base_dir: &Path) -> SieveResult<PathBuf> {
        match &self.database {
            DatabaseConfig::Sqlite { path } => {
                let path = path.clone().unwrap_or_else(|| DEFAULT_SQLITE_NAME.to_string());
                let candidate = PathBuf::from(path);
                if candidate.is_absolute() {
                    Ok(candidate)
                } else {
                    Ok(base_dir.join(candidate))
                }
            }
            _ => Err(SieveError::invalid("config is not sqlite backend")),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self.database {
            DatabaseConfig::Sqlite { .. } => "sqlite",
            DatabaseConfig::Postgres { .. } => "postgres",
            DatabaseConfig::Mysql { .. } => "mysql",
        }
    }

    pub fn connection_url(&self) -> Option<&str> {
        match &self.database {
            DatabaseConfig::Sqlite { .. } => None,
            DatabaseConfig::Postgres { url } | DatabaseConfig::Mysql { url } => Some(url.as_str()),
        }
    }

    pub fn tables(&self) -> TablesConfig {
        self.tables.clone().unwrap_or_default()
    }

    pub fn cluster_name(&self) -> String {
        self.cluster
            .as_ref()
            .and_then(|cluster| cluster.name.clone())
            .unwrap_or_else(|| DEFAULT_CLUSTER_NAME.to_string())
    }

    pub fn cluster_scoping(&self) -> bool {
        self.cluster
            .as_ref()
            .and_then(|cluster| cluster.scoping)
            .unwrap_or(false)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
