use serde::{Deserialize, Serialize};

/// Storage backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    #[default]
    Memory,
    File,
    Sql,
    Redis,
}

impl DbType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbType::Memory => "memory",
            DbType::File => "file",
            DbType::Sql => "sql",
            DbType::Redis => "redis",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(rename = "type", default)]
    pub db_type: DbType,

    /// Directory of per-basket JSON documents (`file` backend).
    #[serde(default = "default_directory")]
    pub directory: String,

    /// SQLite database file (`sql` backend).
    #[serde(default = "default_file")]
    pub file: String,

    /// SQLite path overriding `file`, e.g. `:memory:`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub connection: String,

    #[serde(default)]
    pub redis: RedisConfig,
}

fn default_directory() -> String {
    "./baskets".to_string()
}

fn default_file() -> String {
    "./baskets.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: DbType::default(),
            directory: default_directory(),
            file: default_file(),
            connection: String::new(),
            redis: RedisConfig::default(),
        }
    }
}

impl DatabaseConfig {
    pub fn sql_path(&self) -> &str {
        if self.connection.is_empty() {
            &self.file
        } else {
            &self.connection
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_redis_key_prefix")]
    pub key_prefix: String,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_redis_pool_size() -> u32 {
    8
}

fn default_redis_key_prefix() -> String {
    "rbaskets:".to_string()
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            key_prefix: default_redis_key_prefix(),
        }
    }
}
