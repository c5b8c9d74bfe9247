//! Server configuration, loaded from YAML and overridable from the command line.

mod database;
mod forward;
mod service;

use crate::basket::{generate_token, validation};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

pub use database::{DatabaseConfig, DbType, RedisConfig};
pub use forward::ForwardConfig;
pub use service::{normalize_prefix, BasketsConfig, ServiceConfig, ServiceMode};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub baskets: BasketsConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub forward: ForwardConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    55555
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
        }
    }
}

impl ListenConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, anyhow::Error> {
        format!("{}:{}", self.address, self.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid listen address '{}': {e}", self.address))
    }
}

/// Request body size limits, in bytes.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_capture_body")]
    pub max_capture_body: usize,
    #[serde(default = "default_max_config_body")]
    pub max_config_body: usize,
    #[serde(default = "default_max_response_body")]
    pub max_response_body: usize,
}

fn default_max_capture_body() -> usize {
    10 * 1024 * 1024
}

fn default_max_config_body() -> usize {
    2 * 1024
}

fn default_max_response_body() -> usize {
    64 * 1024
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_capture_body: default_max_capture_body(),
            max_config_body: default_max_config_body(),
            max_response_body: default_max_response_body(),
        }
    }
}

impl ServerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: ServerConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Canonicalizes values that accept several spellings.
    pub fn normalize(&mut self) {
        self.service.path_prefix = normalize_prefix(&self.service.path_prefix);
    }

    /// Generates a master token when none is configured. Returns the new token.
    pub fn ensure_master_token(&mut self) -> Option<String> {
        if !self.service.master_token.is_empty() {
            return None;
        }
        let token = generate_token();
        self.service.master_token = token.clone();
        Some(token)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        let baskets = &self.baskets;
        if baskets.init_capacity < 1 {
            anyhow::bail!("baskets.init_capacity must be at least 1");
        }
        if baskets.max_capacity < baskets.init_capacity {
            anyhow::bail!(
                "baskets.max_capacity ({}) must not be less than baskets.init_capacity ({})",
                baskets.max_capacity,
                baskets.init_capacity
            );
        }
        if baskets.page_size < 1 {
            anyhow::bail!("baskets.page_size must be at least 1");
        }
        for name in &baskets.auto_create {
            validation::check_name(name)
                .map_err(|e| anyhow::anyhow!("Invalid auto-created basket: {e}"))?;
        }

        let prefix = &self.service.path_prefix;
        if !prefix.is_empty() && prefix.trim_start_matches('/').split('/').any(str::is_empty) {
            anyhow::bail!("service.path_prefix '{prefix}' contains an empty segment");
        }

        match self.database.db_type {
            DbType::File if self.database.directory.is_empty() => {
                anyhow::bail!("database.directory is required for the file backend")
            }
            DbType::Sql if self.database.sql_path().is_empty() => {
                anyhow::bail!("database.file or database.connection is required for the sql backend")
            }
            DbType::Redis if self.database.redis.url.is_empty() => {
                anyhow::bail!("database.redis.url is required for the redis backend")
            }
            _ => {}
        }

        if self.forward.timeout_secs == 0 {
            anyhow::bail!("forward.timeout_secs must be at least 1");
        }
        Ok(())
    }
}
