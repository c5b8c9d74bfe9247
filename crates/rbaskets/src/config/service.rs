use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ServiceMode {
    /// Anyone may create baskets.
    #[default]
    Public,
    /// Creating baskets requires the master token.
    Restricted,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub mode: ServiceMode,

    /// Grants access to every basket and to the list and stats endpoints.
    /// Generated at startup when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub master_token: String,

    /// Mount point of every route, e.g. `/hooks`.
    #[serde(default)]
    pub path_prefix: String,
}

/// Limits on basket sizes and pages.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BasketsConfig {
    #[serde(default = "default_init_capacity")]
    pub init_capacity: usize,
    #[serde(default = "default_max_capacity")]
    pub max_capacity: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Baskets created at startup if missing.
    #[serde(default)]
    pub auto_create: Vec<String>,
}

fn default_init_capacity() -> usize {
    200
}

fn default_max_capacity() -> usize {
    2000
}

fn default_page_size() -> usize {
    20
}

impl Default for BasketsConfig {
    fn default() -> Self {
        Self {
            init_capacity: default_init_capacity(),
            max_capacity: default_max_capacity(),
            page_size: default_page_size(),
            auto_create: Vec::new(),
        }
    }
}

/// Normalizes a mount point to `/segment` form; empty stays empty.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
