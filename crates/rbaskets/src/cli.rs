use crate::config::{normalize_prefix, DbType, ServerConfig, ServiceMode};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Collect, inspect and forward HTTP requests
#[derive(Parser, Debug)]
#[command(name = "rbaskets")]
#[command(version, about)]
pub struct Args {
    /// YAML configuration file; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// HTTP service port
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// HTTP listen address
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Initial basket capacity
    #[arg(long)]
    pub size: Option<usize>,

    /// Maximum allowed basket capacity
    #[arg(long)]
    pub maxsize: Option<usize>,

    /// Default page size
    #[arg(long)]
    pub page: Option<usize>,

    /// Master token, generated when absent
    #[arg(long)]
    pub token: Option<String>,

    /// Baskets storage type
    #[arg(long, value_enum)]
    pub db: Option<DbType>,

    /// Database location, only applicable to the sql backend
    #[arg(long)]
    pub file: Option<String>,

    /// Directory of basket files, only applicable to the file backend
    #[arg(long)]
    pub dir: Option<String>,

    /// Database connection string for the sql backend (a SQLite path) or
    /// the redis backend (a redis:// URL)
    #[arg(long)]
    pub conn: Option<String>,

    /// Service URL path prefix
    #[arg(long)]
    pub prefix: Option<String>,

    /// Service mode
    #[arg(long, value_enum)]
    pub mode: Option<ServiceMode>,

    /// Basket to create at startup when missing (repeatable)
    #[arg(long = "basket")]
    pub baskets: Vec<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Args {
    /// Loads the configuration file, if any, and applies the flags on top.
    pub fn into_config(self) -> Result<ServerConfig, anyhow::Error> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };

        if let Some(port) = self.port {
            config.listen.port = port;
        }
        if let Some(listen) = self.listen {
            config.listen.address = listen;
        }
        if let Some(size) = self.size {
            config.baskets.init_capacity = size;
        }
        if let Some(maxsize) = self.maxsize {
            config.baskets.max_capacity = maxsize;
        }
        if let Some(page) = self.page {
            config.baskets.page_size = page;
        }
        if let Some(token) = self.token {
            config.service.master_token = token;
        }
        if let Some(db) = self.db {
            config.database.db_type = db;
        }
        if let Some(file) = self.file {
            config.database.file = file;
        }
        if let Some(dir) = self.dir {
            config.database.directory = dir;
        }
        if let Some(conn) = self.conn {
            match config.database.db_type {
                DbType::Redis => config.database.redis.url = conn,
                _ => config.database.connection = conn,
            }
        }
        if let Some(prefix) = self.prefix {
            config.service.path_prefix = normalize_prefix(&prefix);
        }
        if let Some(mode) = self.mode {
            config.service.mode = mode;
        }
        for name in self.baskets {
            if !config.baskets.auto_create.contains(&name) {
                config.baskets.auto_create.push(name);
            }
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    #[serial]
    fn test_defaults() {
        std::env::remove_var("PORT");
        let config = Args::parse_from(["rbaskets"]).into_config().unwrap();
        assert_eq!(config.listen.port, 55555);
        assert_eq!(config.listen.address, "127.0.0.1");
        assert_eq!(config.baskets.init_capacity, 200);
        assert_eq!(config.database.db_type, DbType::Memory);
        assert_eq!(config.service.mode, ServiceMode::Public);
    }

    #[test]
    #[serial]
    fn test_port_from_env() {
        std::env::set_var("PORT", "8099");
        let args = Args::parse_from(["rbaskets"]);
        std::env::remove_var("PORT");
        assert_eq!(args.port, Some(8099));
    }

    #[test]
    #[serial]
    fn test_flags_override_file() {
        std::env::remove_var("PORT");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "listen:\n  port: 7000\nbaskets:\n  init_capacity: 50\n  auto_create: [first]\nservice:\n  path_prefix: hooks"
        )
        .unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let config = Args::parse_from([
            "rbaskets",
            "--config",
            &path,
            "-p",
            "7001",
            "--mode",
            "restricted",
            "--db",
            "sql",
            "--conn",
            ":memory:",
            "--basket",
            "second",
            "--basket",
            "first",
        ])
        .into_config()
        .unwrap();

        assert_eq!(config.listen.port, 7001);
        assert_eq!(config.baskets.init_capacity, 50);
        assert_eq!(config.service.path_prefix, "/hooks");
        assert_eq!(config.service.mode, ServiceMode::Restricted);
        assert_eq!(config.database.db_type, DbType::Sql);
        assert_eq!(config.database.sql_path(), ":memory:");
        assert_eq!(config.baskets.auto_create, vec!["first", "second"]);
    }

    #[test]
    #[serial]
    fn test_invalid_capacity_rejected() {
        std::env::remove_var("PORT");
        let result = Args::parse_from(["rbaskets", "--size", "500", "--maxsize", "100"]).into_config();
        assert!(result.is_err());
    }
}
