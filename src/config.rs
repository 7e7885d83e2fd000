use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} missing")]
    Missing(&'static str),
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub url: String,
    pub service_key: String,
    pub bucket: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub bind_addr: String,
    pub jwt_secret: Vec<u8>,
    /// Remote object storage; when absent uploads go to `upload_dir`.
    pub storage: Option<StorageConfig>,
    pub upload_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => raw.parse::<u32>().map_err(|e| ConfigError::Invalid {
                name: "DATABASE_MAX_CONNECTIONS",
                reason: e.to_string(),
            })?,
            None => 10,
        };
        if max_connections == 0 {
            return Err(ConfigError::Invalid {
                name: "DATABASE_MAX_CONNECTIONS",
                reason: "must be at least 1".to_string(),
            });
        }

        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| {
            let port = lookup("PORT").unwrap_or_else(|| "3000".to_string());
            format!("0.0.0.0:{}", port)
        });

        let jwt_secret = lookup("AUTH_JWT_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("AUTH_JWT_SECRET"))?
            .into_bytes();

        let bucket = lookup("STORAGE_BUCKET").unwrap_or_else(|| "resumes".to_string());
        let storage = match (lookup("STORAGE_URL"), lookup("STORAGE_SERVICE_KEY")) {
            (Some(url), Some(service_key)) => Some(StorageConfig {
                url: url.trim_end_matches('/').to_string(),
                service_key,
                bucket,
            }),
            (Some(_), None) => return Err(ConfigError::Missing("STORAGE_SERVICE_KEY")),
            _ => None,
        };

        let upload_dir = lookup("STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./uploads"));

        Ok(Self {
            database_url,
            max_connections,
            bind_addr,
            jwt_secret,
            storage,
            upload_dir,
        })
    }
}
