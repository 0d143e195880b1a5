use std::env;
use std::path::PathBuf;

use crate::importers::DEFAULT_ARCHIVE_BASE_URL;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub archive_base_url: String,
    pub import_batch_size: usize,
    pub import_temp_dir: Option<PathBuf>,
    pub download_timeout_secs: u64,
    pub download_max_retries: usize,
    pub default_station_id: String,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            archive_base_url: env::var("ARCHIVE_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_ARCHIVE_BASE_URL.to_string()),
            import_batch_size: env::var("IMPORT_BATCH_SIZE")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .ok()
                .filter(|size| *size > 0)
                .unwrap_or(5000),
            import_temp_dir: env::var("IMPORT_TEMP_DIR").ok().map(PathBuf::from),
            download_timeout_secs: env::var("DOWNLOAD_TIMEOUT_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .unwrap_or(60),
            download_max_retries: env::var("DOWNLOAD_MAX_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),
            default_station_id: env::var("DEFAULT_STATION_ID")
                .unwrap_or_else(|_| "41002".to_string()),
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
