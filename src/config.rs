use std::env;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// JSON file of salons and services; an empty catalog when unset.
    pub catalog_path: Option<PathBuf>,
    pub metrics_port: Option<u16>,
    pub compact_threshold: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            bind: var("SALONBOOK_BIND").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: var("SALONBOOK_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            data_dir: var("SALONBOOK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            catalog_path: var("SALONBOOK_CATALOG").map(PathBuf::from),
            metrics_port: var("SALONBOOK_METRICS_PORT").and_then(|v| v.parse().ok()),
            compact_threshold: var("SALONBOOK_COMPACT_THRESHOLD")
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("bookings.wal")
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
