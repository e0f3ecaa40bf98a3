//! Environment-sourced configuration (§6 "Configuration environment").
//! `.env`/`.env.local` is loaded once at startup (teacher's `PATCH S1`
//! pattern); everything beyond that is plain env vars, no config file
//! format.

use std::path::PathBuf;
use std::time::Duration;

pub struct Config {
    pub database_url: Option<String>,
    pub working_dir: PathBuf,
    pub max_concurrent_jobs: usize,
    pub connector_timeout: Duration,
    pub default_batch_size: usize,
    pub lineage_endpoint: Option<String>,
    pub connector_registry_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        dotenvy::from_filename(".env.local").ok();

        let working_dir = std::env::var("WORKING_DIR").map(PathBuf::from).unwrap_or_else(|_| std::env::temp_dir().join("elt-sync"));
        let connector_registry_path = std::env::var("CONNECTOR_REGISTRY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| working_dir.join("connectors.json"));

        Config {
            database_url: std::env::var("DATABASE_URL").ok(),
            working_dir,
            max_concurrent_jobs: env_usize("MAX_CONCURRENT_JOBS", 5),
            connector_timeout: Duration::from_secs(env_usize("CONNECTOR_TIMEOUT_SECONDS", 3600) as u64),
            default_batch_size: env_usize("DEFAULT_BATCH_SIZE", elt_db::DEFAULT_BATCH_SIZE),
            lineage_endpoint: std::env::var("LINEAGE_ENDPOINT").ok(),
            connector_registry_path,
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
