//! Process configuration, read once at startup from `DUKA_*`
//! environment variables.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use duka_sync::{DEFAULT_MIN_SYNC_INTERVAL, DEFAULT_SYNC_INTERVAL};

/// Everything the binary needs to know about its environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database file. Parent directories are created on open.
    pub database_path: PathBuf,
    /// Base URL of the Supabase project.
    pub supabase_url: String,
    /// API key sent with every backend call.
    pub supabase_key: String,
    /// Storage bucket holding product images.
    pub storage_bucket: String,
    /// Period of the background sync tick.
    pub sync_interval: Duration,
    /// Minimum spacing between sync cycles; rapid triggers within it
    /// are dropped.
    pub debounce: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let database_path = std::env::var("DUKA_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_database_path());

        let supabase_url = std::env::var("DUKA_SUPABASE_URL").unwrap_or_else(|_| {
            warn!("DUKA_SUPABASE_URL not set; using the local dev stack");
            "http://127.0.0.1:54321".to_string()
        });

        let supabase_key = std::env::var("DUKA_SUPABASE_KEY").unwrap_or_else(|_| {
            warn!("DUKA_SUPABASE_KEY not set; using an insecure dev default");
            "dev-anon-key".to_string()
        });

        let storage_bucket = std::env::var("DUKA_STORAGE_BUCKET")
            .unwrap_or_else(|_| "product-images".to_string());

        let sync_interval = duration_var("DUKA_SYNC_INTERVAL_SECS", DEFAULT_SYNC_INTERVAL);
        let debounce = duration_var("DUKA_DEBOUNCE_SECS", DEFAULT_MIN_SYNC_INTERVAL);

        Self {
            database_path,
            supabase_url,
            supabase_key,
            storage_bucket,
            sync_interval,
            debounce,
        }
    }
}

fn duration_var(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

/// `{app_data_dir}/duka/duka.db`, falling back to `~/.local/share`.
fn default_database_path() -> PathBuf {
    let base = dirs::data_dir()
        .or_else(|| {
            dirs::home_dir().map(|mut home| {
                home.push(".local");
                home.push("share");
                home
            })
        })
        .unwrap_or_else(|| PathBuf::from("."));

    base.join("duka").join("duka.db")
}
