use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Route serving local assets by signed token.
pub const ASSETS_PATH: &str = "/v1/assets";
/// Route receiving signed completion callbacks.
pub const CALLBACK_PATH: &str = "/v1/compute/callback";
/// Header carrying the hex HMAC-SHA256 of a callback body.
pub const CALLBACK_SIGNATURE_HEADER: &str = "x-callback-signature";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    S3,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeBackend {
    #[default]
    Runpod,
    Mock,
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string. Unset selects the in-memory store.
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default)]
    pub storage_backend: StorageBackend,

    /// Root directory for the local storage backend
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,

    #[serde(default)]
    pub s3_bucket: String,

    /// S3-compatible endpoint URL
    #[serde(default)]
    pub s3_endpoint: String,

    #[serde(default = "default_s3_region")]
    pub s3_region: String,

    #[serde(default)]
    pub s3_access_key: String,

    #[serde(default)]
    pub s3_secret_key: String,

    #[serde(default)]
    pub s3_prefix: String,

    /// Externally reachable base URL of this service
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// HMAC secret for asset reference tokens
    pub asset_token_secret: String,

    #[serde(default = "default_asset_token_ttl_secs")]
    pub asset_token_ttl_secs: u64,

    #[serde(default = "default_output_url_ttl_secs")]
    pub output_url_ttl_secs: u64,

    #[serde(default)]
    pub compute_backend: ComputeBackend,

    #[serde(default)]
    pub runpod_api_key: String,

    #[serde(default)]
    pub runpod_endpoint_id: String,

    #[serde(default = "default_runpod_api_base")]
    pub runpod_api_base: String,

    #[serde(default = "default_compute_timeout_secs")]
    pub compute_timeout_secs: u64,

    #[serde(default = "default_output_download_timeout_secs")]
    pub output_download_timeout_secs: u64,

    /// HMAC secret shared with the compute backend for callbacks
    pub callback_secret: String,

    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: u64,

    /// Idle wait before the dispatch worker runs a reconciliation sweep
    #[serde(default = "default_dispatch_idle_timeout_ms")]
    pub dispatch_idle_timeout_ms: u64,

    /// Sweep period of the standalone reconciler
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,

    /// Re-enqueue `queued`/`retry` jobs when the server starts
    #[serde(default = "default_true")]
    pub requeue_on_startup: bool,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_data_root() -> PathBuf {
    PathBuf::from("./data")
}

fn default_s3_region() -> String {
    "auto".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_asset_token_ttl_secs() -> u64 {
    900
}

fn default_output_url_ttl_secs() -> u64 {
    3600
}

fn default_runpod_api_base() -> String {
    "https://api.runpod.ai/v2".to_string()
}

fn default_compute_timeout_secs() -> u64 {
    45
}

fn default_output_download_timeout_secs() -> u64 {
    120
}

fn default_max_upload_mb() -> u64 {
    500
}

fn default_dispatch_idle_timeout_ms() -> u64 {
    1000
}

fn default_reconcile_interval_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

/// Immutable settings handed to the job service.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub asset_ttl: Duration,
    pub output_url_ttl: Duration,
    pub max_upload_mb: u64,
    /// Public callback endpoint; `None` leaves completion to the poller.
    pub callback_url: Option<String>,
    pub callback_secret: String,
    pub output_download_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            asset_ttl: Duration::from_secs(default_asset_token_ttl_secs()),
            output_url_ttl: Duration::from_secs(default_output_url_ttl_secs()),
            max_upload_mb: default_max_upload_mb(),
            callback_url: None,
            callback_secret: String::new(),
            output_download_timeout: Duration::from_secs(default_output_download_timeout_secs()),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        let config: Self = envy::from_env()?;
        config.check_secrets()?;
        Ok(config)
    }

    /// An empty HMAC key would sign with a key anyone can reproduce.
    fn check_secrets(&self) -> Result<(), envy::Error> {
        for (name, value) in [
            ("ASSET_TOKEN_SECRET", &self.asset_token_secret),
            ("CALLBACK_SECRET", &self.callback_secret),
        ] {
            if value.trim().is_empty() {
                return Err(envy::Error::Custom(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }

    /// Callback endpoint the compute backend can reach, if any.
    pub fn callback_url(&self) -> Option<String> {
        callback_url_for(&self.public_base_url)
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        let callback_url = self.callback_url();
        OrchestratorSettings {
            asset_ttl: Duration::from_secs(self.asset_token_ttl_secs),
            output_url_ttl: Duration::from_secs(self.output_url_ttl_secs),
            max_upload_mb: self.max_upload_mb,
            callback_secret: self.callback_secret.clone(),
            callback_url,
            output_download_timeout: Duration::from_secs(self.output_download_timeout_secs),
        }
    }

    pub fn compute_timeout(&self) -> Duration {
        Duration::from_secs(self.compute_timeout_secs)
    }

    pub fn dispatch_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_idle_timeout_ms.max(1))
    }
}

/// Host left in sample configuration until a real tunnel is set up.
const PLACEHOLDER_HOST: &str = "your-tunnel-domain.example.com";

/// Loopback, placeholder and empty base URLs are unreachable from the remote backend.
fn callback_url_for(public_base_url: &str) -> Option<String> {
    let raw = public_base_url.trim();
    let unreachable = ["http://localhost", "http://127.0.0.1", "http://0.0.0.0", "https://localhost"];
    if raw.is_empty()
        || raw.contains(PLACEHOLDER_HOST)
        || unreachable.iter().any(|prefix| raw.starts_with(prefix))
    {
        return None;
    }
    Some(format!("{}{}", raw.trim_end_matches('/'), CALLBACK_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_url_requires_public_host() {
        assert_eq!(callback_url_for(""), None);
        assert_eq!(callback_url_for("http://localhost:3000"), None);
        assert_eq!(callback_url_for("http://127.0.0.1:8000/"), None);
        assert_eq!(callback_url_for("https://your-tunnel-domain.example.com"), None);
        assert_eq!(
            callback_url_for("https://media.example.net/").as_deref(),
            Some("https://media.example.net/v1/compute/callback")
        );
    }

    fn config_with_secrets(asset: &str, callback: &str) -> AppConfig {
        let vars = vec![
            ("ASSET_TOKEN_SECRET".to_string(), asset.to_string()),
            ("CALLBACK_SECRET".to_string(), callback.to_string()),
        ];
        envy::from_iter(vars).unwrap()
    }

    #[test]
    fn test_empty_secrets_are_rejected() {
        assert!(config_with_secrets("asset", "callback").check_secrets().is_ok());

        let err = config_with_secrets("", "callback").check_secrets().unwrap_err();
        assert!(err.to_string().contains("ASSET_TOKEN_SECRET"), "{err}");

        let err = config_with_secrets("asset", "  ").check_secrets().unwrap_err();
        assert!(err.to_string().contains("CALLBACK_SECRET"), "{err}");
    }

    #[test]
    fn test_backend_names_deserialize() {
        let s3: StorageBackend = serde_json::from_str("\"s3\"").unwrap();
        assert_eq!(s3, StorageBackend::S3);
        let mock: ComputeBackend = serde_json::from_str("\"mock\"").unwrap();
        assert_eq!(mock, ComputeBackend::Mock);
    }
}
