//! Application configuration for SiteScribe.
//!
//! User config lives at `~/.sitescribe/sitescribe.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SiteScribeError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "sitescribe.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".sitescribe";

// ---------------------------------------------------------------------------
// Config structs (matching sitescribe.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Generation backend settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// External capability servers.
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default output directory for generated documents and stores.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Maximum number of pages collected per crawl.
    #[serde(default = "default_crawl_limit")]
    pub crawl_limit: usize,

    /// Concurrent in-flight page fetches.
    #[serde(default = "default_crawl_concurrency")]
    pub crawl_concurrency: usize,

    /// Per-fetch timeout in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Output language for generated documents.
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            crawl_limit: default_crawl_limit(),
            crawl_concurrency: default_crawl_concurrency(),
            fetch_timeout_secs: default_fetch_timeout(),
            language: default_language(),
        }
    }
}

fn default_output_dir() -> String {
    "~/sitescribe-out".into()
}
fn default_crawl_limit() -> usize {
    30
}
fn default_crawl_concurrency() -> usize {
    4
}
fn default_fetch_timeout() -> u64 {
    30
}
fn default_language() -> String {
    "en".into()
}

/// `[backend]` section — the generation bridge subprocess.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Bridge command (e.g., "bun").
    #[serde(default = "default_bridge_cmd")]
    pub bridge_cmd: String,

    /// Bridge script path.
    #[serde(default = "default_bridge_script")]
    pub bridge_script: String,

    /// Working directory for the bridge subprocess.
    #[serde(default = "default_working_dir")]
    pub working_dir: String,

    /// Model identifier passed through to the bridge.
    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Maximum attempts for a transiently failing generation call.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay in milliseconds between retries.
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            bridge_cmd: default_bridge_cmd(),
            bridge_script: default_bridge_script(),
            working_dir: default_working_dir(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            max_attempts: default_max_attempts(),
            retry_base_ms: default_retry_base_ms(),
        }
    }
}

fn default_bridge_cmd() -> String {
    "bun".into()
}
fn default_bridge_script() -> String {
    "packages/ts/generation-provider/src/bridge.ts".into()
}
fn default_working_dir() -> String {
    ".".into()
}
fn default_model() -> String {
    "gpt-4.1".into()
}
fn default_api_key_env() -> String {
    "SITESCRIBE_API_KEY".into()
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_base_ms() -> u64 {
    500
}

/// Transport kind for an external capability server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServerKind {
    /// Spawned child process speaking JSON lines over stdio.
    LocalProcess,
    /// HTTP endpoint advertising its tools at `GET {url}/tools`.
    RemoteEndpoint,
}

/// `[[servers]]` entry — one external capability server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Unique server name, used in logs and capability payloads.
    pub name: String,

    /// Transport kind.
    pub kind: ServerKind,

    /// Command to spawn (local-process only).
    #[serde(default)]
    pub command: Option<String>,

    /// Arguments for the command (local-process only).
    #[serde(default)]
    pub args: Vec<String>,

    /// Base URL (remote-endpoint only).
    #[serde(default)]
    pub url: Option<String>,

    /// Disabled servers are skipped at instantiation.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.sitescribe/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SiteScribeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.sitescribe/sitescribe.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SiteScribeError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| SiteScribeError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SiteScribeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SiteScribeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SiteScribeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the backend API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.backend.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(()),
        _ => Err(SiteScribeError::config(format!(
            "generation API key not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("output_dir"));
        assert!(toml_str.contains("SITESCRIBE_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.crawl_limit, 30);
        assert_eq!(parsed.defaults.crawl_concurrency, 4);
        assert_eq!(parsed.backend.max_attempts, 3);
    }

    #[test]
    fn config_with_servers() {
        let toml_str = r#"
[defaults]
crawl_limit = 10

[[servers]]
name = "docs-search"
kind = "local-process"
command = "bun"
args = ["run", "server.ts"]

[[servers]]
name = "web-archive"
kind = "remote-endpoint"
url = "https://archive.example.com/mcp"
enabled = false
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.crawl_limit, 10);
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.servers[0].kind, ServerKind::LocalProcess);
        assert!(config.servers[0].enabled);
        assert_eq!(config.servers[1].kind, ServerKind::RemoteEndpoint);
        assert!(!config.servers[1].enabled);
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.backend.api_key_env = "SS_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
