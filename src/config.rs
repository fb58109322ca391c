use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub webui: WebUiConfig,

    pub replicate: ReplicateConfig,

    pub generation: GenerationConfig,

    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Directory where decoded PNGs are written and served from.
    pub output_path: String,

    /// Directory containing the static frontend, served as the fallback route.
    pub static_path: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/easel.db".to_string(),
            log_level: "info".to_string(),
            output_path: "outputs".to_string(),
            static_path: "web".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// Upper bound for request bodies, generous enough for init images.
    pub max_upload_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            cors_allowed_origins: vec!["*".to_string()],
            max_upload_mb: 25,
        }
    }
}

/// Connection settings for a locally running Stable Diffusion WebUI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebUiConfig {
    pub url: String,

    /// Request timeout in seconds (default: 120, diffusion is slow)
    pub request_timeout_seconds: u64,

    pub default_sampler: String,
}

impl Default for WebUiConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:7861".to_string(),
            request_timeout_seconds: 120,
            default_sampler: "DPM++ 2M Karras".to_string(),
        }
    }
}

/// Settings for the Replicate.com prediction API.
///
/// The token is usually supplied via the `REPLICATE_API_TOKEN` environment
/// variable rather than the config file; `Config::load` applies that overlay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicateConfig {
    pub api_base: String,

    #[serde(skip_serializing)]
    pub api_token: String,

    /// Pinned SDXL model version for image generation.
    pub sdxl_version: String,

    /// Pinned BLIP model version for image captioning.
    pub blip_version: String,

    pub request_timeout_seconds: u64,

    pub poll_interval_seconds: u64,

    /// Hard cap on prediction polling attempts before giving up.
    pub max_poll_attempts: u32,

    pub caption_poll_interval_seconds: u64,

    pub caption_max_poll_attempts: u32,
}

impl Default for ReplicateConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.replicate.com/v1".to_string(),
            api_token: String::new(),
            sdxl_version: "39ed52f2a78e934b3ba6e2a89f5b1c712de7dfea535525255b1aa35c5565e08b"
                .to_string(),
            blip_version: "2e1dddc8621f72155f24cf2e0adbde548458d3cab9f00c0139eea840d0ac4746"
                .to_string(),
            request_timeout_seconds: 120,
            poll_interval_seconds: 2,
            max_poll_attempts: 60,
            caption_poll_interval_seconds: 1,
            caption_max_poll_attempts: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Which backend `/api/generate` forwards to: "webui" or "replicate".
    pub backend: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            backend: "webui".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations) - higher = more CPU work
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,

    pub min_password_length: usize,

    /// How long an issued session token stays valid.
    pub session_ttl_days: i64,

    /// Interval for the background sweep that deletes expired sessions.
    pub session_sweep_minutes: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
            min_password_length: 6,
            session_ttl_days: 7,
            session_sweep_minutes: 60,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            webui: WebUiConfig::default(),
            replicate: ReplicateConfig::default(),
            generation: GenerationConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        let mut config = None;
        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                config = Some(Self::load_from_path(path)?);
                break;
            }
        }

        let mut config = config.unwrap_or_else(|| {
            info!("No config file found, using defaults");
            Self::default()
        });

        if config.replicate.api_token.is_empty()
            && let Ok(token) = std::env::var("REPLICATE_API_TOKEN")
            && !token.trim().is_empty()
        {
            config.replicate.api_token = token.trim().to_string();
        }

        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("easel").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".easel").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self.generation.backend.as_str() {
            "webui" => {
                if self.webui.url.is_empty() {
                    anyhow::bail!("WebUI URL cannot be empty when backend is 'webui'");
                }
            }
            "replicate" => {}
            other => anyhow::bail!("Unknown generation backend '{other}' (use webui or replicate)"),
        }

        if self.security.session_ttl_days <= 0 {
            anyhow::bail!("Session TTL must be at least one day");
        }

        if self.security.min_password_length < 4 {
            anyhow::bail!("Minimum password length must be at least 4");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.generation.backend, "webui");
        assert_eq!(config.webui.url, "http://127.0.0.1:7861");
        assert_eq!(config.replicate.max_poll_attempts, 60);
        assert_eq!(config.security.session_ttl_days, 7);
        config.validate().unwrap();
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[webui]"));
        assert!(toml_str.contains("[security]"));
        // The token is secret and must never be written back out.
        assert!(!toml_str.contains("api_token"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [generation]
            backend = "replicate"

            [security]
            session_ttl_days = 1
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.generation.backend, "replicate");
        assert_eq!(config.security.session_ttl_days, 1);

        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_validate_rejects_unknown_backend() {
        let mut config = Config::default();
        config.generation.backend = "dalle".to_string();
        assert!(config.validate().is_err());
    }
}
