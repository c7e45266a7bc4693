use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SkillShadowConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding both persisted files. Relative paths resolve against the
    /// working directory.
    pub data_dir: String,
    pub traces_file: String,
    pub index_file: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub cache_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_top_k: usize,
}

impl Default for SkillShadowConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".into(),
            traces_file: "traces.json".into(),
            index_file: "traces.index".into(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_app_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "local".into(),
            model: "all-MiniLM-L6-v2".into(),
            cache_dir,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { default_top_k: 3 }
    }
}

/// Returns `~/.skill-shadow/`
pub fn default_app_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".skill-shadow")
}

/// Returns the default config file path: `~/.skill-shadow/config.toml`
pub fn default_config_path() -> PathBuf {
    default_app_dir().join("config.toml")
}

impl SkillShadowConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            SkillShadowConfig::default()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides (SKILL_SHADOW_DATA_DIR, SKILL_SHADOW_HOST,
    /// SKILL_SHADOW_PORT, SKILL_SHADOW_LOG_LEVEL).
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("SKILL_SHADOW_DATA_DIR") {
            self.storage.data_dir = val;
        }
        if let Ok(val) = std::env::var("SKILL_SHADOW_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("SKILL_SHADOW_PORT") {
            self.server.port = val
                .parse()
                .with_context(|| format!("invalid SKILL_SHADOW_PORT: {val}"))?;
        }
        if let Ok(val) = std::env::var("SKILL_SHADOW_LOG_LEVEL") {
            self.server.log_level = val;
        }
        Ok(())
    }

    pub fn resolved_data_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.data_dir)
    }

    /// Path of the JSON trace store.
    pub fn resolved_traces_path(&self) -> PathBuf {
        self.resolved_data_dir().join(&self.storage.traces_file)
    }

    /// Path of the binary flat vector index.
    pub fn resolved_index_path(&self) -> PathBuf {
        self.resolved_data_dir().join(&self.storage.index_file)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .expect("home directory must exist")
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SkillShadowConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.storage.data_dir, "data");
        assert_eq!(config.retrieval.default_top_k, 3);
        assert_eq!(config.embedding.model, "all-MiniLM-L6-v2");
        assert!(config.embedding.cache_dir.ends_with("models"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"
port = 9100

[storage]
data_dir = "/tmp/shadow"

[retrieval]
default_top_k = 7
"#;
        let config: SkillShadowConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.storage.data_dir, "/tmp/shadow");
        assert_eq!(config.retrieval.default_top_k, 7);
        // defaults still apply for unset fields
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.storage.traces_file, "traces.json");
    }

    #[test]
    fn resolved_paths_join_data_dir() {
        let mut config = SkillShadowConfig::default();
        config.storage.data_dir = "/var/lib/shadow".into();
        assert_eq!(
            config.resolved_traces_path(),
            PathBuf::from("/var/lib/shadow/traces.json")
        );
        assert_eq!(
            config.resolved_index_path(),
            PathBuf::from("/var/lib/shadow/traces.index")
        );
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = SkillShadowConfig::default();
        std::env::set_var("SKILL_SHADOW_DATA_DIR", "/tmp/override");
        std::env::set_var("SKILL_SHADOW_PORT", "9999");
        std::env::set_var("SKILL_SHADOW_LOG_LEVEL", "trace");

        config.apply_env_overrides().unwrap();

        assert_eq!(config.storage.data_dir, "/tmp/override");
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.server.log_level, "trace");

        // Shares the env vars above, so it runs in the same test.
        std::env::set_var("SKILL_SHADOW_PORT", "not-a-port");
        let err = config.apply_env_overrides().unwrap_err();
        assert!(err.to_string().contains("SKILL_SHADOW_PORT"));
        assert_eq!(config.server.port, 9999);

        // Clean up
        std::env::remove_var("SKILL_SHADOW_DATA_DIR");
        std::env::remove_var("SKILL_SHADOW_PORT");
        std::env::remove_var("SKILL_SHADOW_LOG_LEVEL");
    }
}
