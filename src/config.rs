use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
pub const DEFAULT_PROXY_URL: &str = "http://localhost:3000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub backend_url: Option<String>,
    pub proxy_url: Option<String>,
    pub route: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            backend_url: None,
            proxy_url: None,
            route: Some("direct".to_string()),
            timeout_secs: None,
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(config_path, config_content)?;
        Ok(())
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("unid3").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert!(config.backend_url.is_none());
        assert_eq!(config.route.as_deref(), Some("direct"));
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::new();
        config.backend_url = Some("http://kg.example.org:8000".to_string());
        config.timeout_secs = Some(15);
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.backend_url.as_deref(), Some("http://kg.example.org:8000"));
        assert_eq!(loaded.timeout_secs, Some(15));
        assert_eq!(loaded.route.as_deref(), Some("direct"));
    }

    #[test]
    fn unknown_route_string_is_preserved_for_the_caller_to_reject() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"backend_url": null, "proxy_url": null, "route": "carrier-pigeon", "timeout_secs": null}"#).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.route.as_deref(), Some("carrier-pigeon"));
        assert!(crate::backend::Route::from_str("carrier-pigeon").is_none());
    }
}
