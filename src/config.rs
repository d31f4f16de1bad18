use anyhow::{Context, Result, anyhow, bail};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const APP_DIR: &str = ".ringside";
const CONFIG_FILE: &str = "config.json";
pub const MAX_LIST_LIMIT: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_path: PathBuf,
    pub api_host: String,
    pub api_port: u16,
    pub class_start_lead_minutes: i64,
    pub list_limit: usize,
    pub popular_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_root_dir().join("db").join("academy.db"),
            api_host: "127.0.0.1".to_string(),
            api_port: 7870,
            class_start_lead_minutes: 15,
            list_limit: 50,
            popular_limit: 5,
        }
    }
}

impl Config {
    pub fn root_dir() -> Result<PathBuf> {
        Ok(default_root_dir())
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(default_root_dir().join(CONFIG_FILE))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.list_limit = config.list_limit.clamp(1, MAX_LIST_LIMIT);

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;
        set_mode_600(config_path)?;

        Ok(())
    }

    pub fn ensure_bootstrap_files(&self) -> Result<()> {
        let root = Self::root_dir()?;
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create root directory: {}", root.display()))?;

        if let Some(parent) = self.db_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create DB directory: {}", parent.display()))?;
        }

        Ok(())
    }

    /// Clamps a requested page size to the configured default and the hard maximum.
    pub fn list_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.list_limit)
            .clamp(1, MAX_LIST_LIMIT)
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match normalize_config_key(key) {
            "db_path" => {
                if value.trim().is_empty() {
                    bail!("db_path cannot be empty");
                }
                self.db_path = expand_home(value.trim());
            }
            "api_host" => {
                let host = value.trim();
                if host.is_empty() {
                    bail!("api_host cannot be empty");
                }
                self.api_host = host.to_string();
            }
            "api_port" => {
                let port = value
                    .trim()
                    .parse::<u16>()
                    .map_err(|_| anyhow!("api_port must be a number"))?;
                if port == 0 {
                    bail!("api_port must be greater than 0");
                }
                self.api_port = port;
            }
            "class_start_lead_minutes" => {
                let minutes = value
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| anyhow!("class_start_lead_minutes must be a number"))?;
                if !(0..=240).contains(&minutes) {
                    bail!("class_start_lead_minutes must be between 0 and 240");
                }
                self.class_start_lead_minutes = minutes;
            }
            "list_limit" => {
                self.list_limit = value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| anyhow!("list_limit must be a number"))?
                    .clamp(1, MAX_LIST_LIMIT);
            }
            "popular_limit" => {
                self.popular_limit = value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| anyhow!("popular_limit must be a number"))?
                    .max(1);
            }
            _ => {
                bail!(
                    "Unsupported config key: {key}. Supported keys: db_path|db.path, api_host|api.host, api_port|api.port, class_start_lead_minutes|classes.start_lead_minutes, list_limit|api.list_limit, popular_limit|stats.popular_limit"
                );
            }
        }

        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Option<String> {
        match normalize_config_key(key) {
            "db_path" => Some(self.db_path.display().to_string()),
            "api_host" => Some(self.api_host.clone()),
            "api_port" => Some(self.api_port.to_string()),
            "class_start_lead_minutes" => Some(self.class_start_lead_minutes.to_string()),
            "list_limit" => Some(self.list_limit.to_string()),
            "popular_limit" => Some(self.popular_limit.to_string()),
            _ => None,
        }
    }
}

fn normalize_config_key(key: &str) -> &str {
    match key {
        "db_path" | "db.path" => "db_path",
        "api_host" | "api.host" => "api_host",
        "api_port" | "api.port" => "api_port",
        "class_start_lead_minutes" | "classes.start_lead_minutes" => "class_start_lead_minutes",
        "list_limit" | "api.list_limit" => "list_limit",
        "popular_limit" | "stats.popular_limit" => "popular_limit",
        _ => key,
    }
}

pub fn expand_home(raw: &str) -> PathBuf {
    raw.strip_prefix("~/")
        .and_then(|stripped| home_dir().map(|home| home.join(stripped)))
        .unwrap_or_else(|| PathBuf::from(raw))
}

fn default_root_dir() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn set_mode_600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set file permissions: {}", path.display()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Config, MAX_LIST_LIMIT};

    #[test]
    fn dotted_aliases_resolve_to_the_same_key() {
        let mut config = Config::default();
        config.set_value("api.port", "9001").expect("port set");
        config
            .set_value("classes.start_lead_minutes", "20")
            .expect("lead set");

        assert_eq!(config.get_value("api_port").as_deref(), Some("9001"));
        assert_eq!(config.class_start_lead_minutes, 20);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = Config::default();
        assert!(config.set_value("api_port", "seventy").is_err());
        assert!(config.set_value("api_port", "0").is_err());
        assert!(config.set_value("class_start_lead_minutes", "-5").is_err());

        let error = config
            .set_value("retention.days", "3")
            .expect_err("unknown key");
        assert!(error.to_string().contains("Supported keys"));
    }

    #[test]
    fn list_limit_is_clamped() {
        let mut config = Config::default();
        config.set_value("list_limit", "5000").expect("limit set");
        assert_eq!(config.list_limit, MAX_LIST_LIMIT);
        assert_eq!(config.list_limit(Some(0)), 1);
        assert_eq!(config.list_limit(None), MAX_LIST_LIMIT);
    }

    #[test]
    fn saved_config_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("config.json");
        let mut config = Config::default();
        config.set_value("api.host", "0.0.0.0").expect("host set");

        config.save_to(&path).expect("saved");
        let loaded = Config::load_from(&path).expect("loaded");
        assert_eq!(loaded.api_host, "0.0.0.0");
        assert_eq!(loaded.api_port, config.api_port);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).expect("metadata").permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"api_port": 8123}"#).expect("written");

        let loaded = Config::load_from(&path).expect("loaded");
        assert_eq!(loaded.api_port, 8123);
        assert_eq!(loaded.class_start_lead_minutes, 15);
        assert_eq!(loaded.popular_limit, 5);
    }
}
