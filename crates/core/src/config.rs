use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{chat::TWITCH_API_URL, error::ConfigError};

pub const CLIENT_ID_ENV: &str = "TWITCH_CLIENT_ID";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
}

/// Get the directory holding vodchat settings
pub fn get_config_dir() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("vodchat"))
        .ok_or(ConfigError::NoConfigDir)
}

pub fn get_settings_path() -> Result<PathBuf, ConfigError> {
    Ok(get_config_dir()?.join("settings.json"))
}

impl Settings {
    /// Settings from the default location, with environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Self::load_from(&get_settings_path()?)?;
        Ok(settings.with_client_id_override(std::env::var(CLIENT_ID_ENV).ok()))
    }

    /// A missing file yields default settings.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_slice(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = get_settings_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_vec_pretty(self)?;
        let write = |p: &Path| -> std::io::Result<()> {
            if let Some(parent) = p.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(p, json)
        };
        write(path).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// A non-empty override replaces the stored client id.
    pub fn with_client_id_override(mut self, client_id: Option<String>) -> Self {
        if let Some(id) = client_id.filter(|id| !id.trim().is_empty()) {
            self.client_id = Some(id);
        }
        self
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    pub fn api_base_url(&self) -> &str {
        self.api_base_url.as_deref().unwrap_or(TWITCH_API_URL)
    }
}
