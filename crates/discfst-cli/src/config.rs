//! Configuration file support for the discfst CLI.
//!
//! Configuration is stored at `~/.config/discfst/config.toml` (XDG standard)
//! or `~/Library/Application Support/com.discfst.discfst/config.toml` on
//! macOS. Setting `DISCFST_CONFIG_DIR` overrides the directory.
//!
//! # Example configuration
//!
//! ```toml
//! [mount]
//! device_name = "disc"
//! expose_metadata = false
//!
//! [images.zelda]
//! path = "/srv/images/RZDE01.iso"
//! ```
//!
//! # Usage
//!
//! ```bash
//! discfst ls @zelda /0
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use discfst_core::MountOptions;

/// Environment variable overriding the configuration directory.
pub const CONFIG_DIR_ENV: &str = "DISCFST_CONFIG_DIR";

/// Main configuration structure
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Options every mount is made with
    #[serde(default)]
    pub mount: MountOptions,

    /// Named images (aliases)
    #[serde(default)]
    pub images: HashMap<String, ImageConfig>,
}

/// Configuration for a named image
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageConfig {
    /// Path to the disc image file
    pub path: PathBuf,
}

impl Config {
    /// Load configuration from the default path, or return empty config if not found.
    pub fn load() -> Result<Self> {
        let path = config_path()?;

        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.mount.validate()?;
        Ok(config)
    }

    /// Get an image configuration by alias name.
    pub fn get_image(&self, alias: &str) -> Option<&ImageConfig> {
        self.images.get(alias)
    }

    /// List all configured image aliases, sorted.
    pub fn list_image_aliases(&self) -> Vec<&String> {
        let mut aliases: Vec<_> = self.images.keys().collect();
        aliases.sort();
        aliases
    }

    /// Resolve an image path, handling @alias syntax.
    ///
    /// If the argument starts with '@', look it up in the `[images]` table.
    /// Otherwise it is returned as a path unchanged.
    pub fn resolve_image(&self, path_or_alias: &str) -> Result<PathBuf> {
        let Some(alias) = path_or_alias.strip_prefix('@') else {
            return Ok(PathBuf::from(path_or_alias));
        };

        let image = self.get_image(alias).ok_or_else(|| {
            let config_file = config_path().map_or_else(
                |_| "~/.config/discfst/config.toml".to_string(),
                |p| p.display().to_string(),
            );
            let available = self.list_image_aliases();
            if available.is_empty() {
                anyhow::anyhow!(
                    "Unknown image alias '@{alias}'.\n\
                     No image aliases are configured.\n\n\
                     Create a config file at {config_file} with:\n\n\
                     [images.{alias}]\n\
                     path = \"/path/to/disc.iso\""
                )
            } else {
                anyhow::anyhow!(
                    "Unknown image alias '@{alias}'.\n\n\
                     Available aliases: {}\n\n\
                     Add to {config_file} with:\n\n\
                     [images.{alias}]\n\
                     path = \"/path/to/disc.iso\"",
                    available
                        .iter()
                        .map(|a| format!("@{a}"))
                        .collect::<Vec<_>>()
                        .join(", "),
                )
            }
        })?;

        if !image.path.exists() {
            anyhow::bail!(
                "Image path for '@{alias}' does not exist: {}\n\
                 Update the path in your config file.",
                image.path.display()
            );
        }

        Ok(image.path.clone())
    }
}

/// Get the path to the configuration file.
///
/// Uses `DISCFST_CONFIG_DIR` when set, else the XDG config directory on
/// Linux and Application Support on macOS.
pub fn config_path() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return Ok(PathBuf::from(dir).join("config.toml"));
    }

    let base_dirs = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;

    #[cfg(target_os = "macos")]
    {
        let config_dir = base_dirs
            .home_dir()
            .join("Library/Application Support/com.discfst.discfst");
        Ok(config_dir.join("config.toml"))
    }

    #[cfg(not(target_os = "macos"))]
    {
        let config_dir = base_dirs.config_dir().join("discfst");
        Ok(config_dir.join("config.toml"))
    }
}
