use std::{fs, path::{Path, PathBuf}, time::Duration};

use anyhow::{anyhow, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::camera::LensFacing;

/// Environment variable that points the desktop build at another config file.
pub const CONFIG_ENV: &str = "SNAP_CAMERA_CONFIG";
pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name of the media sub directory photos are written into
    pub app_name: String,
    pub preview_width: u32,
    pub preview_height: u32,
    /// How long the captured photo stays on screen
    pub photo_display_ms: u64,
    /// How long a transient message stays on screen
    pub message_display_ms: u64,
    /// How long a permission request may go without the dialog taking
    /// focus before its result is read anyway
    pub permission_settle_ms: u64,
    pub jpeg_quality: u8,
    pub default_lens: LensFacing,
    /// Desktop webcam index used as the back camera
    pub back_device: usize,
    /// Desktop webcam index used as the front camera
    pub front_device: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "SnapCamera".to_string(),
            preview_width: 1280,
            preview_height: 720,
            photo_display_ms: 2000,
            message_display_ms: 3500,
            permission_settle_ms: 2000,
            jpeg_quality: 90,
            default_lens: LensFacing::Back,
            back_device: 0,
            front_device: 1,
        }
    }
}

impl Config {
    pub fn photo_display(&self) -> Duration {
        Duration::from_millis(self.photo_display_ms)
    }

    pub fn message_display(&self) -> Duration {
        Duration::from_millis(self.message_display_ms)
    }

    pub fn permission_settle(&self) -> Duration {
        Duration::from_millis(self.permission_settle_ms)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|err| anyhow!("failed to read {}: {err}", path.display()))?;
        let mut config: Config = serde_json::from_str(&text)
            .map_err(|err| anyhow!("failed to parse {}: {err}", path.display()))?;
        config.jpeg_quality = config.jpeg_quality.clamp(1, 100);
        Ok(config)
    }

    /// Missing file means defaults, a broken one is reported and ignored.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            info!("no config at {}, using defaults", path.display());
            return Config::default();
        }
        match Config::load(path) {
            Ok(config) => {
                info!("config loaded from {}", path.display());
                config
            }
            Err(err) => {
                warn!("{err:?}, using defaults");
                Config::default()
            }
        }
    }

    /// `$SNAP_CAMERA_CONFIG`, else `<config dir>/snap-camera/config.json`.
    #[cfg(not(target_os = "android"))]
    pub fn desktop_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("snap-camera")
            .join(CONFIG_FILE_NAME)
    }

    pub fn in_dir(dir: &Path) -> PathBuf {
        dir.join(CONFIG_FILE_NAME)
    }
}
