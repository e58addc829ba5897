use serde::Deserialize;
use std::path::{Path, PathBuf};

use familycloud_common::documents::DEFAULT_UPLOADER;

use crate::drime::VendorPaths;

pub const DEFAULT_ROOT_FOLDER: &str = "FamilyCloud";
pub const DEFAULT_REMOTE_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;
pub const DEFAULT_LOCAL_MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;
pub const DEFAULT_LOCAL_CAPACITY: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct AlbumConfig {
    /// Label recorded as `uploadedBy` on new photos.
    #[serde(default = "default_user")]
    pub user: String,
    pub data_dir: PathBuf,
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
    #[serde(default)]
    pub local: LocalConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    pub api_base_url: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_root_folder")]
    pub root_folder: String,
    #[serde(default = "default_remote_max_file_size")]
    pub max_file_size: u64,
    #[serde(default)]
    pub paths: VendorPaths,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalConfig {
    #[serde(default = "default_local_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_local_capacity")]
    pub capacity: u64,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_LOCAL_MAX_FILE_SIZE,
            capacity: DEFAULT_LOCAL_CAPACITY,
        }
    }
}

fn default_user() -> String {
    DEFAULT_UPLOADER.to_string()
}

fn default_root_folder() -> String {
    DEFAULT_ROOT_FOLDER.to_string()
}

fn default_remote_max_file_size() -> u64 {
    DEFAULT_REMOTE_MAX_FILE_SIZE
}

fn default_local_max_file_size() -> u64 {
    DEFAULT_LOCAL_MAX_FILE_SIZE
}

fn default_local_capacity() -> u64 {
    DEFAULT_LOCAL_CAPACITY
}

impl AlbumConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        let mut config: AlbumConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// `FAMILYCLOUD_ACCESS_TOKEN` and `FAMILYCLOUD_USER` override the file.
    fn apply_env(&mut self) {
        if let Ok(user) = std::env::var("FAMILYCLOUD_USER") {
            if !user.trim().is_empty() {
                self.user = user.trim().to_string();
            }
        }
        if let (Some(remote), Ok(token)) = (self.remote.as_mut(), std::env::var("FAMILYCLOUD_ACCESS_TOKEN")) {
            if !token.is_empty() {
                remote.access_token = token;
            }
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.user.trim().is_empty() {
            anyhow::bail!("user must not be empty");
        }
        if self.data_dir.as_os_str().is_empty() {
            anyhow::bail!("data_dir must not be empty");
        }
        if self.local.max_file_size == 0 {
            anyhow::bail!("local.max_file_size must be positive");
        }
        if self.local.capacity < self.local.max_file_size {
            anyhow::bail!("local.capacity must be at least local.max_file_size");
        }
        if let Some(remote) = &self.remote {
            if !remote.api_base_url.starts_with("http://") && !remote.api_base_url.starts_with("https://") {
                anyhow::bail!("remote.api_base_url must be an http(s) URL: {}", remote.api_base_url);
            }
            if remote.access_token.is_empty() {
                anyhow::bail!("remote.access_token must not be empty (or set FAMILYCLOUD_ACCESS_TOKEN)");
            }
            if remote.root_folder.trim().is_empty() {
                anyhow::bail!("remote.root_folder must not be empty");
            }
        }
        Ok(())
    }
}
