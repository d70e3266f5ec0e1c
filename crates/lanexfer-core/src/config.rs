use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::protocol::TransferOptions;
use crate::saver::{SaverOptions, SidecarExtensions};

/// Limits for the push/pull services (optional `[service]` section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Cap on lanes a push client may request (0 = unlimited).
    pub max_lanes: usize,
    /// Cap on per-lane cache bytes a push client may request (0 = unlimited).
    pub max_cache_bytes: u64,
    /// Sessions and handles untouched for this long are closed by the reaper.
    pub idle_timeout_secs: u64,
    /// Reject paths that resolve outside the service root.
    pub confine_to_root: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_lanes: 0,
            max_cache_bytes: 0,
            idle_timeout_secs: 60,
            confine_to_root: true,
        }
    }
}

impl ServiceConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Apply `max_lanes` to a requested lane count.
    pub fn cap_lanes(&self, requested: usize) -> usize {
        match self.max_lanes {
            0 => requested,
            max => requested.min(max),
        }
    }

    /// Apply `max_cache_bytes` to a requested per-lane cache size.
    pub fn cap_cache(&self, requested: u64) -> u64 {
        match self.max_cache_bytes {
            0 => requested,
            max => requested.min(max),
        }
    }
}

/// Global configuration loaded from `~/.config/lanexfer/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XferConfig {
    /// Concurrent lanes per transfer.
    pub lanes: usize,
    /// Bytes each lane reads per round trip.
    pub block_size: u64,
    /// Bytes a lane buffers before committing to the temp file.
    pub cache_bytes_per_lane: u64,
    /// Grow the temp file on demand instead of pre-allocating it.
    pub auto_expand: bool,
    /// Continue from an existing sidecar.
    pub resume: bool,
    /// Replace an existing destination.
    pub overwrite: bool,
    /// Hash the source and verify the destination at finalize.
    pub verify_checksum: bool,
    /// Optional artifact extensions; defaults to tmp/info/lock.
    #[serde(default)]
    pub extensions: Option<SidecarExtensions>,
    #[serde(default)]
    pub service: Option<ServiceConfig>,
}

impl Default for XferConfig {
    fn default() -> Self {
        Self {
            lanes: 4,
            block_size: 64 * 1024,
            cache_bytes_per_lane: 1024 * 1024,
            auto_expand: false,
            resume: true,
            overwrite: false,
            verify_checksum: true,
            extensions: None,
            service: None,
        }
    }
}

impl XferConfig {
    pub fn saver_options(&self) -> SaverOptions {
        SaverOptions {
            resume: self.resume,
            overwrite: self.overwrite,
            lanes: self.lanes.max(1),
            block_size: self.block_size.max(1),
            cache_bytes_per_lane: self.cache_bytes_per_lane.max(1),
            auto_expand: self.auto_expand,
            extensions: self.extensions.clone().unwrap_or_default(),
            ..SaverOptions::default()
        }
    }

    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            saver: self.saver_options(),
            verify_checksum: self.verify_checksum,
        }
    }

    pub fn service(&self) -> ServiceConfig {
        self.service.clone().unwrap_or_default()
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("lanexfer")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<XferConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = XferConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: XferConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = XferConfig::default();
        assert_eq!(cfg.lanes, 4);
        assert_eq!(cfg.block_size, 65536);
        assert_eq!(cfg.cache_bytes_per_lane, 1 << 20);
        assert!(!cfg.auto_expand);
        assert!(cfg.resume);
        assert!(cfg.verify_checksum);
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = XferConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: XferConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.lanes, cfg.lanes);
        assert_eq!(parsed.block_size, cfg.block_size);
        assert_eq!(parsed.cache_bytes_per_lane, cfg.cache_bytes_per_lane);
    }

    #[test]
    fn config_toml_sections() {
        let toml = r#"
            lanes = 8
            block_size = 4096
            cache_bytes_per_lane = 2048
            auto_expand = true
            resume = false
            overwrite = true
            verify_checksum = false

            [extensions]
            temp = "part"

            [service]
            max_lanes = 2
            idle_timeout_secs = 5
        "#;
        let cfg: XferConfig = toml::from_str(toml).unwrap();
        let opts = cfg.saver_options();
        assert_eq!(opts.lanes, 8);
        assert_eq!(opts.extensions.temp, "part");
        assert_eq!(opts.extensions.info, "info");
        assert!(!opts.resume);
        assert!(!cfg.transfer_options().verify_checksum);

        let svc = cfg.service();
        assert_eq!(svc.cap_lanes(8), 2);
        assert_eq!(svc.cap_cache(1 << 30), 1 << 30);
        assert_eq!(svc.idle_timeout(), Duration::from_secs(5));
        assert!(svc.confine_to_root);
    }

    #[test]
    fn missing_sections_use_defaults() {
        let toml = r#"
            lanes = 2
            block_size = 1024
            cache_bytes_per_lane = 4096
            auto_expand = false
            resume = true
            overwrite = false
            verify_checksum = true
        "#;
        let cfg: XferConfig = toml::from_str(toml).unwrap();
        assert!(cfg.extensions.is_none());
        assert_eq!(cfg.saver_options().extensions, SidecarExtensions::default());
        assert_eq!(cfg.service().max_lanes, 0);
    }
}
