//! Configuration loading and parsing.
//!
//! Defines the server config schema and resolves defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::ytdlp::YtDlpOptions;

const DEFAULT_DOWNLOAD_DIR: &str = "downloads";
const DEFAULT_MAX_QUEUE_LEN: usize = 100;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 300;
const DEFAULT_GATEWAY_TIMEOUT_MS: u64 = 5000;

/// Top-level server configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct ServerConfig {
    /// Bind address (host:port).
    pub bind: Option<String>,
    /// Directory where fetched audio is staged.
    pub download_dir: Option<String>,
    /// Pending tracks allowed per chat (0 = unbounded, default 100).
    pub max_queue_len: Option<usize>,
    /// Seconds before a fetch is abandoned (0 = never, default 300).
    pub fetch_timeout_secs: Option<u64>,
    /// yt-dlp invocation settings.
    pub ytdlp: Option<YtDlpConfig>,
    /// Call gateway connection.
    pub gateway: Option<GatewayConfig>,
}

/// yt-dlp settings from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct YtDlpConfig {
    /// Executable name or path (default: `yt-dlp`).
    pub binary: Option<String>,
    /// Audio codec passed to `--audio-format` (default: `mp3`).
    pub audio_format: Option<String>,
    /// Passed to `--audio-quality` (default: `192K`).
    pub audio_quality: Option<String>,
    /// Search prefix for non-URL queries (default: `ytsearch`).
    pub default_search: Option<String>,
    /// Extra arguments appended before the query.
    pub extra_args: Option<Vec<String>>,
}

/// Call gateway settings from TOML.
#[derive(Debug, Deserialize)]
pub struct GatewayConfig {
    /// Gateway base URL, e.g. `http://127.0.0.1:9100`.
    pub base_url: String,
    /// Per-request timeout in milliseconds (default: 5000).
    pub timeout_ms: Option<u64>,
}

/// Resolved gateway settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySettings {
    pub base_url: String,
    pub timeout: Duration,
}

impl ServerConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<ServerConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }
}

/// Parse an optional bind address from config.
pub fn bind_from_config(cfg: &ServerConfig) -> Result<Option<SocketAddr>> {
    let Some(bind) = cfg.bind.as_deref() else {
        return Ok(None);
    };
    let addr = bind.parse().with_context(|| format!("parse bind {bind}"))?;
    Ok(Some(addr))
}

pub fn download_dir_from_config(cfg: &ServerConfig) -> PathBuf {
    cfg.download_dir
        .as_deref()
        .map(str::trim)
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_DIR))
}

/// Per-chat queue bound; `None` means unbounded.
pub fn max_queue_len_from_config(cfg: &ServerConfig) -> Option<usize> {
    match cfg.max_queue_len {
        Some(0) => None,
        Some(limit) => Some(limit),
        None => Some(DEFAULT_MAX_QUEUE_LEN),
    }
}

/// Fetch timeout; `None` means fetches may run forever.
pub fn fetch_timeout_from_config(cfg: &ServerConfig) -> Option<Duration> {
    match cfg.fetch_timeout_secs.unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS) {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    }
}

pub fn ytdlp_from_config(cfg: &ServerConfig) -> YtDlpOptions {
    let defaults = YtDlpOptions::default();
    let Some(ytdlp) = cfg.ytdlp.as_ref() else {
        return defaults;
    };
    YtDlpOptions {
        binary: ytdlp
            .binary
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or(defaults.binary),
        audio_format: ytdlp.audio_format.clone().unwrap_or(defaults.audio_format),
        audio_quality: ytdlp.audio_quality.clone().unwrap_or(defaults.audio_quality),
        default_search: ytdlp
            .default_search
            .clone()
            .unwrap_or(defaults.default_search),
        extra_args: ytdlp.extra_args.clone().unwrap_or_default(),
    }
}

/// Resolve the call gateway section; it is required.
pub fn gateway_from_config(cfg: &ServerConfig) -> Result<GatewaySettings> {
    let gateway = cfg
        .gateway
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("[gateway] section is required in config"))?;
    let base_url = gateway.base_url.trim().trim_end_matches('/');
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(anyhow::anyhow!(
            "gateway.base_url must be an http(s) URL, got {:?}",
            gateway.base_url
        ));
    }
    Ok(GatewaySettings {
        base_url: base_url.to_string(),
        timeout: Duration::from_millis(gateway.timeout_ms.unwrap_or(DEFAULT_GATEWAY_TIMEOUT_MS)),
    })
}
