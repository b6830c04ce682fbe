use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::util::{ProxyError, Result};

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Config {
    #[clap(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// externally visible origin used when rewriting playlists,
    /// e.g. https://tv.example.com. derived from each request when unset
    #[clap(long, env = "PUBLIC_ORIGIN")]
    pub public_origin: Option<String>,

    /// max cache size in mb
    #[clap(long, env = "CACHE_SIZE_MB", default_value_t = 256)]
    pub cache_size_mb: u64,

    /// largest single response admitted to the cache, in mb
    #[clap(long, env = "CACHE_OBJECT_MAX_MB", default_value_t = 32)]
    pub cache_object_max_mb: u64,

    /// cache ttl for media segments and single streams
    #[clap(long = "stream-max-age", env = "STREAM_MAX_AGE_SECONDS", default_value_t = 3600)]
    pub stream_max_age_seconds: u64,

    /// cache ttl for rewritten playlists
    #[clap(long = "playlist-max-age", env = "PLAYLIST_MAX_AGE_SECONDS", default_value_t = 300)]
    pub playlist_max_age_seconds: u64,

    #[clap(
        long,
        env = "ORIGIN_USER_AGENT",
        default_value = "Mozilla/5.0 (compatible; M3U Proxy)"
    )]
    pub user_agent: String,

    /// how long to wait for origin response headers
    #[clap(long = "origin-timeout", env = "ORIGIN_TIMEOUT_SECONDS", default_value_t = 30)]
    pub origin_timeout_seconds: u64,

    #[clap(long, env = "MAX_REDIRECTS", default_value_t = 20)]
    pub max_redirects: usize,

    /// worker threads, defaults to the number of cpus
    #[clap(long, env = "WORKERS")]
    pub workers: Option<usize>,

    #[clap(long = "shutdown-timeout", env = "SHUTDOWN_TIMEOUT_SECONDS", default_value_t = 30)]
    pub shutdown_timeout_seconds: u64,

    /// tls cert path
    #[clap(long = "tls-cert", env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<PathBuf>,

    /// tls key path
    #[clap(long = "tls-key", env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<PathBuf>,

    #[clap(long, env = "TLS_LISTEN_ADDR", default_value = "0.0.0.0:8443")]
    pub tls_listen_addr: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Config::parse();
        config.normalize()?;
        Ok(config)
    }

    /// validates the public origin and strips its trailing slash
    pub fn normalize(&mut self) -> Result<()> {
        if let Some(origin) = self.public_origin.take() {
            Url::parse(&origin).map_err(ProxyError::UrlParse)?;
            self.public_origin = Some(origin.trim_end_matches('/').to_string());
        }
        Ok(())
    }

    /// cert and key paths, only when both are set
    pub fn tls_paths(&self) -> Option<(&Path, &Path)> {
        Some((self.tls_cert_path.as_deref()?, self.tls_key_path.as_deref()?))
    }

    pub fn stream_ttl(&self) -> Duration {
        Duration::from_secs(self.stream_max_age_seconds)
    }

    pub fn playlist_ttl(&self) -> Duration {
        Duration::from_secs(self.playlist_max_age_seconds)
    }

    pub fn origin_timeout(&self) -> Duration {
        Duration::from_secs(self.origin_timeout_seconds)
    }

    pub fn cache_object_max_bytes(&self) -> usize {
        usize::try_from(self.cache_object_max_mb.saturating_mul(1024 * 1024)).unwrap_or(usize::MAX)
    }

    pub fn workers(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }
}
