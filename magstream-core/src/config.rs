//! Centralized configuration for Magstream.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::path::PathBuf;
use std::time::Duration;

/// Central configuration for all Magstream components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct MagstreamConfig {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
    pub search: SearchConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    /// Returns `host:port` suitable for binding a listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Session cache configuration.
///
/// Controls how long idle swarm sessions are kept and how long a stream
/// request may wait for a session to become ready.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Sliding idle window measured from the last refresh
    pub ttl: Duration,
    /// Upper bound on the readiness wait (None = wait indefinitely)
    pub ready_timeout: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_millis(600_000), // 10 minutes
            ready_timeout: None,
        }
    }
}

/// Download storage configuration for the directory-backed engine.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory where swarm content lands, one subdirectory per info hash
    pub download_dir: PathBuf,
    /// Buffer size for file reads
    pub read_chunk_size: usize,
    /// How often to re-check for content that has not arrived yet
    pub poll_interval: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("./downloads"),
            read_chunk_size: 65536, // 64 KiB
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// External search API configuration.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Base URL of the search API
    pub base_url: String,
    /// HTTP request timeout
    pub timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl MagstreamConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults. Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("MAGSTREAM_HOST") {
            config.server.host = host;
        }

        let port = std::env::var("MAGSTREAM_PORT").or_else(|_| std::env::var("PORT"));
        if let Ok(port) = port {
            if let Ok(port) = port.parse::<u16>() {
                config.server.port = port;
            }
        }

        if let Ok(ttl) = std::env::var("MAGSTREAM_CACHE_TTL_MS") {
            if let Ok(millis) = ttl.parse::<u64>() {
                config.cache.ttl = Duration::from_millis(millis);
            }
        }

        if let Ok(timeout) = std::env::var("MAGSTREAM_READY_TIMEOUT_SECS") {
            if let Ok(seconds) = timeout.parse::<u64>() {
                config.cache.ready_timeout = Some(Duration::from_secs(seconds));
            }
        }

        if let Ok(dir) = std::env::var("MAGSTREAM_DOWNLOAD_DIR") {
            config.storage.download_dir = PathBuf::from(dir);
        }

        if let Ok(url) = std::env::var("MAGSTREAM_SEARCH_URL") {
            config.search.base_url = url;
        }

        config
    }

    /// Creates a configuration suited to tests: short TTL, fast polling.
    pub fn for_testing() -> Self {
        Self {
            cache: CacheConfig {
                ttl: Duration::from_secs(5),
                ready_timeout: Some(Duration::from_secs(5)),
            },
            storage: StorageConfig {
                poll_interval: Duration::from_millis(10),
                read_chunk_size: 4096,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = MagstreamConfig::default();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.bind_address(), "127.0.0.1:3000");
        assert_eq!(config.cache.ttl, Duration::from_secs(600));
        assert!(config.cache.ready_timeout.is_none());
        assert_eq!(config.storage.download_dir, PathBuf::from("./downloads"));
        assert_eq!(config.storage.read_chunk_size, 65536);
    }

    #[test]
    fn test_config_presets() {
        let testing_config = MagstreamConfig::for_testing();
        assert!(testing_config.cache.ttl < Duration::from_secs(600));
        assert!(testing_config.cache.ready_timeout.is_some());
        assert_eq!(testing_config.server.port, 3000);
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("MAGSTREAM_PORT", "8081");
            std::env::set_var("MAGSTREAM_CACHE_TTL_MS", "1500");
            std::env::set_var("MAGSTREAM_READY_TIMEOUT_SECS", "30");
            std::env::set_var("MAGSTREAM_DOWNLOAD_DIR", "/tmp/magstream");
            std::env::set_var("MAGSTREAM_SEARCH_URL", "http://search.local");
        }

        let config = MagstreamConfig::from_env();

        assert_eq!(config.server.port, 8081);
        assert_eq!(config.cache.ttl, Duration::from_millis(1500));
        assert_eq!(config.cache.ready_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.storage.download_dir, PathBuf::from("/tmp/magstream"));
        assert_eq!(config.search.base_url, "http://search.local");

        // Cleanup
        unsafe {
            std::env::remove_var("MAGSTREAM_PORT");
            std::env::remove_var("MAGSTREAM_CACHE_TTL_MS");
            std::env::remove_var("MAGSTREAM_READY_TIMEOUT_SECS");
            std::env::remove_var("MAGSTREAM_DOWNLOAD_DIR");
            std::env::remove_var("MAGSTREAM_SEARCH_URL");
        }
    }
}
