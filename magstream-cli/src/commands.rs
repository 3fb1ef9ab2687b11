//! CLI command implementations

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, anyhow};
use clap::{Args, Subcommand};
use magstream_core::config::MagstreamConfig;
use magstream_search::{MediaSearchService, PageRequest};
use magstream_web::run_server;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the streaming server
    Server(ServerArgs),
    /// Search for torrents through the configured search API
    Search {
        /// Free-text search terms
        query: String,
        /// 1-based page number
        #[arg(long)]
        page: Option<u32>,
        /// Results per page
        #[arg(long)]
        limit: Option<u32>,
        /// Search API base URL
        #[arg(long)]
        search_url: Option<String>,
    },
}

/// Server flags; each one overrides the matching environment variable.
#[derive(Debug, Default, Args)]
pub struct ServerArgs {
    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,
    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,
    /// Directory the swarm downloader writes content into
    #[arg(long)]
    pub download_dir: Option<PathBuf>,
    /// Idle time-to-live of cached sessions in milliseconds
    #[arg(long)]
    pub cache_ttl_ms: Option<u64>,
    /// Give up waiting for session metadata after this many seconds
    #[arg(long)]
    pub ready_timeout_secs: Option<u64>,
    /// Search API base URL
    #[arg(long)]
    pub search_url: Option<String>,
}

impl ServerArgs {
    /// Applies the flags that were given on top of `config`.
    pub fn apply_to(self, config: &mut MagstreamConfig) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(dir) = self.download_dir {
            config.storage.download_dir = dir;
        }
        if let Some(ttl) = self.cache_ttl_ms {
            config.cache.ttl = Duration::from_millis(ttl);
        }
        if let Some(timeout) = self.ready_timeout_secs {
            config.cache.ready_timeout = Some(Duration::from_secs(timeout));
        }
        if let Some(url) = self.search_url {
            config.search.base_url = url;
        }
    }
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Server(args) => start_server(args).await,
        Commands::Search {
            query,
            page,
            limit,
            search_url,
        } => search(query, page, limit, search_url).await,
    }
}

/// Start the streaming server
async fn start_server(args: ServerArgs) -> anyhow::Result<()> {
    let mut config = MagstreamConfig::from_env();
    args.apply_to(&mut config);

    run_server(config)
        .await
        .map_err(|e| anyhow!("Server error: {e}"))
}

/// Run a search and print one page of results
async fn search(
    query: String,
    page: Option<u32>,
    limit: Option<u32>,
    search_url: Option<String>,
) -> anyhow::Result<()> {
    let mut config = MagstreamConfig::from_env();
    if let Some(url) = search_url {
        config.search.base_url = url;
    }

    let service = MediaSearchService::from_config(&config.search)?;
    let page = service
        .search(&query, PageRequest::new(page, limit))
        .await
        .with_context(|| format!("Search for '{query}' failed"))?;

    println!(
        "{} results for '{}' (page {}/{})",
        page.total_results,
        query,
        page.current_page,
        page.total_pages.max(1)
    );
    for result in &page.results {
        println!(
            "  {:<60} {:>10}  S:{:<5} L:{:<5}",
            result.name,
            result.format_size(),
            result.seeders,
            result.leechers
        );
        println!("    {}", result.magnet);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_args_override_config() {
        let mut config = MagstreamConfig::default();
        let args = ServerArgs {
            port: Some(9000),
            cache_ttl_ms: Some(2500),
            ready_timeout_secs: Some(15),
            download_dir: Some(PathBuf::from("/srv/downloads")),
            ..Default::default()
        };

        args.apply_to(&mut config);

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.cache.ttl, Duration::from_millis(2500));
        assert_eq!(config.cache.ready_timeout, Some(Duration::from_secs(15)));
        assert_eq!(config.storage.download_dir, PathBuf::from("/srv/downloads"));
    }

    #[test]
    fn test_empty_server_args_keep_config() {
        let mut config = MagstreamConfig::default();
        ServerArgs::default().apply_to(&mut config);
        assert_eq!(config.server.bind_address(), "127.0.0.1:3000");
        assert!(config.cache.ready_timeout.is_none());
    }
}
