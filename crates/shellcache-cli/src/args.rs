//! CLI argument definitions using clap derive

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;

/// shellcache - keep an offline copy of a web application in sync
///
/// Installs the resources a manifest names into a local cache, swaps cache
/// generations when the manifest changes, and serves requests from the cache
/// when the origin is unreachable.
#[derive(Parser, Debug)]
#[command(name = "shellcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "SHELLCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,
}

/// Settings that override the configuration file
#[derive(Args, Debug, Default)]
pub struct Overrides {
    /// Origin of the application, e.g. https://app.example.com
    #[arg(long, global = true, env = "SHELLCACHE_ORIGIN")]
    pub origin: Option<String>,

    /// Manifest file (JSON object of resource key to content identifier)
    #[arg(long, global = true, env = "SHELLCACHE_MANIFEST")]
    pub manifest: Option<PathBuf>,

    /// Core resource list (JSON array of keys)
    #[arg(long, global = true, env = "SHELLCACHE_CORE")]
    pub core: Option<PathBuf>,

    /// Directory holding the cache stores
    #[arg(long, global = true, env = "SHELLCACHE_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Request timeout in seconds (0 disables it)
    #[arg(long, global = true, env = "SHELLCACHE_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Wait for the running generation to be released before activating
    #[arg(long, global = true)]
    pub wait: bool,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true, env = "SHELLCACHE_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

impl Overrides {
    pub fn into_config(self) -> Config {
        Config {
            origin: self.origin,
            manifest: self.manifest,
            core: self.core,
            cache_dir: self.cache_dir,
            request_timeout_secs: self.timeout,
            skip_waiting: self.wait.then_some(false),
            log_dir: self.log_dir,
        }
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write the effective settings to the configuration file
    Init,

    /// Install the configured manifest and activate it
    Sync,

    /// Serve one GET request through the active cache generation
    /// (requests it declines are fetched from the network)
    Get(GetArgs),

    /// Send a control message (skip-wait, prefetch-remainder)
    Message(MessageArgs),

    /// Show the active generation and cache contents
    Status,

    /// Run the event host, reading commands from stdin
    /// (get, message, deploy, release, status, quit)
    Serve,

    /// Delete every cache store
    Clear,
}

#[derive(Parser, Debug)]
pub struct GetArgs {
    /// Absolute URL or path relative to the origin
    pub target: String,

    /// Write the body to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct MessageArgs {
    /// Signal to deliver
    pub signal: String,
}
