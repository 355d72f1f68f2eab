use clap::Parser;
use std::path::PathBuf;

// Build version with stack info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "HTTP:   rouille 3.6 (sync, worker pool)\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// JSON action server for browsing and editing a notes collection
#[derive(Parser, Debug, Default)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Address to bind (default: 127.0.0.1)
    #[arg(long = "host", value_name = "HOST")]
    pub host: Option<String>,

    /// Port to bind, 0 picks a free one (default: 5678)
    #[arg(short = 'p', long = "port", value_name = "PORT")]
    pub port: Option<u16>,

    /// Serve static files of the web UI from this directory
    #[arg(short = 'w', long = "web-dir", value_name = "DIR")]
    pub web_dir: Option<PathBuf>,

    /// Load the collection from a JSON fixture instead of the demo data
    #[arg(short = 'f', long = "fixture", value_name = "FILE")]
    pub fixture: Option<PathBuf>,

    /// Server configuration file (default: server.json in the config directory)
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// HTTP worker threads (default: 2 per CPU)
    #[arg(long = "workers", value_name = "N")]
    pub workers: Option<usize>,

    /// Pending requests the owner queue holds before callers block (default: 64)
    #[arg(long = "queue", value_name = "N")]
    pub queue: Option<usize>,

    /// Run actions on the request thread instead of a dedicated owner context
    #[arg(long = "inline")]
    pub inline: bool,

    /// Enable logging to file (default: browse-web.log in the data directory)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,
}
