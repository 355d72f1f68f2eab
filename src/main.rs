use browse_web::bridge::{Bridge, OwnerQueue};
use browse_web::cli::Args;
use browse_web::collection::MemoryCollection;
use browse_web::config::{self, PathConfig, ServerConfig};
use browse_web::server::{API_PATH, BrowseServer, HEALTH_PATH, Router, StaticFiles};

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};

fn init_logging(args: &Args, path_config: &PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .as_ref()
            .cloned()
            .unwrap_or_else(|| config::data_file(config::LOG_FILE, path_config));

        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .filter_module("tiny_http", log::LevelFilter::Warn)
            .filter_module("rouille", log::LevelFilter::Warn)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Respects RUST_LOG if set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .filter_module("tiny_http", log::LevelFilter::Warn)
            .filter_module("rouille", log::LevelFilter::Warn)
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn load_collection(config: &ServerConfig) -> Result<MemoryCollection> {
    match &config.fixture {
        Some(path) => {
            let col = MemoryCollection::from_json_file(path)?;
            info!("Loaded {} notes / {} cards from {}", col.note_count(), col.card_count(), path.display());
            Ok(col)
        }
        None => {
            info!("No fixture given, serving the demo collection");
            Ok(MemoryCollection::demo())
        }
    }
}

fn start_server(config: &ServerConfig, bridge: Bridge<MemoryCollection>) -> Result<BrowseServer<MemoryCollection>> {
    let mut router = Router::new(bridge);
    if let Some(dir) = &config.web_dir {
        router = router.with_assets(StaticFiles::new(dir)?);
        info!("Serving static files from {}", dir.display());
    }

    let server = BrowseServer::from_router(router).with_pool_size(config.workers);
    let addr = server.start(&config.host, config.port)?;
    println!("browse-web listening on http://{}", addr);
    info!("API: POST http://{}{}, health: GET http://{}{}", addr, API_PATH, addr, HEALTH_PATH);
    Ok(server)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone(), config::process_env);
    if let Err(e) = config::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }
    init_logging(&args, &path_config)?;
    debug!("Command-line args: {:?}", args);

    let config = ServerConfig::resolve(&args, config::process_env)?;
    debug!("Resolved config: {:?}", config);
    info!("Config path: {}", config::config_file(config::CONFIG_FILE, &config.path_config).display());

    let mut collection = load_collection(&config)?;

    if config.inline {
        info!("Inline mode: actions run on request threads, serialized by a lock");
        let _server = start_server(&config, Bridge::inline(collection))?;
        loop {
            std::thread::park();
        }
    }

    // The main thread is the owner context. The router holds the only
    // sender, so the queue stays open for as long as the server lives.
    let (sender, receiver) = OwnerQueue::bounded(config.queue);
    let _server = start_server(&config, Bridge::new(sender))?;
    receiver.run(&mut collection);
    Ok(())
}
