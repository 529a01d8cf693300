mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use ims_core::config::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise pick defaults from the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "imagestore=trace,ims_server=trace,ims_db=debug,ims_storage=debug,ims_core=debug,tower_http=debug".to_string()
        } else {
            "imagestore=info,ims_server=info,ims_db=info,ims_storage=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Serve { bind, base_url } => {
            let mut config = load_config(cli.config.as_deref());
            if let Some(bind) = bind {
                config.server.bind_addr = bind;
            }
            if let Some(base_url) = base_url {
                config.server.base_url = base_url;
            }

            tracing::info!("Starting imagestore {}", env!("CARGO_PKG_VERSION"));
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(ims_server::start(config))?;
            Ok(())
        }
        Commands::Validate { config: path } => {
            let path = path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Orphans => {
            let config = load_config(cli.config.as_deref());
            let orphans = ims_server::reconcile::scan(&config)
                .context("failed to scan for orphaned blobs")?;
            for id in &orphans {
                println!("{id}");
            }
            tracing::info!("{} orphaned blob(s)", orphans.len());
            Ok(())
        }
        Commands::Version => {
            println!("imagestore {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Config file (or defaults) with environment overrides applied.
fn load_config(path: Option<&Path>) -> Config {
    let mut config = Config::load_or_default(path);
    config.apply_env();
    config
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let contents = std::fs::read_to_string(p)
                .with_context(|| format!("failed to read {}", p.display()))?;
            Config::from_json(&contents)?
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("✓ Configuration is valid");
    } else {
        for warning in &warnings {
            println!("⚠ {warning}");
        }
    }
    println!("  RPC: {}", config.server.rpc_addr());
    println!("  HTTP: {}", config.server.http_addr());
    println!("  Base URL: {}", config.server.base_url);
    println!("  Database: {}", config.storage.db_path.display());
    println!("  Images: {}", config.storage.images_dir.display());
    println!("  Max image size: {} bytes", config.storage.max_image_bytes);

    Ok(())
}
