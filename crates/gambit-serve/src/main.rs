// ABOUTME: gambit CLI entry point.
// ABOUTME: Runs the engine relay server, lists engines, or writes a default config.

use anyhow::Result;
use clap::{Parser, Subcommand};
use gambit_core::{DirectoryDiscovery, Discover};
use gambit_serve::Config;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gambit")]
#[command(about = "Relay one hot-swappable UCI engine to many WebSocket clients")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Engines root directory (one sub-directory per engine)
    #[arg(long, global = true)]
    engines_dir: Option<PathBuf>,

    /// Interface to bind
    #[arg(long, env = "GAMBIT_HOST", global = true)]
    host: Option<String>,

    /// Port to bind
    #[arg(long, env = "GAMBIT_PORT", global = true)]
    port: Option<u16>,

    /// Log everything at INFO, not just gambit's own crates
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay server (default)
    Serve,
    /// Print the engines found in the engines directory
    Engines,
    /// Write a default config file
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        gambit_log::init();
    } else {
        gambit_log::init_for(&["gambit", "gambit_core", "gambit_serve"]);
    }

    if let Some(Commands::InitConfig) = cli.command {
        let path = cli.config.unwrap_or_else(Config::config_path);
        if Config::init(&path)? {
            println!("Wrote {}", path.display());
        } else {
            println!("Config already exists at {}", path.display());
        }
        return Ok(());
    }

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.engines_dir {
        config.engines.dir = dir;
    }
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    match cli.command {
        Some(Commands::Engines) => {
            let discovery = DirectoryDiscovery::new(&config.engines.dir);
            let engines = discovery.scan();
            if engines.is_empty() {
                println!("No engines found in {}", discovery.root().display());
            }
            for (name, path) in engines {
                println!("{name}\t{}", path.display());
            }
            Ok(())
        }
        Some(Commands::Serve) | Some(Commands::InitConfig) | None => {
            gambit_serve::run(config).await
        }
    }
}
