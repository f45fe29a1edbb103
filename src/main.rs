use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::{ConfigCommand, DeviceCommand};
use facesync::config::Config;
use facesync_core::OriginPath;

#[derive(Parser)]
#[command(name = "facesync")]
#[command(version)]
#[command(about = "Sync watch face preferences between a phone and a watch", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Log sync activity to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Act as the companion app on the phone
    Companion(DeviceCommand),

    /// Act as the watch face on the wearable
    Wearable(DeviceCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    facesync::init_logging(if cli.verbose {
        "facesync=info,facesync_core=info"
    } else {
        "facesync=warn,facesync_core=warn"
    });

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Companion(cmd)) => {
            cmd.run(OriginPath::Companion, &config).await?;
        }
        Some(Commands::Wearable(cmd)) => {
            cmd.run(OriginPath::Wearable, &config).await?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(&config)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
