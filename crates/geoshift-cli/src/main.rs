use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod adapters;
mod commands;
mod common;

#[derive(Parser)]
#[command(name = "geoshift", version, about = "Geofence shift tracking CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start, stop and inspect tracking
    Track {
        #[command(subcommand)]
        action: commands::track::TrackAction,
    },
    /// Feed location signals to the detector
    Signal {
        #[command(subcommand)]
        action: commands::signal::SignalAction,
    },
    /// Review shifts awaiting confirmation
    Pending {
        #[command(subcommand)]
        action: commands::pending::PendingAction,
    },
    /// Confirmed shifts
    Shifts {
        #[command(subcommand)]
        action: commands::shifts::ShiftsAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("geoshift=info,geoshift_core=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Track { action } => commands::track::run(action).await,
        Commands::Signal { action } => commands::signal::run(action).await,
        Commands::Pending { action } => commands::pending::run(action).await,
        Commands::Shifts { action } => commands::shifts::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
