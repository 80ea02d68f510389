use chrono::{DateTime, Utc};
use clap::Subcommand;
use geoshift_core::{LocationSignal, Position, SignalOutcome};

use crate::common::{print_json, CliResult, Context};

#[derive(Subcommand)]
pub enum SignalAction {
    /// Geofence entry reported by the platform
    Enter {
        /// Signal time (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Geofence exit reported by the platform
    Exit {
        /// Signal time (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Position sample; also becomes the current fix
    Position {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        /// Horizontal accuracy in meters
        #[arg(long)]
        accuracy: Option<f64>,
        /// Fix time (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Run the arrival check if the dwell window has passed
    Dwell,
}

pub async fn run(action: SignalAction) -> CliResult {
    let ctx = Context::open()?;
    let tracker = ctx.tracker();

    let outcome: SignalOutcome = match action {
        SignalAction::Enter { at } => {
            tracker
                .handle_signal(LocationSignal::enter(at.unwrap_or_else(Utc::now)))
                .await
        }
        SignalAction::Exit { at } => {
            tracker
                .handle_signal(LocationSignal::exit(at.unwrap_or_else(Utc::now)))
                .await
        }
        SignalAction::Position {
            lat,
            lon,
            accuracy,
            at,
        } => {
            let mut position = Position::new(lat, lon, at.unwrap_or_else(Utc::now));
            if let Some(accuracy) = accuracy {
                position = position.with_accuracy(accuracy);
            }
            ctx.location.record(&position).await?;
            tracker.handle_signal(LocationSignal::sample(position)).await
        }
        SignalAction::Dwell => tracker.check_dwell().await,
    };

    print_json(&outcome)
}
