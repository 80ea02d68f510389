use clap::Subcommand;
use geoshift_core::WorkSite;

use crate::common::{print_json, CliResult, Context};

#[derive(Subcommand)]
pub enum TrackAction {
    /// Start tracking a work site
    Start {
        /// Latitude of the site center
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        /// Longitude of the site center
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        /// Geofence radius in meters (50-500)
        #[arg(long, default_value = "100")]
        radius: f64,
    },
    /// Stop tracking (pending shifts are kept)
    Stop,
    /// Print tracking status as JSON
    Status,
    /// End the current visit now, without validation
    ForceExit,
}

pub async fn run(action: TrackAction) -> CliResult {
    let ctx = Context::open()?;
    let tracker = ctx.tracker();

    match action {
        TrackAction::Start { lat, lon, radius } => {
            let site = WorkSite::new(lat, lon, radius)?;
            tracker.start_tracking(site).await?;
            print_json(&tracker.tracking_status().await?)?;
        }
        TrackAction::Stop => {
            tracker.stop_tracking().await?;
            println!("{{\"type\": \"tracking_stopped\"}}");
        }
        TrackAction::Status => {
            print_json(&tracker.tracking_status().await?)?;
        }
        TrackAction::ForceExit => {
            print_json(&tracker.force_exit().await?)?;
        }
    }
    Ok(())
}
