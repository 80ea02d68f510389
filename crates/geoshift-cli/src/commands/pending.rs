use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use clap::Subcommand;
use geoshift_core::ValidationError;

use crate::common::{print_json, CliResult, Context};

#[derive(Subcommand)]
pub enum PendingAction {
    /// List shifts awaiting confirmation, oldest first
    List,
    /// Store the shift at INDEX as-is
    Accept { index: usize },
    /// Store the shift at INDEX with corrected times
    Edit {
        index: usize,
        /// New start, local HH:MM on the shift's start day
        #[arg(long)]
        start: String,
        /// New end, local HH:MM on the shift's end day
        #[arg(long)]
        end: String,
    },
    /// Drop the shift at INDEX without storing it
    Discard { index: usize },
}

pub async fn run(action: PendingAction) -> CliResult {
    let ctx = Context::open()?;
    let workflow = ctx.workflow();

    match action {
        PendingAction::List => print_json(&workflow.list().await?)?,
        PendingAction::Accept { index } => print_json(&workflow.accept(index).await?)?,
        PendingAction::Edit { index, start, end } => {
            let offset = ctx.config.utc_offset();
            let draft = workflow.edit(index).await?;
            let start = at_local(&start, local_day(draft.start_time, offset), offset)?;
            let end = at_local(&end, local_day(draft.end_time, offset), offset)?;
            print_json(&workflow.edit_and_accept(index, start, end).await?)?;
        }
        PendingAction::Discard { index } => print_json(&workflow.discard(index).await?)?,
    }
    Ok(())
}

fn local_day(t: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    t.with_timezone(&offset).date_naive()
}

/// `HH:MM` on `day` in `offset`, as UTC.
fn at_local(hhmm: &str, day: NaiveDate, offset: FixedOffset) -> Result<DateTime<Utc>, ValidationError> {
    let invalid = |message: String| ValidationError::InvalidValue {
        field: "time".into(),
        message,
    };
    let time = NaiveTime::parse_from_str(hhmm, "%H:%M")
        .map_err(|e| invalid(format!("'{hhmm}' is not HH:MM: {e}")))?;
    day.and_time(time)
        .and_local_timezone(offset)
        .single()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| invalid(format!("'{hhmm}' does not exist on {day}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn local_time_is_converted_to_utc() {
        let cet = FixedOffset::east_opt(3600).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 3, 11).unwrap();
        assert_eq!(
            at_local("09:30", day, cet).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 11, 8, 30, 0).unwrap()
        );
        assert!(at_local("9h30", day, cet).is_err());
        assert!(at_local("25:00", day, cet).is_err());
    }
}
