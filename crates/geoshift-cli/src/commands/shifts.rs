use clap::Subcommand;

use crate::common::{print_json, CliResult, Context};

#[derive(Subcommand)]
pub enum ShiftsAction {
    /// List confirmed shifts
    List,
}

pub fn run(action: ShiftsAction) -> CliResult {
    let ctx = Context::open()?;
    match action {
        ShiftsAction::List => print_json(&ctx.shifts.list()?),
    }
}
