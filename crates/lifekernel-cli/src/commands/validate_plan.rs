use std::path::PathBuf;

use clap::Args;
use lifekernel_core::hard_mode::{effective_max_items, HardModeConstraint, PlannedItem};
use lifekernel_core::validate_plan;

use super::read_json;

#[derive(Args)]
pub struct ValidatePlanArgs {
    /// JSON array of planned items
    #[arg(long)]
    pub plan: PathBuf,
    /// JSON array of constraints
    #[arg(long)]
    pub constraints: PathBuf,
}

pub fn run(args: ValidatePlanArgs) -> Result<(), Box<dyn std::error::Error>> {
    let items: Vec<PlannedItem> = read_json(&args.plan)?;
    let constraints: Vec<HardModeConstraint> = read_json(&args.constraints)?;

    validate_plan(&items, &constraints)?;

    match effective_max_items(&constraints) {
        Some(max) => println!(
            "ok: {} items satisfy {} constraints (max {max})",
            items.len(),
            constraints.len()
        ),
        None => println!(
            "ok: {} items satisfy {} constraints",
            items.len(),
            constraints.len()
        ),
    }
    Ok(())
}
