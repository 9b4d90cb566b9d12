use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::Args;
use lifekernel_core::habit::HabitState;
use lifekernel_core::suggest::{EnvelopeUsage, PatternInsight};
use lifekernel_core::{
    suggest, CheckinKernel, Dispatcher, HabitKernel, KernelConfig, MemoryStore, PolicyInput,
    ReviewKernel, Stream, TaskKernel, WireEvent,
};
use serde::Deserialize;

use super::read_json;

#[derive(Args)]
pub struct SuggestArgs {
    /// JSON object with `events`, and optional `envelopes` and `patterns`
    #[arg(long)]
    pub log: PathBuf,
    /// Evaluation time (RFC 3339); defaults to now
    #[arg(long)]
    pub now: Option<DateTime<Utc>>,
    /// Print suggestions as JSON
    #[arg(long)]
    pub json: bool,
}

/// Input file layout. Events from every stream share one array.
#[derive(Debug, Deserialize)]
struct SuggestLog {
    events: Vec<WireEvent>,
    #[serde(default)]
    envelopes: Vec<EnvelopeUsage>,
    #[serde(default)]
    patterns: Vec<PatternInsight>,
}

pub fn run(args: SuggestArgs) -> Result<(), Box<dyn std::error::Error>> {
    let log: SuggestLog = read_json(&args.log)?;
    let now = args.now.unwrap_or_else(Utc::now);
    let config = KernelConfig::load_or_default();

    let dispatcher = Dispatcher::new(MemoryStore::from_log(log.events));
    // Day-scoped projections are keyed by the UTC day; the offset only moves
    // the policies' clock checks.
    let habits = lifekernel_core::events::replay_wire(
        &HabitKernel,
        HabitState::for_date(now.date_naive()),
        dispatcher.store().stream(Stream::Habits),
    );
    let tasks = dispatcher.state(Stream::Tasks, &TaskKernel);
    let checkins = dispatcher.state(Stream::Checkins, &CheckinKernel::new(&config.checkin));
    let reviews = dispatcher.state(Stream::Reviews, &ReviewKernel::new(config.review.clone()));

    let input = PolicyInput {
        now,
        habits: &habits,
        tasks: &tasks,
        checkins: &checkins,
        reviews: &reviews,
        envelopes: &log.envelopes,
        patterns: &log.patterns,
    };
    let suggestions = suggest(&input, &config.suggestions);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&suggestions)?);
        return Ok(());
    }
    if suggestions.is_empty() {
        println!("No suggestions");
    }
    for s in &suggestions {
        println!("[{}] {}", s.priority, s.headline);
        if !s.subtext.is_empty() {
            println!("    {}", s.subtext);
        }
    }
    Ok(())
}
