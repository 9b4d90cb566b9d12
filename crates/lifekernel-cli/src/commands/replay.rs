use std::path::PathBuf;

use chrono::{NaiveDate, Utc};
use clap::Args;
use lifekernel_core::events::replay_wire;
use lifekernel_core::habit::HabitState;
use lifekernel_core::{
    CheckinKernel, CheckinState, HabitKernel, HardModeKernel, HardModeState, KernelConfig,
    ReviewKernel, ReviewState, Stream, TaskKernel, TaskState, WireEvent,
};

use super::read_json;

#[derive(Args)]
pub struct ReplayArgs {
    /// habits, tasks, checkins, reviews or hard-mode
    pub stream: Stream,
    /// JSON array of wire events
    #[arg(long)]
    pub events: PathBuf,
    /// Day whose habit log to rebuild (habits only)
    #[arg(long)]
    pub for_date: Option<NaiveDate>,
    /// Print the folded state as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: ReplayArgs) -> Result<(), Box<dyn std::error::Error>> {
    let wire: Vec<WireEvent> = read_json(&args.events)?;
    let wire: Vec<WireEvent> = wire
        .into_iter()
        .filter(|e| Stream::of_event_type(&e.event_type) == Some(args.stream))
        .collect();
    tracing::debug!(stream = %args.stream, events = wire.len(), "replaying");

    let config = KernelConfig::load_or_default();
    match args.stream {
        Stream::Habits => {
            let initial = args.for_date.map(HabitState::for_date).unwrap_or_default();
            let state = replay_wire(&HabitKernel, initial, &wire);
            let grace_hours = config.habits.missed_grace_hours;
            emit(&state, args.json, |s| print_habits(s, grace_hours))
        }
        Stream::Tasks => {
            let state = replay_wire(&TaskKernel, TaskState::default(), &wire);
            emit(&state, args.json, print_tasks)
        }
        Stream::Checkins => {
            let kernel = CheckinKernel::new(&config.checkin);
            let state = replay_wire(&kernel, CheckinState::default(), &wire);
            emit(&state, args.json, print_checkins)
        }
        Stream::Reviews => {
            let kernel = ReviewKernel::new(config.review);
            let state = replay_wire(&kernel, ReviewState::default(), &wire);
            emit(&state, args.json, print_reviews)
        }
        Stream::HardMode => {
            let kernel = HardModeKernel::new(config.hard_mode);
            let state = replay_wire(&kernel, HardModeState::default(), &wire);
            emit(&state, args.json, print_hard_mode)
        }
    }
}

fn emit<S: serde::Serialize>(
    state: &S,
    json: bool,
    print: impl FnOnce(&S),
) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(state)?);
    } else {
        print(state);
    }
    Ok(())
}

fn print_habits(state: &HabitState, grace_hours: u32) {
    let statuses = state
        .today
        .map(|day| state.day_statuses(day, Utc::now(), grace_hours))
        .unwrap_or_default();
    println!("Habits: {}", state.active_habits().count());
    for habit in state.active_habits() {
        match statuses.get(&habit.id).or(state.log_for(&habit.id).map(|l| &l.status)) {
            Some(status) => println!("  {} ({}): {:?}", habit.name, habit.id, status),
            None => println!("  {} ({})", habit.name, habit.id),
        }
    }
    let archived = state.habits.values().filter(|h| h.archived).count();
    if archived > 0 {
        println!("Archived: {archived}");
    }
}

fn print_tasks(state: &TaskState) {
    let section = |label: &str, tasks: Vec<&lifekernel_core::task::Task>| {
        println!("{label}: {}", tasks.len());
        for task in tasks {
            println!("  {} {}", task.id, task.title);
        }
    };
    section("Focus", state.focus());
    section("Inbox", state.inbox());
    section("Deferred", state.deferred());
}

fn print_checkins(state: &CheckinState) {
    println!("Check-ins: {}", state.checkins.len());
    if let Some(latest) = state.latest() {
        println!(
            "Latest: mood {} energy {} at {}",
            latest.mood, latest.energy, latest.submitted_at
        );
    }
    println!(
        "Trend over {} days: mood {:.2} energy {:.2}",
        state.trend.days_tracked, state.trend.average_mood, state.trend.average_energy
    );
}

fn print_reviews(state: &ReviewState) {
    match &state.active {
        Some(review) => println!(
            "Active: {} (week of {}, {:?})",
            review.id, review.week_start, review.phase
        ),
        None => println!("Active: none"),
    }
    println!("Closed: {}", state.history.len());
    if let Some(last) = state.last_closed() {
        println!("Last: week of {}", last.week_start);
    }
}

fn print_hard_mode(state: &HardModeState) {
    let Some(session) = state.active_session() else {
        println!("Hard Mode: inactive");
        return;
    };
    println!(
        "Hard Mode: {} ({} to {})",
        session.id, session.window.start, session.window.end
    );
    match &session.plan {
        Some(plan) => {
            println!("Plan for {}: {} items", plan.day, plan.items.len());
            for item in &plan.items {
                println!(
                    "  [{:?}] {} {} at {}",
                    item.status,
                    item.id,
                    item.title,
                    item.scheduled_at.format("%H:%M")
                );
            }
        }
        None => println!("No plan"),
    }
}
