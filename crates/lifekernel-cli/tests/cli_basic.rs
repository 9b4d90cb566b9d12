//! Basic CLI E2E tests.
//!
//! Tests run the built binary with `HOME` pointed at a temp dir so the
//! config file never touches the real one.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_lifekernel"))
        .args(args)
        .env("HOME", home)
        .env_remove("LIFEKERNEL_ENV")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn write(dir: &TempDir, name: &str, json: serde_json::Value) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, json.to_string()).unwrap();
    path.to_string_lossy().into_owned()
}

fn event(event_type: &str, key: &str, at: &str, payload: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "type": event_type,
        "occurredAt": at,
        "idempotencyKey": key,
        "payload": payload,
    })
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn test_config_path_is_under_home() {
    let home = TempDir::new().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["config", "path"]);
    assert_eq!(code, 0);
    assert!(stdout.trim().ends_with(".config/lifekernel/config.toml"));
    assert!(stdout.starts_with(&*home.path().to_string_lossy()));
}

#[test]
fn test_config_set_then_get() {
    let home = TempDir::new().unwrap();
    let (_, _, code) = run_cli(
        home.path(),
        &["config", "set", "review.max_intentions", "5"],
    );
    assert_eq!(code, 0);

    let (stdout, _, code) = run_cli(home.path(), &["config", "get", "review.max_intentions"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "5");
}

#[test]
fn test_config_show_is_toml() {
    let home = TempDir::new().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["config", "show"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("[hard_mode]"));
    assert!(stdout.contains("trend_window_days = 14"));
}

#[test]
fn test_config_unknown_key_fails() {
    let home = TempDir::new().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["config", "set", "theme", "dark"]);
    assert_eq!(code, 1);
    assert!(stderr.starts_with("error:"));
}

// ============================================================================
// Replay
// ============================================================================

#[test]
fn test_replay_tasks() {
    let home = TempDir::new().unwrap();
    let events = write(
        &home,
        "events.json",
        serde_json::json!([
            event("task.created", "k1", "2026-03-02T09:00:00Z", serde_json::json!({"task_id": "a", "title": "Write"})),
            event("task.created", "k2", "2026-03-02T09:01:00Z", serde_json::json!({"task_id": "b", "title": "Read"})),
            event("task.focused", "k3", "2026-03-02T09:02:00Z", serde_json::json!({"task_id": "a"})),
            event("calendar.synced", "k4", "2026-03-02T09:03:00Z", serde_json::json!({})),
        ]),
    );

    let (stdout, _, code) = run_cli(home.path(), &["replay", "tasks", "--events", &events]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Focus: 1"));
    assert!(stdout.contains("Inbox: 1"));

    let (stdout, _, code) = run_cli(home.path(), &["replay", "tasks", "--events", &events, "--json"]);
    assert_eq!(code, 0);
    let state: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(state["tasks"]["a"]["status"], "focus");
}

#[test]
fn test_replay_unknown_stream_fails() {
    let home = TempDir::new().unwrap();
    let events = write(&home, "events.json", serde_json::json!([]));
    let (_, _, code) = run_cli(home.path(), &["replay", "calendar", "--events", &events]);
    assert_ne!(code, 0);
}

#[test]
fn test_replay_missing_file_fails() {
    let home = TempDir::new().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["replay", "habits", "--events", "/nonexistent.json"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("cannot read"));
}

// ============================================================================
// Validate plan
// ============================================================================

fn plan(home: &TempDir) -> String {
    write(
        home,
        "plan.json",
        serde_json::json!([
            {"id": "w", "module": "habits", "title": "Walk", "scheduled_at": "2026-03-02T08:00:00Z", "confidence": 0.7, "habit_anchor": "after-coffee"},
            {"id": "t", "module": "tasks", "title": "Pay rent", "scheduled_at": "2026-03-02T09:00:00Z", "confidence": 0.6},
        ]),
    )
}

#[test]
fn test_validate_plan_ok() {
    let home = TempDir::new().unwrap();
    let plan = plan(&home);
    let constraints = write(
        &home,
        "constraints.json",
        serde_json::json!([
            {"kind": "max_planned_items", "max": 2},
            {"kind": "allowed_habit_anchors", "anchors": ["after-coffee"]},
        ]),
    );
    let (stdout, _, code) = run_cli(
        home.path(),
        &["validate-plan", "--plan", &plan, "--constraints", &constraints],
    );
    assert_eq!(code, 0);
    assert!(stdout.starts_with("ok: 2 items"));
}

#[test]
fn test_validate_plan_violation_exits_nonzero() {
    let home = TempDir::new().unwrap();
    let plan = plan(&home);
    let constraints = write(
        &home,
        "constraints.json",
        serde_json::json!([{"kind": "disallow_module", "module": "tasks"}]),
    );
    let (stdout, stderr, code) = run_cli(
        home.path(),
        &["validate-plan", "--plan", &plan, "--constraints", &constraints],
    );
    assert_eq!(code, 1);
    assert!(stdout.is_empty());
    assert!(stderr.starts_with("error:"));
}

// ============================================================================
// Suggest
// ============================================================================

#[test]
fn test_suggest_empty_log_prompts_checkin() {
    let home = TempDir::new().unwrap();
    let log = write(&home, "log.json", serde_json::json!({"events": []}));
    let (stdout, _, code) = run_cli(
        home.path(),
        &["suggest", "--log", &log, "--now", "2026-03-03T15:00:00Z", "--json"],
    );
    assert_eq!(code, 0);
    let suggestions: Vec<serde_json::Value> = serde_json::from_str(&stdout).unwrap();
    assert!(suggestions.len() <= 3);
    assert!(suggestions.iter().any(|s| s["id"] == "checkin-prompt"));
}

#[test]
fn test_suggest_output_is_capped() {
    let home = TempDir::new().unwrap();
    let log = write(
        &home,
        "log.json",
        serde_json::json!({
            "events": [],
            "envelopes": [
                {"id": "food", "label": "Food", "spent": 95.0, "limit": 100.0},
                {"id": "fun", "label": "Fun", "spent": 90.0, "limit": 100.0},
            ],
            "patterns": [
                {"id": "p1", "title": "Late nights", "explanation": "You sleep less on Sundays.", "confidence": 0.9},
            ],
        }),
    );
    let (stdout, _, code) = run_cli(
        home.path(),
        &["suggest", "--log", &log, "--now", "2026-03-03T15:00:00Z", "--json"],
    );
    assert_eq!(code, 0);
    let suggestions: Vec<serde_json::Value> = serde_json::from_str(&stdout).unwrap();
    assert_eq!(suggestions.len(), 3);
    let priorities: Vec<u64> = suggestions.iter().map(|s| s["priority"].as_u64().unwrap()).collect();
    assert!(priorities.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn test_suggest_counts_completions_from_earlier_same_local_day() {
    let home = TempDir::new().unwrap();
    let (_, _, code) = run_cli(
        home.path(),
        &["config", "set", "suggestions.utc_offset_minutes", "600"],
    );
    assert_eq!(code, 0);

    // UTC+10: 21:00Z is 07:00 and 23:00Z is 09:00 on the next local day.
    let log = write(
        &home,
        "log.json",
        serde_json::json!({
            "events": [
                event("checkin.submitted", "c1", "2026-03-01T18:00:00Z", serde_json::json!({
                    "checkin": {
                        "id": "c1", "kind": "daily", "mood": 2, "energy": 1,
                        "flags": [], "note": null, "weekly_answers": {},
                        "submitted_at": "2026-03-01T18:00:00Z",
                        "updated_at": "2026-03-01T18:00:00Z",
                    },
                    "window_days": 14,
                })),
                event("task.created", "t1", "2026-03-01T19:00:00Z", serde_json::json!({"task_id": "a", "title": "Taxes"})),
                event("task.focused", "t2", "2026-03-01T20:00:00Z", serde_json::json!({"task_id": "a"})),
                event("task.completed", "t3", "2026-03-01T21:00:00Z", serde_json::json!({"task_id": "a"})),
            ],
        }),
    );
    let (stdout, _, code) = run_cli(
        home.path(),
        &["suggest", "--log", &log, "--now", "2026-03-01T23:00:00Z", "--json"],
    );
    assert_eq!(code, 0);
    let suggestions: Vec<serde_json::Value> = serde_json::from_str(&stdout).unwrap();
    assert!(suggestions.iter().all(|s| s["id"] != "rest-permission"));
}
