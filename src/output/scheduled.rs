use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::warn;

use super::{format_duration_compact, new_table, render_table};
use crate::actuator::models::{LastExecution, NextExecution, Runnable, ScheduledTasksResponse};

/// Exception messages longer than this are cut unless `wide` is set
const MAX_STATUS_MESSAGE_LENGTH: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq)]
struct TaskRow {
    kind: &'static str,
    target: String,
    schedule: String,
    next: String,
    last: String,
    status: String,
}

/// One table of every scheduled task, sorted by type then target
///
/// Times are shown relative to `now`. Without `wide`, targets are shortened
/// to `Class.method` and error messages are truncated.
pub fn render_scheduled_tasks(tasks: &ScheduledTasksResponse, wide: bool, now: DateTime<Utc>) -> String {
    let row = |kind: &'static str,
               runnable: &Runnable,
               schedule: String,
               next: &Option<NextExecution>,
               last: &Option<LastExecution>| TaskRow {
        kind,
        target: format_target(&runnable.target, wide),
        schedule,
        next: format_next(next.as_ref(), now),
        last: format_last(last.as_ref(), now),
        status: format_status(last.as_ref(), wide),
    };

    let mut rows = Vec::new();
    for t in &tasks.cron {
        rows.push(row(
            "cron",
            &t.runnable,
            format!("cron({})", t.expression),
            &t.next_execution,
            &t.last_execution,
        ));
    }
    for t in &tasks.fixed_delay {
        rows.push(row(
            "fixedDelay",
            &t.runnable,
            interval_schedule("fixedDelay", t.interval, t.initial_delay),
            &t.next_execution,
            &t.last_execution,
        ));
    }
    for t in &tasks.fixed_rate {
        rows.push(row(
            "fixedRate",
            &t.runnable,
            interval_schedule("fixedRate", t.interval, t.initial_delay),
            &t.next_execution,
            &t.last_execution,
        ));
    }
    for t in &tasks.custom {
        rows.push(row(
            "custom",
            &t.runnable,
            "-".to_string(),
            &t.next_execution,
            &t.last_execution,
        ));
    }

    rows.sort_by(|a, b| a.kind.cmp(b.kind).then_with(|| a.target.cmp(&b.target)));

    let mut table = new_table(["TYPE", "TARGET", "SCHEDULE", "NEXT", "LAST", "STATUS"]);
    for r in rows {
        table.add_row([r.kind.to_string(), r.target, r.schedule, r.next, r.last, r.status]);
    }
    render_table(&table)
}

fn interval_schedule(kind: &str, interval_ms: i64, initial_delay_ms: i64) -> String {
    let mut schedule = format!("{}={}", kind, format_millis(interval_ms));
    if initial_delay_ms > 0 {
        schedule.push_str(&format!(" initialDelay={}", format_millis(initial_delay_ms)));
    }
    schedule
}

fn format_millis(ms: i64) -> String {
    format_duration_compact(Duration::from_millis(ms.unsigned_abs()))
}

/// `Class.method` unless the full target was asked for
fn format_target(target: &str, full: bool) -> String {
    if full {
        return target.to_string();
    }
    let parts: Vec<&str> = target.split('.').collect();
    if parts.len() >= 2 {
        format!("{}.{}", parts[parts.len() - 2], parts[parts.len() - 1])
    } else {
        target.to_string()
    }
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(s) {
        Ok(t) => Some(t.with_timezone(&Utc)),
        Err(e) => {
            warn!(time = %s, error = %e, "Unable to parse time, expected RFC 3339");
            None
        }
    }
}

fn relative(t: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = t - now;
    let magnitude = delta.abs().to_std().unwrap_or_default();
    if delta >= chrono::Duration::zero() {
        format!("in {}", format_duration_compact(magnitude))
    } else {
        format!("{} ago", format_duration_compact(magnitude))
    }
}

fn format_next(next: Option<&NextExecution>, now: DateTime<Utc>) -> String {
    match next {
        Some(n) if !n.time.is_empty() => parse_time(&n.time)
            .map(|t| relative(t, now))
            .unwrap_or_else(|| n.time.clone()),
        _ => "-".to_string(),
    }
}

fn format_last(last: Option<&LastExecution>, now: DateTime<Utc>) -> String {
    match last {
        Some(l) if !l.time.is_empty() => parse_time(&l.time)
            .map(|t| relative(t, now))
            .unwrap_or_else(|| l.time.clone()),
        _ => "-".to_string(),
    }
}

fn format_status(last: Option<&LastExecution>, wide: bool) -> String {
    let Some(last) = last else {
        return "-".to_string();
    };
    let status = last.status.as_deref().unwrap_or("");

    if status == "ERROR" {
        if let Some(message) = last.exception.as_ref().map(|e| e.message.as_str()).filter(|m| !m.is_empty()) {
            let shown = if !wide && message.chars().count() > MAX_STATUS_MESSAGE_LENGTH {
                let cut: String = message.chars().take(MAX_STATUS_MESSAGE_LENGTH).collect();
                format!("{}…", cut)
            } else {
                message.to_string()
            };
            return format!("{} - {}", status, shown);
        }
    }

    if status.is_empty() {
        "-".to_string()
    } else {
        status.to_string()
    }
}
