use std::collections::HashMap;
use std::fmt::Write;

use crate::actuator::models::{StackFrame, ThreadDumpResponse, ThreadInfo};

/// JVM thread states in lifecycle order
pub const THREAD_STATES: [&str; 6] = ["NEW", "RUNNABLE", "BLOCKED", "WAITING", "TIMED_WAITING", "TERMINATED"];

/// Frames printed per thread unless the full trace was asked for
const DEFAULT_MAX_STACK_FRAMES: usize = 10;

/// Normalize a `--state` value, rejecting anything the JVM never reports
pub fn parse_thread_state(s: &str) -> Result<String, String> {
    let state = s.to_uppercase();
    if THREAD_STATES.contains(&state.as_str()) {
        Ok(state)
    } else {
        Err(format!(
            "invalid thread state '{}'\nValid states: [{}]",
            state,
            THREAD_STATES.join(" ")
        ))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ThreadDumpView<'a> {
    /// Exact state, already upper-cased
    pub state: Option<&'a str>,
    /// Case-insensitive substring of the thread name
    pub name: Option<&'a str>,
    pub summary_only: bool,
    pub no_stacktrace: bool,
    pub wide: bool,
}

impl ThreadDumpView<'_> {
    fn matches(&self, thread: &ThreadInfo) -> bool {
        if let Some(state) = self.state.filter(|s| !s.is_empty()) {
            if !thread.thread_state.eq_ignore_ascii_case(state) {
                return false;
            }
        }
        if let Some(name) = self.name.filter(|n| !n.is_empty()) {
            if !thread.thread_name.to_lowercase().contains(&name.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

/// State summary, then each matching thread with its stack
pub fn render_thread_dump(dump: &ThreadDumpResponse, view: &ThreadDumpView<'_>) -> String {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for thread in &dump.threads {
        *counts.entry(thread.thread_state.as_str()).or_default() += 1;
    }
    let filtered: Vec<&ThreadInfo> = dump.threads.iter().filter(|t| view.matches(t)).collect();

    let mut out = String::new();
    let _ = writeln!(out, "Total Threads: {}", dump.threads.len());
    out.push_str("\nThread States:\n");
    for state in THREAD_STATES {
        if let Some(count) = counts.get(state) {
            let _ = writeln!(out, "  {}: {}", state, count);
        }
    }

    if view.summary_only {
        return out;
    }
    out.push('\n');

    if filtered.is_empty() {
        out.push_str("No threads match the specified filters.\n");
        return out;
    }
    if filtered.len() < dump.threads.len() {
        let _ = write!(out, "Showing {} filtered threads:\n\n", filtered.len());
    }

    let max_frames = if view.wide { None } else { Some(DEFAULT_MAX_STACK_FRAMES) };
    for (i, thread) in filtered.iter().enumerate() {
        write_thread(&mut out, thread, i + 1, view, max_frames);
    }
    out
}

fn write_thread(out: &mut String, thread: &ThreadInfo, index: usize, view: &ThreadDumpView<'_>, max_frames: Option<usize>) {
    let _ = writeln!(out, "Thread #{}: {} (ID: {})", index, thread.thread_name, thread.thread_id);
    let _ = writeln!(out, "  State: {}", thread.thread_state);
    let _ = writeln!(
        out,
        "  Daemon: {}, In Native: {}, Suspended: {}",
        thread.daemon, thread.in_native, thread.suspended
    );

    if view.wide && thread.priority > 0 {
        let _ = writeln!(out, "  Priority: {}", thread.priority);
    }
    write_counter(out, "Blocked", thread.blocked_count, thread.blocked_time);
    write_counter(out, "Waited", thread.waited_count, thread.waited_time);
    if thread.lock_owner_id > 0 {
        let _ = writeln!(out, "  Waiting on lock owned by thread ID: {}", thread.lock_owner_id);
    }

    if !view.no_stacktrace && !thread.stack_trace.is_empty() {
        write_stack_trace(out, &thread.stack_trace, max_frames);
    }
    out.push('\n');
}

fn write_counter(out: &mut String, label: &str, count: i64, time_ms: i64) {
    if count <= 0 {
        return;
    }
    let _ = write!(out, "  {} Count: {}", label, count);
    if time_ms > 0 {
        let _ = write!(out, ", Time: {} ms", time_ms);
    }
    out.push('\n');
}

fn write_stack_trace(out: &mut String, frames: &[StackFrame], max_frames: Option<usize>) {
    out.push_str("  Stack Trace:\n");
    let shown = max_frames.map_or(frames.len(), |max| frames.len().min(max));
    for frame in &frames[..shown] {
        let _ = writeln!(
            out,
            "    at {}.{}({})",
            frame.class_name,
            frame.method_name,
            frame_location(frame)
        );
    }
    if frames.len() > shown {
        let _ = writeln!(out, "    ... {} more frames", frames.len() - shown);
    }
}

fn frame_location(frame: &StackFrame) -> String {
    match (&frame.file_name, frame.line_number) {
        (Some(file), Some(line)) if line != -1 => format!("{}:{}", file, line),
        (Some(file), _) => file.clone(),
        (None, _) if frame.native_method => "Native Method".to_string(),
        (None, _) => "Unknown Source".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(class: &str, method: &str, file: Option<&str>, line: Option<i32>) -> StackFrame {
        StackFrame {
            class_name: class.to_string(),
            method_name: method.to_string(),
            file_name: file.map(str::to_string),
            line_number: line,
            native_method: false,
        }
    }

    fn thread(name: &str, id: i64, state: &str, frames: usize) -> ThreadInfo {
        ThreadInfo {
            thread_name: name.to_string(),
            thread_id: id,
            thread_state: state.to_string(),
            priority: 5,
            stack_trace: (0..frames)
                .map(|i| frame("com.example.Worker", "run", Some("Worker.java"), Some(i as i32 + 1)))
                .collect(),
            ..Default::default()
        }
    }

    fn dump() -> ThreadDumpResponse {
        ThreadDumpResponse {
            threads: vec![
                thread("main", 1, "RUNNABLE", 2),
                thread("http-nio-8080-exec-1", 31, "WAITING", 15),
                thread("http-nio-8080-exec-2", 32, "WAITING", 0),
            ],
        }
    }

    #[test]
    fn test_parse_thread_state() {
        assert_eq!(parse_thread_state("blocked").unwrap(), "BLOCKED");
        let err = parse_thread_state("sleeping").unwrap_err();
        assert!(err.starts_with("invalid thread state 'SLEEPING'\nValid states: [NEW RUNNABLE"));
    }

    #[test]
    fn test_summary_only() {
        let view = ThreadDumpView {
            summary_only: true,
            ..Default::default()
        };
        assert_eq!(
            render_thread_dump(&dump(), &view),
            "Total Threads: 3\n\nThread States:\n  RUNNABLE: 1\n  WAITING: 2\n"
        );
    }

    #[test]
    fn test_frames_capped_unless_wide() {
        let text = render_thread_dump(&dump(), &ThreadDumpView::default());
        assert!(text.contains("Thread #2: http-nio-8080-exec-1 (ID: 31)"));
        assert!(text.contains("    at com.example.Worker.run(Worker.java:10)\n    ... 5 more frames"));
        assert!(!text.contains("Priority"));
        assert!(!text.contains("filtered threads"));

        let wide = ThreadDumpView {
            wide: true,
            ..Default::default()
        };
        let text = render_thread_dump(&dump(), &wide);
        assert!(text.contains("Worker.java:15"));
        assert!(!text.contains("more frames"));
        assert!(text.contains("  Priority: 5"));
    }

    #[test]
    fn test_filters() {
        let view = ThreadDumpView {
            state: Some("WAITING"),
            name: Some("EXEC-2"),
            ..Default::default()
        };
        let text = render_thread_dump(&dump(), &view);
        assert!(text.contains("Showing 1 filtered threads:\n\nThread #1: http-nio-8080-exec-2"));

        let view = ThreadDumpView {
            state: Some("BLOCKED"),
            ..Default::default()
        };
        assert!(render_thread_dump(&dump(), &view).ends_with("No threads match the specified filters.\n"));
    }

    #[test]
    fn test_no_stacktrace() {
        let view = ThreadDumpView {
            no_stacktrace: true,
            ..Default::default()
        };
        assert!(!render_thread_dump(&dump(), &view).contains("Stack Trace"));
    }

    #[test]
    fn test_frame_location() {
        assert_eq!(frame_location(&frame("A", "b", Some("A.java"), Some(-1))), "A.java");
        assert_eq!(frame_location(&frame("A", "b", None, None)), "Unknown Source");
        let mut native = frame("A", "b", None, None);
        native.native_method = true;
        assert_eq!(frame_location(&native), "Native Method");
    }

    #[test]
    fn test_lock_and_counters() {
        let mut t = thread("worker", 7, "BLOCKED", 0);
        t.blocked_count = 3;
        t.blocked_time = 40;
        t.waited_count = 2;
        t.lock_owner_id = 9;
        let text = render_thread_dump(&ThreadDumpResponse { threads: vec![t] }, &ThreadDumpView::default());
        assert!(text.contains("  Blocked Count: 3, Time: 40 ms\n"));
        assert!(text.contains("  Waited Count: 2\n"));
        assert!(text.contains("  Waiting on lock owned by thread ID: 9\n"));
    }
}
