//! Rendering of actuator responses for the terminal
//!
//! Every renderer returns the finished text for one pod; the per-pod runner
//! decides where it goes. Tables are borderless and aligned the way kubectl
//! prints them.

pub mod beans;
pub mod env;
pub mod health;
pub mod loggers;
pub mod metrics;
pub mod raw;
pub mod scheduled;
pub mod threads;

use comfy_table::presets::NOTHING;
use comfy_table::{Cell, ContentArrangement, Table};
use humansize::{format_size, WINDOWS};
use serde_json::Value;
use std::time::Duration;

/// Borderless table with two spaces between columns
pub fn new_table<I, T>(header: I) -> Table
where
    I: IntoIterator<Item = T>,
    T: Into<Cell>,
{
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Disabled)
        .set_header(header);
    for column in table.column_iter_mut() {
        column.set_padding((0, 2));
    }
    table
}

/// Headerless two-column table of labels and values
pub fn render_pairs<I, K, V>(pairs: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<Cell>,
    V: Into<Cell>,
{
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Disabled);
    for (key, value) in pairs {
        table.add_row(vec![key.into(), value.into()]);
    }
    for column in table.column_iter_mut() {
        column.set_padding((0, 2));
    }
    render_table(&table)
}

/// Table text with trailing padding removed, ending in a newline
pub fn render_table(table: &Table) -> String {
    let mut out = String::new();
    for line in table.lines() {
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

/// Compact duration such as `1h2m3s`, rounded to whole seconds
pub fn format_duration_compact(d: Duration) -> String {
    let secs = (d.as_millis() + 500) / 1000;
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);

    let mut out = String::new();
    if h > 0 {
        out.push_str(&format!("{}h", h));
    }
    if m > 0 {
        out.push_str(&format!("{}m", m));
    }
    if s > 0 || out.is_empty() {
        out.push_str(&format!("{}s", s));
    }
    out
}

/// Seconds scaled to the most readable unit
pub fn format_seconds_human(seconds: f64) -> String {
    if seconds < 0.001 {
        format!("{:.2} µs", seconds * 1_000_000.0)
    } else if seconds < 1.0 {
        format!("{:.2} ms", seconds * 1000.0)
    } else if seconds < 60.0 {
        format!("{:.2} s", seconds)
    } else if seconds < 3600.0 {
        format!("{:.2} m", seconds / 60.0)
    } else {
        format!("{:.2} h", seconds / 3600.0)
    }
}

/// Byte count in binary units (`1.5 KB`)
pub fn format_bytes_human(bytes: f64) -> String {
    if bytes < 1024.0 {
        return format!("{:.0} B", bytes);
    }
    format_size(bytes as u64, WINDOWS.decimal_places(1))
}

/// Plain-text form of a JSON value; strings lose their quotes
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Make control characters visible so a value stays on one table row
pub fn escape_value(s: &str) -> String {
    s.replace('\n', "\\n").replace('\r', "\\r").replace('\t', "\\t")
}

/// Pretty JSON followed by a newline
pub fn to_pretty_json<T: serde::Serialize>(value: &T) -> crate::errors::Result<String> {
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_alignment() {
        let mut table = new_table(["NAME", "STATUS"]);
        table.add_row(["db", "UP"]);
        table.add_row(["diskSpace", "DOWN"]);
        let text = render_table(&table);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("NAME"));
        // Second column starts at the same offset on every row
        let offset = lines[0].find("STATUS").unwrap();
        assert_eq!(lines[1].find("UP"), Some(offset));
        assert_eq!(lines[2].find("DOWN"), Some(offset));
        assert!(lines.iter().all(|l| !l.ends_with(' ')));
    }

    #[test]
    fn test_pairs_align_values() {
        let text = render_pairs([("NAME", "jvm.memory.used"), ("BASE UNIT", "bytes")]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0].find("jvm"), lines[1].find("bytes"));
    }

    #[test]
    fn test_duration_compact() {
        assert_eq!(format_duration_compact(Duration::from_secs(0)), "0s");
        assert_eq!(format_duration_compact(Duration::from_millis(1500)), "2s");
        assert_eq!(format_duration_compact(Duration::from_secs(3723)), "1h2m3s");
        assert_eq!(format_duration_compact(Duration::from_secs(120)), "2m");
    }

    #[test]
    fn test_seconds_human() {
        assert_eq!(format_seconds_human(0.0005), "500.00 µs");
        assert_eq!(format_seconds_human(0.25), "250.00 ms");
        assert_eq!(format_seconds_human(12.0), "12.00 s");
        assert_eq!(format_seconds_human(90.0), "1.50 m");
        assert_eq!(format_seconds_human(7200.0), "2.00 h");
    }

    #[test]
    fn test_small_byte_counts() {
        assert_eq!(format_bytes_human(512.0), "512 B");
        assert!(format_bytes_human(1536.0).starts_with("1.5"));
    }

    #[test]
    fn test_value_to_string() {
        assert_eq!(value_to_string(&serde_json::json!("text")), "text");
        assert_eq!(value_to_string(&serde_json::json!(8080)), "8080");
        assert_eq!(value_to_string(&serde_json::json!(true)), "true");
        assert_eq!(value_to_string(&Value::Null), "");
    }

    #[test]
    fn test_escape_value() {
        assert_eq!(escape_value("a\nb\tc"), "a\\nb\\tc");
    }
}
