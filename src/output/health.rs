use std::collections::BTreeMap;

use super::{new_table, render_table};
use crate::actuator::models::{HealthComponent, HealthResponse};

/// One row of the flattened component tree
#[derive(Debug, Clone, PartialEq)]
struct ComponentEntry {
    path: String,
    status: String,
    details: String,
}

fn collect_components(components: &BTreeMap<String, HealthComponent>, prefix: &str, entries: &mut Vec<ComponentEntry>) {
    for (name, component) in components {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}/{}", prefix, name)
        };

        let details = if component.details.is_empty() {
            "-".to_string()
        } else {
            serde_json::to_string(&component.details).unwrap_or_else(|_| "-".to_string())
        };

        entries.push(ComponentEntry {
            path: path.clone(),
            status: component.status.clone(),
            details,
        });

        collect_components(&component.components, &path, entries);
    }
}

/// Component table ending in an `[overall]` row; `wide` adds details
pub fn render_health(health: &HealthResponse, wide: bool) -> String {
    let mut entries = Vec::new();
    collect_components(&health.components, "", &mut entries);
    entries.sort_by(|a, b| a.path.cmp(&b.path));

    let mut table = if wide {
        new_table(["COMPONENT", "STATUS", "DETAILS"])
    } else {
        new_table(["COMPONENT", "STATUS"])
    };

    for entry in entries {
        if wide {
            table.add_row([entry.path, entry.status, entry.details]);
        } else {
            table.add_row([entry.path, entry.status]);
        }
    }

    if wide {
        table.add_row(["[overall]", health.status.as_str(), "-"]);
    } else {
        table.add_row(["[overall]", health.status.as_str()]);
    }

    render_table(&table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> HealthResponse {
        serde_json::from_str(
            r#"{"status":"DOWN","components":{
                "ping":{"status":"UP"},
                "db":{"status":"DOWN","components":{
                    "primary":{"status":"DOWN","details":{"error":"timeout"}},
                    "replica":{"status":"UP"}}}}}"#,
        )
        .unwrap()
    }

    fn cells(text: &str) -> Vec<Vec<String>> {
        text.lines()
            .map(|l| l.split_whitespace().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn test_nested_paths_sorted() {
        let rows = cells(&render_health(&sample(), false));
        assert_eq!(rows[0], vec!["COMPONENT", "STATUS"]);
        let paths: Vec<&str> = rows[1..].iter().map(|r| r[0].as_str()).collect();
        assert_eq!(paths, vec!["db", "db/primary", "db/replica", "ping", "[overall]"]);
        assert_eq!(rows.last().unwrap()[1], "DOWN");
    }

    #[test]
    fn test_wide_shows_details() {
        let text = render_health(&sample(), true);
        assert!(text.starts_with("COMPONENT"));
        assert!(text.contains(r#"{"error":"timeout"}"#));
        let overall = text.lines().last().unwrap();
        assert!(overall.starts_with("[overall]"));
        assert!(overall.ends_with('-'));
    }

    #[test]
    fn test_no_components() {
        let health = HealthResponse {
            status: "UP".to_string(),
            ..Default::default()
        };
        let rows = cells(&render_health(&health, false));
        assert_eq!(rows, vec![vec!["COMPONENT", "STATUS"], vec!["[overall]", "UP"]]);
    }
}
