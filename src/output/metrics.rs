use super::{format_bytes_human, format_seconds_human, new_table, render_pairs, render_table};
use crate::actuator::models::{MetricResponse, MetricsListResponse};

/// Metric names, one per line, keeping those that contain `filter`
pub fn render_metric_names(metrics: &MetricsListResponse, filter: Option<&str>) -> String {
    let filter = filter.unwrap_or("");
    metrics
        .names
        .iter()
        .filter(|name| name.contains(filter))
        .map(|name| format!("{}\n", name))
        .collect()
}

/// Header block, measurements and available tags of a single metric
pub fn render_metric(metric: &MetricResponse) -> String {
    let base_unit = metric.base_unit.as_deref().unwrap_or("");

    let mut out = render_pairs([
        ("NAME", metric.name.as_str()),
        ("DESCRIPTION", metric.description.as_deref().unwrap_or("")),
        ("BASE UNIT", base_unit),
    ]);
    out.push('\n');

    out.push_str("MEASUREMENTS\n");
    let mut measurements = new_table(["STATISTIC", "VALUE"]);
    for m in &metric.measurements {
        measurements.add_row([m.statistic.clone(), format_metric_value(m.value, base_unit)]);
    }
    out.push_str(&render_table(&measurements));

    if !metric.available_tags.is_empty() {
        out.push('\n');
        out.push_str("AVAILABLE TAGS\n");
        let mut tags = new_table(["TAG", "VALUES"]);
        for tag in &metric.available_tags {
            tags.add_row([tag.tag.clone(), tag.values.join(", ")]);
        }
        out.push_str(&render_table(&tags));
    }

    out
}

fn format_metric_value(value: f64, unit: &str) -> String {
    match unit {
        "bytes" => format_bytes_human(value),
        "seconds" => format_seconds_human(value),
        _ => format!("{:.2}", value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_filtered_by_substring() {
        let list = MetricsListResponse {
            names: vec![
                "jvm.memory.used".to_string(),
                "http.server.requests".to_string(),
                "jvm.threads.live".to_string(),
            ],
        };
        assert_eq!(render_metric_names(&list, None).lines().count(), 3);
        assert_eq!(
            render_metric_names(&list, Some("jvm")),
            "jvm.memory.used\njvm.threads.live\n"
        );
        assert_eq!(render_metric_names(&list, Some("nope")), "");
    }

    #[test]
    fn test_metric_detail() {
        let metric: MetricResponse = serde_json::from_str(
            r#"{
                "name": "jvm.memory.used",
                "description": "The amount of used memory",
                "baseUnit": "bytes",
                "measurements": [{"statistic": "VALUE", "value": 512}],
                "availableTags": [{"tag": "area", "values": ["heap", "nonheap"]}]
            }"#,
        )
        .unwrap();
        let text = render_metric(&metric);

        assert!(text.starts_with("NAME"));
        assert!(text.contains("The amount of used memory"));
        assert!(text.contains("\n\nMEASUREMENTS\nSTATISTIC"));
        assert!(text.contains("512 B"));
        assert!(text.contains("\n\nAVAILABLE TAGS\n"));
        assert!(text.contains("heap, nonheap"));
    }

    #[test]
    fn test_unitless_values_and_no_tags() {
        let metric = MetricResponse {
            name: "process.uptime".to_string(),
            measurements: vec![crate::actuator::models::Measurement {
                statistic: "COUNT".to_string(),
                value: 3.0,
            }],
            ..Default::default()
        };
        let text = render_metric(&metric);
        assert!(text.contains("3.00"));
        assert!(!text.contains("AVAILABLE TAGS"));
    }

    #[test]
    fn test_seconds_unit() {
        assert_eq!(format_metric_value(0.25, "seconds"), "250.00 ms");
    }
}
