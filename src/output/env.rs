use std::collections::BTreeSet;

use super::{escape_value, new_table, render_pairs, render_table, value_to_string};
use crate::actuator::models::{EnvPropertyResponse, EnvResponse};

/// Active profiles followed by a `NAME VALUE ORIGIN` table of every property
///
/// Properties keep the order of their sources, so an overridden key shows up
/// once per source that defines it.
pub fn render_env(env: &EnvResponse, filter: Option<&str>) -> String {
    let filter = filter.unwrap_or("");
    let mut out = format!("Active Profiles: [{}]\n\n", env.active_profiles.join(" "));

    let mut table = new_table(["NAME", "VALUE", "ORIGIN"]);
    for source in &env.property_sources {
        for (name, details) in &source.properties {
            if !name.contains(filter) {
                continue;
            }
            let origin = details
                .origin
                .as_deref()
                .filter(|o| !o.is_empty())
                .unwrap_or(&source.name);
            table.add_row([
                name.clone(),
                escape_value(&value_to_string(&details.value)),
                origin.to_string(),
            ]);
        }
    }
    out.push_str(&render_table(&table));
    out
}

/// Sorted, de-duplicated property names
pub fn render_env_names(env: &EnvResponse, filter: Option<&str>) -> String {
    let filter = filter.unwrap_or("");
    let names: BTreeSet<&str> = env
        .property_sources
        .iter()
        .flat_map(|source| source.properties.keys())
        .map(String::as_str)
        .filter(|name| name.contains(filter))
        .collect();
    names.into_iter().map(|name| format!("{}\n", name)).collect()
}

/// Resolved value of one property and where it came from
pub fn render_env_property(name: &str, property: &EnvPropertyResponse) -> String {
    let (value, source) = match &property.property {
        Some(p) => (escape_value(&value_to_string(&p.value)), p.source.clone()),
        None => (String::new(), String::new()),
    };

    let origin = property
        .property_sources
        .iter()
        .filter_map(|ps| ps.property.as_ref())
        .find_map(|p| p.get("origin"))
        .map(value_to_string);

    let mut pairs = vec![
        ("NAME:", name.to_string()),
        ("VALUE:", value),
        ("SOURCE:", source),
    ];
    if let Some(origin) = origin.filter(|o| !o.is_empty()) {
        pairs.push(("ORIGIN:", origin));
    }
    render_pairs(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EnvResponse {
        serde_json::from_str(
            r#"{
                "activeProfiles": ["prod", "k8s"],
                "propertySources": [
                    {"name": "systemEnvironment", "properties": {
                        "JAVA_HOME": {"value": "/opt/java", "origin": "System Environment Property \"JAVA_HOME\""},
                        "server.port": {"value": 9090}
                    }},
                    {"name": "Config resource 'class path resource [application.yml]'", "properties": {
                        "server.port": {"value": 8080, "origin": "class path resource [application.yml] - 1:7"},
                        "app.banner": {"value": "line1\nline2"}
                    }}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_table_with_profiles() {
        let text = render_env(&sample(), None);
        assert!(text.starts_with("Active Profiles: [prod k8s]\n\nNAME"));
        assert!(text.contains("/opt/java"));
        assert!(text.contains("line1\\nline2"));
        // Origin falls back to the source name
        let port_row = text.lines().find(|l| l.contains("9090")).unwrap();
        assert!(port_row.ends_with("systemEnvironment"));
    }

    #[test]
    fn test_filter_applies_to_names() {
        let text = render_env(&sample(), Some("server"));
        assert_eq!(text.lines().filter(|l| l.starts_with("server.port")).count(), 2);
        assert!(!text.contains("JAVA_HOME"));
    }

    #[test]
    fn test_names_are_unique_and_sorted() {
        assert_eq!(
            render_env_names(&sample(), None),
            "JAVA_HOME\napp.banner\nserver.port\n"
        );
    }

    #[test]
    fn test_property_view() {
        let property: EnvPropertyResponse = serde_json::from_str(
            r#"{
                "property": {"source": "systemEnvironment", "value": "9090"},
                "activeProfiles": [],
                "propertySources": [
                    {"name": "server.ports"},
                    {"name": "systemEnvironment", "property": {"value": "9090", "origin": "System Environment Property \"SERVER_PORT\""}}
                ]
            }"#,
        )
        .unwrap();
        let text = render_env_property("server.port", &property);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("NAME:"));
        assert!(lines[1].ends_with("9090"));
        assert!(lines[2].ends_with("systemEnvironment"));
        assert!(lines[3].contains("SERVER_PORT"));
    }

    #[test]
    fn test_property_without_origin() {
        let property = EnvPropertyResponse {
            property: Some(crate::actuator::models::PropertyValue {
                source: "defaults".to_string(),
                value: serde_json::json!(true),
            }),
            ..Default::default()
        };
        let text = render_env_property("feature.enabled", &property);
        assert_eq!(text.lines().count(), 3);
    }
}
