use std::fmt::Write;

use super::{new_table, render_table};
use crate::actuator::models::{Bean, BeansResponse};

const MAX_BEAN_NAME_LENGTH: usize = 70;
const MAX_BEAN_TYPE_LENGTH: usize = 80;
const MAX_DEPENDENCIES_SHOWN: usize = 5;

fn name_matches(name: &str, filter: Option<&str>) -> bool {
    match filter.filter(|f| !f.is_empty()) {
        Some(f) => name.to_lowercase().contains(&f.to_lowercase()),
        None => true,
    }
}

/// `NAME TYPE SCOPE DEPENDENCIES` across all contexts, sorted by name
pub fn render_beans(beans: &BeansResponse, filter: Option<&str>) -> String {
    let mut rows: Vec<(&str, &Bean)> = beans
        .contexts
        .values()
        .flat_map(|ctx| ctx.beans.iter())
        .filter(|(name, _)| name_matches(name, filter))
        .map(|(name, bean)| (name.as_str(), bean))
        .collect();

    if rows.is_empty() {
        return match filter.filter(|f| !f.is_empty()) {
            Some(f) => format!("No beans matching filter: {}\n", f),
            None => "No beans found\n".to_string(),
        };
    }
    rows.sort_by(|a, b| a.0.cmp(b.0));

    let mut table = new_table(["NAME", "TYPE", "SCOPE", "DEPENDENCIES"]);
    for (name, bean) in rows {
        let scope = if bean.scope.is_empty() { "singleton" } else { &bean.scope };
        table.add_row([
            smart_truncate(name, MAX_BEAN_NAME_LENGTH),
            shorten_type(&bean.bean_type, MAX_BEAN_TYPE_LENGTH),
            scope.to_string(),
            bean.dependencies.len().to_string(),
        ]);
    }
    render_table(&table)
}

/// Sorted bean names; a filtered listing ends with the match count
pub fn render_bean_names(beans: &BeansResponse, filter: Option<&str>) -> String {
    let mut names: Vec<&str> = beans
        .contexts
        .values()
        .flat_map(|ctx| ctx.beans.keys())
        .map(String::as_str)
        .filter(|name| name_matches(name, filter))
        .collect();
    names.sort_unstable();

    let mut out: String = names.iter().map(|name| format!("{}\n", name)).collect();
    if filter.is_some_and(|f| !f.is_empty()) {
        let _ = write!(out, "\nTotal matching beans: {}\n", names.len());
    }
    out
}

/// Full detail per bean, grouped by application context
pub fn render_beans_wide(beans: &BeansResponse, filter: Option<&str>) -> String {
    let mut out = String::new();

    for (context_name, ctx) in &beans.contexts {
        let matching: Vec<(&String, &Bean)> = ctx.beans.iter().filter(|(name, _)| name_matches(name, filter)).collect();
        if matching.is_empty() {
            continue;
        }

        let _ = write!(out, "Context: {}\nBeans: {}\n\n", context_name, matching.len());

        for (name, bean) in matching {
            let _ = writeln!(out, "Bean: {}", name);
            if !bean.aliases.is_empty() {
                let _ = writeln!(out, "  Aliases: [{}]", bean.aliases.join(" "));
            }
            let _ = writeln!(out, "  Type: {}", bean.bean_type);
            if !bean.scope.is_empty() {
                let _ = writeln!(out, "  Scope: {}", bean.scope);
            }
            if let Some(resource) = bean.resource.as_deref().filter(|r| !r.is_empty()) {
                let _ = writeln!(out, "  Resource: {}", resource);
            }
            if !bean.dependencies.is_empty() {
                let _ = writeln!(out, "  Dependencies ({}):", bean.dependencies.len());
                for dep in bean.dependencies.iter().take(MAX_DEPENDENCIES_SHOWN) {
                    let _ = writeln!(out, "    - {}", dep);
                }
                if bean.dependencies.len() > MAX_DEPENDENCIES_SHOWN {
                    let _ = writeln!(out, "    ... and {} more", bean.dependencies.len() - MAX_DEPENDENCIES_SHOWN);
                }
            }
            out.push('\n');
        }
    }

    out
}

fn truncate(s: &str, max_len: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max_len {
        return s.to_string();
    }
    if max_len <= 1 {
        return chars[..max_len].iter().collect();
    }
    let mut out: String = chars[..max_len - 1].iter().collect();
    out.push('…');
    out
}

/// Keep the part after the last dot and cut from the middle
fn smart_truncate(s: &str, max_len: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max_len {
        return s.to_string();
    }

    let suffix: Vec<char> = match chars.iter().rposition(|&c| c == '.') {
        Some(dot) if dot < chars.len() - 1 => chars[dot + 1..].to_vec(),
        _ => {
            let keep = (max_len.saturating_sub(3) / 2).min(chars.len());
            chars[chars.len() - keep..].to_vec()
        }
    };

    let budget = max_len.saturating_sub(1);
    if suffix.len() > budget {
        let tail: String = suffix[suffix.len() - budget..].iter().collect();
        return format!("…{}", tail);
    }

    let prefix: String = chars[..budget - suffix.len()].iter().collect();
    let suffix: String = suffix.iter().collect();
    format!("{}…{}", prefix, suffix)
}

/// `org.springframework.web.Foo` becomes `o.s.w.Foo`
fn shorten_type(full_type: &str, max_len: usize) -> String {
    let Some((package, class)) = full_type.rsplit_once('.') else {
        return truncate(full_type, max_len);
    };
    let abbreviated: Vec<String> = package
        .split('.')
        .map(|segment| segment.chars().take(1).collect())
        .collect();
    truncate(&format!("{}.{}", abbreviated.join("."), class), max_len)
}
