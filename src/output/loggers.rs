use super::{new_table, render_table};
use crate::actuator::models::LoggerConfiguration;

pub const ROOT_LOGGER: &str = "ROOT";

/// Options for the logger listing
#[derive(Debug, Clone, Default)]
pub struct LoggerView<'a> {
    /// Only show loggers whose name starts with this prefix
    pub prefix: Option<&'a str>,
    /// Include loggers that only inherit their level
    pub show_all: bool,
}

/// `LOGGER LEVEL` table, `ROOT` first
///
/// Loggers without a configured level are hidden unless `show_all` is set or
/// the logger was asked for by its exact name.
pub fn render_loggers(loggers: &[LoggerConfiguration], view: &LoggerView<'_>) -> String {
    let mut sorted: Vec<&LoggerConfiguration> = loggers.iter().collect();
    sorted.sort_by(|a, b| {
        (a.name != ROOT_LOGGER)
            .cmp(&(b.name != ROOT_LOGGER))
            .then_with(|| a.name.cmp(&b.name))
    });

    let prefix = view.prefix.filter(|p| !p.is_empty());
    let mut table = new_table(["LOGGER", "LEVEL"]);
    let mut omitted = 0usize;

    for logger in sorted {
        if logger.configured_level.is_none() && !view.show_all && Some(logger.name.as_str()) != prefix {
            continue;
        }
        if let Some(prefix) = prefix {
            if !logger.name.starts_with(prefix) {
                omitted += 1;
                continue;
            }
        }

        let level = match (&logger.configured_level, &logger.effective_level) {
            (Some(configured), _) => configured.clone(),
            (None, Some(effective)) => format!("{} (effective)", effective),
            (None, None) => String::new(),
        };
        table.add_row([logger.name.clone(), level]);
    }

    let mut out = render_table(&table);
    if omitted > 0 {
        out.push_str(&format!("{} non-matching loggers omitted\n", omitted));
    }
    out
}
