//! Output filename rendering.

use chrono::{DateTime, TimeZone};

use crate::types::Mode;

/// Render an output filename from a template.
///
/// Placeholders: `{date}` → `YYYYMMDD`, `{time}` → `HHMMSS`, `{freq}` → the
/// frequency in Hz, `{mode}` → the mode tag. The result is sanitized so it
/// is always a single valid path component.
pub fn render<Tz: TimeZone>(
    template: &str,
    at: DateTime<Tz>,
    frequency: u64,
    mode: Mode,
) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let rendered = template
        .replace("{date}", &at.format("%Y%m%d").to_string())
        .replace("{time}", &at.format("%H%M%S").to_string())
        .replace("{freq}", &frequency.to_string())
        .replace("{mode}", mode.as_str());
    sanitize(&rendered)
}

/// Replace characters that are path separators or otherwise unsafe in a
/// filename on common filesystems.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
