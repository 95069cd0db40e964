use std::time::Duration;

pub const CHT_HEADER: &str = "#CHT1";

/// Format a duration as HH:MM:SS timestamp
pub fn format_timestamp(duration: Duration) -> String {
    let total = duration.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// Replace field separators so a value fits on one `.cht` line.
pub fn sanitize_field(value: &str) -> String {
    value
        .chars()
        .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
        .collect()
}

fn is_hex_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit())
}

/// One message line of a `.cht` file: `offset_ms<TAB>color<TAB>name<TAB>body`.
pub fn format_cht_line(offset: Duration, color: Option<&str>, name: &str, body: &str) -> String {
    let color = color.filter(|c| is_hex_color(c)).unwrap_or("");
    format!(
        "{}\t{}\t{}\t{}",
        offset.as_millis(),
        color.to_ascii_uppercase(),
        sanitize_field(name),
        sanitize_field(body)
    )
}
