//! Command implementations for the binary

pub mod stats;
pub mod status;
pub mod sync;

/// Human form of a second count, e.g. `2h 05m`
pub fn format_duration(total_seconds: f64) -> String {
    let minutes = (total_seconds.max(0.0) / 60.0).round() as u64;
    let (hours, minutes) = (minutes / 60, minutes % 60);
    if hours > 0 {
        format!("{}h {:02}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

/// Clip `text` to `width` characters for table columns
pub fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        let kept: String = text.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        text.to_string()
    }
}
