//! Display formatting for console output.

/// US dollar amount with thousands separators and two decimals.
///
/// Example: 1234.5 → "$1,234.50"
pub fn format_currency(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, grouped, cents % 100)
}

/// Currency for an optional amount; missing renders as a dash.
pub fn format_amount(amount: Option<f64>) -> String {
    amount.map(format_currency).unwrap_or_else(|| "-".to_string())
}

/// Example: 0.425 → "42.5%"
pub fn format_percentage(ratio: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, ratio * 100.0)
}

/// Cut `text` to at most `max_chars` characters, ending in "...".
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

pub fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().to_string() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

/// Enum wire names for display: "closed_won" → "Closed won"
pub fn humanize(value: &str) -> String {
    capitalize_first(&value.replace('_', " "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(1234.5), "$1,234.50");
        assert_eq!(format_currency(0.0), "$0.00");
        assert_eq!(format_currency(999.999), "$1,000.00");
        assert_eq!(format_currency(1_250_000.0), "$1,250,000.00");
        assert_eq!(format_currency(-42.1), "-$42.10");
    }

    #[test]
    fn test_format_amount_missing() {
        assert_eq!(format_amount(None), "-");
        assert_eq!(format_amount(Some(12.0)), "$12.00");
    }

    #[test]
    fn test_format_percentage() {
        assert_eq!(format_percentage(0.425, 1), "42.5%");
        assert_eq!(format_percentage(1.0, 0), "100%");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Globex renewal deal", 10), "Globex ...");
        assert_eq!(truncate("Zoë Åberg Ltd", 6), "Zoë...");
    }

    #[test]
    fn test_capitalize_and_humanize() {
        assert_eq!(capitalize_first("hELLO"), "Hello");
        assert_eq!(capitalize_first(""), "");
        assert_eq!(humanize("closed_won"), "Closed won");
    }
}
