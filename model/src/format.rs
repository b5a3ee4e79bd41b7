//! Display helpers for addresses, token amounts, and timestamps.

use chrono::DateTime;

/// Shorten an address to its first `start` and last `end` characters (`0x1234...abcd`).
///
/// Values too short to shorten are returned unchanged.
pub fn short_address(address: &str, start: usize, end: usize) -> String {
    if !address.is_ascii() || address.len() < start.saturating_add(end) {
        return address.to_string();
    }
    format!("{}...{}", &address[..start], &address[address.len() - end..])
}

/// Render an amount expressed in the token's smallest unit with `decimals` fractional digits.
///
/// Trailing zeros of the fractional part are trimmed.
pub fn format_amount(amount: u128, decimals: u32) -> String {
    let digits = amount.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits;
    }
    let padded = format!("{digits:0>width$}", width = decimals + 1);
    let (whole, fraction) = padded.split_at(padded.len() - decimals);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        return whole.to_string();
    }
    format!("{whole}.{fraction}")
}

/// Render a unix timestamp (seconds) as a UTC date, like `Nov 14, 2023, 10:13 PM`.
///
/// Timestamps outside the representable range are rendered as the raw number.
pub fn format_date(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|date| date.format("%b %-d, %Y, %I:%M %p").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

/// Describe how long before `now` the unix timestamp `timestamp` was, in its largest whole unit.
///
/// Anything under a minute old (or in the future) is `Just now`.
pub fn format_relative_time(timestamp: u64, now: u64) -> String {
    let minutes = now.saturating_sub(timestamp) / 60;
    let hours = minutes / 60;
    let days = hours / 24;
    let (count, unit) = if days > 0 {
        (days, "day")
    } else if hours > 0 {
        (hours, "hour")
    } else if minutes > 0 {
        (minutes, "minute")
    } else {
        return "Just now".to_string();
    };
    let plural = if count > 1 { "s" } else { "" };
    format!("{count} {unit}{plural} ago")
}
