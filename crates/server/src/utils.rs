use tokio::time::Duration;

/// Interval used when a target's interval string is empty or unparsable.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
/// Timeout used when a target's timeout string is empty or unparsable.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest interval or timeout a target may use; longer values are clamped.
pub const MAX_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Parses a human duration such as `"30"`, `"30s"`, `"500ms"`, `"5m"` or `"1h30m"`.
///
/// A bare integer (optionally suffixed with `s`) is a number of seconds;
/// anything else goes through `humantime`.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(secs) = s.strip_suffix('s').unwrap_or(s).parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    humantime::parse_duration(s).ok()
}

fn positive_or(input: &str, fallback: Duration) -> Duration {
    match parse_duration(input) {
        Some(d) if !d.is_zero() => d.min(MAX_DURATION),
        _ => fallback,
    }
}

/// Check interval for a target; never zero.
pub fn interval_or_default(input: &str) -> Duration {
    positive_or(input, DEFAULT_INTERVAL)
}

/// Check timeout for a target; never zero.
pub fn timeout_or_default(input: &str) -> Duration {
    positive_or(input, DEFAULT_TIMEOUT)
}

/// Removes the whitespace Gmail and friends insert into application passwords.
pub fn clean_app_password(password: &str) -> String {
    password.chars().filter(|c| !c.is_whitespace()).collect()
}
