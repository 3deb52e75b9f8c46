//! The `agg` command and interval parsing.

use std::io::Write;

use tokio::sync::watch;
use tokio::time::Duration;

use super::State;
use crate::feed::Aggregator;
use crate::{GatorError, Result};

/// Run the aggregator every `interval` until `shutdown` fires.
pub async fn agg(
    state: &State,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
    out: &mut dyn Write,
) -> Result<()> {
    writeln!(out, "Collecting feeds every {}", format_interval(interval))?;
    out.flush()?;

    let aggregator = Aggregator::new(state.db.clone(), state.fetcher.clone(), interval);
    let ticks = aggregator.run(shutdown).await;

    writeln!(out, "Stopped after {ticks} tick(s)")?;
    Ok(())
}

/// Parse an interval such as `1h30m`, `45s` or `500ms`.
///
/// The input is a sequence of integer and unit pairs; units are `h`, `m`,
/// `s` and `ms`. The total must be greater than zero.
pub fn parse_interval(input: &str) -> Result<Duration> {
    let invalid = || GatorError::Validation(format!("invalid interval: {input:?}"));

    let mut rest = input.trim();
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total = Duration::ZERO;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits == 0 {
            return Err(invalid());
        }
        let value: u64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let part = match unit {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.checked_mul(60).ok_or_else(invalid)?),
            "h" => Duration::from_secs(value.checked_mul(3600).ok_or_else(invalid)?),
            _ => return Err(invalid()),
        };
        total = total.checked_add(part).ok_or_else(invalid)?;
    }

    if total.is_zero() {
        return Err(GatorError::Validation(
            "interval must be greater than zero".to_string(),
        ));
    }
    Ok(total)
}

/// Format an interval the way [`parse_interval`] reads it.
pub fn format_interval(interval: Duration) -> String {
    let mut secs = interval.as_secs();
    let millis = interval.subsec_millis();
    let mut out = String::new();

    let hours = secs / 3600;
    secs %= 3600;
    let minutes = secs / 60;
    secs %= 60;

    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if secs > 0 {
        out.push_str(&format!("{secs}s"));
    }
    if millis > 0 || out.is_empty() {
        out.push_str(&format!("{millis}ms"));
    }
    out
}
