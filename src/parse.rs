use std::time::Duration;

use crate::error::{Result, TimerError};

/// Parse a human readable duration such as `90`, `45s`, `25m` or `1h30m`.
///
/// Bare digits are seconds. Otherwise the input is any non-empty sequence of
/// `<n>h`, `<n>m` and `<n>s` in that order, case-insensitive. Validating that
/// the result is non-zero is left to [`Timer`](crate::Timer) construction.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let invalid = || TimerError::InvalidFormat(input.to_string());
    let text = input.trim().to_ascii_lowercase();

    if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
        let seconds = text.parse::<u64>().map_err(|_| invalid())?;
        return Ok(Duration::from_secs(seconds));
    }

    let mut total: u64 = 0;
    let mut rest = text.as_str();
    let mut units = [('h', 3600u64), ('m', 60), ('s', 1)].into_iter();
    let mut matched = false;

    while !rest.is_empty() {
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return Err(invalid());
        }
        let (number, tail) = rest.split_at(digits);
        let unit = tail.chars().next().ok_or_else(invalid)?;

        // Units must appear at most once and in h, m, s order
        let scale = loop {
            match units.next() {
                Some((symbol, scale)) if symbol == unit => break scale,
                Some(_) => continue,
                None => return Err(invalid()),
            }
        };

        let value: u64 = number.parse().map_err(|_| invalid())?;
        total = value
            .checked_mul(scale)
            .and_then(|seconds| total.checked_add(seconds))
            .ok_or_else(invalid)?;
        rest = &tail[unit.len_utf8()..];
        matched = true;
    }

    if !matched {
        return Err(invalid());
    }
    Ok(Duration::from_secs(total))
}
