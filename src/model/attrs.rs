//! Numeric attribute conventions of definition files.
//!
//! Addresses are hexadecimal with an optional `0x` prefix; counts are
//! decimal unless prefixed; file sizes may carry a `kb`/`mb` suffix.

/// Parse `0x`-prefixed hex or plain decimal, with an optional leading `-`.
pub fn parse_number(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let value = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    Some(if negative { -value } else { value })
}

/// Parse an address: always hexadecimal, `0x` optional, sign allowed.
pub fn parse_hex(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(digits);
    let value = i64::from_str_radix(digits, 16).ok()?;
    Some(if negative { -value } else { value })
}

/// Parse a file size such as `512kb`, `1mb`, `0x80000` or `524288`.
pub fn parse_file_size(raw: &str) -> Option<u64> {
    let lower = raw.trim().to_ascii_lowercase();
    let (digits, scale) = if let Some(n) = lower.strip_suffix("kb") {
        (n, 1024)
    } else if let Some(n) = lower.strip_suffix("mb") {
        (n, 1024 * 1024)
    } else if let Some(n) = lower.strip_suffix('b') {
        (n, 1)
    } else {
        (lower.as_str(), 1)
    };
    let value = u64::try_from(parse_number(digits)?).ok()?;
    value.checked_mul(scale)
}

/// Parse switch state data: hex bytes, optionally separated by whitespace.
pub fn parse_state_bytes(raw: &str) -> Option<Vec<u8>> {
    let compact: String = raw.split_whitespace().collect();
    hex::decode(compact).ok()
}

/// Render an address the way definition files spell it.
pub fn format_hex(value: i64) -> String {
    if value < 0 {
        format!("-{:#x}", value.unsigned_abs())
    } else {
        format!("{:#x}", value)
    }
}
