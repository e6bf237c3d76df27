/// Small shared helpers for amount parsing, timestamps and addresses.
use chrono::DateTime;

/// Parse a decimal amount string into a u128 magnitude.
///
/// Leading sign is dropped (pool event outputs can be negative), fractional
/// tails are truncated, anything unparseable is 0 and overflow saturates.
pub fn safe_amount(raw: &str) -> u128 {
    let s = raw.trim();
    let s = s.strip_prefix('-').unwrap_or(s);
    let s = s.strip_prefix('+').unwrap_or(s);
    let int_part = s.split('.').next().unwrap_or("");
    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return 0;
    }
    let mut acc: u128 = 0;
    for b in int_part.bytes() {
        let digit = (b - b'0') as u128;
        acc = match acc.checked_mul(10).and_then(|v| v.checked_add(digit)) {
            Some(v) => v,
            None => return u128::MAX,
        };
    }
    acc
}

/// Strip a leading sign from an amount string, keeping the digits intact.
pub fn amount_magnitude(raw: &str) -> String {
    let s = raw.trim();
    s.strip_prefix('-')
        .or_else(|| s.strip_prefix('+'))
        .unwrap_or(s)
        .to_string()
}

/// Epoch milliseconds from an RFC 3339 timestamp, or from a bare numeric
/// string. Unparseable input sorts to 0 rather than failing the row.
pub fn to_epoch_ms(timestamp: &str) -> i64 {
    let s = timestamp.trim();
    if s.is_empty() {
        return 0;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.timestamp_millis();
    }
    s.parse::<i64>().unwrap_or(0)
}

/// Case-insensitive equality for EVM addresses; empty strings never match.
pub fn evm_addr_eq(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && a.eq_ignore_ascii_case(b)
}

/// Row id used for aggregated swap rows.
pub fn swap_row_id(extrinsic_hash: &str) -> String {
    format!("{}:swap", extrinsic_hash)
}
