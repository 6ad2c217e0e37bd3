//! Integer syntax accepted for numeric options.

/// Parse an integer the way `strtol(s, NULL, 0)` picks its base: `0x`/`0X`
/// prefix is hex, a leading `0` is octal, anything else decimal. Unlike
/// `strtol` the whole string must be consumed.
pub fn parse_number(input: &str) -> Option<i64> {
    let s = input.trim();
    let (negative, body) = match s.as_bytes().first()? {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };

    let (digits, radix) = if let Some(hex) = body
        .strip_prefix("0x")
        .or_else(|| body.strip_prefix("0X"))
    {
        (hex, 16)
    } else if body.len() > 1 && body.starts_with('0') {
        (&body[1..], 8)
    } else {
        (body, 10)
    };

    // from_str_radix would accept a second sign
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }

    let magnitude = i128::from_str_radix(digits, radix).ok()?;
    let value = if negative { -magnitude } else { magnitude };
    i64::try_from(value).ok()
}
