//! Phone number normalization for the payment network.

use crate::error::PaymentError;

/// Normalizes a Kenyan mobile number to the `2547XXXXXXXX` form.
///
/// Spaces, dashes and a leading `+` are ignored. Accepts local `07…`/`01…`
/// numbers, bare 9-digit subscriber numbers and numbers already carrying
/// the `254` prefix.
pub fn normalize_phone(raw: &str) -> Result<String, PaymentError> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    let digits = compact.strip_prefix('+').unwrap_or(&compact);

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(PaymentError::InvalidPhone(raw.to_string()));
    }

    let subscriber = match digits.len() {
        12 => digits.strip_prefix("254"),
        10 => digits.strip_prefix('0'),
        9 => Some(digits),
        _ => None,
    };

    match subscriber {
        Some(s) if s.starts_with('7') || s.starts_with('1') => Ok(format!("254{s}")),
        _ => Err(PaymentError::InvalidPhone(raw.to_string())),
    }
}
