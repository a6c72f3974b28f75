// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Phone number canonicalization.

/// Reduce a WhatsApp address or phone number to its canonical digit string.
///
/// Strips a `whatsapp:` channel prefix, every non-digit character, and an
/// international `00` dialing prefix, so `whatsapp:+1 (555) 010-2000`,
/// `+15550102000` and `0015550102000` all map to `15550102000`.
pub fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_channel = match trimmed.get(..9) {
        Some(prefix) if prefix.eq_ignore_ascii_case("whatsapp:") => &trimmed[9..],
        _ => trimmed,
    };
    let digits: String = without_channel
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    match digits.strip_prefix("00") {
        Some(rest) => rest.to_string(),
        None => digits,
    }
}
