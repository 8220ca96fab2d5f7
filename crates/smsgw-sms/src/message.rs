//! Message properties stored alongside a received SMS.

use chrono::{NaiveDateTime, Timelike};
use sha2::{Digest, Sha256};

/// GSM-7 single-part capacity in characters.
pub const GSM7_PART_CHARS: usize = 160;
/// UCS-2 single-part capacity in characters.
pub const UCS2_PART_CHARS: usize = 70;

/// Whether `text` holds anything outside ASCII.
pub fn contains_unicode(text: &str) -> bool {
    text.len() != text.chars().count()
}

/// Number of SMS parts needed for `text`; never zero.
pub fn parts_count(text: &str) -> u32 {
    let per_part = if contains_unicode(text) {
        UCS2_PART_CHARS
    } else {
        GSM7_PART_CHARS
    };
    let chars = text.chars().count();
    chars.div_ceil(per_part).max(1) as u32
}

/// De-duplication hash: SHA-256 of `sender|message|minute`, hex encoded,
/// where `minute` is `received_at` truncated to the minute.
pub fn message_hash(sender: &str, message: &str, received_at: NaiveDateTime) -> String {
    let minute = received_at
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(received_at);
    let input = format!("{sender}|{message}|{}", minute.format("%Y-%m-%dT%H:%M:%S"));
    hex::encode(Sha256::digest(input.as_bytes()))
}
