//! International phone number validation.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::SmsError;

fn e164() -> &'static Regex {
    static E164: OnceLock<Regex> = OnceLock::new();
    E164.get_or_init(|| Regex::new(r"^\+[1-9]\d{6,14}$").expect("static pattern"))
}

/// Drop whitespace and the `-`, `(` and `)` separators.
pub fn clean(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '(' | ')'))
        .collect()
}

/// The cleaned number when it is a `+`-prefixed international number of
/// 7 to 15 digits.
pub fn validate(raw: &str) -> Result<String, SmsError> {
    let cleaned = clean(raw);
    if e164().is_match(&cleaned) {
        Ok(cleaned)
    } else {
        Err(SmsError::InvalidRecipient(raw.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_formatted_numbers() {
        assert_eq!(validate("+33 6 12 34 56 78").unwrap(), "+33612345678");
        assert_eq!(validate("+1 (555) 123-4567").unwrap(), "+15551234567");
        assert_eq!(validate("+2126000000").unwrap(), "+2126000000");
    }

    #[test]
    fn rejects_bad_numbers() {
        for bad in ["0612345678", "+0612345678", "+12345", "+1234567890123456", "+33 6x12", ""] {
            assert!(
                matches!(validate(bad), Err(SmsError::InvalidRecipient(_))),
                "{bad} accepted"
            );
        }
    }

    proptest! {
        #[test]
        fn valid_lengths_accepted(first in 1u8..=9, rest in "[0-9]{6,14}") {
            let number = format!("+{first}{rest}");
            prop_assert_eq!(validate(&number).unwrap(), number);
        }

        #[test]
        fn separators_do_not_matter(rest in "[0-9]{6,14}") {
            let plain = format!("+4{rest}");
            let spaced: String = plain
                .chars()
                .flat_map(|c| [c, ' '])
                .collect();
            prop_assert_eq!(validate(&spaced).unwrap(), plain);
        }
    }
}
