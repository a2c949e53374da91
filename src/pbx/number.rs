//! Destination number normalization.

/// Reduces user input to the digit string the PBX dials.
///
/// Surrounding whitespace is trimmed, a leading `+` becomes the `00`
/// international prefix, and everything that is not an ASCII digit is
/// dropped.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    let (prefix, rest) = match trimmed.strip_prefix('+') {
        Some(rest) => ("00", rest),
        None => ("", trimmed),
    };

    let mut digits = String::with_capacity(prefix.len() + rest.len());
    digits.push_str(prefix);
    digits.extend(rest.chars().filter(char::is_ascii_digit));
    digits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn international_prefix_becomes_zeros() {
        assert_eq!(normalize("+49 171 234"), "0049171234");
    }

    #[test]
    fn punctuation_is_stripped() {
        assert_eq!(normalize("0171-234"), "0171234");
    }

    #[test]
    fn letters_vanish() {
        assert_eq!(normalize("CALL-ME"), "");
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize(" +49 (171) 234-56 ");
        assert_eq!(normalize(&once), once);
    }
}
