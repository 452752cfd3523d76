//! Vessel name normalization.
//!
//! Every component that keys or compares vessel names goes through
//! [`normalize_vessel_name`]; the watch table stores the same key.

/// Trim, collapse whitespace runs to a single space and upper-case.
///
/// Punctuation and diacritics are kept: `"MOL-TRIUMPH"` stays as is.
pub fn normalize_vessel_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_spacing() {
        let cases = [
            (" ever given ", "EVER GIVEN"),
            ("MSC    OSCAR", "MSC OSCAR"),
            ("cma cgm marco polo", "CMA CGM MARCO POLO"),
            ("HAPAG\tLLOYD\nEXPRESS", "HAPAG LLOYD EXPRESS"),
            ("MOL-TRIUMPH", "MOL-TRIUMPH"),
        ];

        for (raw, expected) in cases {
            assert_eq!(normalize_vessel_name(raw), expected, "input {raw:?}");
        }
    }

    #[test]
    fn keeps_diacritics() {
        assert_eq!(normalize_vessel_name("  höegh  trotter"), "HÖEGH TROTTER");
    }

    #[test]
    fn empty_input_gives_empty_key() {
        assert_eq!(normalize_vessel_name(""), "");
        assert_eq!(normalize_vessel_name(" \t\n "), "");
    }

    #[test]
    fn is_idempotent() {
        for raw in ["  a  b ", "X", "ünïcode  Name", "MSC\u{00a0}OSCAR", "ß"] {
            let once = normalize_vessel_name(raw);
            assert_eq!(normalize_vessel_name(&once), once, "input {raw:?}");
        }
    }
}
