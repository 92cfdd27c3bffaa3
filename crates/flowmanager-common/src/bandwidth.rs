//! Parsing and formatting of the `kubernetes.io/egress-bandwidth`
//! annotation value.
//!
//! Format rules (spec §6): the formatted value is bit-exact — an integer
//! Mbps followed by the capital letter `M`, no spaces. The accepted
//! suffix set for parsing is `{M, m, K, k, G, g}`; per DESIGN.md open
//! question 4, `G`/`g` multiplies by 1000, not 1024, preserved from the
//! original implementation to avoid surprising the data plane.

/// Formats a bandwidth value in Mbps as the annotation's bit-exact
/// string form, e.g. `510M`.
pub fn format_mbps(mbps: i64) -> String {
    format!("{mbps}M")
}

/// Parses an annotation value such as `"500M"`, `"0.5G"`'s integer-run
/// variant (`"500000K"`), etc., into whole Mbps.
///
/// The numeric part is the leading integer run; trailing non-digit
/// characters select the suffix. Returns `None` if no leading digits
/// are present or the suffix is not one of `{M, m, K, k, G, g}`.
pub fn parse_mbps(value: &str) -> Option<i64> {
    let value = value.trim();
    let digit_end = value
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(value.len());

    if digit_end == 0 {
        return None;
    }

    let number: i64 = value[..digit_end].parse().ok()?;
    let suffix = &value[digit_end..];

    match suffix {
        "M" | "m" | "" => Some(number),
        "K" | "k" => Some(number / 1000),
        "G" | "g" => Some(number * 1000),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_bit_exact() {
        assert_eq!(format_mbps(510), "510M");
        assert_eq!(format_mbps(10), "10M");
    }

    #[test]
    fn parses_megabit_suffixes() {
        assert_eq!(parse_mbps("500M"), Some(500));
        assert_eq!(parse_mbps("500m"), Some(500));
    }

    #[test]
    fn parses_kilobit_suffix() {
        assert_eq!(parse_mbps("500000K"), Some(500));
        assert_eq!(parse_mbps("500000k"), Some(500));
    }

    #[test]
    fn parses_gigabit_suffix_as_times_1000() {
        assert_eq!(parse_mbps("1G"), Some(1000));
        assert_eq!(parse_mbps("2g"), Some(2000));
    }

    #[test]
    fn rejects_no_leading_digits() {
        assert_eq!(parse_mbps("M"), None);
        assert_eq!(parse_mbps(""), None);
    }

    #[test]
    fn rejects_unknown_suffix() {
        assert_eq!(parse_mbps("500X"), None);
    }

    #[test]
    fn format_then_parse_round_trips() {
        for v in [10, 500, 1000] {
            assert_eq!(parse_mbps(&format_mbps(v)), Some(v));
        }
    }
}
