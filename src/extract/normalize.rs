// src/extract/normalize.rs
use crate::extract::Unit;
use once_cell::sync::Lazy;
use regex::Regex;

// Footnote markers printed next to amounts: ※1, 注２, *3 and the bare "※ ".
static ANNOTATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:※|注|\*)[0-9０-９]{0,2}").expect("Failed to compile ANNOTATION_RE")
});

// Long-dash glyphs used by filings for "no amount".
const DASHES: &[&str] = &["－", "―", "-"];

/// Cleans one raw cell value into an integer amount.
///
/// Strips footnote markers, the share suffix, separators and whitespace;
/// a standalone dash means zero and the triangle glyph marks a negative
/// amount. Unparseable input is logged and treated as absent rather than
/// failing the whole row set.
pub fn normalize_value(raw: &str) -> Option<i64> {
    let stripped = ANNOTATION_RE.replace_all(raw, "");
    let cleaned = stripped
        .replace('株', "")
        .replace([' ', '\u{00a0}', '\u{3000}', ','], "");

    if cleaned.is_empty() {
        return None;
    }
    if DASHES.contains(&cleaned.as_str()) {
        return Some(0);
    }

    let signed = cleaned.replace('△', "-");
    match signed.parse::<i64>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("could not normalize value '{}', treating it as absent", raw);
            None
        }
    }
}

/// Normalizes and applies the table's amount unit.
pub fn normalize_scaled(raw: &str, unit: Unit) -> Option<i64> {
    normalize_value(raw).map(|v| v * unit.scale())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_amounts_lose_separators() {
        assert_eq!(normalize_value("1,234"), Some(1234));
        assert_eq!(normalize_value("12,345,678株"), Some(12_345_678));
    }

    #[test]
    fn unit_scaling_applies_after_normalization() {
        assert_eq!(normalize_scaled("1,234", Unit::ThousandsOfYen), Some(1_234_000));
        assert_eq!(normalize_scaled("1,234", Unit::MillionsOfYen), Some(1_234_000_000));
    }

    #[test]
    fn triangle_glyph_means_negative() {
        assert_eq!(normalize_value("△500"), Some(-500));
        assert_eq!(normalize_scaled("△500", Unit::ThousandsOfYen), Some(-500_000));
    }

    #[test]
    fn standalone_dash_means_zero() {
        assert_eq!(normalize_value("－"), Some(0));
        assert_eq!(normalize_value("―"), Some(0));
        assert_eq!(normalize_value("-"), Some(0));
    }

    #[test]
    fn footnote_markers_are_stripped() {
        assert_eq!(normalize_value("※1 1,234"), Some(1234));
        assert_eq!(normalize_value("※ 987"), Some(987));
        assert_eq!(normalize_value("注２ 500"), Some(500));
        assert_eq!(normalize_value("*1 42"), Some(42));
    }

    #[test]
    fn unreadable_values_become_absent() {
        assert_eq!(normalize_value("同左"), None);
        assert_eq!(normalize_value("1,234.56"), None);
        assert_eq!(normalize_value(""), None);
    }

    #[test]
    fn dash_inside_a_number_is_not_zeroed() {
        // a date-like cell must not silently turn into digits
        assert_eq!(normalize_value("2023-01"), None);
    }
}
