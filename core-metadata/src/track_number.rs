//! Track-number normalization.

/// Leading integer of a track field.
///
/// Accepts `"7"`, `"3/12"`, `"3-12"` and `"3 of 12"`. Anything else is 0.
pub fn parse_track_number(raw: &str) -> i64 {
    let raw = raw.trim();

    let leading = if let Some((head, _)) = raw.split_once('/') {
        head
    } else if let Some((head, _)) = raw.split_once('-') {
        head
    } else if let Some((head, _)) = raw.split_once("of") {
        head
    } else {
        raw
    };

    leading.trim().parse::<i64>().unwrap_or(0)
}

/// Track number from a JSON tag value.
pub(crate) fn track_number_from_value(value: &serde_json::Value) -> i64 {
    match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        serde_json::Value::String(s) => parse_track_number(s),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_textual_encodings() {
        assert_eq!(parse_track_number("3 of 12"), 3);
        assert_eq!(parse_track_number("3/12"), 3);
        assert_eq!(parse_track_number("3-12"), 3);
        assert_eq!(parse_track_number("7"), 7);
        assert_eq!(parse_track_number("abc"), 0);
    }

    #[test]
    fn test_whitespace_and_degenerate_input() {
        assert_eq!(parse_track_number(" 11 / 14 "), 11);
        assert_eq!(parse_track_number(""), 0);
        assert_eq!(parse_track_number("/12"), 0);
    }

    #[test]
    fn test_json_values() {
        assert_eq!(track_number_from_value(&json!(5)), 5);
        assert_eq!(track_number_from_value(&json!(5.0)), 5);
        assert_eq!(track_number_from_value(&json!("9/10")), 9);
        assert_eq!(track_number_from_value(&json!(null)), 0);
    }
}
