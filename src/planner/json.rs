//! Lenient JSON object extraction for model output.
//!
//! Models wrap their answer in prose, markdown fences or leave trailing
//! commas behind. [`extract_object`] scans for the first `{` that opens a
//! well-formed object, repairing trailing commas when a strict parse fails.

use serde_json::{Map, Value};

/// Returns the first JSON object found in `text`, if any.
pub fn extract_object(text: &str) -> Option<Map<String, Value>> {
    let mut offset = 0;
    while let Some(pos) = text[offset..].find('{') {
        let start = offset + pos;
        if let Some(end) = matching_brace(text, start) {
            let candidate = &text[start..=end];
            if let Some(object) = parse_object(candidate) {
                return Some(object);
            }
        }
        offset = start + 1;
    }
    None
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => None,
        Err(_) => match serde_json::from_str::<Value>(&strip_trailing_commas(candidate)) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        },
    }
}

/// Byte index of the `}` closing the object opened at `start`.
fn matching_brace(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Drops commas that directly precede `}` or `]`, outside of strings.
fn strip_trailing_commas(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        if c == '"' {
            in_string = true;
        }
        if c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_object() {
        let obj = extract_object(r#"{"n": 20}"#).unwrap();
        assert_eq!(obj["n"], 20);
    }

    #[test]
    fn test_surrounding_prose_and_fences() {
        let text = "Sure! Here is the plan:\n```json\n{\"genres\": [\"funk\"], \"n\": 12}\n```\nEnjoy.";
        let obj = extract_object(text).unwrap();
        assert_eq!(obj["genres"][0], "funk");
        assert_eq!(obj["n"], 12);
    }

    #[test]
    fn test_trailing_commas() {
        let text = r#"{"artists": ["Daft Punk", "Justice",], "exclusions": {"artists": ["GIMS",],},}"#;
        let obj = extract_object(text).unwrap();
        assert_eq!(obj["artists"].as_array().unwrap().len(), 2);
        assert_eq!(obj["exclusions"]["artists"][0], "GIMS");
    }

    #[test]
    fn test_braces_and_commas_inside_strings() {
        let text = r#"note {not json} then {"keywords": ["a, }", "b {x}"]}"#;
        let obj = extract_object(text).unwrap();
        assert_eq!(obj["keywords"][0], "a, }");
        assert_eq!(obj["keywords"][1], "b {x}");
    }

    #[test]
    fn test_no_object() {
        assert!(extract_object("no json here").is_none());
        assert!(extract_object("{ unterminated").is_none());
        assert!(extract_object("[1, 2, 3]").is_none());
    }
}
