//! Locates the first balanced JSON object embedded in free text.
//!
//! Model replies mix prose with a JSON object. The scanner starts at the first
//! `{` and tracks brace depth, whether it is inside a string literal, and whether
//! the previous character was an escaping backslash. Braces inside strings are
//! not structural.

#[derive(Debug, Default)]
struct Scanner {
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl Scanner {
    /// Feed one byte; returns true when the opening brace has been closed.
    fn step(&mut self, byte: u8) -> bool {
        if self.escaped {
            self.escaped = false;
            return false;
        }

        match byte {
            b'\\' if self.in_string => {
                self.escaped = true;
                false
            }
            b'"' => {
                self.in_string = !self.in_string;
                false
            }
            _ if self.in_string => false,
            b'{' => {
                self.depth += 1;
                false
            }
            b'}' => {
                self.depth = self.depth.saturating_sub(1);
                self.depth == 0
            }
            _ => false,
        }
    }
}

/// Return the span from the first `{` through its matching `}`, inclusive.
///
/// Returns `None` when the text has no `{` or the first object never closes.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut scanner = Scanner::default();

    // The structural characters are all ASCII, so every index where the scan
    // stops is a char boundary.
    for (offset, byte) in text.as_bytes()[start..].iter().enumerate() {
        if scanner.step(*byte) {
            return Some(&text[start..=start + offset]);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_surrounded_by_prose() {
        let text = "Here is my analysis:\n{\"root_cause\":\"OOM\"}\nHope this helps.";
        assert_eq!(extract_json(text), Some("{\"root_cause\":\"OOM\"}"));
    }

    #[test]
    fn test_no_opening_brace() {
        assert_eq!(extract_json("No JSON here at all."), None);
        assert_eq!(extract_json(""), None);
        assert_eq!(extract_json("only a closing } brace"), None);
    }

    #[test]
    fn test_unclosed_object() {
        assert_eq!(extract_json("{\"root_cause\": \"OOM\", \"timeline\": [{}"), None);
        assert_eq!(extract_json("prefix { never closed"), None);
    }

    #[test]
    fn test_nested_objects_return_outermost() {
        let text = r#"{"evidence":{"logs":[{"line":"a"}],"events":[]}} trailing {"other":1}"#;
        assert_eq!(
            extract_json(text),
            Some(r#"{"evidence":{"logs":[{"line":"a"}],"events":[]}}"#)
        );
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let text = r#"{"reasoning":"map {key} was } empty {","x":1} after"#;
        assert_eq!(
            extract_json(text),
            Some(r#"{"reasoning":"map {key} was } empty {","x":1}"#)
        );
    }

    #[test]
    fn test_escaped_quotes_and_backslashes() {
        let text = r#"Result: {"line":"he said \"}\" then left","path":"C:\\dir\\","n":2} done"#;
        assert_eq!(
            extract_json(text),
            Some(r#"{"line":"he said \"}\" then left","path":"C:\\dir\\","n":2}"#)
        );
    }

    #[test]
    fn test_prose_braces_after_object_do_not_matter() {
        let text = "{\"a\":\"b\"} and then some } stray { braces";
        assert_eq!(extract_json(text), Some("{\"a\":\"b\"}"));
    }

    #[test]
    fn test_backslash_outside_string_is_not_an_escape() {
        let text = "{\\}";
        assert_eq!(extract_json(text), Some("{\\}"));
    }

    #[test]
    fn test_multibyte_text_around_object() {
        let text = "Análisis → {\"root_cause\":\"señal ✓\"} ✔";
        assert_eq!(extract_json(text), Some("{\"root_cause\":\"señal ✓\"}"));
    }

    #[test]
    fn test_span_parses_as_json() {
        let text = "I think the issue is memory.\n{\"root_cause\":\"OOM\",\"confidence\":\"high\",\"reasoning\":\"r\",\"timeline\":[],\"evidence\":{\"logs\":[],\"events\":[]},\"recommendations\":[]}";
        let span = extract_json(text).unwrap();
        let value: serde_json::Value = serde_json::from_str(span).unwrap();
        assert_eq!(value["root_cause"], "OOM");
    }
}
