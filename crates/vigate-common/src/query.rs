//! Query-string splitting for endpoint requests.

/// Splits the query part of `request` (everything after the first `?`) into
/// ordered `(key, value)` pairs.
///
/// Pairs are separated by `&`. A pair that does not split into exactly two
/// parts on `=` is dropped.
pub fn parse_query(request: &str) -> Vec<(String, String)> {
    let Some((_, query)) = request.split_once('?') else {
        return Vec::new();
    };

    query
        .split('&')
        .filter_map(|pair| {
            let mut parts = pair.split('=');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(key), Some(value), None) => Some((key.to_string(), value.to_string())),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_ordered_pairs() {
        let parsed = parse_query("greet?Name=Joe&Age=5");
        assert_eq!(parsed, pairs(&[("Name", "Joe"), ("Age", "5")]));
    }

    #[test]
    fn test_no_query_yields_nothing() {
        assert!(parse_query("greet").is_empty());
        assert!(parse_query("greet?").is_empty());
    }

    #[test]
    fn test_malformed_pairs_are_dropped() {
        let parsed = parse_query("x?flag&a=1&b=2=3&=empty&c=");
        assert_eq!(parsed, pairs(&[("a", "1"), ("", "empty"), ("c", "")]));
    }

    #[test]
    fn test_only_first_question_mark_starts_query() {
        let parsed = parse_query("x?q=what?");
        assert_eq!(parsed, pairs(&[("q", "what?")]));
    }
}
