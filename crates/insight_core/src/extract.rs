use once_cell::sync::Lazy;
use regex::Regex;

// First triple-fenced block only: optional language tag on the opening fence,
// whitespace, then a lazy body up to the next fence. DOTALL so the body spans
// newlines.
static FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+\-]*\s+(.*?)```").expect("fence pattern is valid")
});

/// Locate the first fenced code block in a model reply. Absence is a normal
/// outcome, not an error: the model answered in prose only.
pub fn extract_code_block(response: &str) -> Option<&str> {
    FENCE
        .captures(response)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_fences_yields_none() {
        assert_eq!(extract_code_block("just prose, no code here"), None);
        assert_eq!(extract_code_block(""), None);
    }

    #[test]
    fn single_fence_without_tag() {
        let reply = "Here you go:\n```\nshow(df)\n```\nDone.";
        assert_eq!(extract_code_block(reply), Some("show(df)\n"));
    }

    #[test]
    fn language_tag_is_skipped() {
        let reply = "```python\nchart.bar(df, x=\"region\", y=\"sales\")\n```";
        assert_eq!(
            extract_code_block(reply),
            Some("chart.bar(df, x=\"region\", y=\"sales\")\n")
        );
    }

    #[test]
    fn first_of_multiple_blocks_wins() {
        let reply = "```\nfirst()\n```\ntext between\n```python\nsecond()\n```";
        assert_eq!(extract_code_block(reply), Some("first()\n"));
    }

    #[test]
    fn body_may_span_many_lines() {
        let reply = "```\na = df.head(5)\nshow(a)\n\nchart.bar(a, x=\"r\", y=\"s\")\n```";
        let code = extract_code_block(reply).unwrap();
        assert!(code.contains("show(a)"));
        assert!(code.contains("chart.bar"));
    }

    #[test]
    fn unterminated_fence_yields_none() {
        assert_eq!(extract_code_block("```python\nnever closed"), None);
    }
}
