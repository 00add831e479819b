//! Per-article rendering toggles read from YAML front matter.

use std::collections::BTreeMap;

use serde_yaml::Value;

/// Front matter key enabling the code line-number gutter.
pub const SHOW_CODE_LINE_NUMBER: &str = "show-code-line-number";
/// Front matter key listing heading selectors to fold.
pub const FOLDED_HEADINGS: &str = "folded-headings";

/// Flat string view of a note's front matter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArticleProperties {
    values: BTreeMap<String, String>,
}

impl ArticleProperties {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Parse the body of a front matter block.
    ///
    /// Scalars become strings and sequences are joined with `", "`. Nested
    /// mappings are skipped. Malformed YAML yields no properties.
    pub fn from_yaml(yaml: &str) -> Self {
        let mapping = match serde_yaml::from_str::<Value>(yaml) {
            Ok(Value::Mapping(mapping)) => mapping,
            Ok(Value::Null) => return Self::default(),
            Ok(_) => {
                tracing::warn!("front matter is not a mapping, ignoring");
                return Self::default();
            }
            Err(e) => {
                tracing::warn!(error = %e, "invalid front matter, ignoring");
                return Self::default();
            }
        };

        let values = mapping
            .into_iter()
            .filter_map(|(key, value)| Some((scalar_to_string(&key)?, value_to_string(&value)?)))
            .collect();
        Self { values }
    }

    /// `show-code-line-number`, accepting `true`, `yes`, `1` and `on`.
    ///
    /// `None` when the key is absent so callers can fall back to configuration.
    pub fn show_code_line_number(&self) -> Option<bool> {
        self.get(SHOW_CODE_LINE_NUMBER).map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "true" | "yes" | "1" | "on"
            )
        })
    }

    /// `folded-headings` split on commas, trimmed, empties dropped.
    pub fn folded_headings(&self) -> Vec<String> {
        self.get(FOLDED_HEADINGS)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null => Some(String::new()),
        Value::Sequence(_) | Value::Mapping(_) | Value::Tagged(_) => None,
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Sequence(items) => Some(
            items
                .iter()
                .filter_map(scalar_to_string)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        Value::Tagged(tagged) => value_to_string(&tagged.value),
        other => scalar_to_string(other),
    }
}

/// Split a leading `---` front matter block from `markdown`.
///
/// Returns the parsed properties and the remaining body. Documents without a
/// closed front matter block are returned whole.
pub fn split_front_matter(markdown: &str) -> (ArticleProperties, &str) {
    let Some(rest) = markdown
        .strip_prefix("---\n")
        .or_else(|| markdown.strip_prefix("---\r\n"))
    else {
        return (ArticleProperties::default(), markdown);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (ArticleProperties::from_yaml(yaml), body);
        }
        offset += line.len();
    }
    (ArticleProperties::default(), markdown)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_split_front_matter() {
        let (props, body) = split_front_matter(
            "---\nshow-code-line-number: yes\nfolded-headings: h2, h3\n---\n# Title\n",
        );
        assert_eq!(body, "# Title\n");
        assert_eq!(props.show_code_line_number(), Some(true));
        assert_eq!(props.folded_headings(), vec!["h2", "h3"]);
    }

    #[test]
    fn test_no_front_matter() {
        let (props, body) = split_front_matter("# Title\n---\n");
        assert_eq!(body, "# Title\n---\n");
        assert_eq!(props, ArticleProperties::default());
    }

    #[test]
    fn test_unclosed_front_matter_is_body() {
        let (props, body) = split_front_matter("---\ntitle: x\n");
        assert_eq!(body, "---\ntitle: x\n");
        assert!(props.get("title").is_none());
    }

    #[test]
    fn test_yaml_types_flatten_to_strings() {
        let props = ArticleProperties::from_yaml(
            "show-code-line-number: true\ncount: 3\nfolded-headings:\n  - h2\n  - \"#intro\"\n",
        );
        assert_eq!(props.get(SHOW_CODE_LINE_NUMBER), Some("true"));
        assert_eq!(props.get("count"), Some("3"));
        assert_eq!(props.folded_headings(), vec!["h2", "#intro"]);
    }

    #[test]
    fn test_line_number_values() {
        for (value, expected) in [("on", true), ("1", true), ("No", false), ("false", false)] {
            let props = ArticleProperties::new().with(SHOW_CODE_LINE_NUMBER, value);
            assert_eq!(props.show_code_line_number(), Some(expected), "{value}");
        }
        assert_eq!(ArticleProperties::new().show_code_line_number(), None);
    }

    #[test]
    fn test_invalid_yaml_is_ignored() {
        let (props, body) = split_front_matter("---\n: : :\n  - [\n---\nbody");
        assert_eq!(body, "body");
        assert_eq!(props, ArticleProperties::default());
    }
}
