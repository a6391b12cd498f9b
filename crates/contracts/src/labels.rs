//! LabelSet - static labels attached to shipped log streams
//!
//! Syntax: `{key="value", other="v2"}`. Braces are optional.

use std::collections::BTreeMap;

use crate::ContractError;

/// Ordered label name -> value map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    /// Parse label set syntax
    pub fn parse(raw: &str) -> Result<Self, ContractError> {
        let invalid = |message: String| ContractError::config_validation("external_labels", message);

        let mut body = raw.trim();
        if let Some(inner) = body.strip_prefix('{') {
            body = inner
                .strip_suffix('}')
                .ok_or_else(|| invalid(format!("unterminated '{{' in '{raw}'")))?;
        }

        let mut labels = BTreeMap::new();
        let mut rest = body.trim();
        while !rest.is_empty() {
            let (name, after_name) = rest
                .split_once('=')
                .ok_or_else(|| invalid(format!("expected name=\"value\" in '{raw}'")))?;
            let name = name.trim();
            if !is_valid_label_name(name) {
                return Err(invalid(format!("invalid label name '{name}'")));
            }

            let after_name = after_name.trim_start();
            let quoted = after_name
                .strip_prefix('"')
                .ok_or_else(|| invalid(format!("value of '{name}' must be double-quoted")))?;
            let (value, after_value) = split_quoted(quoted)
                .ok_or_else(|| invalid(format!("unterminated value for '{name}'")))?;

            if labels.insert(name.to_string(), value).is_some() {
                return Err(invalid(format!("duplicate label '{name}'")));
            }

            rest = after_value.trim_start();
            if let Some(next) = rest.strip_prefix(',') {
                rest = next.trim_start();
            } else if !rest.is_empty() {
                return Err(invalid(format!("expected ',' after '{name}'")));
            }
        }

        Ok(Self(labels))
    }

    /// Insert or replace a label
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Look up a label value
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Iterate in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of labels
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when there are no labels
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge, with `other` winning on conflicts
    pub fn merged(&self, other: &LabelSet) -> LabelSet {
        let mut out = self.clone();
        for (k, v) in other.iter() {
            out.insert(k, v);
        }
        out
    }

    /// Borrow the underlying map
    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Split `value"rest` at the closing quote, handling `\"` and `\\`
fn split_quoted(input: &str) -> Option<(String, &str)> {
    let mut value = String::new();
    let mut escaped = false;
    for (idx, c) in input.char_indices() {
        if escaped {
            value.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            return Some((value, &input[idx + 1..]));
        } else {
            value.push(c);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_braced() {
        let labels = LabelSet::parse(r#"{env="prod", cluster="eu-1"}"#).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.get("env"), Some("prod"));
        assert_eq!(labels.get("cluster"), Some("eu-1"));
    }

    #[test]
    fn test_parse_bare_and_escaped() {
        let labels = LabelSet::parse(r#"team="a \"b\"""#).unwrap();
        assert_eq!(labels.get("team"), Some(r#"a "b""#));
        assert!(LabelSet::parse("").unwrap().is_empty());
        assert!(LabelSet::parse("{}").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(LabelSet::parse(r#"{env="prod""#).is_err());
        assert!(LabelSet::parse(r#"{env=prod}"#).is_err());
        assert!(LabelSet::parse(r#"{1env="prod"}"#).is_err());
        assert!(LabelSet::parse(r#"{env="prod" x="y"}"#).is_err());
        assert!(LabelSet::parse(r#"{env="a", env="b"}"#).is_err());
    }

    #[test]
    fn test_merged_prefers_other() {
        let base = LabelSet::parse(r#"{env="prod", topic="x"}"#).unwrap();
        let extra = LabelSet::parse(r#"{topic="Deployment"}"#).unwrap();
        let merged = base.merged(&extra);
        assert_eq!(merged.get("topic"), Some("Deployment"));
        assert_eq!(merged.get("env"), Some("prod"));
    }
}
