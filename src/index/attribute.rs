//! Attribute paths: parsing and document dereferencing.
//!
//! Paths are split on unescaped `.`; `\.` escapes a literal dot so
//! URL-style keys can be indexed. The first segment selects the document
//! root (`content` or `meta`). Arrays encountered during the walk recurse
//! into every element and flatten the results.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::Document;

/// A parsed attribute path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributePath {
    raw: String,
    segments: Vec<String>,
}

impl AttributePath {
    /// Parses a dotted path such as `content.foo.bar` or
    /// `content.https:\/\/example\.com`.
    ///
    /// # Errors
    /// `InvalidArgument` for an empty path, an empty segment, a path with
    /// fewer than two segments, or a root other than `content`/`meta`.
    pub fn parse(path: &str) -> Result<Self> {
        let segments = split_unescaped(path);

        if segments.len() < 2 {
            return Err(Error::invalid_argument(format!(
                "attribute path must reference a key under content or meta: {path}"
            )));
        }
        if segments.iter().any(String::is_empty) {
            return Err(Error::invalid_argument(format!(
                "attribute path contains an empty segment: {path}"
            )));
        }
        if segments[0] != "content" && segments[0] != "meta" {
            return Err(Error::invalid_argument(format!(
                "attribute path must begin with content or meta: {path}"
            )));
        }

        Ok(Self { raw: path.to_string(), segments })
    }

    /// The path exactly as the caller declared it.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

fn split_unescaped(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'.') => {
                current.push('.');
                chars.next();
            }
            '.' => segments.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    segments.push(current);
    segments
}

/// Collects every value the path refers to in `doc`.
///
/// A missing key contributes nothing; arrays anywhere along the walk are
/// descended element-wise, so a single path may yield many values.
pub fn dereference<'a>(doc: &'a Document, path: &AttributePath) -> Vec<&'a Value> {
    let segments = path.segments();
    let root = match segments[0].as_str() {
        "content" => &doc.content,
        _ => &doc.meta,
    };

    let mut out = Vec::new();
    if let Some(value) = root.get(&segments[1]) {
        walk(value, &segments[2..], &mut out);
    }
    out
}

fn walk<'a>(value: &'a Value, keys: &[String], out: &mut Vec<&'a Value>) {
    if let Value::Array(items) = value {
        for item in items {
            walk(item, keys, out);
        }
        return;
    }
    match keys.split_first() {
        None => out.push(value),
        Some((key, rest)) => {
            if let Value::Object(map) = value {
                if let Some(next) = map.get(key) {
                    walk(next, rest, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(content: Value) -> Document {
        let Value::Object(content) = content else { panic!("content must be an object") };
        Document::with_content(content)
    }

    #[test]
    fn test_parse_simple() {
        let path = AttributePath::parse("content.foo.bar").unwrap();
        assert_eq!(path.segments(), ["content", "foo", "bar"]);
        assert_eq!(path.raw(), "content.foo.bar");
    }

    #[test]
    fn test_parse_escaped_dot() {
        let path = AttributePath::parse(r"content.example\.com").unwrap();
        assert_eq!(path.segments(), ["content", "example.com"]);
    }

    #[test]
    fn test_parse_rejects_bad_paths() {
        assert!(AttributePath::parse("").is_err());
        assert!(AttributePath::parse("content").is_err());
        assert!(AttributePath::parse("foo.bar").is_err());
        assert!(AttributePath::parse("content..bar").is_err());
        assert!(AttributePath::parse(".content.bar").is_err());
    }

    #[test]
    fn test_meta_root() {
        let path = AttributePath::parse("meta.kind").unwrap();
        let mut d = doc(json!({}));
        d.meta.insert("kind".into(), json!("note"));
        let values = dereference(&d, &path);
        assert_eq!(values, [&json!("note")]);
    }

    #[test]
    fn test_missing_key_yields_nothing() {
        let d = doc(json!({"foo": 1}));
        let path = AttributePath::parse("content.bar").unwrap();
        assert!(dereference(&d, &path).is_empty());
    }

    #[test]
    fn test_array_descent_flattens() {
        let d = doc(json!({"nested": {"array": [{"foo": "bar"}, {"foo": "baz"}, {"other": 1}]}}));
        let path = AttributePath::parse("content.nested.array.foo").unwrap();
        let values = dereference(&d, &path);
        assert_eq!(values, [&json!("bar"), &json!("baz")]);
    }

    #[test]
    fn test_terminal_array_yields_each_element() {
        let d = doc(json!({"tags": ["a", "b"]}));
        let path = AttributePath::parse("content.tags").unwrap();
        let values = dereference(&d, &path);
        assert_eq!(values, [&json!("a"), &json!("b")]);
    }

    #[test]
    fn test_null_is_a_present_value() {
        let d = doc(json!({"maybe": null}));
        let path = AttributePath::parse("content.maybe").unwrap();
        assert_eq!(dereference(&d, &path), [&Value::Null]);
    }
}
