//! Template trees and the placeholder renderer.
//!
//! A template definition is a nested JSON object whose string leaves may embed
//! Mustache-style placeholders:
//!
//! - `{{ path }}`: value at `path`, HTML-escaped
//! - `{{{ path }}}` / `{{& path }}`: value at `path`, unescaped
//! - `{{! comment }}`: renders nothing
//! - `{{# path }}...{{/ path }}`: renders the body once per array item, once
//!   for any other truthy value, and not at all for `false`, `null`, `""`,
//!   `[]` or a missing value
//! - `{{^ path }}...{{/ path }}`: renders the body only when `{{# path }}` would not
//! - `{{.}}`: the current section item
//!
//! A path is a dot-separated list of segments (`user.name`, `message.items.0`).
//! Inside a section, paths resolve against the section items first, innermost
//! first, then against the root data.
//! Leaves are validated when the tree is parsed, so rendering cannot fail.

use serde_json::{Map, Value};

use super::types::{TemplateError, TemplateResult};

/// Read access to the data a template is rendered against
pub trait Scope {
    fn resolve(&self, path: &[String]) -> Option<&Value>;
}

impl Scope for Value {
    fn resolve(&self, path: &[String]) -> Option<&Value> {
        lookup(self, path)
    }
}

/// Walk `path` from `value`; numeric segments index into arrays.
pub(crate) fn lookup<'a>(mut value: &'a Value, path: &[String]) -> Option<&'a Value> {
    for segment in path {
        value = match value {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value)
}

/// Parsed template: string leaves and ordered sub-trees
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateTree {
    Leaf(TemplateString),
    Node(Vec<(String, TemplateTree)>),
}

impl TemplateTree {
    /// Parse a raw definition. Any invalid leaf fails the whole tree.
    pub fn parse(raw: &Value) -> TemplateResult<Self> {
        Self::parse_at(raw, "")
    }

    fn parse_at(raw: &Value, path: &str) -> TemplateResult<Self> {
        match raw {
            Value::String(source) => TemplateString::parse(source)
                .map(TemplateTree::Leaf)
                .map_err(|reason| syntax_error(path, reason)),
            Value::Object(map) => {
                let mut fields = Vec::with_capacity(map.len());
                for (name, child) in map {
                    let child_path = if path.is_empty() {
                        name.clone()
                    } else {
                        format!("{}.{}", path, name)
                    };
                    fields.push((name.clone(), Self::parse_at(child, &child_path)?));
                }
                Ok(TemplateTree::Node(fields))
            }
            other => Err(syntax_error(
                path,
                format!("expected a string or an object, found {}", value_kind(other)),
            )),
        }
    }

    /// Render against `scope`, producing a value of the same shape.
    pub fn render<S: Scope + ?Sized>(&self, scope: &S) -> Value {
        match self {
            TemplateTree::Leaf(template) => Value::String(template.render(scope)),
            TemplateTree::Node(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(name, child)| (name.clone(), child.render(scope)))
                    .collect::<Map<String, Value>>(),
            ),
        }
    }

    /// Direct child of a node
    pub fn field(&self, name: &str) -> Option<&TemplateTree> {
        match self {
            TemplateTree::Leaf(_) => None,
            TemplateTree::Node(fields) => fields
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, tree)| tree),
        }
    }
}

fn syntax_error(path: &str, reason: impl Into<String>) -> TemplateError {
    TemplateError::Syntax {
        path: if path.is_empty() {
            "(root)".to_string()
        } else {
            path.to_string()
        },
        reason: reason.into(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A string leaf split into literal text, placeholders and sections
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateString {
    source: String,
    parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Text(String),
    /// An empty path is the current item (`{{.}}`)
    Value { path: Vec<String>, escape: bool },
    Section {
        path: Vec<String>,
        inverted: bool,
        children: Vec<Part>,
    },
}

/// A section opened but not yet closed while parsing
struct OpenSection {
    name: String,
    path: Vec<String>,
    inverted: bool,
    enclosing: Vec<Part>,
}

impl TemplateString {
    pub fn parse(source: &str) -> Result<Self, String> {
        let mut parts = Vec::new();
        let mut open: Vec<OpenSection> = Vec::new();
        let mut rest = source;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                parts.push(Part::Text(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];

            if let Some(inner) = after.strip_prefix('{') {
                let close = inner.find("}}}").ok_or("unclosed '{{{' tag")?;
                parts.push(Part::Value {
                    path: parse_path(&inner[..close])?,
                    escape: false,
                });
                rest = &inner[close + 3..];
                continue;
            }

            let close = after.find("}}").ok_or("unclosed '{{' tag")?;
            let tag = after[..close].trim();
            rest = &after[close + 2..];

            if tag.starts_with('!') {
                continue;
            }
            if let Some(raw) = tag.strip_prefix('&') {
                parts.push(Part::Value {
                    path: parse_path(raw)?,
                    escape: false,
                });
            } else if let Some(name) = tag.strip_prefix('#') {
                open.push(open_section(name, false, &mut parts)?);
            } else if let Some(name) = tag.strip_prefix('^') {
                open.push(open_section(name, true, &mut parts)?);
            } else if let Some(name) = tag.strip_prefix('/') {
                let name = name.trim();
                let section = open
                    .pop()
                    .ok_or_else(|| format!("'{{{{/{}}}}}' closes no open section", name))?;
                if section.name != name {
                    return Err(format!(
                        "section '{}' closed by '{{{{/{}}}}}'",
                        section.name, name
                    ));
                }
                let children = std::mem::replace(&mut parts, section.enclosing);
                parts.push(Part::Section {
                    path: section.path,
                    inverted: section.inverted,
                    children,
                });
            } else {
                parts.push(Part::Value {
                    path: parse_path(tag)?,
                    escape: true,
                });
            }
        }

        if let Some(section) = open.last() {
            return Err(format!("unclosed section '{}'", section.name));
        }
        if !rest.is_empty() {
            parts.push(Part::Text(rest.to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            parts,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn has_placeholders(&self) -> bool {
        self.parts.iter().any(|p| !matches!(p, Part::Text(_)))
    }

    pub fn render<S: Scope + ?Sized>(&self, scope: &S) -> String {
        let mut out = String::with_capacity(self.source.len());
        render_parts(&self.parts, scope, &mut Vec::new(), &mut out);
        out
    }
}

fn open_section(name: &str, inverted: bool, parts: &mut Vec<Part>) -> Result<OpenSection, String> {
    let name = name.trim();
    Ok(OpenSection {
        name: name.to_string(),
        path: parse_path(name)?,
        inverted,
        enclosing: std::mem::take(parts),
    })
}

/// Render `parts` with `frames` holding the section items entered so far,
/// innermost last.
fn render_parts<'a, S: Scope + ?Sized>(
    parts: &[Part],
    scope: &'a S,
    frames: &mut Vec<&'a Value>,
    out: &mut String,
) {
    for part in parts {
        match part {
            Part::Text(text) => out.push_str(text),
            Part::Value { path, escape } => {
                let formatted = resolve(scope, frames, path)
                    .map(format_value)
                    .unwrap_or_default();
                if *escape {
                    escape_html_into(&formatted, out);
                } else {
                    out.push_str(&formatted);
                }
            }
            Part::Section {
                path,
                inverted,
                children,
            } => {
                let value = resolve(scope, frames, path).filter(|v| is_truthy(v));
                match (value, *inverted) {
                    (None, true) => render_parts(children, scope, frames, out),
                    (Some(Value::Array(items)), false) => {
                        for item in items {
                            frames.push(item);
                            render_parts(children, scope, frames, out);
                            frames.pop();
                        }
                    }
                    (Some(value), false) => {
                        frames.push(value);
                        render_parts(children, scope, frames, out);
                        frames.pop();
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Look `path` up in the innermost frame that has its first segment, then in
/// the root scope.
fn resolve<'a, S: Scope + ?Sized>(
    scope: &'a S,
    frames: &[&'a Value],
    path: &[String],
) -> Option<&'a Value> {
    let Some((head, tail)) = path.split_first() else {
        return frames.last().copied();
    };
    for &frame in frames.iter().rev() {
        if let Some(found) = lookup(frame, std::slice::from_ref(head)) {
            return lookup(found, tail);
        }
    }
    scope.resolve(path)
}

/// Mustache truthiness: `false`, `null`, `""` and `[]` skip a section.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Number(_) | Value::Object(_) => true,
    }
}

fn parse_path(tag: &str) -> Result<Vec<String>, String> {
    let tag = tag.trim();
    if tag.is_empty() {
        return Err("empty tag".to_string());
    }
    if tag == "." {
        return Ok(Vec::new());
    }

    tag.split('.')
        .map(|segment| {
            if segment.is_empty() {
                Err(format!("empty path segment in '{}'", tag))
            } else if !segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                Err(format!("invalid character in placeholder '{}'", tag))
            } else {
                Ok(segment.to_string())
            }
        })
        .collect()
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        // Numbers and booleans display as-is, arrays and objects as compact JSON
        other => other.to_string(),
    }
}

fn escape_html_into(input: &str, out: &mut String) {
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '/' => out.push_str("&#x2F;"),
            '`' => out.push_str("&#x60;"),
            '=' => out.push_str("&#x3D;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render_str(template: &str, data: Value) -> String {
        TemplateString::parse(template).unwrap().render(&data)
    }

    #[test]
    fn test_parse_nested_tree() {
        let tree = TemplateTree::parse(&json!({
            "subject": "Hi {{user.name}}",
            "envelope": { "from": "bounce@example.com" }
        }))
        .unwrap();

        assert!(matches!(tree.field("subject"), Some(TemplateTree::Leaf(_))));
        assert!(matches!(
            tree.field("envelope").and_then(|e| e.field("from")),
            Some(TemplateTree::Leaf(_))
        ));
        assert!(tree.field("missing").is_none());
    }

    #[test]
    fn test_invalid_leaf_fails_whole_tree_with_path() {
        let err = TemplateTree::parse(&json!({
            "subject": "fine",
            "notification": { "body": "Hello {{user.name" }
        }))
        .unwrap_err();

        match err {
            TemplateError::Syntax { path, .. } => assert_eq!(path, "notification.body"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_non_string_value_is_rejected() {
        let err = TemplateTree::parse(&json!({ "data": { "badge": 3 } })).unwrap_err();
        match err {
            TemplateError::Syntax { path, reason } => {
                assert_eq!(path, "data.badge");
                assert!(reason.contains("number"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_placeholders() {
        for bad in ["{{}}", "{{ }}", "{{a..b}}", "{{.a}}", "{{a.}}", "{{a b}}", "{{{a}}", "x {{a"] {
            assert!(TemplateString::parse(bad).is_err(), "expected '{}' to fail", bad);
        }
    }

    #[test]
    fn test_stray_closing_braces_are_text() {
        assert_eq!(render_str("a }} b", json!({})), "a }} b");
    }

    #[test]
    fn test_render_paths_and_formatting() {
        let data = json!({
            "user": { "name": "Ann", "age": 31, "vip": true, "nick": null },
            "message": { "items": ["first", "second"], "meta": { "a": 1 } }
        });

        assert_eq!(render_str("Hi {{user.name}}", data.clone()), "Hi Ann");
        assert_eq!(render_str("{{ user.age }}/{{user.vip}}", data.clone()), "31/true");
        assert_eq!(render_str("[{{user.nick}}][{{user.missing}}]", data.clone()), "[][]");
        assert_eq!(render_str("{{message.items.1}}", data.clone()), "second");
        assert_eq!(render_str("{{{message.meta}}}", data.clone()), "{\"a\":1}");
        assert_eq!(render_str("{{message.items.9}}", data), "");
    }

    #[test]
    fn test_escaping() {
        let data = json!({ "v": "<b>Tom & \"Jerry\"</b>" });
        assert_eq!(
            render_str("{{v}}", data.clone()),
            "&lt;b&gt;Tom &amp; &quot;Jerry&quot;&lt;&#x2F;b&gt;"
        );
        assert_eq!(render_str("{{{v}}}", data.clone()), "<b>Tom & \"Jerry\"</b>");
        assert_eq!(render_str("{{& v}}", data), "<b>Tom & \"Jerry\"</b>");
    }

    #[test]
    fn test_comments_render_nothing() {
        let template = TemplateString::parse("a{{! note }}b").unwrap();
        assert!(!template.has_placeholders());
        assert_eq!(template.render(&json!({})), "ab");
    }

    #[test]
    fn test_sections_follow_truthiness() {
        let data = json!({
            "user": { "vip": true, "name": "Ann", "tags": [], "note": "" },
            "guest": { "vip": false }
        });
        let template = "{{#user.vip}}VIP {{/user.vip}}Hi";

        assert_eq!(render_str(template, data.clone()), "VIP Hi");
        assert_eq!(render_str("{{#guest.vip}}VIP {{/guest.vip}}Hi", data.clone()), "Hi");
        assert_eq!(render_str("{{#user.missing}}x{{/user.missing}}", data.clone()), "");
        assert_eq!(render_str("{{#user.tags}}x{{/user.tags}}", data.clone()), "");
        assert_eq!(render_str("{{#user.note}}x{{/user.note}}", data), "");
    }

    #[test]
    fn test_inverted_sections() {
        let data = json!({ "user": { "vip": false, "tags": ["a"] } });
        assert_eq!(render_str("{{^user.vip}}regular{{/user.vip}}", data.clone()), "regular");
        assert_eq!(render_str("{{^user.tags}}none{{/user.tags}}", data.clone()), "");
        assert_eq!(render_str("{{^ user.gone }}none{{/ user.gone }}", data), "none");
    }

    #[test]
    fn test_sections_iterate_arrays() {
        let data = json!({
            "message": {
                "items": [
                    { "name": "Tea", "qty": 2 },
                    { "name": "<Cake>", "qty": 1 }
                ],
                "codes": ["A", "B"]
            },
            "user": { "name": "Ann" }
        });

        assert_eq!(
            render_str(
                "{{#message.items}}{{qty}}x {{name}} for {{user.name}};{{/message.items}}",
                data.clone()
            ),
            "2x Tea for Ann;1x &lt;Cake&gt; for Ann;"
        );
        assert_eq!(
            render_str("{{#message.codes}}[{{.}}]{{/message.codes}}", data),
            "[A][B]"
        );
    }

    #[test]
    fn test_object_section_scopes_lookups() {
        let data = json!({
            "user": { "name": "Ann", "address": { "city": "Oslo" } },
            "city": "root"
        });
        assert_eq!(
            render_str("{{#user.address}}{{city}}/{{user.name}}{{/user.address}}", data.clone()),
            "Oslo/Ann"
        );
        assert_eq!(render_str("{{city}}", data), "root");
    }

    #[test]
    fn test_nested_sections() {
        let data = json!({
            "groups": [
                { "title": "g1", "members": ["a", "b"] },
                { "title": "g2", "members": [] }
            ]
        });
        assert_eq!(
            render_str(
                "{{#groups}}{{title}}:{{#members}}{{.}}{{/members}}{{^members}}-{{/members}} {{/groups}}",
                data
            ),
            "g1:ab g2:- "
        );
    }

    #[test]
    fn test_unbalanced_sections_are_rejected() {
        for bad in [
            "{{#a}}open",
            "{{#a}}{{/b}}",
            "close{{/a}}",
            "{{#a}}{{^b}}{{/a}}{{/b}}",
            "{{#}}x{{/}}",
            "{{#a b}}x{{/a b}}",
        ] {
            assert!(TemplateString::parse(bad).is_err(), "expected '{}' to fail", bad);
        }

        let err = TemplateTree::parse(&json!({ "notification": { "body": "{{#user.vip}}VIP" } }))
            .unwrap_err();
        match err {
            TemplateError::Syntax { path, reason } => {
                assert_eq!(path, "notification.body");
                assert!(reason.contains("user.vip"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_render_preserves_shape_and_order() {
        let raw = json!({
            "z": "{{user.name}}",
            "a": { "y": "static", "b": "{{user.name}}!" }
        });
        let tree = TemplateTree::parse(&raw).unwrap();
        let data = json!({ "user": { "name": "Ann" } });

        let first = tree.render(&data);
        let second = tree.render(&data);

        assert_eq!(first, second);
        assert_eq!(first, json!({ "z": "Ann", "a": { "y": "static", "b": "Ann!" } }));
        let keys: Vec<_> = first.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["z", "a"]);
    }
}
