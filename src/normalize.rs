//! Structured-report normalizer
//!
//! Converts raw XML, JSON or YAML documents into a uniform [`Node`] tree.
//! A field holding a single object and a field holding an array of objects
//! normalize identically: callers always get a slice of children and never
//! have to ask whether a value was a list or a scalar.
//!
//! ```text
//! {"steps": {"name": "a"}}          ─┐
//!                                    ├──► Node { children: [("steps", [..])] }
//! {"steps": [{"name": "a"}]}        ─┘
//! ```

use crate::error::{fragment_around, ParseError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Child name used for the elements of a top-level JSON array
pub const ROOT_ITEMS: &str = "items";

/// Name given to the synthetic root of JSON/YAML documents
pub const JSON_ROOT: &str = "$root";

/// One node of a normalized document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    name: String,
    attributes: BTreeMap<String, String>,
    /// Named children in first-seen order; every name maps to one or more nodes
    children: Vec<(String, Vec<Node>)>,
    text: Option<String>,
}

/// A logical field known under several names across report variants
///
/// Aliases are tried in order; the first one present wins.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub aliases: &'static [&'static str],
}

impl Field {
    pub const fn new(aliases: &'static [&'static str]) -> Self {
        Self { aliases }
    }
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// All children under `name`; empty when the field is absent
    pub fn children(&self, name: &str) -> &[Node] {
        self.children
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, nodes)| nodes.as_slice())
            .unwrap_or(&[])
    }

    /// First child under `name`
    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children(name).first()
    }

    /// Names of all child groups, in document order
    pub fn child_names(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(|(n, _)| n.as_str())
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.children.iter().any(|(n, _)| n == name)
    }

    /// Scalar value of a field: an attribute, or the text of the first child
    pub fn value(&self, name: &str) -> Option<&str> {
        self.attr(name)
            .or_else(|| self.child(name).and_then(Node::text))
    }

    /// Every scalar under `name`: a lone attribute value or the text of each child
    pub fn texts(&self, name: &str) -> Vec<&str> {
        self.attr(name)
            .into_iter()
            .chain(self.children(name).iter().filter_map(Node::text))
            .collect()
    }

    /// Children of the first alias of `field` that is present
    pub fn lookup(&self, field: &Field) -> &[Node] {
        field
            .aliases
            .iter()
            .find(|alias| self.has_child(alias))
            .map(|alias| self.children(alias))
            .unwrap_or(&[])
    }

    /// Scalar value of the first alias of `field` that is present
    pub fn lookup_value(&self, field: &Field) -> Option<&str> {
        field.aliases.iter().find_map(|alias| self.value(alias))
    }

    /// Walk a path of child names, fanning out over every occurrence
    pub fn descend<'a>(&'a self, path: &[&str]) -> Vec<&'a Node> {
        let mut frontier = vec![self];
        for segment in path {
            frontier = frontier
                .into_iter()
                .flat_map(|node| node.children(segment).iter())
                .collect();
        }
        frontier
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn push_child(&mut self, name: impl Into<String>, child: Node) {
        let name = name.into();
        match self.children.iter_mut().find(|(n, _)| *n == name) {
            Some((_, nodes)) => nodes.push(child),
            None => self.children.push((name, vec![child])),
        }
    }

    fn append_text(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        match &mut self.text {
            Some(existing) => existing.push_str(text),
            None => self.text = Some(text.to_string()),
        }
    }
}

/// Raw document syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Xml,
    Json,
    Yaml,
}

impl DocumentFormat {
    /// Pick a format from the file extension, falling back to content sniffing
    pub fn detect(path: &Path, content: &str) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("xml") => DocumentFormat::Xml,
            Some("json") => DocumentFormat::Json,
            Some("yaml") | Some("yml") => DocumentFormat::Yaml,
            _ => Self::sniff(content),
        }
    }

    pub fn sniff(content: &str) -> Self {
        match content.trim_start().chars().next() {
            Some('<') => DocumentFormat::Xml,
            Some('{') | Some('[') => DocumentFormat::Json,
            _ => DocumentFormat::Yaml,
        }
    }

    fn label(self) -> &'static str {
        match self {
            DocumentFormat::Xml => "XML",
            DocumentFormat::Json => "JSON",
            DocumentFormat::Yaml => "YAML",
        }
    }
}

/// Normalize a raw document, sniffing its syntax from the content
pub fn normalize(raw: &str) -> Result<Node, ParseError> {
    normalize_as(raw, DocumentFormat::sniff(raw))
}

/// Normalize a raw document of a known syntax
pub fn normalize_as(raw: &str, format: DocumentFormat) -> Result<Node, ParseError> {
    match format {
        DocumentFormat::Xml => normalize_xml(raw),
        DocumentFormat::Json => normalize_json(raw),
        DocumentFormat::Yaml => normalize_yaml(raw),
    }
}

/// Normalize a JSON document
pub fn normalize_json(raw: &str) -> Result<Node, ParseError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| {
        let offset = line_column_offset(raw, e.line(), e.column());
        ParseError::at_offset(DocumentFormat::Json.label(), e.to_string(), raw, offset)
    })?;
    Ok(normalize_value(&value))
}

/// Normalize a YAML document via its JSON data model
pub fn normalize_yaml(raw: &str) -> Result<Node, ParseError> {
    let value: serde_norway::Value = serde_norway::from_str(raw).map_err(|e| {
        let offset = e.location().map(|loc| loc.index()).unwrap_or(0);
        ParseError::at_offset(DocumentFormat::Yaml.label(), e.to_string(), raw, offset)
    })?;
    Ok(normalize_value(&yaml_to_json(value)))
}

/// YAML allows non-string mapping keys (`200:`); JSON does not
fn yaml_to_json(value: serde_norway::Value) -> Value {
    use serde_norway::Value as Yaml;
    match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(items.into_iter().map(yaml_to_json).collect()),
        Yaml::Mapping(map) => Value::Object(
            map.into_iter()
                .filter_map(|(k, v)| yaml_key(k).map(|k| (k, yaml_to_json(v))))
                .collect(),
        ),
        Yaml::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

fn yaml_key(key: serde_norway::Value) -> Option<String> {
    match key {
        serde_norway::Value::String(s) => Some(s),
        serde_norway::Value::Number(n) => Some(n.to_string()),
        serde_norway::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Normalize an already-parsed JSON value
pub fn normalize_value(value: &Value) -> Node {
    let mut root = Node::new(JSON_ROOT);
    match value {
        Value::Object(map) => fill_object(&mut root, map),
        Value::Array(items) => push_array(&mut root, ROOT_ITEMS, items),
        scalar => root.text = scalar_to_string(scalar),
    }
    root
}

fn fill_object(node: &mut Node, map: &serde_json::Map<String, Value>) {
    for (key, value) in map {
        match value {
            Value::Null => {}
            Value::Object(inner) => {
                let mut child = Node::new(key.clone());
                fill_object(&mut child, inner);
                node.push_child(key.clone(), child);
            }
            Value::Array(items) => push_array(node, key, items),
            scalar => {
                if let Some(s) = scalar_to_string(scalar) {
                    node.set_attr(key.clone(), s);
                }
            }
        }
    }
}

fn push_array(node: &mut Node, key: &str, items: &[Value]) {
    for item in items {
        match item {
            Value::Null => {}
            Value::Object(inner) => {
                let mut child = Node::new(key);
                fill_object(&mut child, inner);
                node.push_child(key, child);
            }
            Value::Array(nested) => push_array(node, key, nested),
            scalar => {
                let mut child = Node::new(key);
                child.text = scalar_to_string(scalar);
                node.push_child(key, child);
            }
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Normalize an XML document; the root element becomes the root node
pub fn normalize_xml(raw: &str) -> Result<Node, ParseError> {
    let label = DocumentFormat::Xml.label();
    let mut reader = Reader::from_str(raw);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Node> = Vec::new();
    let mut root: Option<Node> = None;

    loop {
        let position = reader.buffer_position() as usize;
        let event = reader
            .read_event()
            .map_err(|e| ParseError::at_offset(label, e.to_string(), raw, position))?;

        match event {
            Event::Start(start) => {
                let node = element_node(&start, raw, position)?;
                stack.push(node);
            }
            Event::Empty(start) => {
                let node = element_node(&start, raw, position)?;
                attach(&mut stack, &mut root, node, raw, position)?;
            }
            Event::End(_) => {
                let node = stack.pop().ok_or_else(|| {
                    ParseError::at_offset(label, "unbalanced closing tag", raw, position)
                })?;
                attach(&mut stack, &mut root, node, raw, position)?;
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| ParseError::at_offset(label, e.to_string(), raw, position))?;
                if let Some(current) = stack.last_mut() {
                    current.append_text(&text);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.append_text(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            // Declarations, DOCTYPE, comments and processing instructions carry no report data
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(ParseError::at_offset(
            label,
            format!("unexpected end of document inside <{}>", open.name),
            raw,
            raw.len(),
        ));
    }

    root.ok_or_else(|| ParseError::new(label, "document has no root element", fragment_around(raw, 0)))
}

fn element_node(start: &BytesStart<'_>, raw: &str, position: usize) -> Result<Node, ParseError> {
    let label = DocumentFormat::Xml.label();
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut node = Node::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| ParseError::at_offset(label, e.to_string(), raw, position))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| ParseError::at_offset(label, e.to_string(), raw, position))?;
        node.set_attr(key, value.into_owned());
    }
    Ok(node)
}

fn attach(
    stack: &mut [Node],
    root: &mut Option<Node>,
    node: Node,
    raw: &str,
    position: usize,
) -> Result<(), ParseError> {
    match stack.last_mut() {
        Some(parent) => {
            let name = node.name.clone();
            parent.push_child(name, node);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(node);
            Ok(())
        }
        None => Err(ParseError::at_offset(
            DocumentFormat::Xml.label(),
            "multiple root elements",
            raw,
            position,
        )),
    }
}

fn line_column_offset(raw: &str, line: usize, column: usize) -> usize {
    let line_start: usize = raw
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum();
    line_start + column.saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_object_and_array_normalize_identically() {
        let single = normalize_json(r#"{"steps": {"name": "a", "line": 3}}"#).unwrap();
        let many = normalize_json(r#"{"steps": [{"name": "a", "line": 3}]}"#).unwrap();
        assert_eq!(single, many);
        assert_eq!(single.children("steps").len(), 1);
        assert_eq!(single.children("steps")[0].attr("line"), Some("3"));
    }

    #[test]
    fn test_absent_field_is_empty_slice() {
        let node = normalize_json(r#"{"name": "x"}"#).unwrap();
        assert!(node.children("steps").is_empty());
        assert_eq!(node.value("name"), Some("x"));
    }

    #[test]
    fn test_scalar_arrays_become_text_children() {
        let node = normalize_json(r#"{"tags": ["orders", "billing"], "empty": null}"#).unwrap();
        assert_eq!(node.texts("tags"), vec!["orders", "billing"]);
        assert!(node.attr("empty").is_none());
    }

    #[test]
    fn test_single_scalar_reads_like_scalar_array() {
        let single = normalize_json(r#"{"tags": "billing"}"#).unwrap();
        let many = normalize_json(r#"{"tags": ["billing"]}"#).unwrap();
        assert_eq!(single.texts("tags"), vec!["billing"]);
        assert_eq!(single.texts("tags"), many.texts("tags"));

        let xml = normalize_xml(r#"<op tags="billing"><tags>audit</tags></op>"#).unwrap();
        assert_eq!(xml.texts("tags"), vec!["billing", "audit"]);
    }

    #[test]
    fn test_top_level_array_uses_items() {
        let node = normalize_json(r#"[{"name": "f1"}, {"name": "f2"}]"#).unwrap();
        assert_eq!(node.name(), JSON_ROOT);
        assert_eq!(node.children(ROOT_ITEMS).len(), 2);
    }

    #[test]
    fn test_field_aliases_resolve_in_order() {
        const SCENARIOS: Field = Field::new(&["elements", "scenarios"]);
        let node = normalize_json(r#"{"scenarios": [{"name": "s"}]}"#).unwrap();
        assert_eq!(node.lookup(&SCENARIOS).len(), 1);

        let both = normalize_json(r#"{"elements": [{"name": "e"}], "scenarios": [{}, {}]}"#).unwrap();
        assert_eq!(both.lookup(&SCENARIOS)[0].attr("name"), Some("e"));
    }

    #[test]
    fn test_descend_fans_out() {
        let node = normalize_json(
            r#"{"match": {"arguments": [{"request": {"method": "get"}}, {"request": {"method": "post"}}]}}"#,
        )
        .unwrap();
        let requests = node.descend(&["match", "arguments", "request"]);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].attr("method"), Some("post"));
    }

    #[test]
    fn test_xml_elements_and_attributes() {
        let xml = r#"<?xml version="1.0"?>
<!DOCTYPE report PUBLIC "-//JACOCO//DTD Report 1.1//EN" "report.dtd">
<report name="demo">
  <package name="com/acme">
    <class name="com/acme/Billing"/>
    <class name="com/acme/Orders"><counter type="LINE" missed="1" covered="3"/></class>
  </package>
</report>"#;
        let root = normalize_xml(xml).unwrap();
        assert_eq!(root.name(), "report");
        let classes = root.descend(&["package", "class"]);
        assert_eq!(classes.len(), 2);
        assert_eq!(classes[1].children("counter")[0].attr("covered"), Some("3"));
    }

    #[test]
    fn test_xml_text_content() {
        let root = normalize_xml("<a><b>hello &amp; bye</b></a>").unwrap();
        assert_eq!(root.value("b"), Some("hello & bye"));
    }

    #[test]
    fn test_malformed_json_carries_fragment() {
        let err = normalize_json("{\"a\": 1,\n \"b\": }").unwrap_err();
        assert_eq!(err.format, "JSON");
        assert!(err.fragment.contains("\"b\""));
    }

    #[test]
    fn test_malformed_xml_is_error() {
        assert!(normalize_xml("<report><package></report>").is_err());
        assert!(normalize_xml("<report><package>").is_err());
        assert!(normalize_xml("").is_err());
    }

    #[test]
    fn test_yaml_normalizes_like_json() {
        let yaml = normalize_yaml("paths:\n  /orders:\n    get:\n      summary: List\n").unwrap();
        let json = normalize_json(r#"{"paths": {"/orders": {"get": {"summary": "List"}}}}"#).unwrap();
        assert_eq!(yaml, json);
    }

    #[test]
    fn test_yaml_numeric_keys_become_names() {
        let node = normalize_yaml("responses:\n  200:\n    description: OK\n").unwrap();
        let responses = node.child("responses").unwrap();
        assert_eq!(responses.child_names().collect::<Vec<_>>(), vec!["200"]);
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(DocumentFormat::detect(Path::new("r.xml"), "{"), DocumentFormat::Xml);
        assert_eq!(DocumentFormat::detect(Path::new("api.yml"), ""), DocumentFormat::Yaml);
        assert_eq!(DocumentFormat::detect(Path::new("report"), "  [1]"), DocumentFormat::Json);
        assert_eq!(DocumentFormat::detect(Path::new("report"), "<x/>"), DocumentFormat::Xml);
    }
}
