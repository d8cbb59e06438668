//! Typed tree encoding: lossless [`Value`] ⇄ XML.
//!
//! XML element names must be valid identifiers and text nodes are untyped
//! strings, so every entry carries its kind in the element name:
//!
//! ```text
//! <object-tree>
//!   <string-name>QWNtZQ==</string-name>
//!   <array-tags>
//!     <string-0>YQ==</string-0>
//!     <int-1>Mg==</int-1>
//!   </array-tags>
//!   <bool-active>MQ==</bool-active>
//!   <null-parent/>
//! </object-tree>
//! ```
//!
//! - Containers become `object-<key>` / `array-<key>` elements.
//! - Scalars become `string-` / `int-` / `float-` / `bool-` elements whose text
//!   is the base64 of the scalar's wire text (booleans as `1`/`0`), so markup,
//!   arbitrary bytes and type-ambiguous strings survive untouched.
//! - Keys that are not valid name fragments are moved to a base64 `key`
//!   attribute on a bare `<kind>` element.
//!
//! Decoding also accepts untyped elements from foreign producers: a node with
//! children becomes a map, a leaf becomes a base64-decoded string, and a
//! repeated key inside a map is promoted to a list of every occurrence.

use std::collections::HashSet;
use std::io::Write;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use quick_xml::events::{BytesDecl, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::CoreError;
use crate::value::{Map, Value, ValueKind};

/// Key of the document root entry.
pub const ROOT_KEY: &str = "tree";

/// Attribute holding a base64 key that cannot appear in an element name.
const KEY_ATTR: &str = "key";

/// Element name prefix for each value kind.
fn prefix(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Null => "null",
        ValueKind::Bool => "bool",
        ValueKind::Int => "int",
        ValueKind::Float => "float",
        ValueKind::String => "string",
        ValueKind::List => "array",
        ValueKind::Map => "object",
    }
}

fn kind_of_prefix(prefix: &str) -> Option<ValueKind> {
    match prefix {
        "null" => Some(ValueKind::Null),
        "bool" => Some(ValueKind::Bool),
        "int" => Some(ValueKind::Int),
        "float" => Some(ValueKind::Float),
        "string" => Some(ValueKind::String),
        "array" => Some(ValueKind::List),
        "object" => Some(ValueKind::Map),
        _ => None,
    }
}

/// Keys made of `[A-Za-z0-9_.-]` can be appended to an element name.
fn is_name_safe(key: &str) -> bool {
    !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'))
}

fn xml_err(e: quick_xml::Error) -> CoreError {
    CoreError::Encoding(e.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Encoding
// ─────────────────────────────────────────────────────────────────────────────

/// Encode a value as a typed XML document.
pub fn encode(value: &Value) -> Result<String, CoreError> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_err)?;
    write_entry(&mut writer, ROOT_KEY, value)?;

    String::from_utf8(writer.into_inner()).map_err(|e| CoreError::Encoding(e.to_string()))
}

fn start_element(kind: ValueKind, key: &str) -> BytesStart<'static> {
    if is_name_safe(key) {
        BytesStart::new(format!("{}-{}", prefix(kind), key))
    } else {
        let mut start = BytesStart::new(prefix(kind));
        let encoded = STANDARD.encode(key.as_bytes());
        start.push_attribute((KEY_ATTR, encoded.as_str()));
        start
    }
}

fn write_entry<W: Write>(writer: &mut Writer<W>, key: &str, value: &Value) -> Result<(), CoreError> {
    let start = start_element(value.kind(), key);

    match value {
        Value::Null => {
            writer.write_event(Event::Empty(start)).map_err(xml_err)?;
        }
        Value::List(items) if items.is_empty() => {
            writer.write_event(Event::Empty(start)).map_err(xml_err)?;
        }
        Value::Map(map) if map.is_empty() => {
            writer.write_event(Event::Empty(start)).map_err(xml_err)?;
        }
        Value::List(items) => {
            writer.write_event(Event::Start(start.borrow())).map_err(xml_err)?;
            for (index, item) in items.iter().enumerate() {
                write_entry(writer, &index.to_string(), item)?;
            }
            writer.write_event(Event::End(start.to_end())).map_err(xml_err)?;
        }
        Value::Map(map) => {
            writer.write_event(Event::Start(start.borrow())).map_err(xml_err)?;
            for (child_key, child) in map {
                write_entry(writer, child_key, child)?;
            }
            writer.write_event(Event::End(start.to_end())).map_err(xml_err)?;
        }
        scalar => {
            let text = scalar.scalar_text().unwrap_or_default();
            let encoded = STANDARD.encode(text.as_bytes());
            writer.write_event(Event::Start(start.borrow())).map_err(xml_err)?;
            writer
                .write_event(Event::Text(BytesText::new(&encoded)))
                .map_err(xml_err)?;
            writer.write_event(Event::End(start.to_end())).map_err(xml_err)?;
        }
    }

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoding
// ─────────────────────────────────────────────────────────────────────────────

/// A parsed element before typing.
#[derive(Debug, Default)]
struct Node {
    name: String,
    key_attr: Option<String>,
    text: String,
    children: Vec<Node>,
}

impl Node {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, CoreError> {
        let name = String::from_utf8(start.name().as_ref().to_vec())
            .map_err(|e| CoreError::Decoding(e.to_string()))?;

        let mut key_attr = None;
        for attr in start.attributes() {
            let attr = attr.map_err(|e| CoreError::Decoding(e.to_string()))?;
            if attr.key.as_ref() == KEY_ATTR.as_bytes() {
                let raw = attr
                    .unescape_value()
                    .map_err(|e| CoreError::Decoding(e.to_string()))?;
                key_attr = Some(decode_text(&raw)?);
            }
        }

        Ok(Self {
            name,
            key_attr,
            ..Self::default()
        })
    }

    /// Split the element name into its kind and original key.
    ///
    /// Returns `None` as kind for untyped elements.
    fn kind_and_key(&self) -> (Option<ValueKind>, String) {
        let (head, tail) = match self.name.split_once('-') {
            Some((head, tail)) => (head, Some(tail)),
            None => (self.name.as_str(), None),
        };

        match kind_of_prefix(head) {
            Some(kind) => {
                let key = match (&self.key_attr, tail) {
                    (Some(key), _) => key.clone(),
                    (None, Some(tail)) => tail.to_string(),
                    (None, None) => String::new(),
                };
                (Some(kind), key)
            }
            None => (None, self.key_attr.clone().unwrap_or_else(|| self.name.clone())),
        }
    }
}

/// Decode a typed XML document back to a value.
pub fn decode(xml: &str) -> Result<Value, CoreError> {
    let root = parse_document(xml)?;
    let (_, value) = node_to_entry(root)?;
    Ok(value)
}

fn parse_document(xml: &str) -> Result<Node, CoreError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<Node> = Vec::new();
    let mut root: Option<Node> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| CoreError::Decoding(e.to_string()))?;
        match event {
            Event::Start(start) => stack.push(Node::from_start(&start)?),
            Event::Empty(start) => {
                let node = Node::from_start(&start)?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| CoreError::Decoding("unbalanced closing tag".into()))?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    let text = text
                        .unescape()
                        .map_err(|e| CoreError::Decoding(e.to_string()))?;
                    top.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    let text = String::from_utf8(data.into_inner().into_owned())
                        .map_err(|e| CoreError::Decoding(e.to_string()))?;
                    top.text.push_str(&text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(CoreError::Decoding("unclosed element".into()));
    }
    root.ok_or_else(|| CoreError::Decoding("empty document".into()))
}

fn attach(stack: &mut [Node], root: &mut Option<Node>, node: Node) -> Result<(), CoreError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
        return Ok(());
    }
    if root.is_some() {
        return Err(CoreError::Decoding("multiple root elements".into()));
    }
    *root = Some(node);
    Ok(())
}

fn decode_text(text: &str) -> Result<String, CoreError> {
    let bytes = STANDARD.decode(text.trim())?;
    String::from_utf8(bytes).map_err(|e| CoreError::Decoding(e.to_string()))
}

fn node_to_entry(node: Node) -> Result<(String, Value), CoreError> {
    let (kind, key) = node.kind_and_key();

    let value = match kind {
        Some(ValueKind::Map) => Value::Map(children_to_map(node.children)?),
        Some(ValueKind::List) => Value::List(
            node.children
                .into_iter()
                .map(|child| node_to_entry(child).map(|(_, value)| value))
                .collect::<Result<_, _>>()?,
        ),
        Some(ValueKind::Null) => Value::Null,
        Some(ValueKind::String) => Value::String(decode_text(&node.text)?),
        Some(ValueKind::Int) => {
            let text = decode_text(&node.text)?;
            Value::Int(text.parse().map_err(|_| {
                CoreError::Decoding(format!("invalid integer for {}: {:?}", key, text))
            })?)
        }
        Some(ValueKind::Float) => {
            let text = decode_text(&node.text)?;
            Value::Float(text.parse().map_err(|_| {
                CoreError::Decoding(format!("invalid float for {}: {:?}", key, text))
            })?)
        }
        Some(ValueKind::Bool) => match decode_text(&node.text)?.as_str() {
            "1" => Value::Bool(true),
            "0" | "" => Value::Bool(false),
            other => {
                return Err(CoreError::Decoding(format!(
                    "invalid boolean for {}: {:?}",
                    key, other
                )))
            }
        },
        None if !node.children.is_empty() => Value::Map(children_to_map(node.children)?),
        None => Value::String(decode_text(&node.text)?),
    };

    Ok((key, value))
}

/// Rebuild a map, promoting repeated keys to a list of every occurrence.
fn children_to_map(children: Vec<Node>) -> Result<Map, CoreError> {
    let mut map = Map::new();
    let mut promoted: HashSet<String> = HashSet::new();

    for child in children {
        let (key, value) = node_to_entry(child)?;
        if promoted.contains(&key) {
            if let Some(Value::List(items)) = map.get_mut(&key) {
                items.push(value);
            }
        } else if let Some(existing) = map.get_mut(&key) {
            let first = std::mem::take(existing);
            *existing = Value::List(vec![first, value]);
            promoted.insert(key);
        } else {
            map.insert(key, value);
        }
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> Value {
        Value::from_pairs([
            ("name", Value::from("Acme <Corp> & \"Sons\"")),
            ("count", Value::from(42)),
            ("active", Value::from(true)),
            ("ratio", Value::from(0.25)),
            ("parent", Value::Null),
            (
                "tags",
                Value::List(vec![Value::from("a"), Value::from(2), Value::empty_map()]),
            ),
            ("nested", Value::from_pairs([("0", Value::from("zero"))])),
            ("with space", Value::from("spaced key")),
        ])
    }

    #[test]
    fn test_roundtrip_sample() {
        let value = sample();
        let xml = encode(&value).unwrap();
        assert_eq!(decode(&xml).unwrap(), value);
    }

    #[test]
    fn test_element_names_carry_kind() {
        let value = Value::from_pairs([("name", "Acme"), ("flag", "1")]);
        let xml = encode(&value).unwrap();
        assert!(xml.contains("<object-tree>"));
        assert!(xml.contains("<string-name>QWNtZQ==</string-name>"));
        // A string "1" stays a string, not a boolean
        assert!(xml.contains("<string-flag>MQ==</string-flag>"));
    }

    #[test]
    fn test_list_indexes_are_prefixed() {
        let value = Value::List(vec![Value::from(true), Value::List(vec![])]);
        let xml = encode(&value).unwrap();
        assert!(xml.contains("<bool-0>MQ==</bool-0>"));
        assert!(xml.contains("<array-1/>"));
        assert_eq!(decode(&xml).unwrap(), value);
    }

    #[test]
    fn test_unsafe_key_goes_to_attribute() {
        let value = Value::from_pairs([("a b", 1)]);
        let xml = encode(&value).unwrap();
        assert!(xml.contains(r#"<int key="YSBi">"#));
        assert_eq!(decode(&xml).unwrap(), value);
    }

    #[test]
    fn test_repeated_key_promoted_to_list() {
        let xml = "<object-tree>\
                   <string-item>YQ==</string-item>\
                   <string-item>Yg==</string-item>\
                   <string-item>Yw==</string-item>\
                   <string-other>eA==</string-other>\
                   </object-tree>";
        let value = decode(xml).unwrap();
        assert_eq!(
            value.get("item"),
            Some(&Value::List(vec!["a".into(), "b".into(), "c".into()]))
        );
        assert_eq!(value.get("other"), Some(&Value::from("x")));
    }

    #[test]
    fn test_untyped_nodes() {
        let xml = "<response><result>MQ==</result><data><name>Zm9v</name></data></response>";
        let value = decode(xml).unwrap();
        assert_eq!(value.get("result"), Some(&Value::from("1")));
        assert_eq!(
            value.get("data").and_then(|d| d.get("name")),
            Some(&Value::from("foo"))
        );
    }

    #[test]
    fn test_invalid_documents() {
        assert!(decode("").is_err());
        assert!(decode("<object-tree>").is_err());
        assert!(decode("<int-x>bm90IGEgbnVtYmVy</int-x>").is_err());
        assert!(decode("<string-x>***</string-x>").is_err());
    }

    fn scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            ".{0,24}".prop_map(Value::String),
        ]
    }

    fn tree() -> impl Strategy<Value = Value> {
        scalar().prop_recursive(4, 48, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::List),
                prop::collection::vec(("[a-z0-9 _]{1,8}", inner), 0..6)
                    .prop_map(|pairs| Value::Map(pairs.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_roundtrip(value in tree()) {
            let xml = encode(&value).unwrap();
            prop_assert_eq!(decode(&xml).unwrap(), value);
        }
    }
}
