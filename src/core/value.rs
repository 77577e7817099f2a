//! Formatted field values and link references
//!
//! Everything the engine hands to a caller is a [`Value`]. Links are a
//! first-class variant rather than a structurally-detected dict shape:
//! only the serialization layer in `store::resolve` produces them, and
//! downstream layers (remap, pages, bridge) match on the variant instead
//! of sniffing for `id`/`name` keys.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::ser::SerializeSeq;
use serde::Serialize;

use crate::core::schema::EntityKind;

/// Wire format for date-only values
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Wire format for timestamp values
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A normalized cross-entity reference, serialized as `{type, id, name}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Link {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub id: i64,
    pub name: String,
}

impl Link {
    pub fn new(kind: EntityKind, id: i64, name: impl Into<String>) -> Self {
        Self { kind, id, name: name.into() }
    }
}

/// A formatted field value as it appears in a result record
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Link(Link),
    LinkList(Vec<Link>),
}

/// One result row: requested fields plus the injected `id` and `type`
pub type Record = BTreeMap<String, Value>;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The id behind a link or integer value, if any
    pub fn as_id(&self) -> Option<i64> {
        match self {
            Value::Int(id) => Some(*id),
            Value::Link(link) => Some(link.id),
            _ => None,
        }
    }

    /// Display-safe string form, matching the wire serialization
    pub fn display(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::Date(d) => d.format(DATE_FORMAT).to_string(),
            Value::DateTime(dt) => dt.format(DATETIME_FORMAT).to_string(),
            Value::Link(link) => link.name.clone(),
            Value::LinkList(links) => links
                .iter()
                .map(|l| l.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Date(d) => serializer.serialize_str(&d.format(DATE_FORMAT).to_string()),
            Value::DateTime(dt) => {
                serializer.serialize_str(&dt.format(DATETIME_FORMAT).to_string())
            }
            Value::Link(link) => link.serialize(serializer),
            Value::LinkList(links) => {
                let mut seq = serializer.serialize_seq(Some(links.len()))?;
                for link in links {
                    seq.serialize_element(link)?;
                }
                seq.end()
            }
        }
    }
}

/// The id of a record, when present
pub fn record_id(record: &Record) -> Option<i64> {
    record.get("id").and_then(Value::as_id)
}

/// The entity kind of a record, read from its injected `type` field
pub fn record_kind(record: &Record) -> Option<EntityKind> {
    match record.get("type") {
        Some(Value::Text(name)) => EntityKind::from_name(name).ok(),
        _ => None,
    }
}

/// Is this JSON mapping shaped like a link reference?
///
/// Recognizes `{id, name}` with at most a `type` key alongside. Used only
/// at the JSON boundary to collapse caller-supplied link dicts; inside the
/// engine links are always the typed [`Value::Link`] variant.
fn is_link_shaped(map: &serde_json::Map<String, serde_json::Value>) -> bool {
    map.contains_key("id")
        && map.contains_key("name")
        && map.len() <= 3
        && map.keys().all(|k| k == "id" || k == "name" || k == "type")
}

/// Normalize a caller-supplied JSON value for the wire.
///
/// Link-shaped mappings collapse to the minimal `{id, name[, type]}`
/// triple, inferring `type` by capitalizing a recognizable kind name when
/// one is present; other mappings and sequences are walked recursively.
/// Idempotent: normalizing an already-normalized value is a no-op.
pub fn normalize_json(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            if is_link_shaped(map) {
                let mut out = serde_json::Map::new();
                out.insert("id".to_string(), map["id"].clone());
                out.insert("name".to_string(), map["name"].clone());
                if let Some(serde_json::Value::String(hint)) = map.get("type") {
                    if let Ok(kind) = EntityKind::from_name(hint) {
                        out.insert(
                            "type".to_string(),
                            serde_json::Value::String(kind.as_str().to_string()),
                        );
                    }
                }
                serde_json::Value::Object(out)
            } else {
                serde_json::Value::Object(
                    map.iter().map(|(k, v)| (k.clone(), normalize_json(v))).collect(),
                )
            }
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(normalize_json).collect())
        }
        other => other.clone(),
    }
}

/// Normalize every element of a JSON list
pub fn normalize_json_list(items: &[serde_json::Value]) -> Vec<serde_json::Value> {
    items.iter().map(normalize_json).collect()
}
