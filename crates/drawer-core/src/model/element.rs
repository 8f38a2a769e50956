//! Host element records.
//!
//! Elements belong to the host's schema, not ours. An [`Element`] keeps the
//! full JSON object it was read from so fields this crate does not know about
//! survive a load/commit round-trip untouched, and exposes typed accessors for
//! the handful of fields the sync engine reasons about.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashSet;

/// One drawable element as stored by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Element(Map<String, Value>);

/// Fields every element must carry after normalization, with their defaults.
///
/// `id`, `seed`, and `versionNonce` are absent here because their defaults are
/// derived per element (see [`normalize_elements`]).
fn static_defaults() -> [(&'static str, Value); 20] {
    [
        ("type", json!("rectangle")),
        ("x", json!(0)),
        ("y", json!(0)),
        ("width", json!(100)),
        ("height", json!(100)),
        ("angle", json!(0)),
        ("strokeColor", json!("#1e1e1e")),
        ("backgroundColor", json!("transparent")),
        ("fillStyle", json!("solid")),
        ("strokeWidth", json!(2)),
        ("strokeStyle", json!("solid")),
        ("roughness", json!(1)),
        ("opacity", json!(100)),
        ("groupIds", json!([])),
        ("frameId", Value::Null),
        ("roundness", Value::Null),
        ("boundElements", Value::Null),
        ("link", Value::Null),
        ("locked", json!(false)),
        ("version", json!(1)),
    ]
}

impl Element {
    /// Wrap a JSON object. Returns `None` for anything that is not an object.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Element identity, if present and a string.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    /// Element type (`rectangle`, `arrow`, `text`, ...).
    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    /// Tombstone flag. Missing means live.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.0.get("isDeleted").and_then(Value::as_bool).unwrap_or(false)
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Parse a host element array, skipping entries that are not JSON objects.
#[must_use]
pub fn elements_from_values(values: Vec<Value>) -> Vec<Element> {
    values.into_iter().filter_map(Element::from_value).collect()
}

/// Fill every missing required field of `elements` with its default.
///
/// Present fields are never overwritten, so normalizing twice is the same as
/// normalizing once. Per-element defaults (`id`, `seed`, `versionNonce`) are
/// derived from `scope` and the element's position rather than drawn at random:
/// loading the same canvas repeatedly must write identical bytes. An element
/// whose `id` is missing, not a string, or repeats an earlier element's `id`
/// is given a derived one so identities stay unique within the document.
#[must_use]
pub fn normalize_elements(scope: &str, elements: &[Element]) -> Vec<Element> {
    let defaults = static_defaults();
    let mut seen: HashSet<String> = HashSet::with_capacity(elements.len());

    elements
        .iter()
        .enumerate()
        .map(|(index, element)| {
            let mut map = element.0.clone();

            let id = match map.get("id").and_then(Value::as_str) {
                Some(id) if !seen.contains(id) => id.to_owned(),
                existing => derived_id(scope, index, existing),
            };
            seen.insert(id.clone());
            map.insert("id".to_owned(), Value::String(id.clone()));

            for (field, default) in &defaults {
                let missing = map
                    .get(*field)
                    .is_none_or(|v| v.is_null() && !default.is_null());
                if missing {
                    map.insert((*field).to_owned(), default.clone());
                }
            }

            if !map.get("seed").is_some_and(Value::is_number) {
                map.insert("seed".to_owned(), json!(derived_u31(scope, &id, "seed")));
            }
            if !map.get("versionNonce").is_some_and(Value::is_number) {
                map.insert(
                    "versionNonce".to_owned(),
                    json!(derived_u31(scope, &id, "versionNonce")),
                );
            }
            if !map.get("isDeleted").is_some_and(Value::is_boolean) {
                map.insert("isDeleted".to_owned(), Value::Bool(false));
            }

            Element(map)
        })
        .collect()
}

fn derived_id(scope: &str, index: usize, existing: Option<&str>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(scope.as_bytes());
    hasher.update(&index.to_le_bytes());
    hasher.update(existing.unwrap_or_default().as_bytes());
    let hex = hasher.finalize().to_hex();
    format!("el-{}", &hex.as_str()[..20])
}

fn derived_u31(scope: &str, id: &str, field: &str) -> u32 {
    let hash = blake3::hash(format!("{scope}\u{1f}{id}\u{1f}{field}").as_bytes());
    let bytes = hash.as_bytes();
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) & 0x7fff_ffff
}
