use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

/// A static link attached uniformly to every root entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentLink {
    /// Key written into each root entity's `links` map.
    #[serde(rename = "type")]
    pub link_type: String,

    /// Link body: an id, an `{id, type}` reference, or any JSON value.
    pub link: Value,
}

/// Configuration for one normalization pass
///
/// All fields default to empty/absent, which extracts every embedded
/// object and collection of objects as a plain (non-polymorphic,
/// one-directional) association.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NormalizeConfig {
    /// Property names that are never traversed, linked, or removed.
    pub excluded_keys: Vec<String>,

    /// Base type names whose concrete bucket type is read from each
    /// child's own `type` field. Declarations may be singular or plural.
    pub polymorphic_types: Vec<String>,

    /// Base type names whose extracted children also receive a reciprocal
    /// link back to their immediate parent.
    pub link_back_types: Vec<String>,

    /// Property-key to type-name redirects. A mapped association is
    /// bucketed under the mapped type while the parent's link key stays
    /// derived from the property key, so several properties can share one
    /// bucket.
    pub mappings: HashMap<String, String>,

    /// Static link added to every root entity after traversal.
    pub parent_link: Option<ParentLink>,
}

/// A normalized sideloaded payload: the root collection under its
/// pluralized type key, plus the `linked` side table of extracted
/// entities bucketed by type.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    /// Pluralized root type, the payload's top-level key.
    pub root_key: String,

    /// Root entities with their associations rewritten as links.
    pub roots: Vec<Value>,

    /// Extracted entities, deduplicated per bucket. Empty when the input
    /// had no associations; omitted from serialized output in that case.
    pub linked: Map<String, Value>,
}

impl Payload {
    /// The payload as a plain JSON mapping:
    /// `{ <root_key>: [...], linked?: {...} }`.
    pub fn into_value(self) -> Value {
        let mut payload = Map::new();
        payload.insert(self.root_key, Value::Array(self.roots));
        if !self.linked.is_empty() {
            payload.insert("linked".to_string(), Value::Object(self.linked));
        }
        Value::Object(payload)
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry(&self.root_key, &self.roots)?;
        if !self.linked.is_empty() {
            map.serialize_entry("linked", &self.linked)?;
        }
        map.end()
    }
}

/// Failures surfaced while building a payload
///
/// Malformed input otherwise degrades instead of failing: entities
/// without ids may coalesce during deduplication, and non-object values
/// in entity position pass through untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PayloadError {
    /// A type was declared polymorphic but an instance carries no string
    /// `type` field to resolve its bucket.
    #[error("entity of polymorphic type '{base_type}' has no string 'type' field")]
    MissingPolymorphicType { base_type: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_serializes_under_root_key() {
        let payload = Payload {
            root_key: "items".to_string(),
            roots: vec![json!({"id": 1})],
            linked: Map::new(),
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value, json!({"items": [{"id": 1}]}));
    }

    #[test]
    fn test_empty_side_table_is_omitted() {
        let payload = Payload {
            root_key: "items".to_string(),
            roots: vec![json!({"id": 1})],
            linked: Map::new(),
        };

        assert_eq!(payload.into_value(), json!({"items": [{"id": 1}]}));
    }

    #[test]
    fn test_side_table_appears_under_linked() {
        let mut linked = Map::new();
        linked.insert("oItems".to_string(), json!([{"id": 2}]));
        let payload = Payload {
            root_key: "items".to_string(),
            roots: vec![json!({"id": 1})],
            linked,
        };

        assert_eq!(
            payload.into_value(),
            json!({"items": [{"id": 1}], "linked": {"oItems": [{"id": 2}]}})
        );
    }

    #[test]
    fn test_config_parses_from_json() {
        let config: NormalizeConfig = serde_json::from_str(
            r#"{
                "excludedKeys": ["auth"],
                "polymorphicTypes": ["shapes"],
                "linkBackTypes": ["childItem"],
                "mappings": {"manager": "employee"},
                "parentLink": {"type": "project", "link": 1}
            }"#,
        )
        .unwrap();

        assert_eq!(config.excluded_keys, vec!["auth"]);
        assert_eq!(config.polymorphic_types, vec!["shapes"]);
        assert_eq!(config.link_back_types, vec!["childItem"]);
        assert_eq!(config.mappings["manager"], "employee");
        assert_eq!(config.parent_link.unwrap().link_type, "project");
    }
}
