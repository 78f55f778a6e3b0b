//! The traversal and linking core
//!
//! A depth-first walk over the input graph classifies every property as a
//! plain attribute, a has-one association (embedded object), or a has-many
//! association (non-empty array of objects). Each discovered child is
//! deduplicated into a type bucket of the shared side table and the
//! parent keeps only a reference under its `links` map.

use crate::inflect::{CruetInflector, Inflect};
use crate::types::{NormalizeConfig, Payload, PayloadError};
use serde_json::{json, Map, Value};
use tracing::{debug, trace};

/// Normalizes nested JSON into sideloaded compound-document payloads.
///
/// The builder holds only configuration; every [`build`](Self::build) call
/// allocates its own side-table accumulator and threads it through the
/// recursion, so one builder can be shared and called concurrently.
pub struct PayloadBuilder<I: Inflect = CruetInflector> {
    config: NormalizeConfig,
    inflector: I,
}

/// How a single property participates in the payload.
enum Association {
    /// Plain attribute, copied through untouched. Also covers empty
    /// arrays and arrays with non-object elements, which are never
    /// extracted.
    Attribute(Value),

    /// Single embedded entity.
    HasOne(Map<String, Value>),

    /// Non-empty collection of embedded entities.
    HasMany(Vec<Value>),
}

/// Identity of the entity currently being rebuilt, for reciprocal links
/// written onto its children.
struct ParentRef {
    singular_type: String,
    id: Value,
    type_field: Option<Value>,
}

/// A pending reciprocal link, applied to a child before its own subtree
/// is traversed.
struct BackLink {
    parent_type: String,
    entry: Value,
}

impl PayloadBuilder<CruetInflector> {
    /// Create a builder with the bundled inflector.
    pub fn new(config: NormalizeConfig) -> Self {
        PayloadBuilder {
            config,
            inflector: CruetInflector,
        }
    }
}

impl<I: Inflect> PayloadBuilder<I> {
    /// Create a builder with a caller-supplied inflector.
    pub fn with_inflector(config: NormalizeConfig, inflector: I) -> Self {
        PayloadBuilder { config, inflector }
    }

    /// Normalize `input` (a single entity or an array of entities) into a
    /// sideloaded payload keyed by the pluralized `root_type`.
    ///
    /// The input is consumed; callers that need the original afterwards
    /// should pass a clone. Non-object values in entity position pass
    /// through untouched rather than failing.
    pub fn build(&self, root_type: &str, input: Value) -> Result<Payload, PayloadError> {
        let root_key = self.inflector.pluralize(root_type);
        debug!("building payload for root type {}", root_key);

        let items = match input {
            Value::Array(items) => items,
            single => vec![single],
        };

        let mut linked = Map::new();
        let mut roots = Vec::with_capacity(items.len());
        for item in items {
            roots.push(self.normalize_value(&root_key, item, None, &mut linked)?);
        }

        if let Some(parent_link) = &self.config.parent_link {
            for root in &mut roots {
                if let Value::Object(entity) = root {
                    links_map(entity)
                        .insert(parent_link.link_type.clone(), parent_link.link.clone());
                }
            }
        }

        Ok(Payload {
            root_key,
            roots,
            linked,
        })
    }

    fn normalize_value(
        &self,
        type_name: &str,
        value: Value,
        back_link: Option<BackLink>,
        linked: &mut Map<String, Value>,
    ) -> Result<Value, PayloadError> {
        match value {
            Value::Object(entity) => Ok(Value::Object(
                self.normalize_entity(type_name, entity, back_link, linked)?,
            )),
            other => Ok(other),
        }
    }

    /// Rebuild one entity: attributes copied through in encounter order,
    /// associations extracted into the side table and replaced by link
    /// entries. The `links` map is merged, never overwritten.
    fn normalize_entity(
        &self,
        type_name: &str,
        entity: Map<String, Value>,
        back_link: Option<BackLink>,
        linked: &mut Map<String, Value>,
    ) -> Result<Map<String, Value>, PayloadError> {
        let parent = ParentRef {
            singular_type: self.inflector.singularize(type_name),
            id: entity.get("id").cloned().unwrap_or(Value::Null),
            type_field: entity.get("type").cloned(),
        };

        // Pre-existing link content survives; new entries merge in after.
        let mut links = match entity.get("links") {
            Some(Value::Object(existing)) => existing.clone(),
            _ => Map::new(),
        };
        if let Some(back) = back_link {
            self.add_links_entry(&mut links, &back.parent_type, back.entry);
        }

        let mut out = Map::new();
        for (key, value) in entity {
            if key == "links" {
                continue;
            }
            if key == "meta" || self.config.excluded_keys.contains(&key) {
                out.insert(key, value);
                continue;
            }
            match classify(value) {
                Association::Attribute(value) => {
                    out.insert(key, value);
                }
                Association::HasOne(child) => {
                    links
                        .entry(self.inflector.singularize(&key))
                        .or_insert(Value::Null);
                    self.link_child(&key, child, &parent, &mut links, linked)?;
                }
                Association::HasMany(children) => {
                    links
                        .entry(self.inflector.pluralize(&key))
                        .or_insert_with(|| Value::Array(Vec::new()));
                    for child in children {
                        if let Value::Object(child) = child {
                            self.link_child(&key, child, &parent, &mut links, linked)?;
                        }
                    }
                }
            }
        }

        if !links.is_empty() {
            out.insert("links".to_string(), Value::Object(links));
        }
        Ok(out)
    }

    /// Resolve the bucket for one discovered child, deduplicate it into
    /// the side table, and rewrite the parent's reference as a link.
    fn link_child(
        &self,
        property_key: &str,
        child: Map<String, Value>,
        parent: &ParentRef,
        parent_links: &mut Map<String, Value>,
        linked: &mut Map<String, Value>,
    ) -> Result<(), PayloadError> {
        let link_base = self.inflector.singularize(property_key);
        let bucket_base = self
            .config
            .mappings
            .get(property_key)
            .cloned()
            .unwrap_or_else(|| link_base.clone());

        let polymorphic = self.is_declared(&self.config.polymorphic_types, &bucket_base);
        let concrete_type = if polymorphic {
            match child.get("type").and_then(Value::as_str) {
                Some(concrete) => concrete.to_string(),
                None => {
                    return Err(PayloadError::MissingPolymorphicType {
                        base_type: bucket_base,
                    })
                }
            }
        } else {
            bucket_base.clone()
        };

        let bucket_key = self.inflector.pluralize(&concrete_type);
        trace!("linking {} into bucket {}", link_base, bucket_key);

        // Reserve the bucket at discovery time so bucket order follows
        // traversal order even while the child's own subtree normalizes.
        if !linked.contains_key(&bucket_key) {
            linked.insert(bucket_key.clone(), Value::Array(Vec::new()));
        }

        let child_id = child.get("id").cloned().unwrap_or(Value::Null);
        let entry = if polymorphic {
            json!({ "id": child_id, "type": concrete_type })
        } else {
            child_id
        };
        self.add_links_entry(parent_links, &link_base, entry);

        let back = if self.is_declared(&self.config.link_back_types, &bucket_base) {
            let parent_poly =
                self.is_declared(&self.config.polymorphic_types, &parent.singular_type);
            let entry = if parent_poly {
                json!({ "id": parent.id, "type": parent.type_field })
            } else {
                parent.id.clone()
            };
            Some(BackLink {
                parent_type: parent.singular_type.clone(),
                entry,
            })
        } else {
            None
        };

        let normalized = self.normalize_entity(property_key, child, back, linked)?;

        if let Some(Value::Array(bucket)) = linked.get_mut(&bucket_key) {
            let id = normalized.get("id");
            let duplicate = bucket.iter().any(|existing| existing.get("id") == id);
            if !duplicate {
                bucket.push(Value::Object(normalized));
            }
        }
        Ok(())
    }

    /// One code path for both association arities: an existing
    /// plural-keyed array receives an appended value, otherwise the
    /// singular key holds the value directly.
    fn add_links_entry(&self, links: &mut Map<String, Value>, base_type: &str, entry: Value) {
        let plural = self.inflector.pluralize(base_type);
        if let Some(Value::Array(many)) = links.get_mut(&plural) {
            many.push(entry);
            return;
        }
        links.insert(self.inflector.singularize(base_type), entry);
    }

    /// Declared-type membership, tolerant of singular or plural
    /// declarations.
    fn is_declared(&self, declared: &[String], base_type: &str) -> bool {
        let base = self.inflector.singularize(base_type);
        declared
            .iter()
            .any(|name| self.inflector.singularize(name) == base)
    }
}

/// Classify one property value by shape, exactly once.
fn classify(value: Value) -> Association {
    match value {
        Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => {
            Association::HasMany(items)
        }
        Value::Object(entity) => Association::HasOne(entity),
        other => Association::Attribute(other),
    }
}

/// Get-or-create accessor for an entity's `links` map.
fn links_map(entity: &mut Map<String, Value>) -> &mut Map<String, Value> {
    let slot = entity
        .entry("links")
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(links) => links,
        _ => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_entity_is_identity() {
        let builder = PayloadBuilder::new(NormalizeConfig::default());
        let payload = builder
            .build("items", json!({"id": 1, "name": "a1"}))
            .unwrap();

        assert_eq!(
            payload.into_value(),
            json!({"items": [{"id": 1, "name": "a1"}]})
        );
    }

    #[test]
    fn test_has_one_extraction() {
        let builder = PayloadBuilder::new(NormalizeConfig::default());
        let payload = builder
            .build(
                "items",
                json!({"id": 1, "name": "item1", "oItem": {"id": 1, "name": "oItem1"}}),
            )
            .unwrap();

        assert_eq!(
            payload.into_value(),
            json!({
                "items": [{"id": 1, "name": "item1", "links": {"oItem": 1}}],
                "linked": {"oItems": [{"id": 1, "name": "oItem1"}]}
            })
        );
    }

    #[test]
    fn test_has_many_extraction_keeps_order() {
        let builder = PayloadBuilder::new(NormalizeConfig::default());
        let payload = builder
            .build(
                "items",
                json!({"id": 1, "mItems": [{"id": 2, "name": "m2"}, {"id": 1, "name": "m1"}]}),
            )
            .unwrap();

        assert_eq!(
            payload.into_value(),
            json!({
                "items": [{"id": 1, "links": {"mItems": [2, 1]}}],
                "linked": {"mItems": [{"id": 2, "name": "m2"}, {"id": 1, "name": "m1"}]}
            })
        );
    }

    #[test]
    fn test_scalar_array_stays_inline() {
        let builder = PayloadBuilder::new(NormalizeConfig::default());
        let payload = builder
            .build("items", json!({"id": 1, "tags": ["rust", "json"]}))
            .unwrap();

        assert_eq!(
            payload.into_value(),
            json!({"items": [{"id": 1, "tags": ["rust", "json"]}]})
        );
    }

    #[test]
    fn test_missing_polymorphic_type_is_an_error() {
        let config = NormalizeConfig {
            polymorphic_types: vec!["shapes".to_string()],
            ..NormalizeConfig::default()
        };
        let builder = PayloadBuilder::new(config);
        let err = builder
            .build("drawings", json!({"id": 1, "shapes": [{"id": 1}]}))
            .unwrap_err();

        assert_eq!(
            err,
            PayloadError::MissingPolymorphicType {
                base_type: "shape".to_string()
            }
        );
    }

    #[test]
    fn test_builder_is_reusable_across_calls() {
        let builder = PayloadBuilder::new(NormalizeConfig::default());

        let first = builder
            .build("items", json!({"id": 1, "oItem": {"id": 2}}))
            .unwrap();
        assert!(!first.linked.is_empty());

        // No accumulator state leaks into the next call.
        let second = builder.build("items", json!({"id": 3})).unwrap();
        assert!(second.linked.is_empty());
    }
}
