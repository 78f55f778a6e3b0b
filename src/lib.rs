//! # Sideload - Compound Document Payload Builder
//!
//! Normalizes arbitrarily nested JSON into "sideloaded" payloads: every
//! embedded sub-object is extracted into a flat, de-duplicated,
//! type-bucketed side table and the original nesting is replaced by
//! lightweight reference links (ids, or id+type for polymorphic
//! associations).
//!
//! ## Quick Start
//!
//! ```rust
//! use sideload::{build_payload, NormalizeConfig};
//! use serde_json::json;
//!
//! # fn main() -> anyhow::Result<()> {
//! let record = json!({
//!     "id": 1,
//!     "name": "item1",
//!     "oItem": {"id": 1, "name": "oItem1"}
//! });
//!
//! let payload = build_payload("items", record, NormalizeConfig::default())?;
//!
//! assert_eq!(payload.into_value(), json!({
//!     "items": [{"id": 1, "name": "item1", "links": {"oItem": 1}}],
//!     "linked": {"oItems": [{"id": 1, "name": "oItem1"}]}
//! }));
//! # Ok(())
//! # }
//! ```
//!
//! Associations are classified by shape: an embedded object is a has-one,
//! a non-empty array of objects is a has-many. Polymorphic buckets,
//! reciprocal parent links, bucket-type redirects, and static parent
//! links are configured per call through [`NormalizeConfig`].

use anyhow::{Context, Result};
use serde_json::Value;
use std::io::{BufRead, Write};

pub mod inflect;
pub mod normalizer;
pub mod types;
pub mod writer;

// Re-export commonly used types for convenience
pub use inflect::{CruetInflector, Inflect};
pub use normalizer::PayloadBuilder;
pub use types::{NormalizeConfig, ParentLink, Payload, PayloadError};
pub use writer::PayloadWriter;

/// Build a sideloaded payload with the bundled inflector.
pub fn build_payload(
    root_type: &str,
    input: Value,
    config: NormalizeConfig,
) -> Result<Payload, PayloadError> {
    PayloadBuilder::new(config).build(root_type, input)
}

/// Normalize a stream of newline-delimited JSON documents, writing one
/// payload per input document.
pub fn normalize_json<R: BufRead, W: Write>(
    reader: R,
    writer: &mut PayloadWriter<W>,
    root_type: &str,
    config: NormalizeConfig,
) -> Result<()> {
    let builder = PayloadBuilder::new(config);

    for line in reader.lines() {
        let line = line.context("Failed to read line")?;
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(&line).context("Failed to parse JSON")?;

        let payload = builder.build(root_type, value)?;
        writer.write_payload(&payload)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_basic_normalization() {
        let input = json!({
            "id": 1,
            "name": "Alice",
            "posts": [
                {"id": 10, "title": "Post 1"},
                {"id": 11, "title": "Post 2"}
            ]
        });

        let payload = build_payload("users", input, NormalizeConfig::default()).unwrap();

        assert_eq!(payload.root_key, "users");
        assert_eq!(payload.linked["posts"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_normalize_json_stream() {
        let input = b"{\"id\": 1, \"oItem\": {\"id\": 2}}\n{\"id\": 3}\n" as &[u8];
        let mut buffer = Vec::new();
        let mut writer = PayloadWriter::new(&mut buffer);

        normalize_json(input, &mut writer, "items", NormalizeConfig::default()).unwrap();

        let output = String::from_utf8(buffer).unwrap();
        let payloads: Vec<Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(payloads.len(), 2);
        assert_eq!(
            payloads[0],
            json!({
                "items": [{"id": 1, "links": {"oItem": 2}}],
                "linked": {"oItems": [{"id": 2}]}
            })
        );
        assert_eq!(payloads[1], json!({"items": [{"id": 3}]}));
    }
}
