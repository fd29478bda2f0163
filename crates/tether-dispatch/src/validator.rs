//! Validator seam: schema checking and guid substitution for wire payloads.
//!
//! The dispatcher does not know the parameter schemas of the domain methods
//! it routes. A [`ValidatorFactory`] supplies, per (kind, message name,
//! direction), a function that checks and coerces a raw payload. The
//! [`ValidatorContext`] handed to validators resolves node references in both
//! directions: wire `{ "guid": ... }` records to live nodes on the way in,
//! node guids back to wire records on the way out. Resolution failures are
//! validation errors, never panics.

use std::sync::Arc;

use serde_json::{json, Value};

use tether_wire::WireMetadata;

use crate::error::DispatchError;

/// Which payload of a message a validator applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Params,
    Result,
    Event,
    Initializer,
}

/// How binary blobs travel in payloads. Local connections pass raw bytes;
/// remote ones use base64.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryMode {
    Raw,
    Base64,
}

/// Bidirectional guid⇄node resolution, supplied by the connection.
pub trait ValidatorContext {
    /// Check that `value` is a `{ "guid": ... }` record referencing a live
    /// node whose kind is in `expected_kinds` (empty slice = any kind).
    /// Returns the referenced guid as a wire value.
    fn guid_to_node(
        &self,
        expected_kinds: &[&str],
        value: &Value,
        path: &str,
    ) -> Result<Value, DispatchError>;

    /// Convert a live node guid to its `{ "guid": ... }` wire form, checking
    /// the node's kind against `expected_kinds` (empty slice = any kind).
    fn node_to_wire(
        &self,
        expected_kinds: &[&str],
        guid: &str,
        path: &str,
    ) -> Result<Value, DispatchError>;

    /// Binary payload encoding for this connection.
    fn binary_mode(&self) -> BinaryMode;
}

/// A single payload check.
pub trait Validator: Send + Sync {
    fn validate(
        &self,
        value: &Value,
        path: &str,
        ctx: &dyn ValidatorContext,
    ) -> Result<Value, DispatchError>;
}

/// Supplies validators per (kind, message name, direction).
pub trait ValidatorFactory: Send + Sync {
    fn find_validator(
        &self,
        kind: &str,
        name: &str,
        direction: Direction,
    ) -> Result<Arc<dyn Validator>, DispatchError>;
}

/// Default factory: accepts any payload unchanged. Useful for embedders that
/// validate at a different layer, and for tests.
pub struct PassthroughValidators;

struct Passthrough;

impl Validator for Passthrough {
    fn validate(
        &self,
        value: &Value,
        _path: &str,
        _ctx: &dyn ValidatorContext,
    ) -> Result<Value, DispatchError> {
        Ok(value.clone())
    }
}

impl ValidatorFactory for PassthroughValidators {
    fn find_validator(
        &self,
        _kind: &str,
        _name: &str,
        _direction: Direction,
    ) -> Result<Arc<dyn Validator>, DispatchError> {
        Ok(Arc::new(Passthrough))
    }
}

/// Parse command metadata, pinning parse failures to the `metadata` path.
pub fn validate_metadata(value: &Value) -> Result<WireMetadata, DispatchError> {
    if value.is_null() {
        return Ok(WireMetadata::default());
    }
    serde_json::from_value(value.clone())
        .map_err(|e| DispatchError::validation("metadata", e.to_string()))
}

/// Helper for custom validators: check a wire value is a guid reference and
/// pull the guid string out of it.
pub fn guid_of(value: &Value, path: &str) -> Result<String, DispatchError> {
    match value.get("guid").and_then(Value::as_str) {
        Some(guid) => Ok(guid.to_string()),
        None => Err(DispatchError::validation(path, "expected guid reference")),
    }
}

/// Helper for custom validators: the wire form of a node reference.
pub fn guid_ref(guid: &str) -> Value {
    json!({ "guid": guid })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullContext;

    impl ValidatorContext for NullContext {
        fn guid_to_node(
            &self,
            _expected_kinds: &[&str],
            value: &Value,
            _path: &str,
        ) -> Result<Value, DispatchError> {
            Ok(value.clone())
        }

        fn node_to_wire(
            &self,
            _expected_kinds: &[&str],
            guid: &str,
            _path: &str,
        ) -> Result<Value, DispatchError> {
            Ok(guid_ref(guid))
        }

        fn binary_mode(&self) -> BinaryMode {
            BinaryMode::Raw
        }
    }

    #[test]
    fn passthrough_returns_payload_unchanged() {
        let factory = PassthroughValidators;
        let validator = factory
            .find_validator("Page", "goto", Direction::Params)
            .unwrap();
        let params = json!({ "url": "about:blank" });
        let validated = validator.validate(&params, "", &NullContext).unwrap();
        assert_eq!(validated, params);
    }

    #[test]
    fn metadata_null_is_default() {
        let metadata = validate_metadata(&Value::Null).unwrap();
        assert_eq!(metadata, WireMetadata::default());
    }

    #[test]
    fn metadata_parse_failure_is_path_qualified() {
        let err = validate_metadata(&json!({ "internal": "yes" })).unwrap_err();
        match err {
            DispatchError::Validation { path, .. } => assert_eq!(path, "metadata"),
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn guid_of_rejects_non_references() {
        assert!(guid_of(&json!({ "guid": "page@1" }), "params.page").is_ok());
        assert!(guid_of(&json!("page@1"), "params.page").is_err());
        assert!(guid_of(&json!({}), "params.page").is_err());
    }
}
