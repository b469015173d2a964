//! Explicit per-call context
//!
//! Everything a document operation needs from outside the document travels
//! in a [`Context`]; nothing is looked up from process-wide state.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

/// External registry that knows the payload schema behind each type tag
pub trait TypeRegistry: Debug + Send + Sync {
    fn validate_payload(&self, type_tag: &str, payload: &[u8]) -> Result<(), String>;
}

/// Accepts every tag and payload
#[derive(Debug, Default, Clone, Copy)]
pub struct OpaqueRegistry;

impl TypeRegistry for OpaqueRegistry {
    fn validate_payload(&self, _type_tag: &str, _payload: &[u8]) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSchema {
    /// Any bytes
    Opaque,
    /// Payload must be empty
    Empty,
    /// Payload must parse as a JSON document
    Json,
}

/// Registry with a fixed schema per known tag
///
/// Unknown tags are rejected unless `allow_unknown` is set.
#[derive(Debug, Default, Clone)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, PayloadSchema>,
    allow_unknown: bool,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(mut self, type_tag: impl Into<String>, schema: PayloadSchema) -> Self {
        self.schemas.insert(type_tag.into(), schema);
        self
    }

    pub fn allow_unknown(mut self) -> Self {
        self.allow_unknown = true;
        self
    }
}

impl TypeRegistry for SchemaRegistry {
    fn validate_payload(&self, type_tag: &str, payload: &[u8]) -> Result<(), String> {
        match self.schemas.get(type_tag) {
            Some(PayloadSchema::Opaque) => Ok(()),
            Some(PayloadSchema::Empty) if payload.is_empty() => Ok(()),
            Some(PayloadSchema::Empty) => Err(format!("expected no payload, got {} bytes", payload.len())),
            Some(PayloadSchema::Json) => serde_json::from_slice::<serde_json::Value>(payload)
                .map(|_| ())
                .map_err(|e| e.to_string()),
            None if self.allow_unknown => Ok(()),
            None => Err("unknown type tag".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Context {
    pub registry: Arc<dyn TypeRegistry>,
}

impl Context {
    pub fn new(registry: Arc<dyn TypeRegistry>) -> Self {
        Self { registry }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(Arc::new(OpaqueRegistry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_registry() {
        let registry = SchemaRegistry::new()
            .with_schema("wall", PayloadSchema::Json)
            .with_schema("marker", PayloadSchema::Empty);

        assert!(registry.validate_payload("wall", br#"{"height": 3}"#).is_ok());
        assert!(registry.validate_payload("wall", b"not json").is_err());
        assert!(registry.validate_payload("marker", b"").is_ok());
        assert!(registry.validate_payload("marker", b"x").is_err());
        assert!(registry.validate_payload("door", b"").is_err());
        assert!(registry.allow_unknown().validate_payload("door", b"").is_ok());
    }
}
