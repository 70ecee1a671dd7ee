//! Method registry: binds method names to capabilities.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{JsonRpcErrorObject, RegistryError};
use crate::handler::{Capability, JsonRpcHandler, JsonRpcStreamHandler};
use crate::request::JsonRpcRequest;

/// Everything the engine knows about one registered method
#[derive(Debug, Clone)]
pub struct MethodMetadata {
    pub capability: Capability,
    pub description: Option<String>,
    /// Example or schema of the expected params, for introspection only
    pub params_schema: Option<Value>,
    /// Example or schema of the result, for introspection only
    pub result_schema: Option<Value>,
}

impl MethodMetadata {
    pub fn new(capability: Capability) -> Self {
        Self {
            capability,
            description: None,
            params_schema: None,
            result_schema: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn params_schema(mut self, schema: Value) -> Self {
        self.params_schema = Some(schema);
        self
    }

    pub fn result_schema(mut self, schema: Value) -> Self {
        self.result_schema = Some(schema);
        self
    }
}

/// Resolves the metadata of the method a request names
pub trait MethodResolver: Send + Sync {
    fn resolve(&self, request: &JsonRpcRequest) -> Result<Arc<MethodMetadata>, JsonRpcErrorObject>;
}

/// Introspection entry returned by [`MethodRepository::methods`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodDescription {
    pub name: String,
    pub streaming: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

/// Shared, read-mostly table of methods
#[derive(Debug, Default)]
pub struct MethodRepository {
    methods: RwLock<HashMap<String, Arc<MethodMetadata>>>,
}

impl MethodRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unary handler under `name`
    pub fn register<H>(&self, name: impl Into<String>, handler: H) -> Result<(), RegistryError>
    where
        H: JsonRpcHandler + 'static,
    {
        self.register_with(name, MethodMetadata::new(Capability::unary(handler)))
    }

    /// Register a streaming handler under `name`
    pub fn register_stream<H>(
        &self,
        name: impl Into<String>,
        handler: H,
    ) -> Result<(), RegistryError>
    where
        H: JsonRpcStreamHandler + 'static,
    {
        self.register_with(name, MethodMetadata::new(Capability::streaming(handler)))
    }

    /// Register a method with full metadata
    pub fn register_with(
        &self,
        name: impl Into<String>,
        metadata: MethodMetadata,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if name.is_empty() {
            return Err(RegistryError::EmptyMethodName);
        }

        let mut methods = self.methods.write();
        if methods.contains_key(&name) {
            return Err(RegistryError::DuplicateMethod(name));
        }
        debug!(
            "Registered method '{}' (streaming={})",
            name,
            metadata.capability.is_streaming()
        );
        methods.insert(name, Arc::new(metadata));
        Ok(())
    }

    /// Remove a method, returning whether it existed
    pub fn unregister(&self, name: &str) -> bool {
        self.methods.write().remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.methods.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.read().is_empty()
    }

    /// Describe all registered methods, sorted by name
    pub fn methods(&self) -> Vec<MethodDescription> {
        let methods = self.methods.read();
        let mut described: Vec<MethodDescription> = methods
            .iter()
            .map(|(name, md)| MethodDescription {
                name: name.clone(),
                streaming: md.capability.is_streaming(),
                description: md.description.clone(),
                params: md.params_schema.clone(),
                result: md.result_schema.clone(),
            })
            .collect();
        described.sort_by(|a, b| a.name.cmp(&b.name));
        described
    }
}

impl MethodResolver for MethodRepository {
    fn resolve(&self, request: &JsonRpcRequest) -> Result<Arc<MethodMetadata>, JsonRpcErrorObject> {
        if request.method.is_empty() || request.version != crate::JSONRPC_VERSION {
            return Err(JsonRpcErrorObject::invalid_request(None));
        }
        self.methods
            .read()
            .get(&request.method)
            .cloned()
            .ok_or_else(|| JsonRpcErrorObject::method_not_found(&request.method))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{handler_fn, stream_handler_fn};
    use crate::response::ResultStream;
    use crate::types::RequestId;
    use serde_json::json;

    fn repository() -> MethodRepository {
        let repo = MethodRepository::new();
        repo.register("echo", handler_fn(|_ctx, _params| async { Ok(json!("ok")) }))
            .unwrap();
        repo.register_stream(
            "tail",
            stream_handler_fn(|_ctx, _params| async { Ok(ResultStream::from_chunks(["[]"])) }),
        )
        .unwrap();
        repo
    }

    #[test]
    fn test_resolve_registered_method() {
        let repo = repository();
        let request = JsonRpcRequest::new_no_params(RequestId::from(1), "tail");
        let md = repo.resolve(&request).unwrap();
        assert!(md.capability.is_streaming());
    }

    #[test]
    fn test_resolve_unknown_method() {
        let repo = repository();
        let request = JsonRpcRequest::new_no_params(RequestId::from(1), "missing");
        let err = repo.resolve(&request).unwrap_err();
        assert_eq!(err.code, -32601);
    }

    #[test]
    fn test_resolve_empty_method_is_invalid_request() {
        let repo = repository();
        let request = JsonRpcRequest::new_no_params(RequestId::from(1), "");
        assert_eq!(repo.resolve(&request).unwrap_err().code, -32600);
    }

    #[test]
    fn test_resolve_rejects_wrong_version() {
        let repo = repository();
        let mut request = JsonRpcRequest::new_no_params(RequestId::from(1), "echo");
        request.version = "1.0".to_string();
        assert_eq!(repo.resolve(&request).unwrap_err().code, -32600);
    }

    #[test]
    fn test_registration_rejections() {
        let repo = repository();
        let dup = repo.register("echo", handler_fn(|_ctx, _params| async { Ok(json!(1)) }));
        assert_eq!(dup, Err(RegistryError::DuplicateMethod("echo".to_string())));

        let empty = repo.register("", handler_fn(|_ctx, _params| async { Ok(json!(1)) }));
        assert_eq!(empty, Err(RegistryError::EmptyMethodName));
        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn test_unregister() {
        let repo = repository();
        assert!(repo.unregister("echo"));
        assert!(!repo.unregister("echo"));
        assert!(!repo.contains("echo"));
    }

    #[test]
    fn test_methods_are_sorted_and_described() {
        let repo = repository();
        repo.register_with(
            "add",
            MethodMetadata::new(Capability::unary(handler_fn(|_ctx, _params| async {
                Ok(json!(0))
            })))
            .description("Adds two integers")
            .params_schema(json!([1, 2]))
            .result_schema(json!(3)),
        )
        .unwrap();

        let methods = repo.methods();
        let names: Vec<_> = methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["add", "echo", "tail"]);
        assert_eq!(methods[0].description.as_deref(), Some("Adds two integers"));
        assert!(methods[2].streaming);
    }
}
