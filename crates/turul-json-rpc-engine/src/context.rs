//! Per-call invocation context and cancellation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::registry::MethodMetadata;
use crate::request::JsonRpcRequest;
use crate::types::RequestId;

/// Base context of one transport-level request.
///
/// Holds the parent cancellation scope and transport attributes such as the
/// peer address. Cancelling it cancels every call derived from it.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancellation: CancellationToken,
    attributes: Arc<HashMap<String, Value>>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing token as the parent scope
    pub fn with_cancellation(cancellation: CancellationToken) -> Self {
        Self {
            cancellation,
            attributes: Arc::default(),
        }
    }

    /// Returns a copy carrying one more attribute; `self` is left untouched.
    pub fn with_attribute(&self, key: impl Into<String>, value: Value) -> Self {
        let mut attributes = (*self.attributes).clone();
        attributes.insert(key.into(), value);
        Self {
            cancellation: self.cancellation.clone(),
            attributes: Arc::new(attributes),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn attributes(&self) -> &HashMap<String, Value> {
        &self.attributes
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Context handed to a capability for one call.
#[derive(Debug, Clone)]
pub struct CallContext {
    base: RequestContext,
    request_id: Option<RequestId>,
    method: String,
    metadata: Arc<MethodMetadata>,
    cancellation: CancellationToken,
}

impl CallContext {
    /// Derive the call context for `request` from `base`.
    ///
    /// The returned handle cancels this call only; it is meant to be stored
    /// on the response so whoever delivers the output can abort the call.
    pub fn derive(
        base: &RequestContext,
        request: &JsonRpcRequest,
        metadata: Arc<MethodMetadata>,
    ) -> (Self, CancelHandle) {
        let cancellation = base.cancellation.child_token();
        let handle = CancelHandle::new(cancellation.clone());
        let context = Self {
            base: base.clone(),
            request_id: request.id.clone(),
            method: request.method.clone(),
            metadata,
            cancellation,
        };
        (context, handle)
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn metadata(&self) -> &MethodMetadata {
        &self.metadata
    }

    pub fn base(&self) -> &RequestContext {
        &self.base
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.base.attribute(key)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves once the call has been cancelled.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

/// Handle that aborts one in-flight call.
///
/// Cancelling twice is a no-op. `cancel` reports `true` only when this
/// handle is what cancelled the call, not when it was already cancelled
/// through its base context.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
    fired: Arc<AtomicBool>,
}

impl CancelHandle {
    fn new(token: CancellationToken) -> Self {
        Self {
            token,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) || self.token.is_cancelled() {
            return false;
        }
        self.token.cancel();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
