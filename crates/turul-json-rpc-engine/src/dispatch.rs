use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::context::{CallContext, RequestContext};
use crate::registry::MethodResolver;
use crate::request::JsonRpcRequest;
use crate::response::{JsonRpcResponse, ResponsePayload};

/// Resolves and invokes the capability for each request.
///
/// Each call is attempted exactly once. Failures are scoped to the
/// response of the call that failed.
#[derive(Clone)]
pub struct JsonRpcDispatcher {
    resolver: Arc<dyn MethodResolver>,
}

impl JsonRpcDispatcher {
    pub fn new(resolver: Arc<dyn MethodResolver>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &Arc<dyn MethodResolver> {
        &self.resolver
    }

    /// Invoke the method named by `request` and produce its response.
    pub async fn invoke(&self, base: &RequestContext, request: &JsonRpcRequest) -> JsonRpcResponse {
        let metadata = match self.resolver.resolve(request) {
            Ok(metadata) => metadata,
            Err(error) => {
                warn!(
                    "Failed to resolve method '{}' (id={}): {}",
                    request.method,
                    display_id(request),
                    error
                );
                return JsonRpcResponse::for_request(request, ResponsePayload::Error(error));
            }
        };

        let capability = metadata.capability.clone();
        let (ctx, cancel) = CallContext::derive(base, request, metadata);
        debug!(
            "Invoking method '{}' (id={}, streaming={})",
            request.method,
            display_id(request),
            capability.is_streaming()
        );

        let payload = match capability.invoke(&ctx, request.params()).await {
            Ok(result) => ResponsePayload::Result(result),
            Err(error) => {
                debug!("Method '{}' failed: {}", request.method, error);
                ResponsePayload::Error(error)
            }
        };

        JsonRpcResponse::for_request(request, payload).with_cancel_handle(cancel)
    }

    /// Invoke every request, returning responses in request order.
    ///
    /// With `concurrent` the calls run at the same time on the current task;
    /// otherwise one after another.
    pub async fn invoke_all(
        &self,
        base: &RequestContext,
        requests: &[JsonRpcRequest],
        concurrent: bool,
    ) -> Vec<JsonRpcResponse> {
        if concurrent {
            return join_all(requests.iter().map(|request| self.invoke(base, request))).await;
        }

        let mut responses = Vec::with_capacity(requests.len());
        for request in requests {
            responses.push(self.invoke(base, request).await);
        }
        responses
    }
}

fn display_id(request: &JsonRpcRequest) -> &str {
    request.id.as_ref().map_or("none", |id| id.as_raw())
}
