//! The root node: the pre-registered entry point of every connection.
//!
//! The root exists before any message flows (guid `""`, kind `"Root"`) and
//! exposes exactly one method, `initialize`. On that call a
//! connection-supplied factory builds the top-level domain node under the
//! root, and its guid is returned so the controller can start driving the
//! graph.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::DispatchError;
use crate::handle::{CallContext, NodeHandle};
use crate::object::RemoteObject;

/// Builds the top-level domain node on the controller's `initialize` call.
/// Receives the root's own handle (the parent scope for the new node) and
/// the raw `initialize` params.
pub type RootFactory = Box<
    dyn Fn(NodeHandle, Value) -> Pin<Box<dyn Future<Output = Result<NodeHandle, DispatchError>> + Send>>
        + Send
        + Sync,
>;

pub(crate) struct RootObject {
    initialized: AtomicBool,
    factory: Option<RootFactory>,
}

impl RootObject {
    pub(crate) fn new(factory: RootFactory) -> Self {
        Self {
            initialized: AtomicBool::new(false),
            factory: Some(factory),
        }
    }

    /// A root that rejects `initialize`: the connection exposes no objects.
    pub(crate) fn without_factory() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            factory: None,
        }
    }
}

#[async_trait]
impl RemoteObject for RootObject {
    fn guid(&self) -> &str {
        ""
    }

    fn kind(&self) -> &str {
        "Root"
    }

    fn method_names(&self) -> &[&str] {
        &["initialize"]
    }

    async fn handle_call(
        &self,
        _method: &str,
        params: Value,
        ctx: CallContext,
    ) -> Result<Value, DispatchError> {
        let Some(factory) = &self.factory else {
            return Err(DispatchError::domain(
                "this connection does not expose any objects",
            ));
        };
        // Marked before the factory runs and never reset: a failed factory
        // still burns the one initialize this connection gets.
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(DispatchError::AlreadyInitialized);
        }
        let child = factory(ctx.handle().clone(), params).await?;
        Ok(json!({ "rootObject": { "guid": child.guid() } }))
    }
}
