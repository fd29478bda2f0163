//! Cheap references to live nodes, and the per-call context handed to
//! method handlers.

use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;

use tether_wire::{CallMetadata, Guid};

use crate::connection::{ConnectionInner, DispatcherConnection};
use crate::error::DispatchError;
use crate::instrumentation::Instrumentation;
use crate::object::RemoteObject;

/// A cloneable reference to a live node. Holds the connection weakly, so
/// handles kept by domain objects never keep the connection alive.
///
/// Operations on a handle whose node (or connection) is gone degrade
/// gracefully: queries answer "disposed", mutations are dropped with a
/// warning. The exception is [`dispose`](NodeHandle::dispose), where
/// disposing twice is a lifecycle bug and fails loudly.
#[derive(Clone)]
pub struct NodeHandle {
    pub(crate) inner: Weak<ConnectionInner>,
    pub(crate) guid: Guid,
}

impl NodeHandle {
    /// The node's guid.
    pub fn guid(&self) -> &Guid {
        &self.guid
    }

    /// The connection this node belongs to, if it is still alive.
    pub fn connection(&self) -> Option<DispatcherConnection> {
        self.inner.upgrade().map(DispatcherConnection::from_inner)
    }

    /// Whether the node is gone from the registry (or the connection itself
    /// has been dropped).
    pub fn is_disposed(&self) -> bool {
        match self.connection() {
            Some(connection) => !connection.is_registered(&self.guid),
            None => true,
        }
    }

    /// Create a child node owned by this node. Emits a `__create__` message
    /// to the controller and runs the GC check for the child's bucket.
    pub fn create_child(
        &self,
        object: Arc<dyn RemoteObject>,
        initializer: Value,
        gc_bucket: Option<&str>,
    ) -> Result<NodeHandle, DispatchError> {
        let connection = self.connection().ok_or_else(DispatchError::target_closed)?;
        connection.create_node(Some(&self.guid), object, initializer, gc_bucket)
    }

    /// Reparent `child` under this node. No-op if it is already ours.
    pub fn adopt(&self, child: &NodeHandle) {
        if let Some(connection) = self.connection() {
            connection.adopt(&self.guid, &child.guid);
        }
    }

    /// Emit a domain event to the controller. Dropped with a warning if the
    /// node is already disposed (a debug assertion catches that in tests,
    /// since it should never happen under correct usage).
    pub fn emit(&self, event: &str, params: Value) -> Result<(), DispatchError> {
        match self.connection() {
            Some(connection) => connection.emit_event(&self.guid, event, params),
            None => {
                tracing::warn!(guid = %self.guid, event, "event dropped: connection is gone");
                Ok(())
            }
        }
    }

    /// Dispose this node and every descendant. `reason` is surfaced to the
    /// controller in the `__dispose__` message (`"gc"` for evictions).
    pub fn dispose(&self, reason: Option<&str>) {
        if let Some(connection) = self.connection() {
            connection.dispose_node(&self.guid, reason);
        }
    }

    /// Record a human-readable close reason on this node. The router uses
    /// the nearest ancestor reason to rewrite target-closed errors.
    pub fn set_close_reason(&self, reason: impl Into<String>) {
        if let Some(connection) = self.connection() {
            connection.set_close_reason(&self.guid, reason.into());
        }
    }
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("guid", &self.guid)
            .finish()
    }
}

/// Per-call context passed to [`RemoteObject::handle_call`].
///
/// Carries the node's own handle (the scope for creating children and
/// emitting events), a snapshot of the call metadata, and the progress log.
pub struct CallContext {
    pub(crate) handle: NodeHandle,
    pub(crate) metadata: CallMetadata,
    pub(crate) log: Arc<Mutex<Vec<String>>>,
    pub(crate) instrumentation: Arc<dyn Instrumentation>,
}

impl CallContext {
    /// The node the call is running on.
    pub fn handle(&self) -> &NodeHandle {
        &self.handle
    }

    /// Call metadata as of call start.
    pub fn metadata(&self) -> &CallMetadata {
        &self.metadata
    }

    /// Append a progress line to the call log and notify instrumentation.
    /// The log travels back to the controller on error responses.
    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        self.instrumentation.on_call_log(&self.metadata, &message);
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message);
    }
}

impl std::fmt::Debug for CallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallContext")
            .field("guid", &self.handle.guid)
            .field("method", &self.metadata.method)
            .finish()
    }
}
