//! The seam between the dispatcher and domain objects.
//!
//! A [`RemoteObject`] is one stateful server-side object (a browser, a page,
//! a stream...) that the controller drives through its node. The dispatcher
//! owns the object graph bookkeeping; the object owns its domain behavior.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::DispatchError;
use crate::handle::CallContext;

/// One remote-controllable domain object.
///
/// Implementations declare their method table up front ([`method_names`]);
/// the router answers `UnsupportedMethod` for anything else without invoking
/// the object, so `handle_call` only ever sees declared methods.
///
/// [`method_names`]: RemoteObject::method_names
#[async_trait]
pub trait RemoteObject: Send + Sync + 'static {
    /// Stable identifier of this object. Becomes the node's guid.
    fn guid(&self) -> &str;

    /// Object-type tag naming the contract this object implements,
    /// e.g. `"Browser"` or `"Page"`.
    fn kind(&self) -> &str;

    /// GC bucket this object's node counts against. Defaults to the kind;
    /// override so related kinds share one eviction budget.
    fn gc_bucket(&self) -> &str {
        self.kind()
    }

    /// The closed set of methods this object handles.
    fn method_names(&self) -> &[&str];

    /// Invoke a declared method. `params` have already passed validation.
    ///
    /// The call runs outside the registry lock; it may await domain I/O
    /// freely. If the node's scope is disposed mid-call, calls not marked
    /// tolerant of that race are aborted with a target-closed error; tolerant
    /// calls run to completion and their real outcome is returned.
    async fn handle_call(
        &self,
        method: &str,
        params: Value,
        ctx: CallContext,
    ) -> Result<Value, DispatchError>;

    /// Cleanup hook, run before the node is marked disposed (e.g. cancel an
    /// in-flight interceptor). Runs under the registry lock: keep it quick
    /// and do not call back into the connection.
    fn on_dispose(&self) {}
}
