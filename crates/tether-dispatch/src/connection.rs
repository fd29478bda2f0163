//! The connection: node registry, message router, cascade disposal, and
//! GC-bucket eviction.
//!
//! One [`DispatcherConnection`] owns every live node reachable from a single
//! bidirectional message channel. All registry mutation is synchronous and
//! happens under one lock that is never held across an await; handler
//! futures and instrumentation hooks run outside it, so commands on
//! different nodes interleave freely while the registry stays consistent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use tether_wire::{
    compress_call_log, monotonic_time_ms, CallMetadata, Command, Event, Guid, OutgoingMessage,
    Response, SerializedError, WaitInfo, WaitPhase, WireMetadata,
};

use crate::error::DispatchError;
use crate::gc::GcPolicy;
use crate::handle::{CallContext, NodeHandle};
use crate::instrumentation::{Instrumentation, NoopInstrumentation};
use crate::object::RemoteObject;
use crate::root::{RootFactory, RootObject};
use crate::validator::{
    validate_metadata, BinaryMode, Direction, PassthroughValidators, ValidatorContext,
    ValidatorFactory,
};
use crate::wait::WaitOperations;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Per-method routing flags, keyed `"Kind.method"` in
/// [`ConnectionOptions::method_flags`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MethodFlags {
    /// Force `metadata.internal` for this method, hiding it from user-facing
    /// traces regardless of what the caller sent.
    pub internal: bool,
    /// The call may legitimately race the closure of its own scope (`close`
    /// itself, or a navigation whose target may close mid-flight). Such
    /// calls are not aborted by disposal; their real outcome is returned.
    pub potentially_closes_scope: bool,
}

/// Connection construction options.
pub struct ConnectionOptions {
    /// Schema validators for params/results/events/initializers.
    pub validators: Arc<dyn ValidatorFactory>,
    /// Before/after-call hooks.
    pub instrumentation: Arc<dyn Instrumentation>,
    /// GC-bucket bounds.
    pub gc: GcPolicy,
    /// Per-method flags, keyed `"Kind.method"`.
    pub method_flags: HashMap<String, MethodFlags>,
    /// Local connections pass binary payloads as raw bytes; remote ones use
    /// base64. Surfaced to validators through their context.
    pub local: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            validators: Arc::new(PassthroughValidators),
            instrumentation: Arc::new(NoopInstrumentation),
            gc: GcPolicy::default(),
            method_flags: HashMap::new(),
            local: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Registry state
// ---------------------------------------------------------------------------

/// One in-flight command on a node. Disposal drains these: non-tolerant
/// operations get aborted, tolerant ones get the close reason captured into
/// `closed` so the racing call can rewrite its outcome.
struct ActiveOp {
    call_id: u64,
    tolerant: bool,
    abort: oneshot::Sender<DispatchError>,
    closed: Arc<OnceLock<Option<String>>>,
}

struct Node {
    kind: String,
    gc_bucket: String,
    parent: Option<Guid>,
    /// Owned children, insertion-ordered. Mutually consistent with each
    /// child's `parent` back-reference at all times.
    children: Vec<Guid>,
    object: Arc<dyn RemoteObject>,
    close_reason: Option<String>,
    active_ops: Vec<ActiveOp>,
}

#[derive(Default)]
struct State {
    nodes: HashMap<Guid, Node>,
    /// Domain-object id -> node guid: the "from" side table guaranteeing at
    /// most one node per domain object per connection.
    by_object: HashMap<String, Guid>,
    /// Bucket name -> guids in insertion order, for GC eviction.
    by_bucket: HashMap<String, Vec<Guid>>,
    wait_operations: WaitOperations,
}

impl State {
    /// First close reason on the chain from `guid` up through its ancestors
    /// (most specific wins: the node itself, then parent, and so on).
    fn close_reason_chain(&self, guid: &Guid) -> Option<String> {
        let mut current = Some(guid.clone());
        while let Some(guid) = current {
            let node = self.nodes.get(&guid)?;
            if let Some(reason) = &node.close_reason {
                return Some(reason.clone());
            }
            current = node.parent.clone();
        }
        None
    }

    /// Tear down `guid` and every descendant: abort non-tolerant in-flight
    /// operations, run cleanup hooks, and remove all bookkeeping. The
    /// registry, bucket index, and side table stay mutually consistent
    /// because everything happens inside one lock scope.
    fn dispose_recursively(&mut self, guid: &Guid, closed_reason: &Option<String>) {
        let Some(mut node) = self.nodes.remove(guid) else {
            panic!("{guid} is disposed more than once");
        };
        for op in node.active_ops.drain(..) {
            let _ = op.closed.set(closed_reason.clone());
            if !op.tolerant {
                let _ = op.abort.send(DispatchError::TargetClosed {
                    reason: closed_reason.clone(),
                });
            }
        }
        node.object.on_dispose();
        if let Some(parent_guid) = &node.parent {
            if let Some(parent) = self.nodes.get_mut(parent_guid) {
                parent.children.retain(|child| child != guid);
            }
        }
        if let Some(bucket) = self.by_bucket.get_mut(&node.gc_bucket) {
            bucket.retain(|g| g != guid);
        }
        self.by_object.remove(node.object.guid());
        for child in std::mem::take(&mut node.children) {
            self.dispose_recursively(&child, closed_reason);
        }
    }
}

pub(crate) struct ConnectionInner {
    state: Mutex<State>,
    outgoing: mpsc::UnboundedSender<OutgoingMessage>,
    validators: Arc<dyn ValidatorFactory>,
    instrumentation: Arc<dyn Instrumentation>,
    gc: GcPolicy,
    method_flags: HashMap<String, MethodFlags>,
    local: bool,
}

impl ConnectionInner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn send(&self, message: OutgoingMessage) {
        if self.outgoing.send(message).is_err() {
            warn!("outgoing message dropped: transport receiver is gone");
        }
    }

    fn binary_mode(&self) -> BinaryMode {
        if self.local {
            BinaryMode::Raw
        } else {
            BinaryMode::Base64
        }
    }
}

/// Guid⇄node resolution over the live registry, handed to validators.
struct WireContext<'a> {
    state: &'a State,
    binary: BinaryMode,
}

fn kinds_label(expected_kinds: &[&str]) -> String {
    if expected_kinds.is_empty() {
        "*".to_string()
    } else {
        expected_kinds.join(", ")
    }
}

impl ValidatorContext for WireContext<'_> {
    fn guid_to_node(
        &self,
        expected_kinds: &[&str],
        value: &Value,
        path: &str,
    ) -> Result<Value, DispatchError> {
        let Some(guid) = value.get("guid").and_then(Value::as_str) else {
            return Err(DispatchError::validation(
                path,
                format!("expected guid for {}", kinds_label(expected_kinds)),
            ));
        };
        let Some(node) = self.state.nodes.get(guid) else {
            return Err(DispatchError::validation(
                path,
                format!("no object with guid {guid}"),
            ));
        };
        if !expected_kinds.is_empty() && !expected_kinds.contains(&node.kind.as_str()) {
            return Err(DispatchError::validation(
                path,
                format!(
                    "object with guid {guid} has type {}, expected {}",
                    node.kind,
                    kinds_label(expected_kinds)
                ),
            ));
        }
        Ok(serde_json::json!({ "guid": guid }))
    }

    fn node_to_wire(
        &self,
        expected_kinds: &[&str],
        guid: &str,
        path: &str,
    ) -> Result<Value, DispatchError> {
        let Some(node) = self.state.nodes.get(guid) else {
            return Err(DispatchError::validation(
                path,
                format!("no object with guid {guid}"),
            ));
        };
        if !expected_kinds.is_empty() && !expected_kinds.contains(&node.kind.as_str()) {
            return Err(DispatchError::validation(
                path,
                format!(
                    "object with guid {guid} has type {}, expected {}",
                    node.kind,
                    kinds_label(expected_kinds)
                ),
            ));
        }
        Ok(serde_json::json!({ "guid": guid }))
    }

    fn binary_mode(&self) -> BinaryMode {
        self.binary
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// The object-graph RPC connection: registry of live nodes plus the router
/// that serializes outgoing lifecycle/events and demultiplexes incoming
/// commands.
#[derive(Clone)]
pub struct DispatcherConnection {
    inner: Arc<ConnectionInner>,
}

impl DispatcherConnection {
    /// Create a connection. The returned receiver yields every
    /// server-to-controller message in order; hand it to the transport.
    pub fn new(options: ConnectionOptions) -> (Self, mpsc::UnboundedReceiver<OutgoingMessage>) {
        let (outgoing, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(ConnectionInner {
            state: Mutex::new(State::default()),
            outgoing,
            validators: options.validators,
            instrumentation: options.instrumentation,
            gc: options.gc,
            method_flags: options.method_flags,
            local: options.local,
        });
        (Self { inner }, rx)
    }

    pub(crate) fn from_inner(inner: Arc<ConnectionInner>) -> Self {
        Self { inner }
    }

    fn downgrade(&self) -> Weak<ConnectionInner> {
        Arc::downgrade(&self.inner)
    }

    /// Register the distinguished root node (guid `""`, kind `"Root"`).
    /// `factory` builds the top-level domain node on the controller's
    /// one-time `initialize` call; pass `None` for a connection that exposes
    /// nothing.
    pub fn register_root(&self, factory: Option<RootFactory>) -> Result<NodeHandle, DispatchError> {
        let object = Arc::new(match factory {
            Some(factory) => RootObject::new(factory),
            None => RootObject::without_factory(),
        });
        self.create_node(None, object, Value::Null, None)
    }

    // -- node graph mutation ------------------------------------------------

    /// Register a new node wrapping `object`, owned by `parent` (`None` only
    /// for the root). Emits `__create__` to the controller before any of the
    /// node's own methods can be called, then runs the GC check for the
    /// node's bucket.
    ///
    /// Registering the same guid twice, or naming an unregistered parent, is
    /// a lifecycle bug and panics.
    pub fn create_node(
        &self,
        parent: Option<&Guid>,
        object: Arc<dyn RemoteObject>,
        initializer: Value,
        gc_bucket: Option<&str>,
    ) -> Result<NodeHandle, DispatchError> {
        let guid = Guid::new(object.guid());
        let kind = object.kind().to_string();
        let bucket = gc_bucket.unwrap_or(object.gc_bucket()).to_string();

        let mut state = self.inner.lock();
        assert!(
            !state.nodes.contains_key(&guid),
            "{guid} is already registered"
        );
        if let Some(parent_guid) = parent {
            assert!(
                state.nodes.contains_key(parent_guid),
                "parent {parent_guid} is not registered"
            );
        }

        // Validate the initializer before touching the registry, so a
        // validation failure leaves no half-registered node behind.
        let create_event = match parent {
            Some(parent_guid) => {
                let validator =
                    self.inner
                        .validators
                        .find_validator(&kind, "", Direction::Initializer)?;
                let ctx = WireContext {
                    state: &state,
                    binary: self.inner.binary_mode(),
                };
                let initializer = validator.validate(&initializer, "", &ctx)?;
                Some(Event::create(parent_guid, &kind, &guid, initializer))
            }
            None => None,
        };

        state.nodes.insert(
            guid.clone(),
            Node {
                kind,
                gc_bucket: bucket.clone(),
                parent: parent.cloned(),
                children: Vec::new(),
                object: object.clone(),
                close_reason: None,
                active_ops: Vec::new(),
            },
        );
        state.by_object.insert(object.guid().to_string(), guid.clone());
        state
            .by_bucket
            .entry(bucket.clone())
            .or_default()
            .push(guid.clone());
        if let Some(parent_guid) = parent {
            if let Some(parent_node) = state.nodes.get_mut(parent_guid) {
                parent_node.children.push(guid.clone());
            }
        }

        if let Some(event) = create_event {
            self.inner.send(event.into());
        }
        self.maybe_evict_stale_nodes(&mut state, &bucket);

        Ok(NodeHandle {
            inner: self.downgrade(),
            guid,
        })
    }

    /// The node already wrapping this domain object, if any. Repeated domain
    /// events must reuse the node they created rather than fabricate
    /// duplicate remote identities.
    pub fn existing_node(&self, object_guid: &str) -> Option<NodeHandle> {
        let state = self.inner.lock();
        let guid = state.by_object.get(object_guid)?.clone();
        Some(NodeHandle {
            inner: self.downgrade(),
            guid,
        })
    }

    /// The "from" pattern: reuse the node wrapping `object` or create one
    /// under `parent`.
    pub fn get_or_create_node(
        &self,
        parent: &Guid,
        object: Arc<dyn RemoteObject>,
        initializer: Value,
        gc_bucket: Option<&str>,
    ) -> Result<NodeHandle, DispatchError> {
        if let Some(existing) = self.existing_node(object.guid()) {
            return Ok(existing);
        }
        self.create_node(Some(parent), object, initializer, gc_bucket)
    }

    /// Reparent `child` under `new_parent`, emitting `__adopt__`. No-op
    /// (including no wire message) if the child already has that parent.
    /// Adoption never changes bucket membership.
    pub fn adopt(&self, new_parent: &Guid, child: &Guid) {
        let mut state = self.inner.lock();
        let Some(child_node) = state.nodes.get(child) else {
            panic!("cannot adopt unregistered node {child}");
        };
        if child_node.parent.as_ref() == Some(new_parent) {
            return;
        }
        assert!(
            state.nodes.contains_key(new_parent),
            "cannot adopt into unregistered node {new_parent}"
        );
        let old_parent = child_node.parent.clone();
        if let Some(old_parent) = old_parent {
            if let Some(old_node) = state.nodes.get_mut(&old_parent) {
                old_node.children.retain(|c| c != child);
            }
        }
        if let Some(new_node) = state.nodes.get_mut(new_parent) {
            new_node.children.push(child.clone());
        }
        if let Some(child_node) = state.nodes.get_mut(child) {
            child_node.parent = Some(new_parent.clone());
        }
        self.inner.send(Event::adopt(new_parent, child).into());
    }

    /// Dispose `guid` and its whole subtree, then announce `__dispose__` for
    /// the explicit target (descendants are covered by the cascade).
    /// Disposing a node that is already gone panics: double disposal means a
    /// lifecycle bug upstream.
    pub fn dispose_node(&self, guid: &Guid, reason: Option<&str>) {
        let mut state = self.inner.lock();
        assert!(
            state.nodes.contains_key(guid),
            "{guid} is disposed more than once"
        );
        let closed_reason = state.close_reason_chain(guid);
        state.dispose_recursively(guid, &closed_reason);
        self.inner.send(Event::dispose(guid, reason).into());
    }

    /// Emit a domain event from `guid`. Events from disposed nodes are a
    /// bug under correct usage (debug assertion), but benign in production:
    /// they are dropped with a warning.
    pub fn emit_event(&self, guid: &Guid, event: &str, params: Value) -> Result<(), DispatchError> {
        let state = self.inner.lock();
        let Some(node) = state.nodes.get(guid) else {
            debug_assert!(false, "{guid} is sending \"{event}\" event after being disposed");
            warn!(%guid, event, "event dropped: node is disposed");
            return Ok(());
        };
        let validator = self
            .inner
            .validators
            .find_validator(&node.kind, event, Direction::Event)?;
        let ctx = WireContext {
            state: &state,
            binary: self.inner.binary_mode(),
        };
        let params = validator.validate(&params, "", &ctx)?;
        self.inner.send(
            Event {
                guid: guid.clone(),
                method: event.to_string(),
                params,
            }
            .into(),
        );
        Ok(())
    }

    /// Record a close reason on a node; target-closed errors for the node
    /// and its descendants surface it.
    pub fn set_close_reason(&self, guid: &Guid, reason: String) {
        let mut state = self.inner.lock();
        match state.nodes.get_mut(guid) {
            Some(node) => node.close_reason = Some(reason),
            None => warn!(%guid, "close reason dropped: node is disposed"),
        }
    }

    // -- GC -----------------------------------------------------------------

    /// Evict the oldest tenth of a bucket once it exceeds its maximum.
    /// Best-effort only: a cascade may already have removed some victims.
    fn maybe_evict_stale_nodes(&self, state: &mut State, bucket: &str) {
        let max = self.inner.gc.max_for(bucket);
        let Some(list) = state.by_bucket.get(bucket) else {
            return;
        };
        if list.len() <= max {
            return;
        }
        let evict_count = self.inner.gc.evict_count(bucket);
        let victims: Vec<Guid> = list.iter().take(evict_count).cloned().collect();
        debug!(bucket, count = victims.len(), "evicting stale nodes");
        for victim in victims {
            if !state.nodes.contains_key(&victim) {
                continue;
            }
            let closed_reason = state.close_reason_chain(&victim);
            state.dispose_recursively(&victim, &closed_reason);
            self.inner.send(Event::dispose(&victim, Some("gc")).into());
        }
    }

    // -- dispatch -----------------------------------------------------------

    /// Route one incoming command: validate, invoke, respond. Every outcome
    /// produces exactly one response on the outgoing channel; nothing here
    /// tears down the connection.
    pub async fn dispatch(&self, command: Command) {
        let Command {
            id,
            guid,
            method,
            params,
            metadata,
        } = command;

        // Everything up to the handler invocation happens in one lock scope:
        // lookup, validation, flag resolution, and in-flight registration.
        // Nothing awaits while the lock is held, so the returned future
        // stays `Send` and can be spawned.
        let (abort_tx, mut abort_rx) = oneshot::channel();
        let closed_slot: Arc<OnceLock<Option<String>>> = Arc::new(OnceLock::new());
        let routed = {
            let mut state = self.inner.lock();
            let Some(node) = state.nodes.get(&guid) else {
                drop(state);
                // Expected benign race: the target was disposed moments
                // before this message arrived.
                debug!(%guid, %method, "command for disposed target");
                self.inner
                    .send(Response::error(id, SerializedError::target_closed(None)).into());
                return;
            };
            let kind = node.kind.clone();
            let object = node.object.clone();

            let validated = (|| -> Result<(Value, WireMetadata), DispatchError> {
                let validator =
                    self.inner
                        .validators
                        .find_validator(&kind, &method, Direction::Params)?;
                let ctx = WireContext {
                    state: &state,
                    binary: self.inner.binary_mode(),
                };
                let valid_params = validator.validate(&params, "", &ctx)?;
                let wire_metadata = validate_metadata(&metadata)?;
                if !object.method_names().contains(&method.as_str()) {
                    return Err(DispatchError::UnsupportedMethod {
                        kind: kind.clone(),
                        method: method.clone(),
                    });
                }
                Ok((valid_params, wire_metadata))
            })();
            let (valid_params, mut wire_metadata) = match validated {
                Ok(validated) => validated,
                Err(err) => {
                    drop(state);
                    self.inner.send(Response::error(id, err.serialize()).into());
                    return;
                }
            };

            let flags = self
                .inner
                .method_flags
                .get(&format!("{kind}.{method}"))
                .copied()
                .unwrap_or_default();
            if flags.internal {
                wire_metadata.internal = true;
            }
            let mut call_metadata =
                CallMetadata::new(id, &wire_metadata, guid.clone(), &kind, &method, params);
            call_metadata.potentially_closes_scope = flags.potentially_closes_scope;

            // Wait operations bypass ordinary dispatch; their hook runs
            // once the lock is released.
            if let Some(info) = WaitInfo::from_params(&valid_params) {
                Routed::Wait(Self::apply_wait_phase(&mut state, info, call_metadata))
            } else {
                // Register the in-flight operation before releasing the
                // lock so a racing disposal can abort (or mark) it.
                if let Some(node) = state.nodes.get_mut(&guid) {
                    node.active_ops.push(ActiveOp {
                        call_id: id,
                        tolerant: flags.potentially_closes_scope,
                        abort: abort_tx,
                        closed: closed_slot.clone(),
                    });
                }
                Routed::Call {
                    object,
                    kind,
                    valid_params,
                    call_metadata,
                    flags,
                }
            }
        };
        let (object, kind, valid_params, mut call_metadata, flags) = match routed {
            Routed::Wait(hook) => {
                self.run_wait_hook(hook).await;
                self.inner.send(Response::ack(id).into());
                return;
            }
            Routed::Call {
                object,
                kind,
                valid_params,
                call_metadata,
                flags,
            } => (object, kind, valid_params, call_metadata, flags),
        };

        self.inner.instrumentation.on_before_call(&call_metadata).await;

        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let outcome = if closed_slot.get().is_some() {
            // Disposed while the before-call hook ran.
            Err(DispatchError::TargetClosed {
                reason: closed_slot.get().cloned().flatten(),
            })
        } else {
            let ctx = CallContext {
                handle: NodeHandle {
                    inner: self.downgrade(),
                    guid: guid.clone(),
                },
                metadata: call_metadata.clone(),
                log: log.clone(),
                instrumentation: self.inner.instrumentation.clone(),
            };
            let call = object.handle_call(&method, valid_params, ctx);
            if flags.potentially_closes_scope {
                // Tolerant of the closing race: never aborted, the real
                // outcome is returned even if the scope went away mid-call.
                call.await
            } else {
                tokio::select! {
                    biased;
                    result = call => result,
                    aborted = &mut abort_rx => {
                        Err(aborted.unwrap_or_else(|_| DispatchError::target_closed()))
                    }
                }
            }
        };

        // Deregister the in-flight operation; the node may already be gone.
        {
            let mut state = self.inner.lock();
            if let Some(node) = state.nodes.get_mut(&guid) {
                node.active_ops.retain(|op| op.call_id != id);
            }
        }

        let outcome = match outcome {
            Ok(result) => self.validate_result(&kind, &method, result),
            Err(err) => Err(err),
        };
        let outcome = outcome.map_err(|err| self.rewrite_closed_error(err, &guid, &closed_slot));

        call_metadata.end_time = monotonic_time_ms();
        call_metadata.log = log.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let response = match outcome {
            Ok(result) => Response::result(id, result),
            Err(err) => {
                let serialized = err.serialize();
                call_metadata.error = Some(serialized.clone());
                let mut response = Response::error(id, serialized);
                response.log = Some(compress_call_log(&call_metadata.log));
                response
            }
        };
        self.inner.instrumentation.on_after_call(&call_metadata).await;
        self.inner.send(response.into());
    }

    fn validate_result(
        &self,
        kind: &str,
        method: &str,
        result: Value,
    ) -> Result<Value, DispatchError> {
        let validator = self
            .inner
            .validators
            .find_validator(kind, method, Direction::Result)?;
        let state = self.inner.lock();
        let ctx = WireContext {
            state: &state,
            binary: self.inner.binary_mode(),
        };
        validator.validate(&result, "", &ctx)
    }

    /// Substitute the most specific human-readable close reason into a
    /// target-closed error: the live ancestor chain first, then the reason
    /// captured when disposal raced this call.
    fn rewrite_closed_error(
        &self,
        err: DispatchError,
        guid: &Guid,
        closed_slot: &OnceLock<Option<String>>,
    ) -> DispatchError {
        match &err {
            DispatchError::TargetClosed { reason: None } => {
                let reason = self
                    .inner
                    .lock()
                    .close_reason_chain(guid)
                    .or_else(|| closed_slot.get().cloned().flatten());
                match reason {
                    Some(reason) => DispatchError::TargetClosed {
                        reason: Some(reason),
                    },
                    None => err,
                }
            }
            _ => err,
        }
    }

    // -- wait operations ----------------------------------------------------

    /// Mutate the wait-operation map under the lock and describe which
    /// instrumentation hook to fire once the lock is released.
    fn apply_wait_phase(
        state: &mut MutexGuard<'_, State>,
        info: WaitInfo,
        metadata: CallMetadata,
    ) -> WaitHook {
        match info.phase {
            WaitPhase::Before => {
                let snapshot = state.wait_operations.begin(&info.wait_id, metadata);
                WaitHook::Before(snapshot)
            }
            WaitPhase::Log => {
                let message = info.message.unwrap_or_default();
                match state.wait_operations.log(&info.wait_id, &message) {
                    Some(snapshot) => WaitHook::Log(snapshot, message),
                    None => {
                        // Caller bug: a phase message for an operation that
                        // was never opened (or already closed). Degrade to a
                        // no-op rather than take down the connection.
                        tracing::error!(
                            wait_id = %info.wait_id,
                            "log phase for unknown wait operation"
                        );
                        WaitHook::None
                    }
                }
            }
            WaitPhase::After => match state
                .wait_operations
                .finish(&info.wait_id, info.error.as_deref())
            {
                Some(closed) => WaitHook::After(closed),
                None => {
                    tracing::error!(
                        wait_id = %info.wait_id,
                        "after phase for unknown wait operation"
                    );
                    WaitHook::None
                }
            },
        }
    }

    async fn run_wait_hook(&self, hook: WaitHook) {
        match hook {
            WaitHook::Before(metadata) => {
                self.inner.instrumentation.on_before_call(&metadata).await;
            }
            WaitHook::Log(metadata, message) => {
                self.inner.instrumentation.on_call_log(&metadata, &message);
            }
            WaitHook::After(metadata) => {
                self.inner.instrumentation.on_after_call(&metadata).await;
            }
            WaitHook::None => {}
        }
    }

    // -- introspection ------------------------------------------------------

    /// Whether a node with this guid is live.
    pub fn is_registered(&self, guid: &Guid) -> bool {
        self.inner.lock().nodes.contains_key(guid)
    }

    /// Guids of every live node. Debug surface, used by tests.
    pub fn live_guids(&self) -> Vec<Guid> {
        self.inner.lock().nodes.keys().cloned().collect()
    }

    /// Guids in one GC bucket, oldest first. Debug surface, used by tests.
    pub fn bucket_guids(&self, bucket: &str) -> Vec<Guid> {
        self.inner
            .lock()
            .by_bucket
            .get(bucket)
            .cloned()
            .unwrap_or_default()
    }

    /// Every bucket's contents, for consistency checks.
    pub fn bucket_index(&self) -> HashMap<String, Vec<Guid>> {
        self.inner.lock().by_bucket.clone()
    }

    /// Current parent of a node, if the node is live.
    pub fn parent_of(&self, guid: &Guid) -> Option<Option<Guid>> {
        let state = self.inner.lock();
        state.nodes.get(guid).map(|node| node.parent.clone())
    }

    /// Children of a node in insertion order, if the node is live.
    pub fn children_of(&self, guid: &Guid) -> Option<Vec<Guid>> {
        let state = self.inner.lock();
        state.nodes.get(guid).map(|node| node.children.clone())
    }

    /// Number of open wait operations.
    pub fn open_wait_operations(&self) -> usize {
        self.inner.lock().wait_operations.len()
    }
}

enum WaitHook {
    Before(CallMetadata),
    Log(CallMetadata, String),
    After(CallMetadata),
    None,
}

/// Outcome of the locked routing phase of a dispatch.
enum Routed {
    Call {
        object: Arc<dyn RemoteObject>,
        kind: String,
        valid_params: Value,
        call_metadata: CallMetadata,
        flags: MethodFlags,
    },
    Wait(WaitHook),
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Dummy {
        guid: String,
        kind: String,
    }

    #[async_trait]
    impl RemoteObject for Dummy {
        fn guid(&self) -> &str {
            &self.guid
        }
        fn kind(&self) -> &str {
            &self.kind
        }
        fn method_names(&self) -> &[&str] {
            &[]
        }
        async fn handle_call(
            &self,
            _method: &str,
            _params: Value,
            _ctx: CallContext,
        ) -> Result<Value, DispatchError> {
            Ok(Value::Null)
        }
    }

    fn state_with(nodes: &[(&str, &str, Option<&str>)]) -> State {
        let mut state = State::default();
        for (guid, kind, parent) in nodes {
            state.nodes.insert(
                Guid::new(*guid),
                Node {
                    kind: kind.to_string(),
                    gc_bucket: kind.to_string(),
                    parent: parent.map(Guid::new),
                    children: Vec::new(),
                    object: Arc::new(Dummy {
                        guid: guid.to_string(),
                        kind: kind.to_string(),
                    }),
                    close_reason: None,
                    active_ops: Vec::new(),
                },
            );
        }
        state
    }

    #[test]
    fn guid_to_node_resolves_live_nodes() {
        let state = state_with(&[("page@1", "Page", None)]);
        let ctx = WireContext {
            state: &state,
            binary: BinaryMode::Raw,
        };
        let value = serde_json::json!({ "guid": "page@1" });
        assert!(ctx.guid_to_node(&["Page"], &value, "params.page").is_ok());
        assert!(ctx.guid_to_node(&[], &value, "params.page").is_ok());
    }

    #[test]
    fn guid_to_node_rejects_unknown_and_mismatched() {
        let state = state_with(&[("page@1", "Page", None)]);
        let ctx = WireContext {
            state: &state,
            binary: BinaryMode::Raw,
        };
        let err = ctx
            .guid_to_node(&[], &serde_json::json!({ "guid": "frame@9" }), "params.frame")
            .unwrap_err();
        assert_eq!(err.to_string(), "params.frame: no object with guid frame@9");

        let err = ctx
            .guid_to_node(
                &["Frame", "Worker"],
                &serde_json::json!({ "guid": "page@1" }),
                "params.target",
            )
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "params.target: object with guid page@1 has type Page, expected Frame, Worker"
        );
    }

    #[test]
    fn node_to_wire_produces_guid_reference() {
        let state = state_with(&[("page@1", "Page", None)]);
        let ctx = WireContext {
            state: &state,
            binary: BinaryMode::Base64,
        };
        let wire = ctx.node_to_wire(&["Page"], "page@1", "result.page").unwrap();
        assert_eq!(wire, serde_json::json!({ "guid": "page@1" }));
        assert_eq!(ctx.binary_mode(), BinaryMode::Base64);
    }

    #[test]
    fn close_reason_prefers_nearest_ancestor() {
        let mut state = state_with(&[
            ("browser@1", "Browser", None),
            ("ctx@1", "BrowserContext", Some("browser@1")),
            ("page@1", "Page", Some("ctx@1")),
        ]);
        assert!(state.close_reason_chain(&Guid::new("page@1")).is_none());

        if let Some(node) = state.nodes.get_mut("browser@1") {
            node.close_reason = Some("browser closed".to_string());
        }
        assert_eq!(
            state.close_reason_chain(&Guid::new("page@1")).as_deref(),
            Some("browser closed")
        );

        if let Some(node) = state.nodes.get_mut("ctx@1") {
            node.close_reason = Some("context closed".to_string());
        }
        assert_eq!(
            state.close_reason_chain(&Guid::new("page@1")).as_deref(),
            Some("context closed")
        );
    }
}
