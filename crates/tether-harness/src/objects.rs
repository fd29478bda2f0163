//! Scriptable domain objects for exercising the dispatcher.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use tether_dispatch::{CallContext, DispatchError, RemoteObject};

/// A fresh guid in the `kind@uuid` shape real servers use.
pub fn test_guid(kind: &str) -> String {
    format!("{}@{}", kind.to_lowercase(), Uuid::new_v4())
}

type Handler = Box<
    dyn Fn(String, Value, CallContext) -> Pin<Box<dyn Future<Output = Result<Value, DispatchError>> + Send>>
        + Send
        + Sync,
>;

/// A [`RemoteObject`] whose behavior is scripted by the test: configurable
/// kind, bucket, and method table, with an optional closure standing in for
/// the method implementations.
///
/// The default handler answers every declared method with `{}`. Disposal is
/// observable through [`dispose_flag`](ScriptedObject::dispose_flag).
pub struct ScriptedObject {
    guid: String,
    kind: String,
    bucket: String,
    methods: Vec<&'static str>,
    handler: Option<Handler>,
    disposed: Arc<AtomicBool>,
    dispose_count: Arc<AtomicUsize>,
}

impl ScriptedObject {
    /// An object of this kind with a fresh guid and an empty method table.
    pub fn new(kind: &str) -> Self {
        Self {
            guid: test_guid(kind),
            kind: kind.to_string(),
            bucket: kind.to_string(),
            methods: Vec::new(),
            handler: None,
            disposed: Arc::new(AtomicBool::new(false)),
            dispose_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Use a specific guid instead of a generated one.
    pub fn with_guid(mut self, guid: &str) -> Self {
        self.guid = guid.to_string();
        self
    }

    /// Count against this GC bucket instead of the kind.
    pub fn with_bucket(mut self, bucket: &str) -> Self {
        self.bucket = bucket.to_string();
        self
    }

    /// Declare the methods this object handles.
    pub fn with_methods(mut self, methods: &[&'static str]) -> Self {
        self.methods = methods.to_vec();
        self
    }

    /// Script the method implementations. The closure receives the method
    /// name, validated params, and the call context.
    pub fn on_call<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String, Value, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, DispatchError>> + Send + 'static,
    {
        self.handler = Some(Box::new(move |method, params, ctx| {
            Box::pin(f(method, params, ctx))
        }));
        self
    }

    /// Flag flipped when the dispatcher disposes this object's node.
    pub fn dispose_flag(&self) -> Arc<AtomicBool> {
        self.disposed.clone()
    }

    /// Counter of how many times disposal ran. Anything above one is a bug.
    pub fn dispose_counter(&self) -> Arc<AtomicUsize> {
        self.dispose_count.clone()
    }
}

#[async_trait]
impl RemoteObject for ScriptedObject {
    fn guid(&self) -> &str {
        &self.guid
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    fn gc_bucket(&self) -> &str {
        &self.bucket
    }

    fn method_names(&self) -> &[&str] {
        &self.methods
    }

    async fn handle_call(
        &self,
        method: &str,
        params: Value,
        ctx: CallContext,
    ) -> Result<Value, DispatchError> {
        match &self.handler {
            Some(handler) => handler(method.to_string(), params, ctx).await,
            None => Ok(json!({})),
        }
    }

    fn on_dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.dispose_count.fetch_add(1, Ordering::SeqCst);
    }
}
