//! Instrumentation seam: before/after-call notifications for tracing,
//! reporting, and test hooks.
//!
//! Hooks are infallible by signature, so a misbehaving implementation cannot
//! corrupt the call lifecycle. The connection fires `on_after_call` in every
//! outcome, including errors and aborted calls.

use async_trait::async_trait;

use tether_wire::CallMetadata;

/// Receives call lifecycle notifications. All methods default to no-ops.
#[async_trait]
pub trait Instrumentation: Send + Sync {
    /// A call is about to run. For wait operations this fires on the
    /// `before` phase.
    async fn on_before_call(&self, _metadata: &CallMetadata) {}

    /// A call finished (successfully, with an error, or aborted by scope
    /// closure). For wait operations this fires on the `after` phase.
    async fn on_after_call(&self, _metadata: &CallMetadata) {}

    /// A progress log line was appended to an in-flight call.
    fn on_call_log(&self, _metadata: &CallMetadata, _message: &str) {}
}

/// Instrumentation that does nothing.
pub struct NoopInstrumentation;

#[async_trait]
impl Instrumentation for NoopInstrumentation {}
