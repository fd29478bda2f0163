//! Test harness for the tether dispatcher.
//!
//! Provides an in-memory [`RecordingTransport`] that captures the outgoing
//! message stream, a scriptable [`ScriptedObject`] domain object, and a
//! tracing bootstrap for tests.
//!
//! ```no_run
//! use tether_dispatch::{ConnectionOptions, DispatcherConnection};
//! use tether_harness::{RecordingTransport, ScriptedObject};
//! use std::sync::Arc;
//!
//! let (connection, rx) = DispatcherConnection::new(ConnectionOptions::default());
//! let mut transport = RecordingTransport::new(rx);
//! let root = connection.register_root(None).unwrap();
//! let page = root
//!     .create_child(
//!         Arc::new(ScriptedObject::new("Page").with_methods(&["reload"])),
//!         serde_json::json!({}),
//!         None,
//!     )
//!     .unwrap();
//! transport.expect_event("__create__");
//! page.dispose(None);
//! transport.expect_event("__dispose__");
//! ```

mod objects;
mod transport;

pub use objects::{test_guid, ScriptedObject};
pub use transport::RecordingTransport;

/// Install a test tracing subscriber honoring `RUST_LOG`. Safe to call from
/// every test; only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}
