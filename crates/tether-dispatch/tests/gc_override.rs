//! The process-wide bucket-size override.
//!
//! The override is a process-global, so it lives in its own test binary; the
//! regular GC tests configure per-bucket policy instead and must not see it.

use std::sync::Arc;

use serde_json::json;

use tether_dispatch::{
    set_max_nodes_per_bucket_for_test, ConnectionOptions, DispatcherConnection, GcPolicy,
};
use tether_harness::ScriptedObject;

#[test]
fn override_shrinks_every_bucket() {
    tether_harness::init_tracing();
    set_max_nodes_per_bucket_for_test(Some(10));

    let (connection, _rx) = DispatcherConnection::new(ConnectionOptions::default());
    let root = connection.register_root(None).unwrap();
    let mut handles = Vec::new();
    for _ in 0..11 {
        handles.push(
            root.create_child(Arc::new(ScriptedObject::new("JSHandle")), json!({}), None)
                .unwrap(),
        );
    }

    // JSHandle would normally allow 100k live nodes; the override caps it at
    // ten and the overflow evicted the oldest one.
    assert!(handles[0].is_disposed());
    assert!(handles[1..].iter().all(|h| !h.is_disposed()));
    assert_eq!(connection.bucket_guids("JSHandle").len(), 10);

    set_max_nodes_per_bucket_for_test(None);
    assert_eq!(GcPolicy::default().max_for("JSHandle"), 100_000);
}
