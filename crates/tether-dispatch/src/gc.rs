//! GC-bucket eviction policy.
//!
//! Every node counts against one bucket (its kind, unless overridden). When
//! a bucket's live count exceeds its maximum, the oldest tenth of the bucket
//! is disposed with reason `"gc"`. This is a safety valve against controllers
//! that leak handles, never a correctness mechanism.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Default maximum live nodes per bucket.
pub const DEFAULT_MAX_NODES_PER_BUCKET: usize = 10_000;

/// Maximum for the high-churn handle buckets, which a busy controller can
/// legitimately fill much faster than anything else.
pub const HIGH_CHURN_MAX_NODES_PER_BUCKET: usize = 100_000;

// Process-wide test override; 0 means unset.
static TEST_MAX_OVERRIDE: AtomicUsize = AtomicUsize::new(0);

/// Override every bucket maximum process-wide, so tests can trigger eviction
/// without creating tens of thousands of nodes. Pass `None` to restore the
/// configured policy.
pub fn set_max_nodes_per_bucket_for_test(max: Option<usize>) {
    TEST_MAX_OVERRIDE.store(max.unwrap_or(0), Ordering::SeqCst);
}

/// Per-bucket live-node bounds.
///
/// The eviction fraction (one tenth) and the default maxima are empirical
/// tuning constants; adjust them through this policy rather than in code.
#[derive(Debug, Clone)]
pub struct GcPolicy {
    /// Maximum for buckets with no specific entry.
    pub default_max: usize,
    /// Per-bucket maxima.
    pub per_bucket: HashMap<String, usize>,
}

impl Default for GcPolicy {
    fn default() -> Self {
        let mut per_bucket = HashMap::new();
        per_bucket.insert("JSHandle".to_string(), HIGH_CHURN_MAX_NODES_PER_BUCKET);
        per_bucket.insert("ElementHandle".to_string(), HIGH_CHURN_MAX_NODES_PER_BUCKET);
        Self {
            default_max: DEFAULT_MAX_NODES_PER_BUCKET,
            per_bucket,
        }
    }
}

impl GcPolicy {
    /// The effective maximum for a bucket, honoring the test override.
    pub fn max_for(&self, bucket: &str) -> usize {
        let test_override = TEST_MAX_OVERRIDE.load(Ordering::SeqCst);
        if test_override != 0 {
            return test_override;
        }
        self.per_bucket
            .get(bucket)
            .copied()
            .unwrap_or(self.default_max)
    }

    /// How many nodes to evict once a bucket exceeds its maximum.
    pub fn evict_count(&self, bucket: &str) -> usize {
        self.max_for(bucket) / 10
    }
}
