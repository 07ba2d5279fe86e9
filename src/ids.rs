use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a short prefixed identifier such as `ep_3fa92c01`.
///
/// Uniqueness comes from hashing the current timestamp together with a
/// process-local counter, so two ids minted in the same nanosecond still
/// differ.
pub fn short_id(prefix: &str) -> String {
    let mut hasher = DefaultHasher::new();
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default()
        .hash(&mut hasher);
    ID_COUNTER.fetch_add(1, Ordering::Relaxed).hash(&mut hasher);
    let hash = hasher.finish() as u32;
    format!("{}{:08x}", prefix, hash)
}
