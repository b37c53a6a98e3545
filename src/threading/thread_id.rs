//! Thread identity.
//!
//! The lock-debugging layer needs to know which thread holds a lock. The
//! runtime asks a registered [`ThreadIdFn`]; the platform provider supplies
//! [`current_thread_id`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Returns a stable, process-unique identifier for the calling thread.
pub type ThreadIdFn = Arc<dyn Fn() -> u64 + Send + Sync>;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

/// Identifier of the calling thread. Never zero, never reused.
#[must_use]
pub fn current_thread_id() -> u64 {
    THREAD_ID.with(|id| *id)
}
