//! Request plumbing between the audio thread and the background workers

use std::sync::{Arc, Weak};
use std::time::Instant;

use wp_core::SampleIdentity;

use crate::entry::CachedFile;

/// A load request captured on the promise path.
///
/// The identity reference is weak: voices own the strong references, so a
/// request whose originating voice died in the meantime is discarded
/// without ever touching the registry.
pub struct QueuedRequest {
    pub id: Weak<SampleIdentity>,
    pub data: Arc<CachedFile>,
    pub queued_at: Instant,
}

/// Commands consumed by the dispatcher thread.
///
/// Delivered over a bounded channel; the audio thread only ever
/// `try_send`s, the dispatcher's blocking `recv` doubles as its wakeup.
pub enum DispatchMessage {
    /// Schedule a loader job for a queued request.
    Load(QueuedRequest),
    /// Exit the dispatch loop.
    Shutdown,
}

/// Commands consumed by the garbage thread.
pub enum GarbageMessage {
    /// Drop everything currently in the collect list.
    Collect,
    /// Exit the garbage loop.
    Shutdown,
}
