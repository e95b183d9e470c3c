//! Idle-tail reclamation
//!
//! Freeing megabytes of decoded audio can stall an allocator, so the
//! actual drop happens on a dedicated thread, away from the audio-adjacent
//! locks. The trigger itself only moves buffers between lists.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;

use wp_core::swap_and_pop_all;

use crate::entry::Status;
use crate::pool::PoolInner;
use crate::queue::GarbageMessage;

/// Garbage thread body: drop collected buffers on demand.
pub(crate) fn garbage_loop(inner: Arc<PoolInner>, messages: Receiver<GarbageMessage>) {
    while let Ok(message) = messages.recv() {
        match message {
            GarbageMessage::Collect => {
                inner.garbage.lock().clear();
            }
            GarbageMessage::Shutdown => break,
        }
    }
}

/// Scan the last-used list and move reclaimable tails onto the collect
/// list. Bails immediately when either bookkeeping lock is contended; the
/// next trigger retries.
pub(crate) fn collect(inner: &PoolInner) {
    let Some(mut last_used) = inner.last_used.try_lock() else {
        return;
    };
    let Some(mut garbage) = inner.garbage.try_lock() else {
        return;
    };

    let now_us = inner.epoch.elapsed().as_micros() as u64;
    let files = inner.files.read();

    swap_and_pop_all(&mut last_used, |id| {
        if garbage.len() >= inner.max_voices {
            // Collect list is full; defer the rest of the sweep.
            return false;
        }
        let Some(data) = files.get(id) else {
            // Entry was cleared; drop the stale bookkeeping.
            return true;
        };
        match data.status() {
            Status::Preloaded => return true,
            Status::Done => {}
            _ => return false,
        }
        if data.reader_count() != 0 {
            return false;
        }
        let idle = Duration::from_micros(now_us.saturating_sub(data.last_reader_left_us()));
        if idle < inner.file_clearing_period {
            return false;
        }

        data.set_available_frames(0);
        // SAFETY: Done with no readers was observed under the bookkeeping
        // locks, and a loader can only reattach after the Preloaded store
        // below, so nothing else aliases the tail here.
        let tail = std::mem::take(unsafe { data.tail_mut() });
        data.set_status(Status::Preloaded);
        garbage.push(tail);
        true
    });

    drop(files);
    drop(last_used);
    drop(garbage);

    // Wake the drop thread; a full channel means it is already backed up
    // and will get to the list anyway.
    let _ = inner.garbage_tx.try_send(GarbageMessage::Collect);
}
