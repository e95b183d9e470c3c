//! Per-sample cache entries
//!
//! A `CachedFile` carries the resident preload head, the streamed tail and
//! the atomics that let loaders, voices and the garbage collector
//! coordinate without the audio thread ever blocking.

use std::cell::UnsafeCell;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;

use wp_core::{FileAudioBuffer, FileMetadata};

/// Lifecycle of a cached sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    /// Reserved slot, not yet populated. Entries are registered directly
    /// in `Preloaded`, so this state is never observable from outside.
    Invalid = 0,
    /// Head resident, no tail.
    Preloaded = 1,
    /// A loader is filling the tail; `available_frames` rises monotonically.
    Streaming = 2,
    /// Tail complete; eligible for reclamation once idle.
    Done = 3,
}

impl From<u8> for Status {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Preloaded,
            2 => Self::Streaming,
            3 => Self::Done,
            _ => Self::Invalid,
        }
    }
}

/// One registered sample: metadata, resident head, streamed tail, and the
/// coordination state between loaders, voices and the collector.
pub struct CachedFile {
    metadata: RwLock<FileMetadata>,
    preloaded: UnsafeCell<FileAudioBuffer>,
    tail: UnsafeCell<FileAudioBuffer>,
    available_frames: AtomicU32,
    status: AtomicU8,
    reader_count: AtomicU32,
    /// Microseconds since `epoch` at which the last reader left.
    last_reader_left_us: AtomicU64,
    epoch: Instant,
}

// SAFETY: the unsafe-cell buffers follow a single-writer protocol. The
// tail is written only by the loader that won the Preloaded → Streaming
// exchange, or by the collector after observing Done with no readers and
// before it republishes Preloaded; consumers read only frames below
// `available_frames`, which is stored with release ordering after the
// corresponding tail writes. The head is rewritten only by the control
// thread while no voice holds a handle.
unsafe impl Send for CachedFile {}
unsafe impl Sync for CachedFile {}

impl CachedFile {
    /// New entry, born in the `Preloaded` state with its head resident.
    pub(crate) fn new(metadata: FileMetadata, preloaded: FileAudioBuffer, epoch: Instant) -> Self {
        Self {
            metadata: RwLock::new(metadata),
            preloaded: UnsafeCell::new(preloaded),
            tail: UnsafeCell::new(FileAudioBuffer::new()),
            available_frames: AtomicU32::new(0),
            status: AtomicU8::new(Status::Preloaded as u8),
            reader_count: AtomicU32::new(0),
            last_reader_left_us: AtomicU64::new(0),
            epoch,
        }
    }

    /// Snapshot of the entry's metadata.
    #[inline]
    pub fn metadata(&self) -> FileMetadata {
        *self.metadata.read()
    }

    pub(crate) fn update_metadata(&self, update: impl FnOnce(&mut FileMetadata)) {
        update(&mut self.metadata.write());
    }

    #[inline]
    pub fn status(&self) -> Status {
        self.status.load(Ordering::Acquire).into()
    }

    /// Claim the streaming token. Exactly one claimant per Preloaded cycle
    /// succeeds; everyone else backs off.
    pub(crate) fn try_begin_streaming(&self) -> bool {
        self.status
            .compare_exchange(
                Status::Preloaded as u8,
                Status::Streaming as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(crate) fn set_status(&self, status: Status) {
        self.status.store(status as u8, Ordering::Release);
    }

    /// Frames of the tail currently safe to read.
    #[inline]
    pub fn available_frames(&self) -> u32 {
        self.available_frames.load(Ordering::Acquire)
    }

    pub(crate) fn available_frames_cell(&self) -> &AtomicU32 {
        &self.available_frames
    }

    pub(crate) fn set_available_frames(&self, frames: u32) {
        self.available_frames.store(frames, Ordering::Release);
    }

    /// The resident head.
    #[inline]
    pub fn preloaded(&self) -> &FileAudioBuffer {
        // SAFETY: rewritten only by the control thread during quiescence
        // (see the Sync rationale above).
        unsafe { &*self.preloaded.get() }
    }

    /// View of the streamed tail, clamped to the published frame count.
    #[inline]
    pub fn streamed(&self) -> TailView<'_> {
        let frames = self.available_frames();
        // SAFETY: every sample below `frames` was written before the
        // release store that made `frames` visible.
        let buffer = unsafe { &*self.tail.get() };
        TailView { buffer, frames }
    }

    /// Exclusive tail access for the streaming-token holder.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn tail_mut(&self) -> &mut FileAudioBuffer {
        unsafe { &mut *self.tail.get() }
    }

    /// Exclusive head access for the control thread.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn preloaded_mut(&self) -> &mut FileAudioBuffer {
        unsafe { &mut *self.preloaded.get() }
    }

    /// Number of voices currently reading from this entry.
    #[inline]
    pub fn reader_count(&self) -> u32 {
        self.reader_count.load(Ordering::Acquire)
    }

    pub(crate) fn acquire_reader(&self) {
        self.reader_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn release_reader(&self) {
        if self.reader_count.fetch_sub(1, Ordering::AcqRel) == 1 {
            let now_us = self.epoch.elapsed().as_micros() as u64;
            self.last_reader_left_us.store(now_us, Ordering::Release);
        }
    }

    pub(crate) fn last_reader_left_us(&self) -> u64 {
        self.last_reader_left_us.load(Ordering::Acquire)
    }
}

/// Read access to the streamed tail, bounded by the frames published when
/// the view was taken.
pub struct TailView<'a> {
    buffer: &'a FileAudioBuffer,
    frames: u32,
}

impl TailView<'_> {
    /// Frames readable through this view.
    #[inline]
    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// Total frames the tail buffer can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.num_frames()
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.buffer.num_channels()
    }

    /// Readable prefix of one channel. Only meaningful when `frames() > 0`.
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.buffer.channel(index)[..self.frames as usize]
    }
}

/// Borrow token granting read access to a cache entry.
///
/// Holding a handle keeps the streamed tail from being reclaimed; dropping
/// the last handle stamps the idle timestamp the collector compares
/// against. Acquisition and release are wait-free atomics.
pub struct FileHandle {
    data: Arc<CachedFile>,
}

impl FileHandle {
    pub(crate) fn new(data: Arc<CachedFile>) -> Self {
        data.acquire_reader();
        Self { data }
    }
}

impl Deref for FileHandle {
    type Target = CachedFile;

    #[inline]
    fn deref(&self) -> &CachedFile {
        &self.data
    }
}

impl Clone for FileHandle {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.data))
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        self.data.release_reader();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn test_entry() -> CachedFile {
        CachedFile::new(
            FileMetadata::default(),
            FileAudioBuffer::with_frames(1, 16),
            Instant::now(),
        )
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            Status::Invalid,
            Status::Preloaded,
            Status::Streaming,
            Status::Done,
        ] {
            assert_eq!(Status::from(status as u8), status);
        }
        assert_eq!(Status::from(42), Status::Invalid);
    }

    #[test]
    fn test_new_entries_are_preloaded() {
        let entry = test_entry();
        assert_eq!(entry.status(), Status::Preloaded);
        assert_eq!(entry.available_frames(), 0);
        assert_eq!(entry.preloaded().num_frames(), 16);
    }

    #[test]
    fn test_streaming_token_has_one_winner() {
        let entry = Arc::new(test_entry());

        let winners: usize = (0..8)
            .map(|_| {
                let entry = Arc::clone(&entry);
                thread::spawn(move || entry.try_begin_streaming() as usize)
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .sum();

        assert_eq!(winners, 1);
        assert_eq!(entry.status(), Status::Streaming);
    }

    #[test]
    fn test_handle_tracks_reader_count() {
        let entry = Arc::new(test_entry());
        assert_eq!(entry.reader_count(), 0);

        let first = FileHandle::new(Arc::clone(&entry));
        let second = first.clone();
        assert_eq!(entry.reader_count(), 2);

        drop(first);
        assert_eq!(entry.reader_count(), 1);
        assert_eq!(entry.last_reader_left_us(), 0);

        thread::sleep(std::time::Duration::from_millis(1));
        drop(second);
        assert_eq!(entry.reader_count(), 0);
        // The 1 → 0 transition stamps the idle timestamp.
        assert!(entry.last_reader_left_us() > 0);
    }

    #[test]
    fn test_tail_view_clamps_to_published_frames() {
        let entry = test_entry();
        // SAFETY: no concurrent access in this test.
        unsafe { entry.tail_mut() }.configure(1, 64);
        entry.set_available_frames(10);

        let view = entry.streamed();
        assert_eq!(view.frames(), 10);
        assert_eq!(view.capacity(), 64);
        assert_eq!(view.channel(0).len(), 10);
    }
}
