//! The sample file pool
//!
//! Registration and reconfiguration run on the control thread; the audio
//! thread only ever takes promises (a registry read, an atomic handle and
//! a bounded try-push). Streaming decode and tail reclamation happen on
//! background threads that the pool owns.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::{Mutex, RwLock};

use wp_core::{
    FileAudioBuffer, FileMetadata, Oversampling, PoolConfig, SampleIdentity, swap_and_pop_all,
};
use wp_file::{AudioReader, MetadataReader, create_audio_reader, resolve_sample_path};

use crate::entry::{CachedFile, FileHandle, Status};
use crate::garbage;
use crate::loader::{self, read_from_file};
use crate::metrics::{DebugLoadLog, LoadTimeLog};
use crate::queue::{DispatchMessage, GarbageMessage, QueuedRequest};
use crate::thread_pool::{Task, ThreadPool};

/// State shared between the pool facade, the dispatcher, the loader jobs
/// and the garbage thread.
pub(crate) struct PoolInner {
    pub(crate) root_directory: RwLock<PathBuf>,
    pub(crate) preload_size: AtomicU32,
    pub(crate) load_in_ram: AtomicBool,
    pub(crate) oversampling: AtomicU8,
    pub(crate) loader_priority: u8,
    pub(crate) file_clearing_period: Duration,
    pub(crate) max_voices: usize,
    pub(crate) epoch: Instant,

    /// The registry. Mutated only by the control thread; the promise path
    /// takes an uncontended read.
    pub(crate) files: RwLock<HashMap<SampleIdentity, Arc<CachedFile>>>,

    pub(crate) to_load_tx: Sender<DispatchMessage>,
    pub(crate) to_load_rx: Receiver<DispatchMessage>,
    pub(crate) queued_requests: AtomicU64,
    pub(crate) handled_requests: AtomicU64,
    pub(crate) loading_jobs: Mutex<Vec<Task>>,

    /// Identities whose tails finished streaming; scanned by the collector.
    pub(crate) last_used: Mutex<Vec<SampleIdentity>>,
    /// Tails waiting for the garbage thread to drop them.
    pub(crate) garbage: Mutex<Vec<FileAudioBuffer>>,
    pub(crate) garbage_tx: Sender<GarbageMessage>,

    pub(crate) logger: Arc<dyn LoadTimeLog>,
}

impl PoolInner {
    pub(crate) fn root_directory(&self) -> PathBuf {
        self.root_directory.read().clone()
    }

    pub(crate) fn oversampling_factor(&self) -> Oversampling {
        Oversampling::from_factor(self.oversampling.load(Ordering::Acquire) as u32)
            .unwrap_or(Oversampling::X1)
    }
}

/// Asynchronous sample file pool.
///
/// See the crate docs for the threading model. Reconfiguration
/// (`set_preload_size`, `set_oversampling_factor`, `set_ram_loading`)
/// requires quiescence: no voice may be reading while buffers are rebuilt.
pub struct FilePool {
    inner: Arc<PoolInner>,
    dispatcher: Option<JoinHandle<()>>,
    garbage_thread: Option<JoinHandle<()>>,
    // Keeps the shared executor alive for the lifetime of this pool.
    _thread_pool: Arc<ThreadPool>,
}

impl FilePool {
    pub fn new(config: PoolConfig) -> Self {
        Self::with_logger(config, Arc::new(DebugLoadLog))
    }

    pub fn with_logger(config: PoolConfig, logger: Arc<dyn LoadTimeLog>) -> Self {
        let max_voices = config.max_voices.max(1);
        let (to_load_tx, to_load_rx) = bounded(max_voices);
        let (garbage_tx, garbage_rx) = bounded(4);

        let inner = Arc::new(PoolInner {
            root_directory: RwLock::new(config.root_directory),
            preload_size: AtomicU32::new(config.preload_size),
            load_in_ram: AtomicBool::new(config.load_in_ram),
            oversampling: AtomicU8::new(config.oversampling_factor.as_u32() as u8),
            loader_priority: config.background_loader_priority.min(100),
            file_clearing_period: Duration::from_secs(config.file_clearing_period_secs),
            max_voices,
            epoch: Instant::now(),
            files: RwLock::new(HashMap::new()),
            to_load_tx,
            to_load_rx: to_load_rx.clone(),
            queued_requests: AtomicU64::new(0),
            handled_requests: AtomicU64::new(0),
            loading_jobs: Mutex::new(Vec::with_capacity(max_voices)),
            last_used: Mutex::new(Vec::with_capacity(max_voices)),
            garbage: Mutex::new(Vec::with_capacity(max_voices)),
            garbage_tx,
            logger,
        });

        let thread_pool = ThreadPool::global();

        let dispatcher = {
            let inner = Arc::clone(&inner);
            let workers = Arc::clone(&thread_pool);
            thread::Builder::new()
                .name("wavepool-dispatch".to_string())
                .spawn(move || dispatch_loop(&inner, &workers, &to_load_rx))
                .map_err(|err| log::error!("failed to spawn dispatcher: {err}"))
                .ok()
        };

        let garbage_thread = {
            let inner = Arc::clone(&inner);
            thread::Builder::new()
                .name("wavepool-garbage".to_string())
                .spawn(move || garbage::garbage_loop(inner, garbage_rx))
                .map_err(|err| log::error!("failed to spawn garbage thread: {err}"))
                .ok()
        };

        Self {
            inner,
            dispatcher,
            garbage_thread,
            _thread_pool: thread_pool,
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Identity resolution and metadata
    // ═══════════════════════════════════════════════════════════════════

    /// Check that a sample exists under the root directory, rewriting
    /// `filename` to the on-disk spelling on case-sensitive filesystems.
    pub fn check_sample(&self, filename: &mut String) -> bool {
        resolve_sample_path(&self.inner.root_directory(), filename)
    }

    /// `check_sample` over a full identity.
    pub fn check_sample_id(&self, id: &mut SampleIdentity) -> bool {
        let mut filename = id.filename().to_string();
        let found = self.check_sample(&mut filename);
        if found {
            *id = SampleIdentity::with_orientation(filename, id.is_reversed());
        }
        found
    }

    /// Probe a sample's metadata without registering it.
    ///
    /// `None` when the path does not exist or the channel layout is
    /// unsupported; missing instrument metadata is not an error.
    pub fn get_file_information(&self, id: &SampleIdentity) -> Option<FileMetadata> {
        let path = self.inner.root_directory().join(id.filename());
        if !path.exists() {
            return None;
        }
        let mut reader = match create_audio_reader(&path, id.is_reversed()) {
            Ok(reader) => reader,
            Err(err) => {
                log::debug!("cannot open {id}: {err}");
                return None;
            }
        };
        file_information_from(&path, reader.as_mut(), id.is_reversed())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Registration
    // ═══════════════════════════════════════════════════════════════════

    /// Register `id` and make sure its resident head covers `max_offset`
    /// plus the preload size (the whole file in RAM mode).
    ///
    /// Re-registering with a larger offset grows the head; it never
    /// shrinks, and `max_offset` is never lowered. Returns false when the
    /// sample cannot be resolved or decoded.
    pub fn preload_file(&self, id: &SampleIdentity, max_offset: u32) -> bool {
        let mut id = id.clone();
        if !self.check_sample_id(&mut id) {
            return false;
        }

        let Some(mut info) = self.get_file_information(&id) else {
            return false;
        };
        info.max_offset = max_offset;

        let path = self.inner.root_directory().join(id.filename());
        let mut reader = match create_audio_reader(&path, id.is_reversed()) {
            Ok(reader) => reader,
            Err(err) => {
                log::warn!("cannot open {id}: {err}");
                return false;
            }
        };

        let factor = self.inner.oversampling_factor();
        let frames = reader.frames() as u32;
        let frames_to_load = if self.inner.load_in_ram.load(Ordering::Acquire) {
            frames
        } else {
            frames.min(max_offset.saturating_add(self.inner.preload_size.load(Ordering::Acquire)))
        };

        let existing = self.inner.files.read().get(&id).cloned();
        match existing {
            Some(data) => {
                let required = frames_to_load as usize * factor.as_u32() as usize;
                if required > data.preloaded().num_frames() {
                    match read_from_file(reader.as_mut(), frames_to_load, factor) {
                        Ok(buffer) => {
                            // SAFETY: head rewrites happen on the control
                            // thread during quiescence.
                            unsafe { *data.preloaded_mut() = buffer };
                            data.update_metadata(|md| md.max_offset = max_offset);
                        }
                        Err(err) => {
                            log::warn!("preload failed for {id}: {err}");
                            return false;
                        }
                    }
                }
                true
            }
            None => {
                info.rescale(factor.as_f64());
                let buffer = match read_from_file(reader.as_mut(), frames_to_load, factor) {
                    Ok(buffer) => buffer,
                    Err(err) => {
                        log::warn!("preload failed for {id}: {err}");
                        return false;
                    }
                };
                let entry = Arc::new(CachedFile::new(info, buffer, self.inner.epoch));
                self.inner.files.write().insert(id, entry);
                true
            }
        }
    }

    /// Read a sample fully into its resident head and hand back a handle.
    ///
    /// The entry behaves as if everything were preloaded; nothing streams
    /// and the garbage collector has nothing to reclaim.
    pub fn load_file(&self, id: &SampleIdentity) -> Option<FileHandle> {
        let mut id = id.clone();
        if !self.check_sample_id(&mut id) {
            return None;
        }
        let Some(mut info) = self.get_file_information(&id) else {
            return None;
        };

        let path = self.inner.root_directory().join(id.filename());
        let mut reader = match create_audio_reader(&path, id.is_reversed()) {
            Ok(reader) => reader,
            Err(err) => {
                log::warn!("cannot open {id}: {err}");
                return None;
            }
        };
        let factor = self.inner.oversampling_factor();
        let frames = reader.frames() as u32;

        if let Some(existing) = self.inner.files.read().get(&id).cloned() {
            let full = frames as usize * factor.as_u32() as usize;
            if existing.preloaded().num_frames() < full {
                match read_from_file(reader.as_mut(), frames, factor) {
                    // SAFETY: control thread, quiescent.
                    Ok(buffer) => unsafe { *existing.preloaded_mut() = buffer },
                    Err(err) => {
                        log::warn!("full load failed for {id}: {err}");
                        return None;
                    }
                }
            }
            return Some(FileHandle::new(existing));
        }

        info.rescale(factor.as_f64());
        let buffer = match read_from_file(reader.as_mut(), frames, factor) {
            Ok(buffer) => buffer,
            Err(err) => {
                log::warn!("full load failed for {id}: {err}");
                return None;
            }
        };
        let entry = Arc::new(CachedFile::new(info, buffer, self.inner.epoch));
        self.inner
            .files
            .write()
            .insert(id, Arc::clone(&entry));
        Some(FileHandle::new(entry))
    }

    // ═══════════════════════════════════════════════════════════════════
    // The promise path (audio-thread entry)
    // ═══════════════════════════════════════════════════════════════════

    /// Hand the audio thread a readable handle and queue the tail stream.
    ///
    /// Returns `None` when the identity was never registered (callers
    /// substitute silence). The handle comes back even when the load queue
    /// is full: the resident head keeps the voice fed, and a later promise
    /// retries the stream. No allocation, no blocking.
    pub fn get_file_promise(&self, id: &Arc<SampleIdentity>) -> Option<FileHandle> {
        let files = self.inner.files.read();
        let Some(data) = files.get(id.as_ref()) else {
            log::debug!("{id} is not registered in the pool");
            return None;
        };
        let data = Arc::clone(data);
        drop(files);

        let request = QueuedRequest {
            id: Arc::downgrade(id),
            data: Arc::clone(&data),
            queued_at: Instant::now(),
        };
        match self.inner.to_load_tx.try_send(DispatchMessage::Load(request)) {
            Ok(()) => {
                self.inner.queued_requests.fetch_add(1, Ordering::Release);
            }
            Err(_) => {
                log::debug!("load queue full, deferring stream for {id}");
            }
        }

        Some(FileHandle::new(data))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Reconfiguration (control thread, quiescent)
    // ═══════════════════════════════════════════════════════════════════

    /// Resize every resident head to `preload_size + max_offset` frames.
    /// Streamed tails are untouched; no-op while RAM loading is on.
    pub fn set_preload_size(&self, preload_size: u32) {
        self.inner.preload_size.store(preload_size, Ordering::Release);
        if self.inner.load_in_ram.load(Ordering::Acquire) {
            return;
        }

        let factor = self.inner.oversampling_factor();
        let root = self.inner.root_directory();
        for (id, data) in self.inner.files.read().iter() {
            let max_offset = data.metadata().max_offset;
            let path = root.join(id.filename());
            let mut reader = match create_audio_reader(&path, id.is_reversed()) {
                Ok(reader) => reader,
                Err(err) => {
                    log::warn!("cannot reopen {id}: {err}");
                    continue;
                }
            };
            let frames = reader.frames() as u32;
            let frames_to_load = frames.min(preload_size.saturating_add(max_offset));
            match read_from_file(reader.as_mut(), frames_to_load, factor) {
                // SAFETY: control thread, quiescent.
                Ok(buffer) => unsafe { *data.preloaded_mut() = buffer },
                Err(err) => log::warn!("preload resize failed for {id}: {err}"),
            }
        }
    }

    /// Toggle between "head + streamed tail" and fully-resident samples.
    pub fn set_ram_loading(&self, load_in_ram: bool) {
        if self.inner.load_in_ram.swap(load_in_ram, Ordering::AcqRel) == load_in_ram {
            return;
        }

        if !load_in_ram {
            self.set_preload_size(self.inner.preload_size.load(Ordering::Acquire));
            return;
        }

        let factor = self.inner.oversampling_factor();
        let root = self.inner.root_directory();
        for (id, data) in self.inner.files.read().iter() {
            let path = root.join(id.filename());
            let mut reader = match create_audio_reader(&path, id.is_reversed()) {
                Ok(reader) => reader,
                Err(err) => {
                    log::warn!("cannot reopen {id}: {err}");
                    continue;
                }
            };
            let frames = reader.frames() as u32;
            match read_from_file(reader.as_mut(), frames, factor) {
                // SAFETY: control thread, quiescent.
                Ok(buffer) => unsafe { *data.preloaded_mut() = buffer },
                Err(err) => log::warn!("RAM load failed for {id}: {err}"),
            }
        }
    }

    /// Re-represent every entry at `factor`: heads are re-read, metadata
    /// rescaled, and completed tails re-streamed at the new rate.
    ///
    /// Must run while no voice is reading; entries mid-stream get no
    /// consistency guarantee beyond their rescaled metadata.
    pub fn set_oversampling_factor(&self, factor: Oversampling) {
        let old = self.inner.oversampling_factor();
        let ratio = factor.as_f64() / old.as_f64();
        let ram = self.inner.load_in_ram.load(Ordering::Acquire);
        let preload_size = self.inner.preload_size.load(Ordering::Acquire);
        let root = self.inner.root_directory();

        for (id, data) in self.inner.files.read().iter() {
            let path = root.join(id.filename());
            let mut reader = match create_audio_reader(&path, id.is_reversed()) {
                Ok(reader) => reader,
                Err(err) => {
                    log::warn!("cannot reopen {id}: {err}");
                    continue;
                }
            };
            let frames = reader.frames() as u32;
            let max_offset = data.metadata().max_offset;
            let frames_to_load = if ram {
                frames
            } else {
                frames.min(preload_size.saturating_add(max_offset))
            };

            match read_from_file(reader.as_mut(), frames_to_load, factor) {
                // SAFETY: control thread, quiescent.
                Ok(buffer) => unsafe { *data.preloaded_mut() = buffer },
                Err(err) => {
                    log::warn!("preload rebuild failed for {id}: {err}");
                    continue;
                }
            }
            data.update_metadata(|md| md.rescale(ratio));

            if data.status() == Status::Done {
                // A fresh reader: the tail restarts from the beginning.
                let mut tail_reader = match create_audio_reader(&path, id.is_reversed()) {
                    Ok(reader) => reader,
                    Err(err) => {
                        log::warn!("cannot reopen {id}: {err}");
                        continue;
                    }
                };
                let real_frames = (data.available_frames() as f64 / old.as_f64()) as u32;
                match read_from_file(tail_reader.as_mut(), real_frames, factor) {
                    Ok(buffer) => {
                        // SAFETY: quiescent, and no loader owns a Done entry.
                        unsafe { *data.tail_mut() = buffer };
                        data.set_available_frames(real_frames * factor.as_u32());
                    }
                    Err(err) => log::warn!("tail rebuild failed for {id}: {err}"),
                }
            }
        }

        self.inner
            .oversampling
            .store(factor.as_u32() as u8, Ordering::Release);
    }

    /// Point the pool at a different sample root. Existing entries keep
    /// the data they were registered with.
    pub fn set_root_directory(&self, root: &Path) {
        *self.inner.root_directory.write() = root.to_path_buf();
    }

    pub fn oversampling_factor(&self) -> Oversampling {
        self.inner.oversampling_factor()
    }

    pub fn preload_size(&self) -> u32 {
        self.inner.preload_size.load(Ordering::Acquire)
    }

    pub fn num_preloaded_samples(&self) -> usize {
        self.inner.files.read().len()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Maintenance
    // ═══════════════════════════════════════════════════════════════════

    /// Reclaim idle streamed tails. Called by the engine between audio
    /// callbacks; returns immediately when the bookkeeping locks are
    /// contended.
    pub fn trigger_garbage_collection(&self) {
        garbage::collect(&self.inner);
    }

    /// Block until every queued request has been dispatched and every
    /// in-flight loader job has finished.
    pub fn wait_for_background_loading(&self) {
        loop {
            let queued = self.inner.queued_requests.load(Ordering::Acquire);
            let handled = self.inner.handled_requests.load(Ordering::Acquire);
            if handled >= queued {
                break;
            }
            thread::yield_now();
        }

        let mut jobs = self.inner.loading_jobs.lock();
        for task in jobs.iter() {
            task.wait();
        }
        jobs.clear();
    }

    /// Drop every entry. Pending requests are drained and in-flight
    /// loaders finish first.
    pub fn clear(&self) {
        while let Ok(message) = self.inner.to_load_rx.try_recv() {
            if matches!(message, DispatchMessage::Load(_)) {
                self.inner.handled_requests.fetch_add(1, Ordering::Release);
            }
        }
        self.wait_for_background_loading();
        self.inner.files.write().clear();
        self.inner.last_used.lock().clear();
    }
}

impl Drop for FilePool {
    fn drop(&mut self) {
        if let Some(garbage_thread) = self.garbage_thread.take() {
            let _ = self.inner.garbage_tx.send(GarbageMessage::Shutdown);
            let _ = garbage_thread.join();
        }
        if let Some(dispatcher) = self.dispatcher.take() {
            let _ = self.inner.to_load_tx.send(DispatchMessage::Shutdown);
            let _ = dispatcher.join();
        }
        // Loader jobs still on the executor must not outlive the pool
        // state they reference.
        let mut jobs = self.inner.loading_jobs.lock();
        for task in jobs.iter() {
            task.wait();
        }
        jobs.clear();
    }
}

/// Dispatcher thread body: block on the request channel, hand live
/// requests to the worker pool, reap finished jobs.
fn dispatch_loop(inner: &Arc<PoolInner>, workers: &ThreadPool, requests: &Receiver<DispatchMessage>) {
    while let Ok(message) = requests.recv() {
        match message {
            DispatchMessage::Load(request) => {
                {
                    let mut jobs = inner.loading_jobs.lock();
                    if request.id.strong_count() == 0 {
                        // The owning voice died; nothing to stream.
                    } else {
                        let job_inner = Arc::clone(inner);
                        jobs.push(
                            workers.enqueue(move || loader::loading_job(&job_inner, request)),
                        );
                    }
                    swap_and_pop_all(&mut jobs, |task| task.is_finished());
                }
                inner.handled_requests.fetch_add(1, Ordering::Release);
            }
            DispatchMessage::Shutdown => break,
        }
    }
}

fn file_information_from(
    path: &Path,
    reader: &mut dyn AudioReader,
    reversed: bool,
) -> Option<FileMetadata> {
    let channels = reader.channels();
    if channels != 1 && channels != 2 {
        log::debug!(
            "unsupported channel count {channels}, discarding {}",
            path.display()
        );
        return None;
    }

    let mut info = FileMetadata {
        sample_rate: reader.sample_rate() as f64,
        end: (reader.frames() as u32).saturating_sub(1),
        num_channels: channels as u8,
        root_key: None,
        has_loop: false,
        loop_begin: 0,
        loop_end: 0,
        max_offset: 0,
        wavetable: None,
    };

    let mut instrument = reader.instrument().cloned();
    let metadata = MetadataReader::open(path).ok();
    if instrument.is_none() {
        // Codecs without a native instrument chunk may still carry one as
        // embedded RIFF data (FLAC).
        instrument = metadata.as_ref().and_then(|md| md.riff_instrument());
    }
    if let Some(md) = metadata.as_ref() {
        info.wavetable = md.wavetable_info();
    }

    if let Some(instrument) = instrument {
        if !reversed {
            if let Some(span) = instrument.loops.first() {
                info.has_loop = true;
                info.loop_begin = span.start;
                info.loop_end = span.end.saturating_sub(1).min(info.end);
            }
        }
        info.root_key = Some(instrument.base_note.clamp(0, 127) as u8);
    }

    Some(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE_RATE: u32 = 44100;

    fn ramp(num_frames: usize) -> Vec<f32> {
        (0..num_frames)
            .map(|frame| (frame as f32 / num_frames as f32) * 2.0 - 1.0)
            .collect()
    }

    fn write_wav(dir: &TempDir, name: &str, samples: &[f32]) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(dir.path().join(name), spec).unwrap();
        for &sample in samples {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn test_config(root: &TempDir) -> PoolConfig {
        PoolConfig {
            preload_size: 4096,
            file_clearing_period_secs: 0,
            root_directory: root.path().to_path_buf(),
            ..PoolConfig::default()
        }
    }

    #[test]
    fn test_gc_reclaims_idle_tails_and_streaming_resumes() {
        let dir = TempDir::new().unwrap();
        let samples = ramp(8000);
        write_wav(&dir, "a.wav", &samples);

        let pool = FilePool::new(test_config(&dir));
        let id = SampleIdentity::new("a.wav");
        assert!(pool.preload_file(&id, 0));
        let id = Arc::new(id);

        let handle = pool.get_file_promise(&id).unwrap();
        pool.wait_for_background_loading();
        assert_eq!(handle.status(), Status::Done);
        drop(handle);

        let entry = pool.inner.files.read().get(id.as_ref()).cloned().unwrap();
        pool.trigger_garbage_collection();

        assert_eq!(entry.status(), Status::Preloaded);
        assert_eq!(entry.available_frames(), 0);
        // Reclamation never touches the resident head.
        assert_eq!(&entry.preloaded().channel(0)[..64], &samples[..64]);

        // A later promise re-streams the tail.
        let handle = pool.get_file_promise(&id).unwrap();
        pool.wait_for_background_loading();
        assert_eq!(handle.status(), Status::Done);
        assert_eq!(handle.available_frames(), 8000);
        assert_eq!(handle.streamed().channel(0)[7999], samples[7999]);
    }

    #[test]
    fn test_gc_keeps_entries_with_readers() {
        let dir = TempDir::new().unwrap();
        write_wav(&dir, "a.wav", &ramp(8000));

        let pool = FilePool::new(test_config(&dir));
        let id = SampleIdentity::new("a.wav");
        assert!(pool.preload_file(&id, 0));
        let id = Arc::new(id);

        let handle = pool.get_file_promise(&id).unwrap();
        pool.wait_for_background_loading();
        assert_eq!(handle.status(), Status::Done);

        // The handle is still alive: nothing may be reclaimed.
        pool.trigger_garbage_collection();
        assert_eq!(handle.status(), Status::Done);
        assert_eq!(handle.available_frames(), 8000);
    }

    #[test]
    fn test_gc_respects_clearing_period() {
        let dir = TempDir::new().unwrap();
        write_wav(&dir, "a.wav", &ramp(8000));

        let mut config = test_config(&dir);
        config.file_clearing_period_secs = 3600;
        let pool = FilePool::new(config);

        let id = SampleIdentity::new("a.wav");
        assert!(pool.preload_file(&id, 0));
        let id = Arc::new(id);

        let handle = pool.get_file_promise(&id).unwrap();
        pool.wait_for_background_loading();
        drop(handle);

        let entry = pool.inner.files.read().get(id.as_ref()).cloned().unwrap();
        pool.trigger_garbage_collection();

        // Not idle long enough; the tail stays resident.
        assert_eq!(entry.status(), Status::Done);
        assert_eq!(entry.available_frames(), 8000);
    }

    #[test]
    fn test_dead_identity_requests_are_dropped() {
        let dir = TempDir::new().unwrap();
        write_wav(&dir, "a.wav", &ramp(8000));

        let pool = FilePool::new(test_config(&dir));
        let id = SampleIdentity::new("a.wav");
        assert!(pool.preload_file(&id, 0));
        let id = Arc::new(id);

        let handle = pool.get_file_promise(&id).unwrap();
        // The voice (and its identity) dies before the dispatcher runs.
        drop(id);
        pool.wait_for_background_loading();

        // The request may or may not have been reaped before the identity
        // died; either way the entry is consistent and readable.
        let status = handle.status();
        assert!(status == Status::Preloaded || status == Status::Streaming || status == Status::Done);
        assert!(handle.available_frames() as usize <= handle.streamed().capacity());
    }
}
