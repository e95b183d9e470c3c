//! Background streaming decode
//!
//! The read helpers shared by the registration path and the loader jobs,
//! plus the job body that drives an entry Preloaded → Streaming → Done.

use std::sync::atomic::AtomicU32;
use std::time::Instant;

use wp_core::{FileAudioBuffer, Oversampling};
use wp_file::{AudioReader, FileResult, Oversampler, create_audio_reader};

use crate::entry::Status;
use crate::pool::PoolInner;
use crate::priority::raise_current_thread_priority;
use crate::queue::QueuedRequest;

/// Frames decoded per read iteration.
const READ_CHUNK_FRAMES: usize = 4096;

/// Decode `frames` base-file frames into a fresh deinterleaved buffer,
/// without oversampling.
pub(crate) fn read_base_file(
    reader: &mut dyn AudioReader,
    frames: u32,
) -> FileResult<FileAudioBuffer> {
    let channels = reader.channels().max(1);
    let mut output = FileAudioBuffer::with_frames(channels, frames as usize);
    let mut interleaved = vec![0.0f32; READ_CHUNK_FRAMES * channels];

    let mut written = 0usize;
    while written < frames as usize {
        let chunk = (frames as usize - written).min(READ_CHUNK_FRAMES);
        let read = reader.read_next_block(&mut interleaved[..chunk * channels])?;
        if read == 0 {
            break;
        }
        output.write_interleaved(written, &interleaved[..read * channels]);
        written += read;
    }
    Ok(output)
}

/// Decode `frames` base frames and lift them to `factor`.
pub(crate) fn read_from_file(
    reader: &mut dyn AudioReader,
    frames: u32,
    factor: Oversampling,
) -> FileResult<FileAudioBuffer> {
    let base = read_base_file(reader, frames)?;
    if factor == Oversampling::X1 {
        return Ok(base);
    }
    let mut output = FileAudioBuffer::new();
    Oversampler::new(factor).stream_buffer(&base, &mut output);
    Ok(output)
}

/// Stream `frames` base frames into `output` at `factor`, publishing
/// playable output frames through `progress` as blocks land.
pub(crate) fn stream_from_file(
    reader: &mut dyn AudioReader,
    frames: u32,
    factor: Oversampling,
    output: &mut FileAudioBuffer,
    progress: Option<&AtomicU32>,
) -> FileResult<()> {
    Oversampler::new(factor).stream_reader(reader, frames, output, progress)
}

/// Body of one background loader job.
pub(crate) fn loading_job(inner: &PoolInner, request: QueuedRequest) {
    let Some(id) = request.id.upgrade() else {
        // The owning voice died between enqueue and dispatch.
        return;
    };

    raise_current_thread_priority(inner.loader_priority);

    let load_started = Instant::now();
    let wait_duration = load_started.duration_since(request.queued_at);

    let path = inner.root_directory().join(id.filename());
    let mut reader = match create_audio_reader(&path, id.is_reversed()) {
        Ok(reader) => reader,
        Err(err) => {
            log::warn!("decoder failed for {id}: {err}");
            return;
        }
    };

    let data = &request.data;
    if data.status() != Status::Preloaded {
        // Someone else is streaming it, or the tail is already resident.
        return;
    }
    if !data.try_begin_streaming() {
        return;
    }

    let frames = reader.frames() as u32;
    let factor = inner.oversampling_factor();
    // SAFETY: this job holds the streaming token for the entry.
    let tail = unsafe { data.tail_mut() };
    if let Err(err) = stream_from_file(
        reader.as_mut(),
        frames,
        factor,
        tail,
        Some(data.available_frames_cell()),
    ) {
        log::warn!("streaming failed for {id}: {err}");
        data.set_available_frames(0);
        data.set_status(Status::Preloaded);
        return;
    }

    data.set_status(Status::Done);

    inner
        .logger
        .log_file_time(wait_duration, load_started.elapsed(), frames, id.filename());

    let mut last_used = inner.last_used.lock();
    if !last_used.iter().any(|used| used == id.as_ref()) {
        last_used.push((*id).clone());
    }
}
