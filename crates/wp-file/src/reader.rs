//! Audio file readers
//!
//! Block-wise decode of sample files into interleaved f32 frames. WAV goes
//! through hound, compressed formats through symphonia (the decode itself
//! always lands in float frames). Reversed orientation decodes the whole
//! file up front and serves frames back-to-front.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions};
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use wp_core::InstrumentInfo;

use crate::{FileError, FileResult, MetadataReader};

/// Block-wise access to decoded sample frames.
///
/// Implementations fill interleaved f32 frames; the pool deinterleaves
/// into its own buffers after each block.
pub trait AudioReader: Send {
    /// Channel count of the underlying stream.
    fn channels(&self) -> usize;

    /// Total frame count of the underlying stream.
    fn frames(&self) -> u64;

    /// Native sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Decode up to `dst.len() / channels()` frames into `dst`,
    /// interleaved. Returns the number of frames produced; fewer than
    /// requested means end of stream.
    fn read_next_block(&mut self, dst: &mut [f32]) -> FileResult<usize>;

    /// Instrument chunk carried by the container, when one is present.
    fn instrument(&self) -> Option<&InstrumentInfo>;
}

/// Open a reader for `path`, honouring the playback orientation.
pub fn create_audio_reader(path: &Path, reversed: bool) -> FileResult<Box<dyn AudioReader>> {
    let is_wav = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("wav") || ext.eq_ignore_ascii_case("wave"))
        .unwrap_or(false);

    let forward: Box<dyn AudioReader> = if is_wav {
        Box::new(WavFileReader::open(path)?)
    } else {
        Box::new(SymphoniaReader::open(path)?)
    };

    if reversed {
        Ok(Box::new(ReverseReader::from_reader(forward)?))
    } else {
        Ok(forward)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// WAV (hound)
// ═══════════════════════════════════════════════════════════════════════════

/// Streaming WAV reader.
pub struct WavFileReader {
    reader: hound::WavReader<std::io::BufReader<File>>,
    spec: hound::WavSpec,
    num_frames: u64,
    instrument: Option<InstrumentInfo>,
}

impl WavFileReader {
    pub fn open(path: &Path) -> FileResult<Self> {
        let instrument = MetadataReader::open(path)
            .ok()
            .and_then(|md| md.riff_instrument());
        let reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        let num_frames = reader.duration() as u64;
        Ok(Self {
            reader,
            spec,
            num_frames,
            instrument,
        })
    }
}

impl AudioReader for WavFileReader {
    fn channels(&self) -> usize {
        self.spec.channels as usize
    }

    fn frames(&self) -> u64 {
        self.num_frames
    }

    fn sample_rate(&self) -> u32 {
        self.spec.sample_rate
    }

    fn read_next_block(&mut self, dst: &mut [f32]) -> FileResult<usize> {
        let channels = self.channels().max(1);
        let wanted = dst.len() / channels * channels;
        let mut written = 0;

        match self.spec.sample_format {
            hound::SampleFormat::Float => {
                for sample in self.reader.samples::<f32>().take(wanted) {
                    dst[written] = sample?;
                    written += 1;
                }
            }
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1i64 << (self.spec.bits_per_sample - 1)) as f32;
                for sample in self.reader.samples::<i32>().take(wanted) {
                    dst[written] = sample? as f32 * scale;
                    written += 1;
                }
            }
        }

        Ok(written / channels)
    }

    fn instrument(&self) -> Option<&InstrumentInfo> {
        self.instrument.as_ref()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Compressed formats (symphonia)
// ═══════════════════════════════════════════════════════════════════════════

/// Streaming reader for the formats symphonia demuxes (FLAC, Ogg Vorbis).
pub struct SymphoniaReader {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    channels: usize,
    sample_rate: u32,
    num_frames: u64,
    /// Decoded interleaved samples not yet handed out.
    pending: Vec<f32>,
    instrument: Option<InstrumentInfo>,
    finished: bool,
}

impl SymphoniaReader {
    pub fn open(path: &Path) -> FileResult<Self> {
        let file =
            File::open(path).map_err(|_| FileError::NotFound(path.display().to_string()))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|err| FileError::Decode(err.to_string()))?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| FileError::InvalidFile("no audio track".to_string()))?;
        let track_id = track.id;
        let channels = track
            .codec_params
            .channels
            .map(|channels| channels.count())
            .ok_or_else(|| FileError::InvalidFile("unknown channel layout".to_string()))?;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| FileError::InvalidFile("unknown sample rate".to_string()))?;
        // The pool sizes preload and tail buffers up front, so streams of
        // unknown length cannot be registered.
        let num_frames = track
            .codec_params
            .n_frames
            .ok_or_else(|| FileError::InvalidFile("unknown stream length".to_string()))?;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|err| FileError::Decode(err.to_string()))?;

        let instrument = MetadataReader::open(path)
            .ok()
            .and_then(|md| md.riff_instrument());

        Ok(Self {
            format,
            decoder,
            track_id,
            channels,
            sample_rate,
            num_frames,
            pending: Vec::new(),
            instrument,
            finished: false,
        })
    }

    fn decode_more(&mut self) -> FileResult<()> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(symphonia::core::errors::Error::IoError(err))
                    if err.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.finished = true;
                    return Ok(());
                }
                Err(err) => return Err(FileError::Decode(err.to_string())),
            };
            if packet.track_id() != self.track_id {
                continue;
            }
            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let mut buffer =
                        SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
                    buffer.copy_interleaved_ref(decoded);
                    self.pending.extend_from_slice(buffer.samples());
                    return Ok(());
                }
                // Corrupt packets are skipped; the demuxer resynchronises.
                Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
                Err(err) => return Err(FileError::Decode(err.to_string())),
            }
        }
    }
}

impl AudioReader for SymphoniaReader {
    fn channels(&self) -> usize {
        self.channels
    }

    fn frames(&self) -> u64 {
        self.num_frames
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_next_block(&mut self, dst: &mut [f32]) -> FileResult<usize> {
        let channels = self.channels.max(1);
        let wanted = dst.len() / channels * channels;

        while self.pending.len() < wanted && !self.finished {
            self.decode_more()?;
        }

        let available = self.pending.len().min(wanted);
        dst[..available].copy_from_slice(&self.pending[..available]);
        self.pending.drain(..available);
        Ok(available / channels)
    }

    fn instrument(&self) -> Option<&InstrumentInfo> {
        self.instrument.as_ref()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Reversed orientation
// ═══════════════════════════════════════════════════════════════════════════

/// Serves a fully-decoded file back-to-front.
///
/// Frame order is reversed; the channel order inside each frame is kept.
pub struct ReverseReader {
    samples: Vec<f32>,
    position: usize,
    channels: usize,
    sample_rate: u32,
    num_frames: u64,
    instrument: Option<InstrumentInfo>,
}

impl ReverseReader {
    pub fn from_reader(mut inner: Box<dyn AudioReader>) -> FileResult<Self> {
        let channels = inner.channels().max(1);
        let total = inner.frames() as usize;

        let mut forward = vec![0.0f32; total * channels];
        let mut filled = 0;
        while filled < total {
            let read = inner.read_next_block(&mut forward[filled * channels..])?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        forward.truncate(filled * channels);

        let mut samples = Vec::with_capacity(forward.len());
        for frame in (0..filled).rev() {
            samples.extend_from_slice(&forward[frame * channels..(frame + 1) * channels]);
        }

        Ok(Self {
            samples,
            position: 0,
            channels,
            sample_rate: inner.sample_rate(),
            num_frames: filled as u64,
            instrument: inner.instrument().cloned(),
        })
    }
}

impl AudioReader for ReverseReader {
    fn channels(&self) -> usize {
        self.channels
    }

    fn frames(&self) -> u64 {
        self.num_frames
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_next_block(&mut self, dst: &mut [f32]) -> FileResult<usize> {
        let wanted = dst.len() / self.channels * self.channels;
        let remaining = self.samples.len() - self.position;
        let take = wanted.min(remaining);
        dst[..take].copy_from_slice(&self.samples[self.position..self.position + take]);
        self.position += take;
        Ok(take / self.channels)
    }

    fn instrument(&self) -> Option<&InstrumentInfo> {
        self.instrument.as_ref()
    }
}
