//! Integer-factor oversampling
//!
//! Upsampling runs as cascaded 2x polyphase half-band FIR stages; factor 1
//! passes frames through untouched. The stages are streaming filters, so
//! feeding the same input in different chunkings produces identical
//! output: preload heads and streamed tails of the same file agree
//! sample for sample.

use std::sync::atomic::{AtomicU32, Ordering};

use wp_core::{FileAudioBuffer, Oversampling};

use crate::{AudioReader, FileResult};

/// Frames pulled from a reader per streaming iteration.
const STREAM_CHUNK_FRAMES: usize = 1024;

/// Half-band lowpass for the 2x stages: 15 taps, windowed sinc,
/// unity passband gain.
const HALFBAND_TAPS: usize = 15;
const HALFBAND_COEFFS: [f32; HALFBAND_TAPS] = [
    -0.00523, 0.0, 0.02317, 0.0, -0.07597, 0.0, 0.30717, 0.5, 0.30717, 0.0, -0.07597, 0.0,
    0.02317, 0.0, -0.00523,
];

/// Per-channel filter state for one 2x stage.
#[derive(Clone)]
struct HalfbandStage {
    state: [f32; HALFBAND_TAPS],
}

impl HalfbandStage {
    fn new() -> Self {
        Self {
            state: [0.0; HALFBAND_TAPS],
        }
    }

    /// One input sample in, two output samples out.
    #[inline]
    fn upsample(&mut self, input: f32) -> (f32, f32) {
        for i in (1..HALFBAND_TAPS).rev() {
            self.state[i] = self.state[i - 1];
        }
        self.state[0] = input;

        let mut filtered = 0.0;
        for (i, &coeff) in HALFBAND_COEFFS.iter().enumerate() {
            filtered += self.state[i] * coeff;
        }

        // Interpolated sample, then the delayed input (center tap phase).
        (filtered * 2.0, self.state[HALFBAND_TAPS / 2])
    }
}

/// Cascade of 2x stages lifting one channel to the target factor.
struct ChannelChain {
    stages: Vec<HalfbandStage>,
}

impl ChannelChain {
    fn new(num_stages: u32) -> Self {
        Self {
            stages: (0..num_stages).map(|_| HalfbandStage::new()).collect(),
        }
    }

    /// Upsample `input` by 2^stages, appending to `output`.
    fn process(&mut self, input: &[f32], output: &mut Vec<f32>) {
        if self.stages.is_empty() {
            output.extend_from_slice(input);
            return;
        }
        let mut current = input.to_vec();
        for stage in &mut self.stages {
            let mut next = Vec::with_capacity(current.len() * 2);
            for &sample in &current {
                let (a, b) = stage.upsample(sample);
                next.push(a);
                next.push(b);
            }
            current = next;
        }
        output.extend_from_slice(&current);
    }
}

/// Streams decoded audio into a destination buffer at an integer
/// upsampling ratio.
pub struct Oversampler {
    factor: Oversampling,
}

impl Oversampler {
    pub fn new(factor: Oversampling) -> Self {
        Self { factor }
    }

    #[inline]
    pub fn factor(&self) -> Oversampling {
        self.factor
    }

    /// Upsample an already-decoded buffer. `output` is reshaped to
    /// `input.num_channels()` x `input.num_frames() * factor`.
    pub fn stream_buffer(&self, input: &FileAudioBuffer, output: &mut FileAudioBuffer) {
        let factor = self.factor.as_u32() as usize;
        output.configure(input.num_channels(), input.num_frames() * factor);
        for ch in 0..input.num_channels() {
            let mut chain = ChannelChain::new(self.factor.num_stages());
            let mut upsampled = Vec::with_capacity(input.num_frames() * factor);
            chain.process(input.channel(ch), &mut upsampled);
            output.channel_mut(ch)[..upsampled.len()].copy_from_slice(&upsampled);
        }
    }

    /// Stream `frames` frames out of `reader` into `output`, publishing the
    /// number of playable output frames through `progress` after every
    /// chunk. The counter only ever rises.
    pub fn stream_reader(
        &self,
        reader: &mut dyn AudioReader,
        frames: u32,
        output: &mut FileAudioBuffer,
        progress: Option<&AtomicU32>,
    ) -> FileResult<()> {
        let channels = reader.channels().max(1);
        let factor = self.factor.as_u32() as usize;
        output.configure(channels, frames as usize * factor);

        let mut chains: Vec<ChannelChain> = (0..channels)
            .map(|_| ChannelChain::new(self.factor.num_stages()))
            .collect();
        let mut interleaved = vec![0.0f32; STREAM_CHUNK_FRAMES * channels];
        let mut scratch = vec![vec![0.0f32; STREAM_CHUNK_FRAMES]; channels];
        let mut written_frames = 0usize;
        let mut remaining = frames as usize;

        while remaining > 0 {
            let chunk = remaining.min(STREAM_CHUNK_FRAMES);
            let read = reader.read_next_block(&mut interleaved[..chunk * channels])?;
            if read == 0 {
                break;
            }

            for (ch, samples) in scratch.iter_mut().enumerate() {
                for frame in 0..read {
                    samples[frame] = interleaved[frame * channels + ch];
                }
            }

            for (ch, chain) in chains.iter_mut().enumerate() {
                let mut upsampled = Vec::with_capacity(read * factor);
                chain.process(&scratch[ch][..read], &mut upsampled);
                let dst = output.channel_mut(ch);
                let end = (written_frames + upsampled.len()).min(dst.len());
                dst[written_frames..end].copy_from_slice(&upsampled[..end - written_frames]);
            }

            written_frames += read * factor;
            remaining -= read;
            if let Some(progress) = progress {
                let playable = written_frames.min(output.num_frames()) as u32;
                progress.store(playable, Ordering::Release);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_from(samples: &[f32]) -> FileAudioBuffer {
        let mut buffer = FileAudioBuffer::with_frames(1, samples.len());
        buffer.channel_mut(0).copy_from_slice(samples);
        buffer
    }

    #[test]
    fn test_factor_one_is_a_copy() {
        let input = buffer_from(&[0.1, -0.2, 0.3, -0.4]);
        let mut output = FileAudioBuffer::new();
        Oversampler::new(Oversampling::X1).stream_buffer(&input, &mut output);
        assert_eq!(output.channel(0), input.channel(0));
    }

    #[test]
    fn test_factor_two_doubles_length() {
        let input = buffer_from(&vec![0.5; 256]);
        let mut output = FileAudioBuffer::new();
        Oversampler::new(Oversampling::X2).stream_buffer(&input, &mut output);
        assert_eq!(output.num_frames(), 512);
    }

    #[test]
    fn test_dc_passes_through_after_settling() {
        let input = buffer_from(&vec![1.0; 256]);
        let mut output = FileAudioBuffer::new();
        Oversampler::new(Oversampling::X2).stream_buffer(&input, &mut output);
        for &sample in &output.channel(0)[64..] {
            assert!((sample - 1.0).abs() < 0.02, "sample {sample} drifted");
        }
    }

    #[test]
    fn test_chunking_does_not_change_output() {
        let samples: Vec<f32> = (0..300).map(|i| ((i * 37) % 100) as f32 / 100.0).collect();

        let mut whole = Vec::new();
        let mut chain = ChannelChain::new(1);
        chain.process(&samples, &mut whole);

        let mut chunked = Vec::new();
        let mut chain = ChannelChain::new(1);
        for chunk in samples.chunks(17) {
            chain.process(chunk, &mut chunked);
        }

        assert_eq!(whole, chunked);
    }

    #[test]
    fn test_progress_counter_reaches_total() {
        use wp_core::InstrumentInfo;

        struct SilentReader {
            remaining: usize,
        }

        impl AudioReader for SilentReader {
            fn channels(&self) -> usize {
                1
            }
            fn frames(&self) -> u64 {
                4000
            }
            fn sample_rate(&self) -> u32 {
                44100
            }
            fn read_next_block(&mut self, dst: &mut [f32]) -> FileResult<usize> {
                let take = dst.len().min(self.remaining);
                dst[..take].fill(0.0);
                self.remaining -= take;
                Ok(take)
            }
            fn instrument(&self) -> Option<&InstrumentInfo> {
                None
            }
        }

        let mut reader = SilentReader { remaining: 4000 };
        let mut output = FileAudioBuffer::new();
        let progress = AtomicU32::new(0);
        Oversampler::new(Oversampling::X2)
            .stream_reader(&mut reader, 4000, &mut output, Some(&progress))
            .unwrap();

        assert_eq!(progress.load(Ordering::Acquire), 8000);
        assert_eq!(output.num_frames(), 8000);
    }
}
