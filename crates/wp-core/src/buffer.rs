//! Deinterleaved audio sample storage

/// Owning container of deinterleaved f32 audio channels.
///
/// Preload heads and streamed tails both live in this container. Samples
/// are addressed as `(channel, frame)`; `reset` keeps allocations so a
/// buffer can be refilled without going back to the allocator.
#[derive(Debug, Clone, Default)]
pub struct FileAudioBuffer {
    channels: Vec<Vec<f32>>,
}

impl FileAudioBuffer {
    /// Empty buffer: no channels, no frames.
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
        }
    }

    /// Zero-filled buffer with the given shape.
    pub fn with_frames(num_channels: usize, num_frames: usize) -> Self {
        Self {
            channels: vec![vec![0.0; num_frames]; num_channels],
        }
    }

    /// Number of channels.
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Number of frames per channel.
    #[inline]
    pub fn num_frames(&self) -> usize {
        self.channels.first().map(|ch| ch.len()).unwrap_or(0)
    }

    /// True when the buffer holds no frames.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_frames() == 0
    }

    /// Drop all frames but keep channel allocations for reuse.
    pub fn reset(&mut self) {
        for ch in &mut self.channels {
            ch.clear();
        }
    }

    /// Reshape to `num_channels` x `num_frames`, zero-filling every sample.
    pub fn configure(&mut self, num_channels: usize, num_frames: usize) {
        self.channels.resize_with(num_channels, Vec::new);
        for ch in &mut self.channels {
            ch.clear();
            ch.resize(num_frames, 0.0);
        }
    }

    /// One channel's samples.
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    /// Mutable access to one channel's samples.
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    /// One sample.
    #[inline]
    pub fn sample(&self, channel: usize, frame: usize) -> f32 {
        self.channels[channel][frame]
    }

    /// Copy interleaved frames into the buffer starting at `start_frame`.
    /// Frames past the end of the buffer are ignored; returns the number of
    /// frames actually copied.
    pub fn write_interleaved(&mut self, start_frame: usize, interleaved: &[f32]) -> usize {
        let num_channels = self.num_channels();
        if num_channels == 0 {
            return 0;
        }
        let frames = interleaved.len() / num_channels;
        let writable = frames.min(self.num_frames().saturating_sub(start_frame));
        for (ch_index, ch) in self.channels.iter_mut().enumerate() {
            for frame in 0..writable {
                ch[start_frame + frame] = interleaved[frame * num_channels + ch_index];
            }
        }
        writable
    }

    /// Zero every sample without changing the shape.
    pub fn fill_silence(&mut self) {
        for ch in &mut self.channels {
            ch.fill(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape() {
        let buffer = FileAudioBuffer::with_frames(2, 128);
        assert_eq!(buffer.num_channels(), 2);
        assert_eq!(buffer.num_frames(), 128);
        assert!(!buffer.is_empty());
        assert_eq!(buffer.sample(1, 127), 0.0);
    }

    #[test]
    fn test_reset_keeps_channels() {
        let mut buffer = FileAudioBuffer::with_frames(2, 64);
        buffer.reset();
        assert_eq!(buffer.num_channels(), 2);
        assert_eq!(buffer.num_frames(), 0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_write_interleaved_deinterleaves() {
        let mut buffer = FileAudioBuffer::with_frames(2, 4);
        let written = buffer.write_interleaved(1, &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(written, 2);
        assert_eq!(buffer.channel(0), &[0.0, 1.0, 3.0, 0.0]);
        assert_eq!(buffer.channel(1), &[0.0, 2.0, 4.0, 0.0]);
    }

    #[test]
    fn test_write_interleaved_clamps_to_capacity() {
        let mut buffer = FileAudioBuffer::with_frames(1, 2);
        let written = buffer.write_interleaved(0, &[1.0, 2.0, 3.0]);
        assert_eq!(written, 2);
        assert_eq!(buffer.channel(0), &[1.0, 2.0]);
    }

    #[test]
    fn test_configure_reshapes() {
        let mut buffer = FileAudioBuffer::with_frames(1, 8);
        buffer.channel_mut(0).fill(1.0);
        buffer.configure(2, 4);
        assert_eq!(buffer.num_channels(), 2);
        assert_eq!(buffer.num_frames(), 4);
        assert_eq!(buffer.channel(0), &[0.0; 4]);
    }
}
