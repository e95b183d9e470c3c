//! Sample metadata types

use serde::{Deserialize, Serialize};

/// Integer oversampling factor applied uniformly across the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Oversampling {
    #[default]
    X1 = 1,
    X2 = 2,
    X4 = 4,
    X8 = 8,
}

impl Oversampling {
    #[inline]
    pub fn as_u32(self) -> u32 {
        self as u8 as u32
    }

    #[inline]
    pub fn as_f64(self) -> f64 {
        self.as_u32() as f64
    }

    /// Factor from its integer value; anything outside {1, 2, 4, 8} is
    /// rejected.
    pub fn from_factor(factor: u32) -> Option<Self> {
        match factor {
            1 => Some(Self::X1),
            2 => Some(Self::X2),
            4 => Some(Self::X4),
            8 => Some(Self::X8),
            _ => None,
        }
    }

    /// Number of 2x stages that realise this factor.
    #[inline]
    pub fn num_stages(self) -> u32 {
        self.as_u32().trailing_zeros()
    }
}

/// One sustain loop span from an instrument chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrumentLoop {
    pub start: u32,
    pub end: u32,
}

/// Instrument chunk data extracted from a sample file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstrumentInfo {
    /// MIDI note the sample was recorded at.
    pub base_note: i32,
    /// Loop spans in file frame indices.
    pub loops: Vec<InstrumentLoop>,
}

/// Wavetable descriptor embedded in a sample file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavetableInfo {
    /// Frames per table.
    pub table_size: u32,
    /// Play tables once instead of cycling.
    pub one_shot: bool,
}

/// Everything the pool knows about a registered sample.
///
/// Frame-indexed fields (`end`, `loop_begin`, `loop_end`) and
/// `sample_rate` are expressed at the pool's current oversampling factor;
/// `max_offset` stays in base-file frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileMetadata {
    pub sample_rate: f64,
    /// Index of the last frame.
    pub end: u32,
    pub num_channels: u8,
    pub root_key: Option<u8>,
    pub has_loop: bool,
    pub loop_begin: u32,
    pub loop_end: u32,
    /// Largest playback start offset voices may use, in base-file frames.
    pub max_offset: u32,
    pub wavetable: Option<WavetableInfo>,
}

impl FileMetadata {
    /// Total frames at the current factor.
    #[inline]
    pub fn total_frames(&self) -> u32 {
        self.end + 1
    }

    /// Rescale the rate-dependent fields when the oversampling factor
    /// changes by `ratio` (new / old).
    pub fn rescale(&mut self, ratio: f64) {
        self.sample_rate *= ratio;
        self.end = (self.end as f64 * ratio) as u32;
        self.loop_begin = (self.loop_begin as f64 * ratio) as u32;
        self.loop_end = (self.loop_end as f64 * ratio) as u32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oversampling_round_trip() {
        for factor in [1u32, 2, 4, 8] {
            assert_eq!(Oversampling::from_factor(factor).unwrap().as_u32(), factor);
        }
        assert_eq!(Oversampling::from_factor(3), None);
        assert_eq!(Oversampling::from_factor(16), None);
    }

    #[test]
    fn test_num_stages() {
        assert_eq!(Oversampling::X1.num_stages(), 0);
        assert_eq!(Oversampling::X2.num_stages(), 1);
        assert_eq!(Oversampling::X4.num_stages(), 2);
        assert_eq!(Oversampling::X8.num_stages(), 3);
    }

    #[test]
    fn test_rescale_doubles_rate_fields() {
        let mut info = FileMetadata {
            sample_rate: 44100.0,
            end: 7999,
            loop_begin: 100,
            loop_end: 7000,
            ..FileMetadata::default()
        };
        info.rescale(2.0);
        assert_eq!(info.sample_rate, 88200.0);
        assert_eq!(info.end, 15998);
        assert_eq!(info.loop_begin, 200);
        assert_eq!(info.loop_end, 14000);
    }
}
