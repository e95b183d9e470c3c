//! Pool configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::Oversampling;

/// Sample pool configuration knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Capacity hint for the load queue and the reclamation lists.
    pub max_voices: usize,
    /// Frames kept resident per sample when not loading in RAM, in
    /// base-file frames.
    pub preload_size: u32,
    /// Seconds a sample must stay idle before its streamed tail is
    /// reclaimed.
    pub file_clearing_period_secs: u64,
    /// Background loader thread priority, 0..100, mapped linearly into the
    /// platform's round-robin scheduling range.
    pub background_loader_priority: u8,
    /// Oversampling factor applied to every sample.
    pub oversampling_factor: Oversampling,
    /// Keep entire files resident instead of streaming tails on demand.
    pub load_in_ram: bool,
    /// Base directory all sample identities resolve against.
    pub root_directory: PathBuf,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_voices: 64,
            preload_size: 8192,
            file_clearing_period_secs: 30,
            background_loader_priority: 50,
            oversampling_factor: Oversampling::X1,
            load_in_ram: false,
            root_directory: PathBuf::from("."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.max_voices, 64);
        assert_eq!(config.preload_size, 8192);
        assert_eq!(config.file_clearing_period_secs, 30);
        assert_eq!(config.background_loader_priority, 50);
        assert_eq!(config.oversampling_factor, Oversampling::X1);
        assert!(!config.load_in_ram);
    }
}
