// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Runtime configuration.
//!
//! Every field has a default, so a configuration file only needs to specify
//! what differs from a standard 24-antenna TART. Files may be toml or json;
//! the extension decides which.

mod error;

pub use error::ConfigError;

use std::{
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::{
    constants::*,
    controller::{ControllerMode, LoopMode},
};

/// The largest sample-count exponent the correlator's counters can hold.
pub const MAX_SAMPLES_EXP: u8 = 30;

#[derive(Debug, Display, EnumIter, EnumString)]
pub(crate) enum ConfigFileType {
    #[strum(serialize = "toml")]
    Toml,
    #[strum(serialize = "json")]
    Json,
}

lazy_static::lazy_static! {
    pub(crate) static ref CONFIG_FILE_TYPES_COMMA_SEPARATED: String = ConfigFileType::iter().join(", ");
}

/// Static properties of the array. These are consumed as-is; they only
/// change if the hardware does.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelescopeConfig {
    pub name: String,
    pub num_antenna: usize,
    /// \[Hz\]
    pub sampling_frequency: f64,
    /// The observing frequency \[Hz\]. Only the simulated correlator uses it.
    pub frequency: f64,
    /// East, north, up \[metres\], one per antenna.
    pub antenna_positions: Vec<[f64; 3]>,
}

impl Default for TelescopeConfig {
    fn default() -> Self {
        Self {
            name: "TART".to_string(),
            num_antenna: DEFAULT_NUM_ANTENNA,
            sampling_frequency: DEFAULT_SAMPLING_FREQUENCY_HZ,
            frequency: DEFAULT_OBSERVING_FREQUENCY_HZ,
            antenna_positions: default_antenna_positions(DEFAULT_NUM_ANTENNA),
        }
    }
}

/// Antennas evenly spaced on a 1.5 m ring. Only used when no positions are
/// supplied.
pub fn default_antenna_positions(num_antenna: usize) -> Vec<[f64; 3]> {
    (0..num_antenna)
        .map(|i| {
            let theta = TAU * i as f64 / num_antenna as f64;
            let (s, c) = theta.sin_cos();
            [1.5 * s, 1.5 * c, 0.0]
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub save: bool,
    pub n_samples_exp: u8,
    pub base_path: PathBuf,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            save: true,
            n_samples_exp: 20,
            base_path: PathBuf::from("/telescope_data/raw"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisConfig {
    pub save: bool,
    /// How many visibility sets are batched into each saved file.
    pub chunk_size: usize,
    pub n_samples_exp: u8,
    pub base_path: PathBuf,
}

impl Default for VisConfig {
    fn default() -> Self {
        Self {
            save: true,
            chunk_size: 60,
            n_samples_exp: 24,
            base_path: PathBuf::from("/telescope_data/vis"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectreConfig {
    pub nfft: usize,
    pub n_samples_exp: u8,
}

impl Default for SpectreConfig {
    fn default() -> Self {
        Self {
            nfft: 4096,
            n_samples_exp: 18,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticConfig {
    /// The accumulation length used while measuring clock phases.
    pub n_samples_exp: u8,
    /// How many phase readings are taken per antenna.
    pub phase_samples: usize,
    /// Mean resultant length above which a phase is "stable".
    pub stable_threshold: f64,
    /// How far from 0.5 a radio's bit mean may stray.
    pub radio_mean_threshold: f64,
    pub spectre: SpectreConfig,
}

impl Default for DiagnosticConfig {
    fn default() -> Self {
        Self {
            n_samples_exp: 20,
            phase_samples: 15,
            stable_threshold: 0.95,
            radio_mean_threshold: 0.2,
            spectre: SpectreConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub queue_capacity: usize,
    pub join_timeout_secs: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            join_timeout_secs: DEFAULT_JOIN_TIMEOUT.as_secs_f64(),
        }
    }
}

impl PipelineConfig {
    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.join_timeout_secs.max(0.0))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub interval_secs: f64,
    /// Log files on disk that the catalog doesn't know about. Nothing is ever
    /// deleted because of this.
    pub report_orphans: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            interval_secs: DEFAULT_CACHE_INTERVAL.as_secs_f64(),
            report_orphans: false,
        }
    }
}

impl CacheConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.interval_secs.max(0.0))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// The clock phase step the simulated phase detector reports.
    pub phase: u8,
    /// Percentage chance that a "ready" poll succeeds.
    pub ready_percent: f64,
    /// Time the simulated correlator spends producing each frame.
    pub frame_interval_secs: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            phase: 3,
            ready_percent: 10.0,
            frame_interval_secs: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    /// Maps correlator output order onto canonical baseline order. Physical
    /// hardware only.
    pub permutation: Option<Vec<usize>>,
    pub simulator: SimulatorConfig,
}

/// Everything the controller needs. Fields that an operator may change at
/// runtime are copied into
/// [`OperatorSettings`](crate::controller::OperatorSettings) when the
/// controller starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub telescope: TelescopeConfig,
    pub raw: RawConfig,
    pub vis: VisConfig,
    pub diagnostic: DiagnosticConfig,
    pub pipeline: PipelineConfig,
    pub cache: CacheConfig,
    pub hardware: HardwareConfig,
    pub mode: ControllerMode,
    pub modes_available: Vec<ControllerMode>,
    pub loop_mode: LoopMode,
    pub loop_n: usize,
    /// Where the file-backed catalog lives. `None` keeps it in memory.
    pub catalog_path: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            telescope: TelescopeConfig::default(),
            raw: RawConfig::default(),
            vis: VisConfig::default(),
            diagnostic: DiagnosticConfig::default(),
            pipeline: PipelineConfig::default(),
            cache: CacheConfig::default(),
            hardware: HardwareConfig::default(),
            mode: ControllerMode::Off,
            modes_available: ControllerMode::iter().collect(),
            loop_mode: LoopMode::Loop,
            loop_n: 5,
            catalog_path: None,
        }
    }
}

impl RuntimeConfig {
    /// Read a configuration from a toml or json file, then validate it.
    pub fn from_file(file: &Path) -> Result<RuntimeConfig, ConfigError> {
        let file_str = file.display().to_string();
        debug!("Attempting to parse configuration file {file_str}");

        let file_type = file
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .and_then(|e| ConfigFileType::from_str(&e).ok());
        let file_type = match file_type {
            Some(t) => t,
            None => {
                return Err(ConfigError::UnsupportedFileType {
                    file: file_str,
                    supported: CONFIG_FILE_TYPES_COMMA_SEPARATED.clone(),
                })
            }
        };

        let contents = std::fs::read_to_string(file).map_err(|e| ConfigError::Read {
            file: file_str.clone(),
            err: e.to_string(),
        })?;
        let config: RuntimeConfig = match file_type {
            ConfigFileType::Toml => toml::from_str(&contents).map_err(|e| ConfigError::Parse {
                file: file_str.clone(),
                err: e.to_string(),
            })?,
            ConfigFileType::Json => {
                serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
                    file: file_str.clone(),
                    err: e.to_string(),
                })?
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Check every relationship between fields that the rest of the crate
    /// relies upon.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.telescope;
        if !(2..=HARDWARE_NUM_CHANNELS).contains(&t.num_antenna) {
            return Err(ConfigError::BadAntennaCount {
                got: t.num_antenna,
                max: HARDWARE_NUM_CHANNELS,
            });
        }
        if t.antenna_positions.len() != t.num_antenna {
            return Err(ConfigError::AntennaPositionCount {
                expected: t.num_antenna,
                got: t.antenna_positions.len(),
            });
        }
        if !(t.sampling_frequency.is_finite() && t.sampling_frequency > 0.0) {
            return Err(ConfigError::BadSamplingFrequency(t.sampling_frequency));
        }
        if let Some(perm) = &self.hardware.permutation {
            let expected = crate::correlator::frame_len(t.num_antenna);
            if perm.len() != expected {
                return Err(ConfigError::PermutationLength {
                    expected,
                    got: perm.len(),
                });
            }
        }

        for (what, exp) in [
            ("raw", self.raw.n_samples_exp),
            ("vis", self.vis.n_samples_exp),
            ("diagnostic", self.diagnostic.n_samples_exp),
            ("spectre", self.diagnostic.spectre.n_samples_exp),
        ] {
            n_samples_from_exp(what, exp)?;
        }

        if self.vis.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.diagnostic.phase_samples == 0 {
            return Err(ConfigError::NoPhaseSamples);
        }
        for (what, value) in [
            ("phase stability", self.diagnostic.stable_threshold),
            ("radio mean", self.diagnostic.radio_mean_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::BadThreshold { what, value });
            }
        }
        crate::analysis::check_nfft(self.diagnostic.spectre.nfft)?;

        if !self.modes_available.contains(&self.mode) {
            return Err(ConfigError::ModeUnavailable(self.mode));
        }

        Ok(())
    }
}

/// The number of samples accumulated for a sample-count exponent. `what`
/// names the exponent in the error.
pub fn n_samples_from_exp(what: &'static str, exp: u8) -> Result<u64, ConfigError> {
    match 1_u64.checked_shl(u32::from(exp)) {
        Some(n) if exp <= MAX_SAMPLES_EXP => Ok(n),
        _ => Err(ConfigError::SampleExponent {
            what,
            exp,
            max: MAX_SAMPLES_EXP,
        }),
    }
}
