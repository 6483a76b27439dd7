// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

All physical constants *must* be double precision.
 */

use std::time::Duration;

pub use std::f64::consts::{FRAC_PI_2, FRAC_PI_6, PI, TAU};

/// The number of one-bit channels packed into each raw acquisition word. The
/// correlator can't be configured with more antennas than this.
pub const HARDWARE_NUM_CHANNELS: usize = 24;

/// The number of bytes in each raw acquisition word.
pub const RAW_WORD_BYTES: usize = 3;

/// The number of bytes in each visibility word read from the correlator.
pub const VIS_WORD_BYTES: usize = 4;

/// The phase detector quantises a clock phase into this many steps (30°
/// each).
pub const NUM_PHASE_STEPS: u8 = 12;

/// Power spectral densities are always re-binned into this many bins.
pub const PSD_NUM_BINS: usize = 128;

/// Added to powers before converting to decibels, so that an all-zero
/// spectrum doesn't produce -inf.
pub const PSD_DB_FLOOR: f64 = 1e-32;

/// The number of most-recent catalog entries the retention service keeps for
/// each data category.
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 10;

/// How long the retention service sleeps between cycles.
pub const DEFAULT_CACHE_INTERVAL: Duration = Duration::from_secs(60);

/// How long the controller idles in the "off" and "calibrate" states.
pub const OFF_IDLE_SLEEP: Duration = Duration::from_millis(500);

/// How long the controller sleeps after draining the pipeline in visibility
/// mode.
pub const VIS_CYCLE_SLEEP: Duration = Duration::from_millis(5);

/// The assembly worker's throttle between polls of its queues.
pub const ASSEMBLY_THROTTLE: Duration = Duration::from_millis(10);

/// The pause between "ready" polls of the hardware.
pub const READY_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// How long to wait for a worker to acknowledge "stop" before abandoning it.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// GPS L1.
pub const DEFAULT_OBSERVING_FREQUENCY_HZ: f64 = 1575.42e6;

/// The MAX2769 sampling frequency used by TART front ends.
pub const DEFAULT_SAMPLING_FREQUENCY_HZ: f64 = 16.368e6;

/// Speed of light \[m/s\].
pub const VEL_C: f64 = 299_792_458.0;

/// The default number of antennas of a TART array.
pub const DEFAULT_NUM_ANTENNA: usize = 24;

/// File extension of every persisted data container.
pub const DATA_FILE_EXTENSION: &str = "json.gz";
