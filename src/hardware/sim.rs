// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A simulated correlator.
//!
//! The sky is a clock: an "hour hand" of four sources rotating once every 12
//! hours and a "minute hand" of seven sources rotating once an hour, both
//! following UTC. Visibilities of that sky are turned back into the agreement
//! counts the real correlator would produce, so simulated frames go through
//! exactly the same decoding as real ones.

use std::time::{Duration, Instant};

use chrono::{DateTime, Timelike, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};

use super::{CorrelatorHardware, DebugMode, HardwareError, HardwareStatus};
use crate::{
    c64,
    config::{RuntimeConfig, SimulatorConfig},
    constants::{FRAC_PI_2, RAW_WORD_BYTES, TAU, VEL_C},
    correlator::{Baselines, RawFrame},
};

/// The fraction of full correlation contributed by the whole sky.
const SKY_AMPLITUDE: f64 = 0.5;

/// A point source of the simulated sky.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkySource {
    pub el_deg: f64,
    pub az_deg: f64,
}

/// The clock-face sky at `time`.
pub fn clock_sky(time: DateTime<Utc>) -> Vec<SkySource> {
    let hour_hand = time.hour() as f64 * 30.0 + time.minute() as f64 / 2.0;
    let minute_hand = time.minute() as f64 * 6.0 + time.second() as f64 / 10.0;

    let hour = [85.0, 75.0, 65.0, 55.0].into_iter().map(|el_deg| SkySource {
        el_deg,
        az_deg: -hour_hand,
    });
    let minute = [90.0, 80.0, 70.0, 60.0, 50.0, 40.0, 30.0]
        .into_iter()
        .map(|el_deg| SkySource {
            el_deg,
            az_deg: -minute_hand,
        });
    hour.chain(minute).collect()
}

/// Ideal visibilities of point sources for antennas at ENU `positions`
/// \[metres\].
pub fn model_visibilities(
    baselines: &Baselines,
    positions: &[[f64; 3]],
    wavelength: f64,
    sources: &[SkySource],
) -> Vec<c64> {
    let directions = sources
        .iter()
        .map(|s| {
            let (sin_el, cos_el) = s.el_deg.to_radians().sin_cos();
            let (sin_az, cos_az) = s.az_deg.to_radians().sin_cos();
            [cos_el * sin_az, cos_el * cos_az, sin_el]
        })
        .collect::<Vec<_>>();
    let scale = if sources.is_empty() {
        0.0
    } else {
        SKY_AMPLITUDE / sources.len() as f64
    };

    baselines
        .pairs()
        .iter()
        .map(|&(i, j)| {
            let b = [
                positions[j][0] - positions[i][0],
                positions[j][1] - positions[i][1],
                positions[j][2] - positions[i][2],
            ];
            directions
                .iter()
                .map(|d| {
                    let path = b[0] * d[0] + b[1] * d[1] + b[2] * d[2];
                    c64::from_polar(scale, -TAU * path / wavelength)
                })
                .sum()
        })
        .collect()
}

/// Agreement counts that decode back to `vis`, for balanced (zero-mean)
/// antennas.
pub fn encode_frame(vis: &[c64], num_antenna: usize, n_samples: u64) -> RawFrame {
    let half = n_samples as f64 / 2.0;
    let count = |v: f64| ((v.clamp(-1.0, 1.0).asin() / FRAC_PI_2 + 1.0) * half).round() as i64;

    let mut words = Vec::with_capacity(2 * vis.len() + num_antenna);
    for v in vis {
        words.push(count(v.re));
        words.push(count(-v.im));
    }
    words.extend(std::iter::repeat(half.round() as i64).take(num_antenna));
    RawFrame { words }
}

pub struct SimulatedCorrelator {
    baselines: Baselines,
    positions: Vec<[f64; 3]>,
    wavelength: f64,
    config: SimulatorConfig,
    rng: StdRng,

    debug: DebugMode,
    capture: bool,
    source: Option<usize>,
    centre: bool,
    sample_delay: u8,
    vis_n_samples_exp: Option<u8>,
    next_frame_at: Option<Instant>,
    acquisition_done_at: Option<Instant>,
    registers: [u8; 16],
}

impl SimulatedCorrelator {
    pub fn new(
        positions: Vec<[f64; 3]>,
        frequency: f64,
        config: SimulatorConfig,
    ) -> SimulatedCorrelator {
        SimulatedCorrelator {
            baselines: Baselines::new(positions.len()),
            positions,
            wavelength: VEL_C / frequency,
            config,
            rng: StdRng::from_entropy(),
            debug: DebugMode::default(),
            capture: false,
            source: None,
            centre: false,
            sample_delay: 0,
            vis_n_samples_exp: None,
            next_frame_at: None,
            acquisition_done_at: None,
            registers: [0; 16],
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> SimulatedCorrelator {
        SimulatedCorrelator::new(
            config.telescope.antenna_positions.clone(),
            config.telescope.frequency,
            config.hardware.simulator.clone(),
        )
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(self.config.frame_interval_secs.max(0.0))
    }

    /// Ready flags come up only some of the time, so that pollers get
    /// exercised.
    fn ready_roll(&mut self) -> bool {
        self.rng.gen_range(0.0..100.0) < self.config.ready_percent
    }
}

impl CorrelatorHardware for SimulatedCorrelator {
    fn num_antenna(&self) -> usize {
        self.baselines.num_antenna()
    }

    fn read_register(&mut self, reg: u8) -> Result<u8, HardwareError> {
        Ok(self.registers[(reg & 0x0F) as usize])
    }

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), HardwareError> {
        self.registers[(reg & 0x0F) as usize] = value;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), HardwareError> {
        self.debug = DebugMode::default();
        self.capture = false;
        self.source = None;
        self.vis_n_samples_exp = None;
        self.next_frame_at = None;
        self.acquisition_done_at = None;
        self.registers = [0; 16];
        Ok(())
    }

    fn set_debug(&mut self, mode: DebugMode) -> Result<(), HardwareError> {
        self.debug = mode;
        Ok(())
    }

    fn set_capture(&mut self, on: bool, source: Option<usize>) -> Result<(), HardwareError> {
        self.capture = on;
        self.source = source;
        Ok(())
    }

    fn set_centre(&mut self, on: bool) -> Result<(), HardwareError> {
        self.centre = on;
        Ok(())
    }

    fn set_sample_delay(&mut self, delay: u8) -> Result<(), HardwareError> {
        self.sample_delay = delay;
        Ok(())
    }

    fn start_vis(&mut self, n_samples_exp: u8) -> Result<(), HardwareError> {
        self.vis_n_samples_exp = Some(n_samples_exp);
        self.next_frame_at = Some(Instant::now() + self.frame_interval());
        Ok(())
    }

    fn start_acquisition(&mut self) -> Result<(), HardwareError> {
        self.acquisition_done_at = Some(Instant::now() + self.frame_interval() / 10);
        Ok(())
    }

    fn vis_ready(&mut self) -> Result<bool, HardwareError> {
        match self.next_frame_at {
            Some(t) if Instant::now() >= t => Ok(self.ready_roll()),
            _ => Ok(false),
        }
    }

    fn data_ready(&mut self) -> Result<bool, HardwareError> {
        match self.acquisition_done_at {
            Some(t) if Instant::now() >= t => Ok(self.ready_roll()),
            _ => Ok(false),
        }
    }

    fn read_status(&mut self) -> Result<HardwareStatus, HardwareError> {
        let now = Instant::now();
        Ok(HardwareStatus {
            timestamp: Utc::now(),
            phase: self.config.phase,
            delta: 0,
            centre: self.centre,
            sample_delay: self.sample_delay,
            debug: self.debug,
            capture: self.capture,
            source: self.source,
            vis_ready: self.next_frame_at.map_or(false, |t| now >= t),
            data_ready: self.acquisition_done_at.map_or(false, |t| now >= t),
            vis_n_samples_exp: self.vis_n_samples_exp.unwrap_or(0),
        })
    }

    fn read_vis_frame(&mut self) -> Result<RawFrame, HardwareError> {
        let n_samples_exp = self.vis_n_samples_exp.unwrap_or(0);
        let sky = clock_sky(Utc::now());
        let vis = model_visibilities(&self.baselines, &self.positions, self.wavelength, &sky);
        // Start the next accumulation.
        if self.next_frame_at.is_some() {
            self.next_frame_at = Some(Instant::now() + self.frame_interval());
        }
        Ok(encode_frame(
            &vis,
            self.baselines.num_antenna(),
            1 << n_samples_exp,
        ))
    }

    fn read_data(&mut self, num_words: usize) -> Result<Vec<u8>, HardwareError> {
        let mut bytes = vec![0; RAW_WORD_BYTES * num_words];
        self.rng.fill(bytes.as_mut_slice());
        Ok(bytes)
    }
}
