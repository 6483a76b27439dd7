// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Visibility streaming: keep the pipeline running, collect what it
//! assembles and persist it in chunks.

use std::thread;

use chrono::Utc;
use log::{debug, info, warn};

use super::{
    delay_step, AcquisitionState, BaselineVis, Controller, ControllerError, LatestVis,
    OperatorSettings,
};
use crate::{
    config::n_samples_from_exp,
    constants::VIS_CYCLE_SLEEP,
    correlator::Baselines,
    hardware::DebugMode,
    io::{write_vis_batch, VisBatchFile},
    pipeline::{AssembledVis, CaptureSettings, VisPipeline},
};

/// How many chunks are kept in memory while persistence keeps failing.
const MAX_RETAINED_CHUNKS: usize = 10;

impl Controller {
    pub(super) fn run_vis(&mut self) -> Result<(), ControllerError> {
        let settings = self.status.settings();
        if let Err(e) = n_samples_from_exp("vis", settings.vis_n_samples_exp) {
            self.stop_pipeline();
            return Err(e.into());
        }

        let restart = match &self.pipeline {
            None => true,
            Some(p) if p.has_failed() => {
                warn!("The visibility pipeline has failed; restarting it");
                true
            }
            Some(_) if self.pipeline_n_samples_exp != settings.vis_n_samples_exp => {
                info!(
                    "Visibility accumulation changed to 2^{} samples; restarting the pipeline",
                    settings.vis_n_samples_exp
                );
                true
            }
            Some(_) => false,
        };
        if restart {
            self.stop_pipeline();
            return self.start_pipeline(&settings);
        }

        let assembled = self
            .pipeline
            .as_ref()
            .map(|p| p.drain())
            .unwrap_or_default();
        if let Some(last) = assembled.last() {
            self.publish_latest(last);
        }

        let chunk_size = self.config.vis.chunk_size;
        let mut result = Ok(());
        for a in assembled {
            self.vis_batch.push(a.set);
            if self.vis_batch.len() % chunk_size != 0 {
                continue;
            }
            if let Err(e) = self.flush_vis_batch(&settings) {
                warn!(
                    "Keeping {} visibility sets after a failed save",
                    self.vis_batch.len()
                );
                if self.vis_batch.len() >= MAX_RETAINED_CHUNKS * chunk_size {
                    warn!("Discarding the oldest {chunk_size} unsaved visibility sets");
                    self.vis_batch.drain(..chunk_size);
                }
                result = Err(e);
            }
        }

        thread::sleep(VIS_CYCLE_SLEEP);
        result
    }

    fn start_pipeline(&mut self, settings: &OperatorSettings) -> Result<(), ControllerError> {
        let capture = CaptureSettings {
            debug: DebugMode::default(),
            sample_delay: delay_step(self.catalog.get_sample_delay()?),
            n_samples_exp: settings.vis_n_samples_exp,
        };
        let pipeline = VisPipeline::start(
            self.hardware.clone(),
            capture,
            self.config.telescope.num_antenna,
            self.config.pipeline.queue_capacity,
        )?;
        self.pipeline = Some(pipeline);
        self.pipeline_n_samples_exp = settings.vis_n_samples_exp;
        self.status
            .update(|v| v.acquisition = AcquisitionState::Streaming);
        info!(
            "Streaming visibilities of 2^{} samples",
            settings.vis_n_samples_exp
        );
        Ok(())
    }

    fn publish_latest(&self, assembled: &AssembledVis) {
        let baselines = Baselines::new(self.config.telescope.num_antenna);
        let latest = LatestVis {
            timestamp: assembled.set.timestamp,
            data: baselines
                .pairs()
                .iter()
                .zip(assembled.set.vis.iter())
                .map(|(&(i, j), v)| BaselineVis {
                    i,
                    j,
                    re: v.re,
                    im: v.im,
                })
                .collect(),
            means: assembled.means.clone(),
        };
        let status = assembled.status.clone();
        self.status.update(|v| {
            v.latest_vis = Some(latest);
            v.hardware = Some(status);
        });
    }

    /// Persist everything in the batch, then clear it. The batch is left as
    /// it was if anything fails.
    fn flush_vis_batch(&mut self, settings: &OperatorSettings) -> Result<(), ControllerError> {
        if !settings.vis_save {
            debug!("Not saving {} visibility sets", self.vis_batch.len());
            self.vis_batch.clear();
            return Ok(());
        }

        let num_antenna = self.config.telescope.num_antenna;
        let batch = VisBatchFile {
            timestamp: Utc::now(),
            num_antenna,
            n_samples: n_samples_from_exp("vis", self.pipeline_n_samples_exp)?,
            antenna_positions: settings.antenna_positions.clone(),
            gains: self.catalog.get_gain()?,
            baselines: Baselines::new(num_antenna).pairs().to_vec(),
            data: self.vis_batch.clone(),
        };
        write_vis_batch(&*self.catalog, &self.config.vis.base_path, batch)?;
        self.vis_batch.clear();
        Ok(())
    }
}
