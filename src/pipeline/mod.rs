// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The visibility capture/assembly pipeline.
//!
//! Two long-lived worker threads connected by bounded queues:
//!
//! * "capture" configures the correlator and then pushes every frame it
//!   produces (with a status snapshot) onto the raw queue;
//! * "assembly" periodically drains the raw queue, decodes each frame and
//!   pushes the resulting visibilities onto the output queue.
//!
//! Each worker has its own command channel. Neither worker ever blocks on its
//! command channel, and both check it at least once per polling interval, so
//! a stop request is honoured promptly. The workers share nothing except
//! these channels and (for capture) the hardware handle.

mod error;

pub use error::PipelineError;

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use crossbeam_utils::atomic::AtomicCell;
use log::{debug, error, trace, warn};
use scopeguard::defer_on_unwind;

use crate::{
    config::n_samples_from_exp,
    constants::{ASSEMBLY_THROTTLE, READY_POLL_INTERVAL},
    correlator::{Decoder, RawFrame, VisibilitySet},
    hardware::{lock_hardware, DebugMode, HardwareError, HardwareStatus, SharedHardware},
};

/// Messages on a worker's command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Stop,
}

/// How the capture worker configures the correlator before it starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureSettings {
    pub debug: DebugMode,
    pub sample_delay: u8,
    pub n_samples_exp: u8,
}

/// A frame as it comes off the correlator.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub frame: RawFrame,
    pub status: HardwareStatus,
}

/// A decoded frame, ready for the controller.
#[derive(Debug, Clone)]
pub struct AssembledVis {
    /// Timestamped by the status snapshot taken when the frame was read.
    pub set: VisibilitySet,
    pub means: Vec<f64>,
    pub status: HardwareStatus,
}

/// A running pipeline. Dropping it without calling
/// [`VisPipeline::shutdown`] disconnects the command channels, which the
/// workers also treat as "stop".
pub struct VisPipeline {
    capture_cmd: Sender<Command>,
    assembly_cmd: Sender<Command>,
    capture: JoinHandle<Result<(), PipelineError>>,
    assembly: JoinHandle<Result<(), PipelineError>>,
    output: Receiver<AssembledVis>,
    /// Set if either worker has failed or panicked.
    error: Arc<AtomicCell<bool>>,
}

impl VisPipeline {
    pub fn start(
        hardware: SharedHardware,
        settings: CaptureSettings,
        num_antenna: usize,
        queue_capacity: usize,
    ) -> Result<VisPipeline, PipelineError> {
        let n_samples = n_samples_from_exp("vis", settings.n_samples_exp)?;
        let decoder = Decoder::new(num_antenna, n_samples)?;

        let (capture_cmd, rx_capture_cmd) = bounded(1);
        let (assembly_cmd, rx_assembly_cmd) = bounded(1);
        let (tx_raw, rx_raw) = bounded(queue_capacity);
        let (tx_out, rx_out) = bounded(queue_capacity);
        let error = Arc::new(AtomicCell::new(false));

        let capture = {
            let error = Arc::clone(&error);
            thread::Builder::new()
                .name("capture".to_string())
                .spawn(move || {
                    defer_on_unwind! { error.store(true); }
                    let result = capture_worker(&hardware, settings, &rx_capture_cmd, &tx_raw);
                    if result.is_err() {
                        error.store(true);
                    }
                    result
                })
                .expect("OS can create threads")
        };

        let assembly = {
            let error = Arc::clone(&error);
            thread::Builder::new()
                .name("assembly".to_string())
                .spawn(move || {
                    defer_on_unwind! { error.store(true); }
                    assembly_worker(&decoder, &rx_assembly_cmd, &rx_raw, &tx_out);
                    Ok(())
                })
                .expect("OS can create threads")
        };

        debug!("Started the visibility pipeline");
        Ok(VisPipeline {
            capture_cmd,
            assembly_cmd,
            capture,
            assembly,
            output: rx_out,
            error,
        })
    }

    pub fn output(&self) -> &Receiver<AssembledVis> {
        &self.output
    }

    /// Everything the assembly worker has produced so far.
    pub fn drain(&self) -> Vec<AssembledVis> {
        self.output.try_iter().collect()
    }

    /// Whether a worker has died. A failed pipeline should be shut down and
    /// started again.
    pub fn has_failed(&self) -> bool {
        self.error.load() || self.capture.is_finished() || self.assembly.is_finished()
    }

    /// Ask both workers to stop, then wait up to `timeout` for each of them.
    /// A worker that doesn't stop in time is abandoned; the first such worker
    /// is reported as an error.
    pub fn shutdown(self, timeout: Duration) -> Result<(), PipelineError> {
        // A send only fails if the worker is already gone.
        let _ = self.capture_cmd.try_send(Command::Stop);
        let _ = self.assembly_cmd.try_send(Command::Stop);

        let capture = join_with_timeout("capture", self.capture, timeout);
        let assembly = join_with_timeout("assembly", self.assembly, timeout);
        for (worker, result) in [("capture", &capture), ("assembly", &assembly)] {
            // The worker's own failure was already logged when it happened.
            if let Ok(Err(e)) = result {
                debug!("The {worker} worker had failed: {e}");
            }
        }
        debug!("Visibility pipeline stopped");
        capture.and(assembly).map(|_| ())
    }
}

/// Wait up to `timeout` for a thread to finish.
pub(crate) fn join_with_timeout<T>(
    worker: &str,
    handle: JoinHandle<T>,
    timeout: Duration,
) -> Result<T, PipelineError> {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            // Threads can't be killed; this one is detached and will exit
            // when it next checks its command channel.
            error!("The {worker} worker didn't stop within {timeout:?}; abandoning it");
            return Err(PipelineError::ShutdownTimeout {
                worker: worker.to_string(),
                timeout,
            });
        }
        thread::sleep(READY_POLL_INTERVAL);
    }
    handle.join().map_err(|_| PipelineError::Panicked {
        worker: worker.to_string(),
    })
}

/// `true` if the worker should stop.
pub(crate) fn stop_requested(commands: &Receiver<Command>) -> bool {
    match commands.try_recv() {
        Ok(Command::Stop) | Err(TryRecvError::Disconnected) => true,
        Err(TryRecvError::Empty) => false,
    }
}

fn configure_capture(
    hardware: &SharedHardware,
    settings: CaptureSettings,
) -> Result<(), HardwareError> {
    let mut hw = lock_hardware(hardware)?;
    hw.reset()?;
    hw.set_debug(settings.debug)?;
    hw.set_capture(true, None)?;
    hw.set_centre(true)?;
    hw.set_sample_delay(settings.sample_delay)?;
    hw.start_vis(settings.n_samples_exp)?;
    Ok(())
}

/// Read a frame if one is ready. The hardware is only locked for the poll
/// and the read.
fn try_read_frame(hardware: &SharedHardware) -> Result<Option<CapturedFrame>, HardwareError> {
    let mut hw = lock_hardware(hardware)?;
    if !hw.vis_ready()? {
        return Ok(None);
    }
    let frame = hw.read_vis_frame()?;
    let status = hw.read_status()?;
    Ok(Some(CapturedFrame { frame, status }))
}

fn capture_worker(
    hardware: &SharedHardware,
    settings: CaptureSettings,
    commands: &Receiver<Command>,
    tx_raw: &Sender<CapturedFrame>,
) -> Result<(), PipelineError> {
    if let Err(e) = configure_capture(hardware, settings) {
        error!("Couldn't configure the correlator for capture: {e}");
        return Err(e.into());
    }
    debug!(
        "Capturing frames of 2^{} samples, sample delay {}",
        settings.n_samples_exp, settings.sample_delay
    );

    while !stop_requested(commands) {
        match try_read_frame(hardware) {
            Ok(Some(captured)) => {
                trace!("Captured a frame at {}", captured.status.timestamp);
                match tx_raw.try_send(captured) {
                    Ok(()) => (),
                    Err(TrySendError::Full(_)) => {
                        warn!("The raw frame queue is full; dropping a frame")
                    }
                    // The assembly worker has gone away.
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
            Ok(None) => thread::sleep(READY_POLL_INTERVAL),
            Err(HardwareError::Poisoned) => return Err(HardwareError::Poisoned.into()),
            Err(e) => {
                warn!("Frame capture failed: {e}");
                thread::sleep(READY_POLL_INTERVAL);
            }
        }
    }
    debug!("Capture worker exiting");
    Ok(())
}

fn assembly_worker(
    decoder: &Decoder,
    commands: &Receiver<Command>,
    rx_raw: &Receiver<CapturedFrame>,
    tx_out: &Sender<AssembledVis>,
) {
    loop {
        thread::sleep(ASSEMBLY_THROTTLE);
        if stop_requested(commands) {
            break;
        }

        for CapturedFrame { frame, status } in rx_raw.try_iter() {
            let decoded = match decoder.decode(&frame) {
                Ok(d) => d,
                Err(e) => {
                    warn!("Dropping a frame: {e}");
                    continue;
                }
            };
            let assembled = AssembledVis {
                set: VisibilitySet {
                    timestamp: status.timestamp,
                    vis: decoded.vis,
                },
                means: decoded.means,
                status,
            };
            match tx_out.try_send(assembled) {
                Ok(()) => (),
                Err(TrySendError::Full(_)) => {
                    warn!("The visibility output queue is full; dropping a visibility set")
                }
                Err(TrySendError::Disconnected(_)) => {
                    debug!("Assembly worker exiting; nobody is listening");
                    return;
                }
            }
        }
    }
    debug!("Assembly worker exiting");
}
