// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{
    str::FromStr,
    time::{Duration, Instant},
};

use approx::assert_abs_diff_eq;
use ndarray::Array1;
use serial_test::serial;
use tempfile::{tempdir, TempDir};

use super::{diag::channel_spectrum, *};
use crate::{
    catalog::{DataCategory, JsonCatalog},
    analysis::power_to_db,
    config::{default_antenna_positions, ConfigError, MAX_SAMPLES_EXP},
    constants::PSD_NUM_BINS,
    correlator::{num_baselines, RawFrame},
    hardware::{share_hardware, DebugMode, HardwareStatus, SimulatedCorrelator},
    io::{read_container, RawCaptureFile, VisBatchFile},
};

const NUM_ANTENNA: usize = 3;

fn test_config(dir: &TempDir) -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.telescope.num_antenna = NUM_ANTENNA;
    config.telescope.antenna_positions = default_antenna_positions(NUM_ANTENNA);
    config.raw.n_samples_exp = 8;
    config.raw.base_path = dir.path().join("raw");
    config.vis.n_samples_exp = 10;
    config.vis.chunk_size = 2;
    config.vis.base_path = dir.path().join("vis");
    config.diagnostic.phase_samples = 5;
    config.diagnostic.spectre.nfft = 256;
    config.diagnostic.spectre.n_samples_exp = 10;
    config.hardware.simulator.phase = 3;
    config.hardware.simulator.ready_percent = 100.0;
    config.hardware.simulator.frame_interval_secs = 0.005;
    config.validate().unwrap();
    config
}

struct Fixture {
    controller: Controller,
    catalog: Arc<JsonCatalog>,
    operator: OperatorHandle,
    _dir: TempDir,
}

fn fixture_with(configure: impl FnOnce(&mut RuntimeConfig)) -> Fixture {
    let dir = tempdir().unwrap();
    let mut config = test_config(&dir);
    configure(&mut config);
    let hardware = share_hardware(Box::new(SimulatedCorrelator::from_config(&config)));
    let catalog = Arc::new(JsonCatalog::in_memory(NUM_ANTENNA));
    let (status, operator) = new_status(&config);
    let controller = Controller::new(config, hardware, catalog.clone(), status);
    Fixture {
        controller,
        catalog,
        operator,
        _dir: dir,
    }
}

fn fixture() -> Fixture {
    fixture_with(|_| ())
}

#[test]
fn test_mode_names() {
    assert_eq!(ControllerMode::VisibilityStream.to_string(), "vis");
    assert_eq!(
        ControllerMode::from_str("diag").unwrap(),
        ControllerMode::Diagnostic
    );
    assert_eq!(LoopMode::LoopN.to_string(), "loop_n");
    assert_eq!(CalibrationState::Running.to_string(), "running");
    assert_eq!(delay_step(9.0), 9);
    assert_eq!(delay_step(11.6), 0);
    assert_eq!(delay_step(2.5), 3);
}

#[test]
fn test_initial_state_is_off() {
    let f = fixture();
    assert_eq!(f.controller.mode(), ControllerMode::Off);
    assert_eq!(f.operator.view().mode, ControllerMode::Off);
    assert!(!f.controller.pipeline_running());
}

#[test]
fn test_set_state_to_current_mode_is_a_no_op() {
    let mut f = fixture();
    f.controller.set_state(ControllerMode::Off);
    assert_eq!(f.controller.mode(), ControllerMode::Off);
    f.controller.set_state(ControllerMode::RawCapture);
    assert_eq!(f.controller.mode(), ControllerMode::RawCapture);
    assert_eq!(f.operator.view().mode, ControllerMode::RawCapture);
}

#[test]
fn test_operator_requests() {
    let mut f = fixture_with(|c| {
        c.modes_available = vec![ControllerMode::Off, ControllerMode::Diagnostic]
    });
    f.operator.request_mode(ControllerMode::Diagnostic);
    // Nothing happens until the controller looks.
    assert_eq!(f.controller.mode(), ControllerMode::Off);
    f.controller.apply_operator_request();
    assert_eq!(f.controller.mode(), ControllerMode::Diagnostic);

    f.operator.request_mode(ControllerMode::VisibilityStream);
    f.controller.apply_operator_request();
    assert_eq!(f.controller.mode(), ControllerMode::Diagnostic);
}

#[test]
#[serial]
fn test_diagnostic_sample_delay() {
    let mut f = fixture();
    f.controller.set_state(ControllerMode::Diagnostic);
    let report = f.controller.run_diagnostic().unwrap();

    // Every antenna reports phase 3, so the delay is (3 + 6) mod 12.
    assert_eq!(report.sample_delay, 9.0);
    assert_eq!(f.catalog.get_sample_delay().unwrap(), 9.0);

    assert_eq!(report.channels.len(), NUM_ANTENNA);
    for channel in &report.channels {
        assert_eq!(channel.phase.measured, 3);
        assert_abs_diff_eq!(channel.phase.stability, 1.0, epsilon = 1e-12);
        assert!(channel.phase.ok);
        assert_eq!(channel.phase.n_samples, 5);
        assert_eq!(channel.spectrum.power_db.len(), PSD_NUM_BINS);
        assert_eq!(channel.spectrum.freq_mhz.len(), PSD_NUM_BINS);
        // Random bits are balanced.
        assert!(channel.radio.ok, "{:?}", channel.radio);
    }

    let view = f.operator.view();
    assert_eq!(view.sample_delay, Some(9.0));
    assert!(view.diagnostic_timestamp.is_some());
    assert!(view.channels.iter().all(|c| c.phase.is_some()));
    assert_eq!(view.acquisition, AcquisitionState::Idle);
}

#[test]
#[serial]
fn test_raw_capture_is_saved() {
    let mut f = fixture();
    f.catalog.insert_sample_delay(Utc::now(), 9.0).unwrap();
    f.controller.set_state(ControllerMode::RawCapture);
    let handle = f.controller.run_raw().unwrap().unwrap();

    let listed = f.catalog.list_file_handles(DataCategory::Raw).unwrap();
    assert_eq!(listed, vec![handle.clone()]);
    let capture: RawCaptureFile = read_container(&handle.filename).unwrap();
    assert_eq!(capture.num_antenna, NUM_ANTENNA);
    assert_eq!(capture.n_samples, 256);
    assert_eq!(capture.data.len(), NUM_ANTENNA);
    assert!(capture.data.iter().all(|row| row.len() == 256));
    assert_eq!(capture.sample_delay, 9.0);
    assert_eq!(capture.antenna_positions.len(), NUM_ANTENNA);

    // The hardware got the stored delay.
    assert_eq!(
        f.operator.view().hardware.unwrap().sample_delay,
        9
    );
}

#[test]
#[serial]
fn test_raw_capture_without_saving() {
    let mut f = fixture();
    f.operator.update(|s| s.raw_save = false);
    f.controller.set_state(ControllerMode::RawCapture);
    assert!(f.controller.run_raw().unwrap().is_none());
    assert!(f
        .catalog
        .list_file_handles(DataCategory::Raw)
        .unwrap()
        .is_empty());
}

/// Run visibility cycles until `done` or a deadline passes.
fn run_vis_until(f: &mut Fixture, mut done: impl FnMut(&Fixture) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done(f) {
        assert!(Instant::now() < deadline, "timed out");
        f.controller.run();
    }
}

#[test]
#[serial]
fn test_vis_stream_persists_chunks() {
    let mut f = fixture();
    f.controller.set_state(ControllerMode::VisibilityStream);
    f.controller.run();
    assert!(f.controller.pipeline_running());
    assert_eq!(f.operator.view().acquisition, AcquisitionState::Streaming);

    run_vis_until(&mut f, |f| {
        f.catalog.list_file_handles(DataCategory::Vis).unwrap().len() >= 2
    });

    let handles = f.catalog.list_file_handles(DataCategory::Vis).unwrap();
    let batch: VisBatchFile = read_container(&handles[0].filename).unwrap();
    assert_eq!(batch.data.len(), 2);
    assert_eq!(batch.baselines, vec![(0, 1), (0, 2), (1, 2)]);
    assert_eq!(batch.n_samples, 1 << 10);
    assert!(batch.data[0].timestamp <= batch.data[1].timestamp);
    assert!(f.controller.pending_vis() < 2);

    let latest = f.operator.view().latest_vis.unwrap();
    assert_eq!(latest.data.len(), num_baselines(NUM_ANTENNA));
    assert_eq!(latest.means.len(), NUM_ANTENNA);
    assert_eq!((latest.data[2].i, latest.data[2].j), (1, 2));

    // Leaving the mode stops the pipeline first.
    f.controller.set_state(ControllerMode::Off);
    assert!(!f.controller.pipeline_running());
    assert_eq!(f.operator.view().acquisition, AcquisitionState::Idle);
}

#[test]
#[serial]
fn test_vis_batch_is_kept_when_saving_fails() {
    let mut f = fixture_with(|c| {
        // A file where the directory tree should go.
        std::fs::create_dir_all(c.vis.base_path.parent().unwrap()).unwrap();
        std::fs::write(&c.vis.base_path, b"").unwrap();
    });
    f.controller.set_state(ControllerMode::VisibilityStream);
    run_vis_until(&mut f, |f| f.controller.pending_vis() >= 4);

    assert!(f
        .catalog
        .list_file_handles(DataCategory::Vis)
        .unwrap()
        .is_empty());
    let view = f.operator.view();
    assert!(view.failed_cycles > 0);
    assert!(view.last_error.unwrap().starts_with("vis"));
    f.controller.shutdown();
    assert!(!f.controller.pipeline_running());
}

#[test]
#[serial]
fn test_leaving_vis_discards_a_partial_chunk() {
    let mut f = fixture_with(|c| c.vis.chunk_size = 1000);
    f.controller.set_state(ControllerMode::VisibilityStream);
    run_vis_until(&mut f, |f| f.controller.pending_vis() >= 1);

    f.controller.set_state(ControllerMode::Off);
    assert_eq!(f.controller.pending_vis(), 0);

    // A new session starts from an empty batch.
    f.controller.set_state(ControllerMode::VisibilityStream);
    f.controller.run();
    assert!(f.controller.pipeline_running());
    assert_eq!(f.controller.pending_vis(), 0);
    f.controller.shutdown();
    assert!(f
        .catalog
        .list_file_handles(DataCategory::Vis)
        .unwrap()
        .is_empty());
}

#[test]
#[serial]
fn test_vis_exponent_change_starts_a_new_batch() {
    let mut f = fixture_with(|c| c.vis.chunk_size = 3);
    f.controller.set_state(ControllerMode::VisibilityStream);
    run_vis_until(&mut f, |f| f.controller.pending_vis() >= 1);
    let before = f.catalog.list_file_handles(DataCategory::Vis).unwrap();

    f.operator.update(|s| s.vis_n_samples_exp = 9);
    f.controller.run();
    assert_eq!(f.controller.pending_vis(), 0);
    run_vis_until(&mut f, |f| {
        f.catalog.list_file_handles(DataCategory::Vis).unwrap().len() > before.len()
    });
    f.controller.shutdown();

    // Only sets captured with the new accumulation go into new batches.
    for handle in f.catalog.list_file_handles(DataCategory::Vis).unwrap() {
        if before.contains(&handle) {
            continue;
        }
        let batch: VisBatchFile = read_container(&handle.filename).unwrap();
        assert_eq!(batch.n_samples, 1 << 9);
        assert_eq!(batch.data.len(), 3);
    }
}

#[test]
#[serial]
fn test_oversized_sample_exponents_fail_the_cycle() {
    let too_big = MAX_SAMPLES_EXP + 1;
    for (mode, what) in [
        (ControllerMode::VisibilityStream, "vis"),
        (ControllerMode::RawCapture, "raw"),
        (ControllerMode::Diagnostic, "diagnostic"),
    ] {
        for exp in [too_big, 64, u8::MAX] {
            let mut f = fixture();
            f.operator.update(|s| {
                s.vis_n_samples_exp = exp;
                s.raw_n_samples_exp = exp;
                s.diag_n_samples_exp = exp;
            });
            f.controller.set_state(mode);
            f.controller.run();

            assert!(!f.controller.pipeline_running());
            let view = f.operator.view();
            assert_eq!(view.failed_cycles, 1);
            assert_eq!(view.acquisition, AcquisitionState::Idle);
            let expected = ControllerError::from(ConfigError::SampleExponent {
                what,
                exp,
                max: MAX_SAMPLES_EXP,
            });
            assert_eq!(view.last_error.unwrap(), format!("{mode}: {expected}"));
        }
    }

    // The exponent is checked before anything is captured.
    let mut f = fixture();
    f.operator.update(|s| s.raw_n_samples_exp = 64);
    assert!(matches!(
        f.controller.run_raw(),
        Err(ControllerError::Config(ConfigError::SampleExponent { exp: 64, .. }))
    ));
    assert!(f.operator.view().hardware.is_none());
}

#[test]
#[serial]
fn test_streaming_resumes_after_a_bad_exponent_is_fixed() {
    let mut f = fixture();
    f.operator.update(|s| s.vis_n_samples_exp = 64);
    f.controller.set_state(ControllerMode::VisibilityStream);
    f.controller.run();
    assert!(!f.controller.pipeline_running());

    f.operator.update(|s| s.vis_n_samples_exp = 10);
    f.controller.run();
    assert!(f.controller.pipeline_running());
    assert_eq!(f.operator.view().failed_cycles, 1);
    f.controller.shutdown();
}

#[test]
fn test_stuck_channel_spectrum_has_no_dc_spike() {
    let floor = power_to_db(0.0);
    for value in [0, 1] {
        let bits = Array1::from_elem(4096, value);
        let spectrum = channel_spectrum(bits.view(), 16.368e6, 256).unwrap();
        assert_eq!(spectrum.power_db.len(), PSD_NUM_BINS);
        assert!(
            spectrum.power_db.iter().all(|&p| p == floor),
            "{:?}",
            &spectrum.power_db[..4]
        );
    }

    // An unbalanced channel toggling at fs/4 peaks there, not at DC.
    let bits = Array1::from_shape_fn(4096, |i| u8::from(i % 4 != 0));
    let spectrum = channel_spectrum(bits.view(), 16.368e6, 256).unwrap();
    let (i_max, _) = spectrum
        .power_db
        .iter()
        .enumerate()
        .fold((0, f64::MIN), |acc, (i, &p)| if p > acc.1 { (i, p) } else { acc });
    assert_abs_diff_eq!(spectrum.freq_mhz[i_max], 16.368 / 4.0, epsilon = 0.2);
}

/// A correlator whose transport has died.
struct DeadHardware;

impl CorrelatorHardware for DeadHardware {
    fn num_antenna(&self) -> usize {
        NUM_ANTENNA
    }
    fn read_register(&mut self, reg: u8) -> Result<u8, HardwareError> {
        Err(HardwareError::Transfer {
            reg,
            err: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"),
        })
    }
    fn write_register(&mut self, reg: u8, _value: u8) -> Result<(), HardwareError> {
        self.read_register(reg).map(|_| ())
    }
    fn reset(&mut self) -> Result<(), HardwareError> {
        self.write_register(0x0F, 1)
    }
    fn set_debug(&mut self, _mode: DebugMode) -> Result<(), HardwareError> {
        self.write_register(0x02, 0)
    }
    fn set_capture(&mut self, _on: bool, _source: Option<usize>) -> Result<(), HardwareError> {
        self.write_register(0x03, 0)
    }
    fn set_centre(&mut self, _on: bool) -> Result<(), HardwareError> {
        self.write_register(0x00, 0)
    }
    fn set_sample_delay(&mut self, _delay: u8) -> Result<(), HardwareError> {
        self.write_register(0x00, 0)
    }
    fn start_vis(&mut self, _n_samples_exp: u8) -> Result<(), HardwareError> {
        self.write_register(0x0C, 0)
    }
    fn start_acquisition(&mut self) -> Result<(), HardwareError> {
        self.write_register(0x0B, 0)
    }
    fn vis_ready(&mut self) -> Result<bool, HardwareError> {
        self.read_register(0x0D).map(|_| false)
    }
    fn data_ready(&mut self) -> Result<bool, HardwareError> {
        self.read_register(0x0B).map(|_| false)
    }
    fn read_status(&mut self) -> Result<HardwareStatus, HardwareError> {
        Err(HardwareError::Poisoned)
    }
    fn read_vis_frame(&mut self) -> Result<RawFrame, HardwareError> {
        Err(HardwareError::Poisoned)
    }
    fn read_data(&mut self, _num_words: usize) -> Result<Vec<u8>, HardwareError> {
        Err(HardwareError::Poisoned)
    }
}

#[test]
fn test_failed_cycles_are_caught_and_reported() {
    let dir = tempdir().unwrap();
    let config = test_config(&dir);
    let (status, operator) = new_status(&config);
    let mut controller = Controller::new(
        config,
        share_hardware(Box::new(DeadHardware)),
        Arc::new(JsonCatalog::in_memory(NUM_ANTENNA)),
        status,
    );

    for (i, mode) in [ControllerMode::RawCapture, ControllerMode::Diagnostic]
        .into_iter()
        .enumerate()
    {
        controller.set_state(mode);
        controller.run();
        let view = operator.view();
        assert_eq!(view.failed_cycles, i as u64 + 1);
        assert!(view.last_error.unwrap().starts_with(&mode.to_string()));
        assert_eq!(view.acquisition, AcquisitionState::Idle);
    }
}

#[test]
fn test_channel_flags_are_mirrored() {
    let mut f = fixture_with(|c| c.modes_available = vec![ControllerMode::Off]);
    f.catalog.set_channel_enabled(1, false).unwrap();
    f.controller.run();
    let view = f.operator.view();
    assert!(view.channels[0].enabled);
    assert!(!view.channels[1].enabled);
    assert!(view.last_cycle.is_some());
    assert!(view.last_error.is_none());
}
