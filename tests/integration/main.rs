// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Integration tests.
//!
//! Some help for laying out these tests was taken from:
//! https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html

mod clean_cache;
mod cli_args;
mod diagnose;
mod run;

use std::{
    path::{Path, PathBuf},
    process::Output,
    str::from_utf8,
};

use assert_cmd::{output::OutputError, Command};

use tart_acquire::config::{default_antenna_positions, RuntimeConfig};

const NUM_ANTENNA: usize = 4;

fn tart() -> Command {
    Command::cargo_bin("tart-acquire").unwrap()
}

fn get_cmd_output(result: Result<Output, OutputError>) -> (String, String) {
    let output = match result {
        Ok(o) => o,
        Err(o) => o.as_output().unwrap().clone(),
    };
    (
        from_utf8(&output.stdout).unwrap().to_string(),
        from_utf8(&output.stderr).unwrap().to_string(),
    )
}

/// A small, fast configuration that keeps everything under `dir`, including a
/// file-backed catalog.
fn small_config(dir: &Path) -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.telescope.num_antenna = NUM_ANTENNA;
    config.telescope.antenna_positions = default_antenna_positions(NUM_ANTENNA);
    config.raw.n_samples_exp = 8;
    config.raw.base_path = dir.join("raw");
    config.vis.n_samples_exp = 10;
    config.vis.chunk_size = 2;
    config.vis.base_path = dir.join("vis");
    config.diagnostic.phase_samples = 3;
    config.diagnostic.spectre.nfft = 256;
    config.diagnostic.spectre.n_samples_exp = 10;
    config.cache.interval_secs = 0.1;
    config.hardware.simulator.phase = 3;
    config.hardware.simulator.ready_percent = 100.0;
    config.hardware.simulator.frame_interval_secs = 0.005;
    config.catalog_path = Some(dir.join("catalog.json"));
    config
}

/// Write a configuration as json and return its path.
fn write_config(dir: &Path, config: &RuntimeConfig) -> PathBuf {
    let path = dir.join("config.json");
    std::fs::write(&path, serde_json::to_string_pretty(config).unwrap()).unwrap();
    path
}
