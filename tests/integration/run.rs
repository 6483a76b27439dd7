// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use tempfile::TempDir;

use crate::{get_cmd_output, small_config, tart, write_config, NUM_ANTENNA};
use tart_acquire::{
    catalog::{Catalog, DataCategory, JsonCatalog},
    io::data_files_under,
};

#[test]
fn test_run_raw_capture_for_a_while() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let config = small_config(tmp_dir.path());
    let config_file = write_config(tmp_dir.path(), &config);

    #[rustfmt::skip]
    let cmd = tart()
        .args([
            "run", &config_file.display().to_string(),
            "--simulate",
            "--mode", "raw",
            "--duration", "1",
        ])
        .ok();
    assert!(cmd.is_ok(), "run failed: {}", cmd.err().unwrap());
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("Control service stopped"), "{stdout}");

    let catalog = JsonCatalog::open(&config.catalog_path.unwrap(), NUM_ANTENNA).unwrap();
    let handles = catalog.list_file_handles(DataCategory::Raw).unwrap();
    assert!(!handles.is_empty());
    let on_disk = data_files_under(&config.raw.base_path).unwrap();
    for handle in &handles {
        assert!(on_disk.contains(&handle.filename));
    }
}

#[test]
fn test_run_rejects_a_negative_duration() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let config_file = write_config(tmp_dir.path(), &small_config(tmp_dir.path()));
    let cmd = tart()
        .args([
            "run",
            &config_file.display().to_string(),
            "--simulate",
            "--duration=-1",
        ])
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("run duration"), "{stderr}");
}
