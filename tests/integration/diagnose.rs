// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use tempfile::TempDir;

use crate::{get_cmd_output, small_config, tart, write_config, NUM_ANTENNA};
use tart_acquire::catalog::{Catalog, JsonCatalog};

#[test]
fn test_diagnose_with_the_simulator() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let config = small_config(tmp_dir.path());
    let config_file = write_config(tmp_dir.path(), &config);

    let cmd = tart()
        .arg("diagnose")
        .arg(config_file.display().to_string())
        .arg("--simulate")
        .ok();
    assert!(cmd.is_ok(), "diagnose failed: {}", cmd.err().unwrap());
    let (stdout, stderr) = get_cmd_output(cmd);
    assert!(stderr.is_empty(), "stderr wasn't empty: {stderr}");
    // Every antenna reports phase step 3, so the delay is 3 + 6.
    assert!(stdout.contains("Sample delay: 9"), "{stdout}");
    assert!(stdout.contains("antenna  phase  stability"), "{stdout}");
    let rows = stdout
        .lines()
        .filter(|l| l.contains("      3      1.000"))
        .count();
    assert_eq!(rows, NUM_ANTENNA, "{stdout}");

    let catalog = JsonCatalog::open(&config.catalog_path.unwrap(), NUM_ANTENNA).unwrap();
    assert_abs_diff_eq!(catalog.get_sample_delay().unwrap(), 9.0);
}
