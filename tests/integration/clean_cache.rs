// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use tempfile::TempDir;

use crate::{get_cmd_output, small_config, tart, write_config, NUM_ANTENNA};
use tart_acquire::catalog::{Catalog, DataCategory, JsonCatalog};

#[test]
fn test_clean_cache_keeps_the_newest_entries() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let mut config = small_config(tmp_dir.path());
    config.cache.max_entries = 3;
    let config_file = write_config(tmp_dir.path(), &config);
    let catalog_path = config.catalog_path.clone().unwrap();

    std::fs::create_dir_all(&config.vis.base_path).unwrap();
    let files = {
        let catalog = JsonCatalog::open(&catalog_path, NUM_ANTENNA).unwrap();
        (0..5)
            .map(|i| {
                let path = config.vis.base_path.join(format!("vis_{i}.json.gz"));
                std::fs::write(&path, b"").unwrap();
                catalog
                    .insert_file_handle(DataCategory::Vis, &path, "00")
                    .unwrap();
                path
            })
            .collect::<Vec<_>>()
    };

    let cmd = tart()
        .arg("clean-cache")
        .arg(config_file.display().to_string())
        .ok();
    assert!(cmd.is_ok(), "clean-cache failed: {}", cmd.err().unwrap());
    let (stdout, stderr) = get_cmd_output(cmd);
    assert!(stderr.is_empty(), "stderr wasn't empty: {stderr}");
    assert!(stdout.contains("evicted 2"), "{stdout}");

    let catalog = JsonCatalog::open(&catalog_path, NUM_ANTENNA).unwrap();
    assert_eq!(catalog.list_file_handles(DataCategory::Vis).unwrap().len(), 3);
    for (i, file) in files.iter().enumerate() {
        assert_eq!(file.exists(), i >= 2, "{}", file.display());
    }
    // Raw had nothing to do, so it's healthy.
    assert!(catalog.get_cache_state(DataCategory::Raw).unwrap().is_some());
}
