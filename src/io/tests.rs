// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use chrono::TimeZone;
use tempfile::tempdir;

use super::*;
use crate::{c64, catalog::JsonCatalog};

#[test]
fn test_timestamped_path() {
    let t = Utc
        .with_ymd_and_hms(2023, 5, 7, 9, 4, 11)
        .unwrap()
        .checked_add_signed(chrono::Duration::microseconds(123456))
        .unwrap();
    assert_eq!(
        timestamped_path(Path::new("/data/vis"), "vis", t),
        PathBuf::from("/data/vis/2023/5/7/vis_2023-05-07_09_04_11.123456.json.gz")
    );
}

#[test]
fn test_create_timestamp_and_path_makes_directories() {
    let dir = tempdir().unwrap();
    let (timestamp, path) = create_timestamp_and_path(dir.path(), "data").unwrap();
    assert!(path.parent().unwrap().is_dir());
    assert!(path.starts_with(dir.path().join(timestamp.year().to_string())));
    assert!(path
        .file_name()
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("data_"));
}

#[test]
fn test_sha256_checksum() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("abc");
    std::fs::write(&path, b"abc").unwrap();
    assert_eq!(
        sha256_checksum(&path).unwrap(),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );

    // Bigger than one block.
    std::fs::write(&path, vec![0u8; 3 * CHECKSUM_BLOCK_SIZE / 2]).unwrap();
    assert_eq!(sha256_checksum(&path).unwrap().len(), 64);

    assert!(matches!(
        sha256_checksum(&dir.path().join("missing")),
        Err(PersistenceError::IO { .. })
    ));
}

#[test]
fn test_raw_capture_is_saved_and_recorded() {
    let dir = tempdir().unwrap();
    let catalog = JsonCatalog::in_memory(2);
    let capture = RawCaptureFile {
        timestamp: Utc::now(),
        num_antenna: 2,
        sampling_frequency: 16.368e6,
        n_samples: 4,
        antenna_positions: vec![[0.0; 3], [1.0, 0.0, 0.0]],
        gains: Gains::unity(2),
        sample_delay: 9.0,
        data: vec![vec![0, 1, 1, 0], vec![1, 1, 0, 0]],
    };
    let handle = write_raw_capture(&catalog, dir.path(), capture.clone()).unwrap();

    assert!(handle.filename.starts_with(dir.path()));
    assert_eq!(handle.checksum, sha256_checksum(&handle.filename).unwrap());
    let listed = catalog.list_file_handles(DataCategory::Raw).unwrap();
    assert_eq!(listed, vec![handle.clone()]);

    let read: RawCaptureFile = read_container(&handle.filename).unwrap();
    assert_eq!(read.data, capture.data);
    assert_eq!(read.antenna_positions, capture.antenna_positions);
    assert_eq!(read.gains, capture.gains);
    assert_eq!(read.sample_delay, 9.0);
}

#[test]
fn test_vis_batch_is_saved_and_recorded() {
    let dir = tempdir().unwrap();
    let catalog = JsonCatalog::in_memory(3);
    let sets = (0..3)
        .map(|i| VisibilitySet {
            timestamp: Utc::now(),
            vis: vec![c64::new(i as f64, -0.5); 3],
        })
        .collect::<Vec<_>>();
    let batch = VisBatchFile {
        timestamp: Utc::now(),
        num_antenna: 3,
        n_samples: 1 << 24,
        antenna_positions: vec![[0.0; 3]; 3],
        gains: Gains::unity(3),
        baselines: vec![(0, 1), (0, 2), (1, 2)],
        data: sets.clone(),
    };
    let handle = write_vis_batch(&catalog, dir.path(), batch).unwrap();
    let name = handle.filename.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("vis_"));
    assert!(name.ends_with(".json.gz"));

    let read: VisBatchFile = read_container(&handle.filename).unwrap();
    assert_eq!(read.data, sets);
    assert_eq!(read.baselines, vec![(0, 1), (0, 2), (1, 2)]);
    assert_eq!(catalog.list_file_handles(DataCategory::Vis).unwrap().len(), 1);
    assert!(catalog.list_file_handles(DataCategory::Raw).unwrap().is_empty());
}

#[test]
fn test_unwritable_base_path() {
    let dir = tempdir().unwrap();
    // A file where a directory is needed.
    let base = dir.path().join("blocker");
    std::fs::write(&base, b"").unwrap();
    let catalog = JsonCatalog::in_memory(2);
    let batch = VisBatchFile {
        timestamp: Utc::now(),
        num_antenna: 2,
        n_samples: 1,
        antenna_positions: vec![[0.0; 3]; 2],
        gains: Gains::unity(2),
        baselines: vec![(0, 1)],
        data: vec![],
    };
    assert!(matches!(
        write_vis_batch(&catalog, &base, batch),
        Err(PersistenceError::CreateDir { .. })
    ));
    assert!(catalog.list_file_handles(DataCategory::Vis).unwrap().is_empty());
}
