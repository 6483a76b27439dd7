// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Persisted data files.
//!
//! Raw captures and visibility batches are written as gzipped json
//! documents beneath a date-partitioned directory tree
//! (`base/year/month/day/`). Every file is checksummed after it has been
//! written, and the checksum is what ends up in the catalog.

mod error;
mod glob;
#[cfg(test)]
mod tests;

pub use error::PersistenceError;
pub use glob::{data_files_under, GlobError};

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Datelike, Utc};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use log::{debug, info};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    catalog::{Catalog, DataCategory, FileHandle, Gains},
    constants::DATA_FILE_EXTENSION,
    correlator::VisibilitySet,
};

const CHECKSUM_BLOCK_SIZE: usize = 64 * 1024;

/// A raw capture, one row of bits per antenna.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCaptureFile {
    pub timestamp: DateTime<Utc>,
    pub num_antenna: usize,
    /// \[Hz\]
    pub sampling_frequency: f64,
    pub n_samples: u64,
    pub antenna_positions: Vec<[f64; 3]>,
    pub gains: Gains,
    pub sample_delay: f64,
    pub data: Vec<Vec<u8>>,
}

/// A batch of visibility sets, in the order they were assembled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisBatchFile {
    pub timestamp: DateTime<Utc>,
    pub num_antenna: usize,
    pub n_samples: u64,
    pub antenna_positions: Vec<[f64; 3]>,
    pub gains: Gains,
    /// The antenna pair of each visibility.
    pub baselines: Vec<(usize, usize)>,
    pub data: Vec<VisibilitySet>,
}

/// The file a timestamped capture is written to, e.g.
/// `base/2023/5/17/vis_2023-05-17_09_04_11.123456.json.gz`.
pub fn timestamped_path(base: &Path, prefix: &str, timestamp: DateTime<Utc>) -> PathBuf {
    base.join(timestamp.year().to_string())
        .join(timestamp.month().to_string())
        .join(timestamp.day().to_string())
        .join(format!(
            "{prefix}_{}.{DATA_FILE_EXTENSION}",
            timestamp.format("%Y-%m-%d_%H_%M_%S%.6f")
        ))
}

/// Stamp "now" and make sure the directory for its file exists.
pub fn create_timestamp_and_path(
    base: &Path,
    prefix: &str,
) -> Result<(DateTime<Utc>, PathBuf), PersistenceError> {
    let timestamp = Utc::now();
    let path = timestamped_path(base, prefix, timestamp);
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|err| PersistenceError::CreateDir {
            path: dir.display().to_string(),
            err,
        })?;
    }
    Ok((timestamp, path))
}

/// The hex-encoded SHA-256 of a file's contents.
pub fn sha256_checksum(path: &Path) -> Result<String, PersistenceError> {
    let io_err = |err| PersistenceError::IO {
        path: path.display().to_string(),
        err,
    };
    let mut file = File::open(path).map_err(io_err)?;
    let mut hasher = Sha256::new();
    let mut block = vec![0; CHECKSUM_BLOCK_SIZE];
    loop {
        let n = file.read(&mut block).map_err(io_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&block[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Write `contents` as a gzipped json document.
pub fn write_container<T: Serialize>(path: &Path, contents: &T) -> Result<(), PersistenceError> {
    let io_err = |err| PersistenceError::IO {
        path: path.display().to_string(),
        err,
    };
    let file = File::create(path).map_err(io_err)?;
    let mut gz = GzEncoder::new(BufWriter::new(file), Compression::default());
    serde_json::to_writer(&mut gz, contents).map_err(|err| PersistenceError::Encode {
        path: path.display().to_string(),
        err,
    })?;
    gz.finish().map_err(io_err)?.flush().map_err(io_err)?;
    Ok(())
}

pub fn read_container<T: DeserializeOwned>(path: &Path) -> Result<T, PersistenceError> {
    let file = File::open(path).map_err(|err| PersistenceError::IO {
        path: path.display().to_string(),
        err,
    })?;
    serde_json::from_reader(GzDecoder::new(BufReader::new(file))).map_err(|err| {
        PersistenceError::Encode {
            path: path.display().to_string(),
            err,
        }
    })
}

/// Write a container, checksum it and record it in the catalog. The catalog
/// entry only appears once the file is complete.
pub fn save_and_record<T: Serialize>(
    catalog: &dyn Catalog,
    category: DataCategory,
    path: &Path,
    contents: &T,
) -> Result<FileHandle, PersistenceError> {
    write_container(path, contents)?;
    let checksum = sha256_checksum(path)?;
    debug!("{} sha256 {checksum}", path.display());
    let handle = catalog.insert_file_handle(category, path, &checksum)?;
    info!("Saved {category} file {}", path.display());
    Ok(handle)
}

/// Save a raw capture beneath `base` as `data_<timestamp>`.
pub fn write_raw_capture(
    catalog: &dyn Catalog,
    base: &Path,
    mut capture: RawCaptureFile,
) -> Result<FileHandle, PersistenceError> {
    let (timestamp, path) = create_timestamp_and_path(base, "data")?;
    capture.timestamp = timestamp;
    save_and_record(catalog, DataCategory::Raw, &path, &capture)
}

/// Save a visibility batch beneath `base` as `vis_<timestamp>`.
pub fn write_vis_batch(
    catalog: &dyn Catalog,
    base: &Path,
    mut batch: VisBatchFile,
) -> Result<FileHandle, PersistenceError> {
    let (timestamp, path) = create_timestamp_and_path(base, "vis")?;
    batch.timestamp = timestamp;
    save_and_record(catalog, DataCategory::Vis, &path, &batch)
}
