// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The catalog of persisted files, calibration and channel settings.
//!
//! The acquisition core only needs a handful of queries, captured by
//! [`Catalog`]. [`JsonCatalog`] implements them over a single json document,
//! either kept in memory or mirrored to a file after every change.

mod error;

pub use error::CatalogError;

use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// The kinds of persisted data, each with its own retention window.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DataCategory {
    #[strum(serialize = "raw")]
    Raw,
    #[strum(serialize = "vis")]
    Vis,
}

/// A persisted file known to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHandle {
    pub id: u64,
    pub filename: PathBuf,
    /// Hex-encoded SHA-256 of the file's contents.
    pub checksum: String,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleDelay {
    pub timestamp: DateTime<Utc>,
    pub delay: f64,
}

/// Per-antenna calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gains {
    pub gain: Vec<f64>,
    /// \[radians\]
    pub phase: Vec<f64>,
}

impl Gains {
    /// Unit gain and zero phase for every antenna.
    pub fn unity(num_antenna: usize) -> Gains {
        Gains {
            gain: vec![1.0; num_antenna],
            phase: vec![0.0; num_antenna],
        }
    }
}

/// The health of a retention loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheProcessState {
    pub state: String,
    pub timestamp: DateTime<Utc>,
}

/// The queries the acquisition core makes of the persistence layer.
/// Implementations are shared between threads.
pub trait Catalog: Send + Sync {
    fn insert_file_handle(
        &self,
        category: DataCategory,
        filename: &Path,
        checksum: &str,
    ) -> Result<FileHandle, CatalogError>;

    /// Newest first. Handles created at the same instant are ordered by
    /// descending id.
    fn list_file_handles(&self, category: DataCategory) -> Result<Vec<FileHandle>, CatalogError>;

    fn delete_file_handle(&self, category: DataCategory, id: u64) -> Result<(), CatalogError>;

    /// The most recently stored sample delay, or 0 if there has never been
    /// one.
    fn get_sample_delay(&self) -> Result<f64, CatalogError>;

    fn insert_sample_delay(&self, timestamp: DateTime<Utc>, delay: f64)
        -> Result<(), CatalogError>;

    fn get_gain(&self) -> Result<Gains, CatalogError>;

    fn insert_gain(&self, gain: &[f64], phase: &[f64]) -> Result<(), CatalogError>;

    fn get_channel_enabled(&self, idx: usize) -> Result<bool, CatalogError>;

    fn set_channel_enabled(&self, idx: usize, enabled: bool) -> Result<(), CatalogError>;

    fn set_cache_state(&self, category: DataCategory, state: &str) -> Result<(), CatalogError>;

    fn get_cache_state(
        &self,
        category: DataCategory,
    ) -> Result<Option<CacheProcessState>, CatalogError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogState {
    next_id: u64,
    files: BTreeMap<DataCategory, Vec<FileHandle>>,
    sample_delays: Vec<SampleDelay>,
    gains: Gains,
    channels_enabled: Vec<bool>,
    cache_states: BTreeMap<DataCategory, CacheProcessState>,
}

impl CatalogState {
    fn new(num_antenna: usize) -> CatalogState {
        CatalogState {
            next_id: 1,
            files: BTreeMap::new(),
            sample_delays: vec![],
            gains: Gains::unity(num_antenna),
            channels_enabled: vec![true; num_antenna],
            cache_states: BTreeMap::new(),
        }
    }
}

/// A [`Catalog`] held in a json document.
pub struct JsonCatalog {
    path: Option<PathBuf>,
    state: Mutex<CatalogState>,
}

impl JsonCatalog {
    /// A catalog that is lost when dropped.
    pub fn in_memory(num_antenna: usize) -> JsonCatalog {
        JsonCatalog {
            path: None,
            state: Mutex::new(CatalogState::new(num_antenna)),
        }
    }

    /// Open the catalog at `path`, creating a fresh one if the file doesn't
    /// exist yet.
    pub fn open(path: &Path, num_antenna: usize) -> Result<JsonCatalog, CatalogError> {
        let state = if path.exists() {
            debug!("Reading catalog {}", path.display());
            let file = File::open(path).map_err(|err| CatalogError::IO {
                path: path.display().to_string(),
                err,
            })?;
            serde_json::from_reader(BufReader::new(file)).map_err(|err| CatalogError::Json {
                path: path.display().to_string(),
                err,
            })?
        } else {
            debug!("Creating catalog {}", path.display());
            CatalogState::new(num_antenna)
        };
        let catalog = JsonCatalog {
            path: Some(path.to_path_buf()),
            state: Mutex::new(state),
        };
        catalog.flush(&*catalog.lock()?)?;
        Ok(catalog)
    }

    fn lock(&self) -> Result<MutexGuard<CatalogState>, CatalogError> {
        self.state.lock().map_err(|_| CatalogError::Poisoned)
    }

    /// Mirror the state to disk, if there's a disk to mirror to. The document
    /// is written alongside and then renamed over the old one.
    fn flush(&self, state: &CatalogState) -> Result<(), CatalogError> {
        let path = match &self.path {
            Some(p) => p,
            None => return Ok(()),
        };
        let io_err = |err| CatalogError::IO {
            path: path.display().to_string(),
            err,
        };
        let tmp = path.with_extension("json.tmp");
        let mut buf = BufWriter::new(File::create(&tmp).map_err(io_err)?);
        serde_json::to_writer_pretty(&mut buf, state).map_err(|err| CatalogError::Json {
            path: tmp.display().to_string(),
            err,
        })?;
        buf.flush().map_err(io_err)?;
        drop(buf);
        std::fs::rename(&tmp, path).map_err(io_err)?;
        trace!("Flushed catalog {}", path.display());
        Ok(())
    }

    /// Apply `f` to the state and persist the result.
    fn modify<T>(
        &self,
        f: impl FnOnce(&mut CatalogState) -> Result<T, CatalogError>,
    ) -> Result<T, CatalogError> {
        let mut state = self.lock()?;
        let out = f(&mut state)?;
        self.flush(&state)?;
        Ok(out)
    }
}

impl Catalog for JsonCatalog {
    fn insert_file_handle(
        &self,
        category: DataCategory,
        filename: &Path,
        checksum: &str,
    ) -> Result<FileHandle, CatalogError> {
        self.modify(|state| {
            let handle = FileHandle {
                id: state.next_id,
                filename: filename.to_path_buf(),
                checksum: checksum.to_string(),
                created: Utc::now(),
            };
            state.next_id += 1;
            state
                .files
                .entry(category)
                .or_default()
                .push(handle.clone());
            Ok(handle)
        })
    }

    fn list_file_handles(&self, category: DataCategory) -> Result<Vec<FileHandle>, CatalogError> {
        let state = self.lock()?;
        let mut handles = state.files.get(&category).cloned().unwrap_or_default();
        handles.sort_unstable_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
        Ok(handles)
    }

    fn delete_file_handle(&self, category: DataCategory, id: u64) -> Result<(), CatalogError> {
        self.modify(|state| {
            let handles = state.files.entry(category).or_default();
            match handles.iter().position(|h| h.id == id) {
                Some(i) => {
                    handles.remove(i);
                    Ok(())
                }
                None => Err(CatalogError::NoSuchHandle { category, id }),
            }
        })
    }

    fn get_sample_delay(&self) -> Result<f64, CatalogError> {
        let state = self.lock()?;
        Ok(state
            .sample_delays
            .iter()
            .max_by_key(|d| d.timestamp)
            .map(|d| d.delay)
            .unwrap_or(0.0))
    }

    fn insert_sample_delay(
        &self,
        timestamp: DateTime<Utc>,
        delay: f64,
    ) -> Result<(), CatalogError> {
        self.modify(|state| {
            state.sample_delays.push(SampleDelay { timestamp, delay });
            Ok(())
        })
    }

    fn get_gain(&self) -> Result<Gains, CatalogError> {
        Ok(self.lock()?.gains.clone())
    }

    fn insert_gain(&self, gain: &[f64], phase: &[f64]) -> Result<(), CatalogError> {
        self.modify(|state| {
            let expected = state.channels_enabled.len();
            if gain.len() != expected || phase.len() != expected {
                return Err(CatalogError::GainLength {
                    expected,
                    gain: gain.len(),
                    phase: phase.len(),
                });
            }
            state.gains = Gains {
                gain: gain.to_vec(),
                phase: phase.to_vec(),
            };
            Ok(())
        })
    }

    fn get_channel_enabled(&self, idx: usize) -> Result<bool, CatalogError> {
        let state = self.lock()?;
        state
            .channels_enabled
            .get(idx)
            .copied()
            .ok_or(CatalogError::ChannelIndex {
                idx,
                num: state.channels_enabled.len(),
            })
    }

    fn set_channel_enabled(&self, idx: usize, enabled: bool) -> Result<(), CatalogError> {
        self.modify(|state| {
            let num = state.channels_enabled.len();
            match state.channels_enabled.get_mut(idx) {
                Some(c) => {
                    *c = enabled;
                    Ok(())
                }
                None => Err(CatalogError::ChannelIndex { idx, num }),
            }
        })
    }

    fn set_cache_state(&self, category: DataCategory, state: &str) -> Result<(), CatalogError> {
        self.modify(|s| {
            s.cache_states.insert(
                category,
                CacheProcessState {
                    state: state.to_string(),
                    timestamp: Utc::now(),
                },
            );
            Ok(())
        })
    }

    fn get_cache_state(
        &self,
        category: DataCategory,
    ) -> Result<Option<CacheProcessState>, CatalogError> {
        Ok(self.lock()?.cache_states.get(&category).cloned())
    }
}
