// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Functions to glob persisted data files.

use std::path::{Path, PathBuf};

use glob::glob;
use thiserror::Error;

use crate::constants::DATA_FILE_EXTENSION;

/// Given a glob pattern, get all of the matches from the filesystem.
pub(crate) fn get_all_matches_from_glob(g: &str) -> Result<Vec<PathBuf>, GlobError> {
    let mut entries = vec![];
    for entry in glob(g)? {
        match entry {
            Ok(e) => entries.push(e),
            Err(e) => return Err(GlobError::GlobCrate(e)),
        }
    }
    Ok(entries)
}

/// Every data file anywhere beneath `base`. A `base` that doesn't exist has
/// no files.
pub fn data_files_under(base: &Path) -> Result<Vec<PathBuf>, GlobError> {
    let pattern = base.join("**").join(format!("*.{DATA_FILE_EXTENSION}"));
    let pattern = pattern.to_str().ok_or_else(|| GlobError::NotUtf8 {
        path: base.display().to_string(),
    })?;
    get_all_matches_from_glob(pattern)
}

#[derive(Error, Debug)]
/// Error type associated with glob helper functions.
pub enum GlobError {
    #[error("Can't glob beneath '{path}'; it isn't valid UTF-8")]
    NotUtf8 { path: String },

    #[error(transparent)]
    GlobCrate(#[from] glob::GlobError),

    #[error(transparent)]
    PatternError(#[from] glob::PatternError),
}
