// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

use super::GlobError;
use crate::catalog::CatalogError;

/// Persistence failures are recoverable: whatever was being saved is kept and
/// tried again later.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Couldn't create directory '{path}': {err}")]
    CreateDir { path: String, err: std::io::Error },

    #[error("Couldn't encode '{path}': {err}")]
    Encode {
        path: String,
        err: serde_json::Error,
    },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Glob(#[from] GlobError),

    #[error("IO error on '{path}': {err}")]
    IO { path: String, err: std::io::Error },
}
