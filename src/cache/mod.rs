// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Retention of persisted files.
//!
//! Each data category keeps only its newest `max_entries` files. Anything
//! older loses both its catalog row and its file. Nothing here ever loads
//! data.

mod error;

pub use error::CacheError;

use std::{
    collections::HashSet,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, info, warn};

use crate::{
    catalog::{Catalog, DataCategory},
    config::CacheConfig,
    io::data_files_under,
    pipeline::Command,
};

/// The health state recorded when a category is within its limit.
pub const CACHE_OK: &str = "OK";

/// What one cleanup cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub kept: usize,
    /// Catalog rows removed. Their files are gone too, or were already.
    pub evicted: Vec<PathBuf>,
    /// Evicted files that had already disappeared.
    pub missing: usize,
}

/// Evict everything beyond the newest `max_entries` files of a category.
pub fn cleanup_cycle(
    catalog: &dyn Catalog,
    category: DataCategory,
    max_entries: usize,
) -> Result<CleanupReport, CacheError> {
    let handles = catalog.list_file_handles(category)?;
    if handles.len() <= max_entries {
        catalog.set_cache_state(category, CACHE_OK)?;
        debug!("{category} cache has {} entries", handles.len());
        return Ok(CleanupReport {
            kept: handles.len(),
            ..Default::default()
        });
    }

    let mut report = CleanupReport {
        kept: max_entries,
        ..Default::default()
    };
    for handle in &handles[max_entries..] {
        catalog.delete_file_handle(category, handle.id)?;
        match std::fs::remove_file(&handle.filename) {
            Ok(()) => info!("Evicted {}", handle.filename.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(
                    "Evicted {}, but the file was already gone",
                    handle.filename.display()
                );
                report.missing += 1;
            }
            Err(e) => warn!("Couldn't delete {}: {e}", handle.filename.display()),
        }
        report.evicted.push(handle.filename.clone());
    }
    Ok(report)
}

/// Files beneath `base` that the catalog doesn't know about. These are only
/// reported, never deleted.
pub fn find_orphans(
    catalog: &dyn Catalog,
    category: DataCategory,
    base: &Path,
) -> Result<Vec<PathBuf>, CacheError> {
    let known = catalog
        .list_file_handles(category)?
        .into_iter()
        .map(|h| h.filename)
        .collect::<HashSet<_>>();
    let orphans = data_files_under(base)?
        .into_iter()
        .filter(|f| !known.contains(f))
        .collect::<Vec<_>>();
    for orphan in &orphans {
        warn!("{category} file {} isn't in the catalog", orphan.display());
    }
    Ok(orphans)
}

/// Run cleanup cycles every `config.interval()` until told to stop.
pub fn run_retention_loop(
    catalog: Arc<dyn Catalog>,
    category: DataCategory,
    base: PathBuf,
    config: CacheConfig,
    commands: Receiver<Command>,
) {
    info!(
        "Keeping the newest {} {category} files, checking every {:?}",
        config.max_entries,
        config.interval()
    );
    loop {
        if let Err(e) = cleanup_cycle(catalog.as_ref(), category, config.max_entries) {
            warn!("{category} cleanup failed: {e}");
        }
        if config.report_orphans {
            if let Err(e) = find_orphans(catalog.as_ref(), category, &base) {
                warn!("{category} orphan search failed: {e}");
            }
        }

        match commands.recv_timeout(config.interval()) {
            Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => (),
        }
    }
    debug!("{category} retention loop exiting");
}
