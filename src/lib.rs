// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Acquisition control software for the TART radio telescope.

This crate decodes raw XNOR-correlator words into complex visibilities, drives
the correlator hardware through its acquisition modes, streams visibilities
through a two-stage capture/assembly pipeline and keeps bounded on-disk caches
of what gets captured.
 */

pub mod analysis;
pub mod cache;
pub mod catalog;
mod cli;
pub mod config;
pub mod constants;
pub mod controller;
pub mod correlator;
pub mod hardware;
pub mod io;
pub mod pipeline;
pub mod service;

// Re-exports.
pub use cli::{Tart, TartError};

/// Double-precision complex numbers.
#[allow(non_camel_case_types)]
pub type c64 = num_complex::Complex64;
