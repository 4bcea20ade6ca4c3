//! avcmux - H.264 Annex-B to MP4 repackaging
//!
//! This library crate exposes configuration, output handling and report
//! formatting for the binary and for integration testing. The muxing itself lives in
//! `avcmux-media`.

pub mod config;
pub mod output;
pub mod report;
