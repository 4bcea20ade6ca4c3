//! avcmux-media: H.264 Annex-B to MP4 muxing without re-encoding
//!
//! # Modules
//!
//! - `annexb` - Start-code scanning, NAL unit index, SPS/PPS capture
//! - `mp4` - Box tree, avcC, movie layout, streaming writer and read-back
//! - `convert` - Conversion session and the result-code entry point
//!
//! # Architecture
//!
//! Conversion is two strictly sequential passes over the source stream:
//!
//! 1. Scan the Annex-B stream once, recording every NAL unit's offset and
//!    type and capturing the single SPS and PPS
//! 2. Build the full box tree from the scan, so every box size and sample
//!    offset is known before the first byte is written
//! 3. Stream the header boxes, then copy each picture NAL unit from the
//!    source behind a 4-byte length prefix

pub mod annexb;
pub mod convert;
pub mod error;
pub mod mp4;

pub use annexb::{scan_path, scan_reader, ScanResult, Scanner};
pub use convert::{convert, create_destination, open_source, ConversionSession, ConversionSummary};
pub use error::{Error, ParameterSetKind, Result};
pub use mp4::{verify_file, MovieOptions, Mp4File, VerifyReport, VideoParams};
