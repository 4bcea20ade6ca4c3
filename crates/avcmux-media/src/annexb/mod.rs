//! Annex-B elementary stream scanning.
//!
//! The scanner walks an H.264 byte stream once, recording every NAL unit
//! delimited by a 4-byte start code and capturing the stream's single SPS
//! and PPS. Its [`ScanResult`] is the frame index the container writer
//! builds its sample tables from.

mod capture;
mod nal;
mod scanner;
mod start_code;

pub use capture::{CaptureState, ParameterSetCapture, INITIAL_PARAMETER_SET_CAPACITY};
pub use nal::{FrameIndex, NalRecord, NalType, NAL_TYPE_MASK};
pub use scanner::{scan_path, scan_reader, ScanResult, Scanner, INITIAL_RECORD_CAPACITY};
pub use start_code::{StartCodeMatcher, START_CODE, START_CODE_LEN};

/// Join NAL unit payloads into an Annex-B stream, each behind a 4-byte start code.
pub fn to_annexb(nal_units: &[&[u8]]) -> Vec<u8> {
    let len = nal_units.iter().map(|n| n.len() + START_CODE_LEN).sum();
    let mut out = Vec::with_capacity(len);
    for nal in nal_units {
        out.extend_from_slice(&START_CODE);
        out.extend_from_slice(nal);
    }
    out
}
