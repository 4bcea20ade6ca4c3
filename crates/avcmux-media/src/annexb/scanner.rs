//! Single-pass Annex-B stream indexer.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use tracing::{debug, error, trace, warn};

use super::capture::{push_growing, ParameterSetCapture};
use super::nal::{FrameIndex, NalRecord, NalType};
use super::start_code::{StartCodeMatcher, START_CODE_LEN};
use crate::error::{Error, ParameterSetKind, Result};

/// Initial capacity of the NAL record list.
pub const INITIAL_RECORD_CAPACITY: usize = 1024;

/// Read size used by [`scan_reader`].
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Everything the container writer needs from the source stream.
#[derive(Debug, Clone)]
pub struct ScanResult {
    /// Every NAL unit in stream order, SPS/PPS included.
    pub records: Vec<NalRecord>,
    /// SPS payload, start code trimmed.
    pub sps: Vec<u8>,
    /// PPS payload, start code trimmed.
    pub pps: Vec<u8>,
    /// Number of picture NAL units.
    pub total_frame_count: u32,
    /// Number of IDR picture NAL units.
    pub sync_frame_count: u32,
    /// Total length of the source stream in bytes.
    pub stream_len: u64,
}

impl ScanResult {
    /// Picture records in sample order.
    pub fn pictures(&self) -> impl Iterator<Item = &NalRecord> + '_ {
        self.records.iter().filter(|r| r.is_picture())
    }

    /// 1-based sample numbers of IDR pictures, ascending.
    pub fn sync_sample_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.records.iter().filter_map(|r| match r.frame_index {
            FrameIndex::Picture(n) if r.nal_type.is_idr() => Some(n + 1),
            _ => None,
        })
    }

    /// Sum of all picture payload sizes.
    pub fn picture_bytes(&self) -> u64 {
        self.pictures().map(|r| r.byte_size).sum()
    }

    /// Profile, compatibility and level bytes from the SPS, if long enough.
    pub fn profile_level(&self) -> Option<(u8, u8, u8)> {
        match self.sps.get(1..4) {
            Some(&[profile, compat, level]) => Some((profile, compat, level)),
            _ => None,
        }
    }
}

/// Push-style scanner over an Annex-B byte stream.
///
/// Feed the stream in arbitrary chunks with [`Scanner::feed`], then call
/// [`Scanner::finish`]. Record sizes are only known once the successor
/// record (or the end of the stream) has been seen, so they are derived in
/// `finish`.
#[derive(Debug)]
pub struct Scanner {
    matcher: StartCodeMatcher,
    awaiting_header: bool,
    position: u64,
    records: Vec<NalRecord>,
    sps: ParameterSetCapture,
    pps: ParameterSetCapture,
    total_frame_count: u32,
    sync_frame_count: u32,
}

impl Scanner {
    pub fn new() -> Result<Self> {
        Self::with_capacity(INITIAL_RECORD_CAPACITY)
    }

    pub fn with_capacity(records: usize) -> Result<Self> {
        let mut list = Vec::new();
        list.try_reserve_exact(records.max(1))?;
        Ok(Self {
            matcher: StartCodeMatcher::new(),
            awaiting_header: false,
            position: 0,
            records: list,
            sps: ParameterSetCapture::new(ParameterSetKind::Sps)?,
            pps: ParameterSetCapture::new(ParameterSetKind::Pps)?,
            total_frame_count: 0,
            sync_frame_count: 0,
        })
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Records seen so far (sizes not yet derived).
    pub fn records(&self) -> &[NalRecord] {
        &self.records
    }

    /// Consume the next chunk of the stream.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<()> {
        for &byte in chunk {
            if self.awaiting_header {
                self.awaiting_header = false;
                self.begin_nal(byte)?;
            } else {
                self.sps.push(byte)?;
                self.pps.push(byte)?;
                if self.matcher.push(byte) {
                    self.awaiting_header = true;
                }
            }
            self.position += 1;
        }
        Ok(())
    }

    fn begin_nal(&mut self, header: u8) -> Result<()> {
        // The start code that just ended was appended to whichever capture was open.
        self.sps.close(START_CODE_LEN);
        self.pps.close(START_CODE_LEN);

        let nal_type = NalType::from_header(header);
        let frame_index = if nal_type.is_sps() {
            self.open_capture(ParameterSetKind::Sps, header)?;
            FrameIndex::Sps
        } else if nal_type.is_pps() {
            self.open_capture(ParameterSetKind::Pps, header)?;
            FrameIndex::Pps
        } else {
            let index = self.total_frame_count;
            self.total_frame_count = index
                .checked_add(1)
                .ok_or_else(|| Error::too_large("picture count exceeds u32"))?;
            if nal_type.is_idr() {
                self.sync_frame_count += 1;
            }
            FrameIndex::Picture(index)
        };

        if self.records.is_empty() && self.position > START_CODE_LEN as u64 {
            warn!(
                "Ignoring {} bytes before the first start code",
                self.position - START_CODE_LEN as u64
            );
        }

        trace!(
            offset = self.position,
            frame_index = frame_index.as_raw(),
            "NAL {}",
            nal_type
        );

        push_growing(
            &mut self.records,
            NalRecord {
                frame_index,
                byte_offset: self.position,
                byte_size: 0,
                nal_type,
            },
        )
    }

    fn open_capture(&mut self, kind: ParameterSetKind, header: u8) -> Result<()> {
        let capture = match kind {
            ParameterSetKind::Sps => &mut self.sps,
            ParameterSetKind::Pps => &mut self.pps,
        };
        let position = self.position;
        capture.open(header).inspect_err(|_| {
            error!("Multiple {} at offset {:#010X}", kind, position);
        })
    }

    /// Finish the scan: close any open capture, validate the parameter sets
    /// and derive every record's size.
    pub fn finish(mut self) -> Result<ScanResult> {
        // A stream ending on a bare start code has no trailing payload.
        let (stream_end, trailing) = if self.awaiting_header {
            (self.position - START_CODE_LEN as u64, START_CODE_LEN)
        } else {
            (self.position, 0)
        };
        self.sps.close(trailing);
        self.pps.close(trailing);

        if self.sps.is_empty() || self.pps.is_empty() {
            error!(
                "Stream is missing a parameter set (sps_len={}, pps_len={})",
                self.sps.len(),
                self.pps.len()
            );
            return Err(Error::MissingParameterSet {
                sps_len: self.sps.len(),
                pps_len: self.pps.len(),
            });
        }

        derive_sizes(&mut self.records, stream_end);

        debug!(
            "Scanned {} bytes: {} NAL units, {} pictures ({} sync), SPS {} bytes, PPS {} bytes",
            self.position,
            self.records.len(),
            self.total_frame_count,
            self.sync_frame_count,
            self.sps.len(),
            self.pps.len()
        );

        Ok(ScanResult {
            records: self.records,
            sps: self.sps.into_bytes(),
            pps: self.pps.into_bytes(),
            total_frame_count: self.total_frame_count,
            sync_frame_count: self.sync_frame_count,
            stream_len: self.position,
        })
    }
}

/// Each payload runs up to the start code preceding its successor; the last
/// one runs to `stream_end`.
fn derive_sizes(records: &mut [NalRecord], stream_end: u64) {
    let mut next_start = stream_end;
    for record in records.iter_mut().rev() {
        record.byte_size = next_start.saturating_sub(record.byte_offset);
        next_start = record.byte_offset.saturating_sub(START_CODE_LEN as u64);
    }
}

/// Scan a complete stream from a reader.
pub fn scan_reader<R: Read>(mut reader: R) -> Result<ScanResult> {
    let mut scanner = Scanner::new()?;
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Read(e)),
        };
        scanner.feed(&buf[..n])?;
    }
    scanner.finish()
}

/// Scan the stream stored at `path`.
pub fn scan_path(path: &Path) -> Result<ScanResult> {
    let file = File::open(path).map_err(|source| Error::SourceOpen {
        path: path.to_path_buf(),
        source,
    })?;
    scan_reader(io::BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annexb::to_annexb as test_stream;

    const SPS: &[u8] = &[0x67, 0x64, 0x00, 0x1F, 0xAC, 0xD9];
    const PPS: &[u8] = &[0x68, 0xEB, 0xE3, 0xCB];

    #[test]
    fn test_scan_basic_stream() {
        let idr = vec![0x65; 50];
        let p = vec![0x41; 12];
        let stream = test_stream(&[SPS, PPS, &idr, &p]);

        let scan = scan_reader(stream.as_slice()).unwrap();
        assert_eq!(scan.sps, SPS);
        assert_eq!(scan.pps, PPS);
        assert_eq!(scan.total_frame_count, 2);
        assert_eq!(scan.sync_frame_count, 1);
        assert_eq!(scan.stream_len, stream.len() as u64);

        let raw: Vec<i64> = scan.records.iter().map(|r| r.frame_index.as_raw()).collect();
        assert_eq!(raw, vec![-1, -2, 0, 1]);

        let sizes: Vec<u64> = scan.records.iter().map(|r| r.byte_size).collect();
        assert_eq!(sizes, vec![6, 4, 50, 12]);

        assert_eq!(scan.records[0].byte_offset, 4);
        assert_eq!(scan.records[1].byte_offset, 4 + 6 + 4);
        assert_eq!(scan.sync_sample_numbers().collect::<Vec<_>>(), vec![1]);
        assert_eq!(scan.picture_bytes(), 62);
        assert_eq!(scan.profile_level(), Some((0x64, 0x00, 0x1F)));
    }

    #[test]
    fn test_payloads_match_source_bytes() {
        let idr = [0x65, 0x88, 0x80, 0x40];
        let p = [0x41, 0x9A, 0x02];
        let stream = test_stream(&[&idr, SPS, &p, PPS]);
        let scan = scan_reader(stream.as_slice()).unwrap();

        let payloads: Vec<&[u8]> = scan
            .pictures()
            .map(|r| &stream[r.byte_offset as usize..r.end_offset() as usize])
            .collect();
        assert_eq!(payloads, vec![&idr[..], &p[..]]);
        assert_eq!(scan.sps, SPS);
        assert_eq!(scan.pps, PPS);
    }

    #[test]
    fn test_chunked_feed_matches_single_feed() {
        let idr = vec![0x65; 300];
        let stream = test_stream(&[SPS, PPS, &idr, &[0x41, 1, 2, 3], &idr]);
        let whole = scan_reader(stream.as_slice()).unwrap();

        for chunk in [1, 3, 7, 64] {
            let mut scanner = Scanner::with_capacity(1).unwrap();
            for part in stream.chunks(chunk) {
                scanner.feed(part).unwrap();
            }
            let scan = scanner.finish().unwrap();
            assert_eq!(scan.records, whole.records);
            assert_eq!(scan.sps, whole.sps);
            assert_eq!(scan.pps, whole.pps);
        }
    }

    #[test]
    fn test_duplicate_sps_is_fatal() {
        let stream = test_stream(&[SPS, PPS, &[0x65, 1], SPS]);
        let err = scan_reader(stream.as_slice()).unwrap_err();
        assert!(matches!(
            err,
            Error::DuplicateParameterSet(ParameterSetKind::Sps)
        ));
        assert_eq!(err.code(), -1);
    }

    #[test]
    fn test_duplicate_pps_is_fatal() {
        let stream = test_stream(&[SPS, PPS, PPS, &[0x65, 1]]);
        let err = scan_reader(stream.as_slice()).unwrap_err();
        assert!(matches!(
            err,
            Error::DuplicateParameterSet(ParameterSetKind::Pps)
        ));
        assert_eq!(err.code(), -2);
    }

    #[test]
    fn test_missing_pps_is_fatal() {
        let stream = test_stream(&[SPS, &[0x65, 1, 2]]);
        let err = scan_reader(stream.as_slice()).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingParameterSet {
                sps_len: 6,
                pps_len: 0
            }
        ));
    }

    #[test]
    fn test_empty_stream_is_missing_parameter_sets() {
        let err = scan_reader(&[][..]).unwrap_err();
        assert_eq!(err.code(), -3);
    }

    #[test]
    fn test_parameter_set_last_runs_to_end_of_stream() {
        let stream = test_stream(&[&[0x65, 9, 9], SPS, PPS]);
        let scan = scan_reader(stream.as_slice()).unwrap();
        assert_eq!(scan.pps, PPS);
        assert_eq!(scan.records.last().unwrap().byte_size, PPS.len() as u64);
    }

    #[test]
    fn test_trailing_start_code_is_trimmed() {
        let mut stream = test_stream(&[SPS, PPS, &[0x65, 7]]);
        stream.extend_from_slice(&[0, 0, 0, 1]);
        let scan = scan_reader(stream.as_slice()).unwrap();
        assert_eq!(scan.records.last().unwrap().byte_size, 2);

        let mut stream = test_stream(&[SPS, &[0x65, 7], PPS]);
        stream.extend_from_slice(&[0, 0, 0, 1]);
        let scan = scan_reader(stream.as_slice()).unwrap();
        assert_eq!(scan.pps, PPS);
    }

    #[test]
    fn test_leading_garbage_is_skipped() {
        let mut stream = vec![0xFF, 0x00, 0x12];
        stream.extend(test_stream(&[SPS, PPS, &[0x65, 1]]));
        let scan = scan_reader(stream.as_slice()).unwrap();
        assert_eq!(scan.records[0].byte_offset, 7);
        assert_eq!(scan.total_frame_count, 1);
    }

    #[test]
    fn test_no_sync_pictures() {
        let stream = test_stream(&[SPS, PPS, &[0x41, 1], &[0x41, 2]]);
        let scan = scan_reader(stream.as_slice()).unwrap();
        assert_eq!(scan.total_frame_count, 2);
        assert_eq!(scan.sync_frame_count, 0);
        assert_eq!(scan.sync_sample_numbers().count(), 0);
    }

    #[test]
    fn test_scan_path_missing_file() {
        let err = scan_path(Path::new("/nonexistent/avcmux/input.h264")).unwrap_err();
        assert!(matches!(err, Error::SourceOpen { .. }));
        assert_eq!(err.code(), -5);
    }
}
