//! Scan-then-write conversion pipeline.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use tracing::{error, info};

use crate::annexb::{scan_path, ScanResult};
use crate::error::{Error, Result};
use crate::mp4::{AvcDecoderConfig, MovieBuilder, MovieOptions, Mp4Writer, VideoParams};

/// What a finished conversion produced.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct ConversionSummary {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub total_frame_count: u32,
    pub sync_frame_count: u32,
    pub nal_unit_count: usize,
    pub sps_len: usize,
    pub pps_len: usize,
    pub codec: String,
    pub source_bytes: u64,
    pub output_bytes: u64,
    /// Movie duration in milliseconds.
    pub duration_ms: u32,
}

/// Conversion context: geometry, rate and cosmetic options for one or more
/// independent conversions. Holds no per-stream state between calls.
#[derive(Debug, Clone)]
pub struct ConversionSession {
    params: VideoParams,
    options: MovieOptions,
}

impl ConversionSession {
    /// Fails with [`Error::InvalidParameters`] if `params` is out of range.
    pub fn new(params: VideoParams, options: MovieOptions) -> Result<Self> {
        params.validate()?;
        Ok(Self { params, options })
    }

    pub fn params(&self) -> VideoParams {
        self.params
    }

    pub fn options(&self) -> &MovieOptions {
        &self.options
    }

    /// Index the source stream.
    pub fn scan(&self, source: &Path) -> Result<ScanResult> {
        scan_path(source)
    }

    /// Emit the container for an already scanned stream.
    pub fn write<R, W>(&self, scan: &ScanResult, source: &mut R, destination: W) -> Result<ConversionSummary>
    where
        R: Read + Seek,
        W: Write,
    {
        let layout = MovieBuilder::new(scan, self.params, &self.options).build()?;
        let mut writer = Mp4Writer::new(destination);
        let output_bytes = writer.write_movie(&layout, scan, source)?;
        let codec = AvcDecoderConfig::from_parameter_sets(&scan.sps, &scan.pps)?.codec_string();

        Ok(ConversionSummary {
            width: self.params.width,
            height: self.params.height,
            frame_rate: self.params.frame_rate,
            total_frame_count: scan.total_frame_count,
            sync_frame_count: scan.sync_frame_count,
            nal_unit_count: scan.records.len(),
            sps_len: scan.sps.len(),
            pps_len: scan.pps.len(),
            codec,
            source_bytes: scan.stream_len,
            output_bytes,
            duration_ms: layout.movie_duration,
        })
    }

    /// Convert `source` into `destination`.
    ///
    /// The destination is only created once the scan has succeeded.
    pub fn convert(&self, source: &Path, destination: &Path) -> Result<ConversionSummary> {
        let scan = self.scan(source)?;
        self.write_file(&scan, source, destination)
    }

    /// Create `destination` and write the container for a stream scanned from
    /// `source`. A failure after creation leaves a partial file behind for the
    /// caller to remove.
    pub fn write_file(
        &self,
        scan: &ScanResult,
        source: &Path,
        destination: &Path,
    ) -> Result<ConversionSummary> {
        let mut input = open_source(source)?;
        let output = create_destination(destination)?;

        let summary = self.write(scan, &mut input, BufWriter::new(output))?;
        info!(
            "Converted {:?} -> {:?}: {} frames ({} sync), {} ms, {} bytes",
            source,
            destination,
            summary.total_frame_count,
            summary.sync_frame_count,
            summary.duration_ms,
            summary.output_bytes
        );
        Ok(summary)
    }
}

/// Open a scanned source for the write phase.
pub fn open_source(source: &Path) -> Result<BufReader<File>> {
    File::open(source)
        .map(BufReader::new)
        .map_err(|e| Error::SourceOpen {
            path: source.to_path_buf(),
            source: e,
        })
}

/// Create (or truncate) the destination file.
pub fn create_destination(destination: &Path) -> Result<File> {
    File::create(destination).map_err(|e| Error::DestinationOpen {
        path: destination.to_path_buf(),
        source: e,
    })
}

/// Host entry point: convert and report `0` or a negative result code.
pub fn convert<P: AsRef<Path>, Q: AsRef<Path>>(
    source: P,
    destination: Q,
    width: u32,
    height: u32,
    frame_rate: u32,
) -> i32 {
    let result = ConversionSession::new(
        VideoParams::new(width, height, frame_rate),
        MovieOptions::default(),
    )
    .and_then(|session| session.convert(source.as_ref(), destination.as_ref()));

    match result {
        Ok(_) => 0,
        Err(e) => {
            error!("Conversion failed: {}", e);
            e.code()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annexb::to_annexb;
    use crate::mp4::verify_file;
    use std::fs;
    use tempfile::TempDir;

    const SPS: &[u8] = &[0x67, 0x64, 0x00, 0x1F, 0xAC, 0xD9];
    const PPS: &[u8] = &[0x68, 0xEB, 0xE3, 0xCB];

    fn write_source(dir: &TempDir, nal_units: &[&[u8]]) -> std::path::PathBuf {
        let path = dir.path().join("in.h264");
        fs::write(&path, to_annexb(nal_units)).unwrap();
        path
    }

    #[test]
    fn test_convert_success() {
        let dir = TempDir::new().unwrap();
        let idr = vec![0x65; 5000];
        let p = vec![0x41; 1200];
        let src = write_source(&dir, &[SPS, PPS, &idr, &p]);
        let dst = dir.path().join("out.mp4");

        assert_eq!(convert(&src, &dst, 640, 480, 30), 0);

        let report = verify_file(&dst).unwrap();
        assert!(report.is_ok(), "{:?}", report.issues);
        assert_eq!(report.sample_count, 2);
        assert_eq!(report.sync_count, 1);
    }

    #[test]
    fn test_duplicate_sps_creates_no_destination() {
        let dir = TempDir::new().unwrap();
        let idr = vec![0x65; 10];
        let src = write_source(&dir, &[SPS, PPS, SPS, &idr]);
        let dst = dir.path().join("out.mp4");

        assert_eq!(convert(&src, &dst, 640, 480, 30), -1);
        assert!(!dst.exists());
    }

    #[test]
    fn test_result_codes() {
        let dir = TempDir::new().unwrap();
        let idr = vec![0x65; 10];
        let dst = dir.path().join("out.mp4");

        let src = write_source(&dir, &[SPS, PPS, PPS, &idr]);
        assert_eq!(convert(&src, &dst, 640, 480, 30), -2);

        let src = write_source(&dir, &[SPS, &idr]);
        assert_eq!(convert(&src, &dst, 640, 480, 30), -3);

        let missing = dir.path().join("missing.h264");
        assert_eq!(convert(&missing, &dst, 640, 480, 30), -5);

        let src = write_source(&dir, &[SPS, PPS, &idr]);
        let bad_dst = dir.path().join("no_such_dir").join("out.mp4");
        assert_eq!(convert(&src, &bad_dst, 640, 480, 30), -6);

        assert_eq!(convert(&src, &dst, 0, 480, 30), -8);
        assert_eq!(convert(&src, &dst, 640, 480, 0), -8);
    }

    #[test]
    fn test_session_summary() {
        let dir = TempDir::new().unwrap();
        let idr = vec![0x65; 100];
        let p = vec![0x41; 30];
        let src = write_source(&dir, &[SPS, PPS, &idr, &p, &p, &idr]);
        let dst = dir.path().join("out.mp4");

        let session =
            ConversionSession::new(VideoParams::new(1920, 1080, 25), MovieOptions::default())
                .unwrap();
        let summary = session.convert(&src, &dst).unwrap();

        assert_eq!(summary.total_frame_count, 4);
        assert_eq!(summary.sync_frame_count, 2);
        assert_eq!(summary.nal_unit_count, 6);
        assert_eq!(summary.duration_ms, 160);
        assert_eq!(summary.codec, "avc1.64001F");
        assert_eq!(summary.output_bytes, fs::metadata(&dst).unwrap().len());

        // sessions carry no stream state between conversions
        let again = session.convert(&src, &dir.path().join("again.mp4")).unwrap();
        assert_eq!(again, summary);
    }

    #[test]
    fn test_round_trip_reproduces_pictures() {
        let dir = TempDir::new().unwrap();
        let idr: Vec<u8> = (1..=255u8).collect();
        let p = vec![0x41, 0x00, 0x00, 0x02, 0x7F];
        let src = write_source(&dir, &[&idr, SPS, &p, PPS, &p]);
        let dst = dir.path().join("out.mp4");
        assert_eq!(convert(&src, &dst, 640, 480, 30), 0);

        let bytes = fs::read(&dst).unwrap();
        let mp4 = crate::mp4::Mp4File::open(&dst).unwrap();
        let mut rebuilt = Vec::new();
        for sample in mp4.video_samples().unwrap().iter() {
            let at = sample.offset as usize + 4;
            rebuilt.push(bytes[at..at + sample.size as usize - 4].to_vec());
        }
        assert_eq!(rebuilt, vec![idr, p.clone(), p]);
    }
}
