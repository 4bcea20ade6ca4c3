//! Read-back verification of a produced file.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use tracing::{debug, warn};

use super::movie::{MOVIE_TIMESCALE, SAMPLE_LENGTH_PREFIX};
use super::{AtomType, Mp4File};
use crate::error::{Error, Result};

/// Outcome of [`verify`].
///
/// Structural problems are collected in `issues` rather than failing fast, so
/// a single run reports everything that is wrong with a file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct VerifyReport {
    pub sample_count: u32,
    pub sync_count: u32,
    pub duration_ms: u64,
    pub media_timescale: u32,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub codec: Option<String>,
    pub encoder: Option<String>,
    pub issues: Vec<String>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }

    /// Turn a report with issues into [`Error::InvalidMp4`].
    pub fn into_result(self) -> Result<Self> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(Error::invalid_mp4(self.issues.join("; ")))
        }
    }
}

/// Parse and verify the file at `path`.
pub fn verify_file(path: &Path) -> Result<VerifyReport> {
    let file = File::open(path).map_err(|source| Error::SourceOpen {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(file);
    let mp4 = Mp4File::parse(&mut reader)?;
    verify(&mp4, &mut reader)
}

/// Check a parsed file against the invariants every converted file satisfies:
/// table counts agree, durations agree, samples tile `mdat` and each sample
/// starts with a length prefix equal to its `stsz` entry minus four.
pub fn verify<R: Read + Seek>(mp4: &Mp4File, reader: &mut R) -> Result<VerifyReport> {
    let mut report = VerifyReport {
        duration_ms: mp4.duration,
        encoder: mp4.encoder.clone(),
        ..Default::default()
    };
    let mut issues = Vec::new();

    if mp4.major_brand != Some(AtomType::ISOM) {
        issues.push(format!("unexpected major brand {:?}", mp4.major_brand.map(|b| b.to_string())));
    }
    if mp4.timescale != MOVIE_TIMESCALE {
        issues.push(format!("movie timescale {} != {}", mp4.timescale, MOVIE_TIMESCALE));
    }
    if !mp4.has_faststart {
        issues.push("moov does not precede mdat".to_string());
    }

    let Some(track) = &mp4.video_track else {
        issues.push("no video track".to_string());
        report.issues = issues;
        return Ok(report);
    };
    let table = &track.sample_table;

    report.sample_count = table.sample_count;
    report.sync_count = table.keyframe_indices().len() as u32;
    report.media_timescale = track.timescale;
    report.width = track.width;
    report.height = track.height;

    if track.sample_entry != Some(AtomType::AVC1) {
        issues.push(format!(
            "sample entry is {:?}, expected avc1",
            track.sample_entry.map(|t| t.to_string())
        ));
    }
    match mp4.decoder_config() {
        Some(Ok(config)) => report.codec = Some(config.codec_string()),
        Some(Err(e)) => issues.push(format!("avcC: {}", e)),
        None => issues.push("missing avcC".to_string()),
    }

    // Counts
    let count = table.sample_count as u64;
    if table.stts_sample_count != count {
        issues.push(format!(
            "stts covers {} samples, stsz has {}",
            table.stts_sample_count, count
        ));
    }
    if table.chunk_count as u64 != count {
        issues.push(format!("stco has {} entries, stsz has {}", table.chunk_count, count));
    }
    if let Some(sync) = &table.sync_samples {
        if sync.windows(2).any(|w| w[0] >= w[1]) {
            issues.push("stss entries are not strictly ascending".to_string());
        }
        if let Some(bad) = sync.iter().find(|&&n| n == 0 || n as u64 > count) {
            issues.push(format!("stss entry {} out of range 1..={}", bad, count));
        }
    }

    // Durations
    if track.duration != count {
        issues.push(format!("mdhd duration {} != sample count {}", track.duration, count));
    }
    if table.stts_duration != track.duration {
        issues.push(format!(
            "stts duration {} != mdhd duration {}",
            table.stts_duration, track.duration
        ));
    }
    if track.timescale == 0 {
        issues.push("media timescale is zero".to_string());
    } else {
        let expected = MOVIE_TIMESCALE as u64 * count / track.timescale as u64;
        if mp4.duration != expected {
            issues.push(format!("mvhd duration {} != expected {}", mp4.duration, expected));
        }
    }
    if track.header_duration != mp4.duration {
        issues.push(format!(
            "tkhd duration {} != mvhd duration {}",
            track.header_duration, mp4.duration
        ));
    }

    // Sample data
    match &mp4.mdat {
        None => issues.push("no mdat atom".to_string()),
        Some(mdat) => {
            let mut expected_offset = mdat.data_offset;
            for sample in table.iter() {
                if sample.offset != expected_offset {
                    issues.push(format!(
                        "sample {} at {} does not follow its predecessor (expected {})",
                        sample.index, sample.offset, expected_offset
                    ));
                    break;
                }
                if sample.size < SAMPLE_LENGTH_PREFIX {
                    issues.push(format!("sample {} is {} bytes", sample.index, sample.size));
                    break;
                }
                reader
                    .seek(SeekFrom::Start(sample.offset))
                    .map_err(Error::Read)?;
                let mut prefix = [0u8; 4];
                if reader.read_exact(&mut prefix).is_err() {
                    issues.push(format!("sample {} at {} is past end of file", sample.index, sample.offset));
                    break;
                }
                let length = u32::from_be_bytes(prefix);
                if length != sample.size - SAMPLE_LENGTH_PREFIX {
                    issues.push(format!(
                        "sample {} length prefix {} != stsz {} - 4",
                        sample.index, length, sample.size
                    ));
                }
                expected_offset += sample.size as u64;
            }
            if issues.is_empty() && expected_offset != mdat.end_offset() {
                issues.push(format!(
                    "samples end at {}, mdat ends at {}",
                    expected_offset,
                    mdat.end_offset()
                ));
            }
        }
    }

    report.issues = issues;
    if report.is_ok() {
        debug!(
            "Verified {} samples ({} sync), {} ms",
            report.sample_count, report.sync_count, report.duration_ms
        );
    } else {
        for issue in &report.issues {
            warn!("verify: {}", issue);
        }
    }
    Ok(report)
}
