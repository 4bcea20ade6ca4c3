//! Human- and machine-readable summaries for the CLI.

use avcmux_media::annexb::ScanResult;
use avcmux_media::{ConversionSummary, VerifyReport};
use serde::Serialize;
use std::collections::BTreeMap;

/// Index summary of an Annex-B stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub stream_bytes: u64,
    pub nal_units: usize,
    pub total_frame_count: u32,
    pub sync_frame_count: u32,
    pub picture_bytes: u64,
    pub sps_len: usize,
    pub pps_len: usize,
    /// `avc1.PPCCLL`, when the SPS carries profile and level bytes.
    pub codec: Option<String>,
    /// NAL unit count per type name.
    pub nal_types: BTreeMap<String, usize>,
}

impl ScanReport {
    pub fn from_scan(scan: &ScanResult) -> Self {
        let mut nal_types = BTreeMap::new();
        for record in &scan.records {
            *nal_types.entry(record.nal_type.to_string()).or_insert(0) += 1;
        }

        Self {
            stream_bytes: scan.stream_len,
            nal_units: scan.records.len(),
            total_frame_count: scan.total_frame_count,
            sync_frame_count: scan.sync_frame_count,
            picture_bytes: scan.picture_bytes(),
            sps_len: scan.sps.len(),
            pps_len: scan.pps.len(),
            codec: scan
                .profile_level()
                .map(|(p, c, l)| format!("avc1.{:02X}{:02X}{:02X}", p, c, l)),
            nal_types,
        }
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "Stream: {} bytes, {} NAL units\n",
            self.stream_bytes, self.nal_units
        ));
        out.push_str(&format!(
            "Pictures: {} ({} sync), {} bytes\n",
            self.total_frame_count, self.sync_frame_count, self.picture_bytes
        ));
        out.push_str(&format!("SPS: {} bytes, PPS: {} bytes\n", self.sps_len, self.pps_len));
        if let Some(ref codec) = self.codec {
            out.push_str(&format!("Codec: {}\n", codec));
        }
        out.push_str("\nNAL types:\n");
        for (name, count) in &self.nal_types {
            out.push_str(&format!("  {:<20} {}\n", name, count));
        }
        out
    }
}

/// Format milliseconds as `HH:MM:SS.mmm`.
pub fn format_duration_ms(ms: u64) -> String {
    let secs = ms / 1000;
    let mins = secs / 60;
    let hours = mins / 60;
    format!("{:02}:{:02}:{:02}.{:03}", hours, mins % 60, secs % 60, ms % 1000)
}

pub fn conversion_text(summary: &ConversionSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Video: {} {}x{} @ {} fps\n",
        summary.codec, summary.width, summary.height, summary.frame_rate
    ));
    out.push_str(&format!(
        "Frames: {} ({} sync)\n",
        summary.total_frame_count, summary.sync_frame_count
    ));
    out.push_str(&format!(
        "Duration: {}\n",
        format_duration_ms(summary.duration_ms as u64)
    ));
    out.push_str(&format!(
        "Size: {} -> {} bytes\n",
        summary.source_bytes, summary.output_bytes
    ));
    out
}

pub fn verify_text(report: &VerifyReport) -> String {
    let mut out = String::new();
    if let Some(ref codec) = report.codec {
        out.push_str(&format!("Video: {}", codec));
        if let (Some(w), Some(h)) = (report.width, report.height) {
            out.push_str(&format!(" {}x{}", w, h));
        }
        if report.media_timescale > 0 {
            out.push_str(&format!(" @ {} fps", report.media_timescale));
        }
        out.push('\n');
    }
    out.push_str(&format!(
        "Samples: {} ({} sync)\n",
        report.sample_count, report.sync_count
    ));
    out.push_str(&format!("Duration: {}\n", format_duration_ms(report.duration_ms)));
    if let Some(ref encoder) = report.encoder {
        out.push_str(&format!("Encoder: {}\n", encoder));
    }
    if report.is_ok() {
        out.push_str("✓ All checks passed\n");
    } else {
        out.push_str(&format!("✗ {} issue(s):\n", report.issues.len()));
        for issue in &report.issues {
            out.push_str(&format!("  - {}\n", issue));
        }
    }
    out
}
